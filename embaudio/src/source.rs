//! Source URI addressing.
//!
//! Source identifiers are URIs: a leading `/` resolves against the
//! configured origin, anything else is taken as absolute. The cache-busting
//! helper implements the embed-layer recovery convention of re-requesting a
//! URI with a timestamp query parameter to defeat a corrupt cached response.

use std::path::PathBuf;

/// Resolves a raw source identifier against an origin.
pub fn resolve_source(raw: &str, origin: &str) -> String {
    if raw.starts_with('/') {
        format!("{}{}", origin.trim_end_matches('/'), raw)
    } else {
        raw.to_string()
    }
}

/// Appends the current unix-millis timestamp as a query parameter.
pub fn cache_busted(uri: &str) -> String {
    let stamp = chrono::Utc::now().timestamp_millis();
    if uri.contains('?') {
        format!("{uri}&{stamp}")
    } else {
        format!("{uri}?{stamp}")
    }
}

/// Where the bytes of a resolved source come from.
#[derive(Clone, Debug, PartialEq)]
pub enum SourceKind {
    Http(String),
    File(PathBuf),
}

/// Classifies a resolved URI. `http(s)://` is fetched over the network,
/// `file://` and bare paths are read from disk.
pub fn classify(uri: &str) -> SourceKind {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        SourceKind::Http(uri.to_string())
    } else if let Some(path) = uri.strip_prefix("file://") {
        SourceKind::File(PathBuf::from(path))
    } else {
        SourceKind::File(PathBuf::from(uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_slash_resolves_against_origin() {
        assert_eq!(
            resolve_source("/a.mp3", "http://localhost:8080"),
            "http://localhost:8080/a.mp3"
        );
        assert_eq!(
            resolve_source("/a.mp3", "http://localhost:8080/"),
            "http://localhost:8080/a.mp3"
        );
    }

    #[test]
    fn absolute_uri_passes_through() {
        assert_eq!(
            resolve_source("https://cdn.example.org/a.flac", "http://localhost"),
            "https://cdn.example.org/a.flac"
        );
    }

    #[test]
    fn cache_busting_appends_a_query_parameter() {
        let busted = cache_busted("http://x/a.mp3");
        assert!(busted.starts_with("http://x/a.mp3?"));

        let busted = cache_busted("http://x/a.mp3?token=1");
        assert!(busted.starts_with("http://x/a.mp3?token=1&"));
    }

    #[test]
    fn classify_splits_network_and_disk() {
        assert_eq!(
            classify("https://x/a.mp3"),
            SourceKind::Http("https://x/a.mp3".into())
        );
        assert_eq!(
            classify("file:///tmp/a.wav"),
            SourceKind::File(PathBuf::from("/tmp/a.wav"))
        );
        assert_eq!(
            classify("/tmp/a.wav"),
            SourceKind::File(PathBuf::from("/tmp/a.wav"))
        );
    }
}
