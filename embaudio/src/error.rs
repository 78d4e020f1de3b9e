use serde::Serialize;
use thiserror::Error;

/// Internal engine failures. These never cross the handle boundary directly:
/// the backend folds them into a [`MediaErrorInfo`] and raises an `error`
/// event, the way a native media element reports through `MediaError`.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio output device available")]
    NoOutputDevice,
    #[error("unsupported output sample format: {0}")]
    UnsupportedSampleFormat(String),
    #[error("failed to open source {uri}: {reason}")]
    SourceOpen { uri: String, reason: String },
    #[error("failed to probe media format: {0}")]
    Probe(String),
    #[error("no audio track in source")]
    NoAudioTrack,
    #[error("decode error: {0}")]
    Decode(String),
    #[error("seek failed: {0}")]
    Seek(String),
    #[error("output stream error: {0}")]
    Stream(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Native-media-element error codes (MediaError.code equivalents).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaErrorCode {
    Aborted,
    Network,
    Decode,
    SrcNotSupported,
}

impl MediaErrorCode {
    /// Numeric code as exposed by HTML `MediaError`.
    pub fn as_u8(self) -> u8 {
        match self {
            MediaErrorCode::Aborted => 1,
            MediaErrorCode::Network => 2,
            MediaErrorCode::Decode => 3,
            MediaErrorCode::SrcNotSupported => 4,
        }
    }
}

/// Per-source terminal error, recorded by the backend and published with the
/// `error` event. Recovery (cache-busting resubmission) is an embed-layer
/// decision, never taken here.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MediaErrorInfo {
    pub code: MediaErrorCode,
    pub message: String,
    /// Source URI the error occurred for.
    pub src: String,
}

impl MediaErrorInfo {
    pub fn new(code: MediaErrorCode, message: impl Into<String>, src: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            src: src.into(),
        }
    }
}

impl AudioError {
    /// Maps an engine failure onto the native media error taxonomy.
    pub fn media_code(&self) -> MediaErrorCode {
        match self {
            AudioError::SourceOpen { .. } | AudioError::Io(_) => MediaErrorCode::Network,
            AudioError::Probe(_) | AudioError::NoAudioTrack => MediaErrorCode::SrcNotSupported,
            AudioError::Decode(_) | AudioError::Seek(_) => MediaErrorCode::Decode,
            AudioError::NoOutputDevice
            | AudioError::UnsupportedSampleFormat(_)
            | AudioError::Stream(_) => MediaErrorCode::Aborted,
        }
    }

    /// Convenience conversion into the published error record.
    pub fn into_media_error(self, src: &str) -> MediaErrorInfo {
        MediaErrorInfo::new(self.media_code(), self.to_string(), src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_codes_match_native_numbering() {
        assert_eq!(MediaErrorCode::Aborted.as_u8(), 1);
        assert_eq!(MediaErrorCode::Network.as_u8(), 2);
        assert_eq!(MediaErrorCode::Decode.as_u8(), 3);
        assert_eq!(MediaErrorCode::SrcNotSupported.as_u8(), 4);
    }

    #[test]
    fn source_open_maps_to_network() {
        let err = AudioError::SourceOpen {
            uri: "http://x/a.mp3".into(),
            reason: "timeout".into(),
        };
        assert_eq!(err.media_code(), MediaErrorCode::Network);
    }
}
