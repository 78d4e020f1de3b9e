//! Derived playback state snapshot published to subscribers.

use embaudio::MediaErrorInfo;
use serde::Serialize;
use serde_json::Value;

/// One snapshot of the playback session, as seen by UI and remote consumers.
///
/// While a source is still loading, `seek_time` and `duration` are absent
/// rather than numeric placeholders, and `playback_rate` falls back to `1.0`;
/// a just-replaced source must not expose stale values.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub is_playing: bool,
    pub is_loading: bool,
    pub is_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seek_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    pub playback_rate: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<MediaErrorInfo>,
}

impl PlayerState {
    /// State of a controller with no source attached.
    pub fn idle() -> Self {
        Self {
            is_playing: false,
            is_loading: false,
            is_loaded: false,
            seek_time: None,
            duration: None,
            playback_rate: 1.0,
            source: None,
            meta: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_state_omits_unknown_numerics() {
        let state = PlayerState {
            is_loading: true,
            source: Some("http://localhost:8080/a.mp3".to_string()),
            ..PlayerState::idle()
        };
        let json = serde_json::to_value(&state).unwrap();
        assert!(json.get("seekTime").is_none());
        assert!(json.get("duration").is_none());
        assert_eq!(json["playbackRate"], 1.0);
    }
}
