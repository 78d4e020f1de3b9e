//! player.js wire protocol frames.
//!
//! The protocol is a JSON command/event convention originally carried over
//! `postMessage` (<https://github.com/embedly/player.js>). Frames are tagged
//! with a `context` and `version`; anything not bearing the player.js context
//! is ignored so the channel can be shared with unrelated traffic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CONTEXT: &str = "player.js";
pub const VERSION: &str = "0.0.11";

/// Events the receiver can emit.
pub const EVENTS: &[&str] = &["ready", "play", "pause", "timeupdate", "ended"];

/// Methods the receiver answers.
pub const METHODS: &[&str] = &[
    "play",
    "pause",
    "getPaused",
    "getDuration",
    "getVolume",
    "setVolume",
    "mute",
    "unmute",
    "getMuted",
    "getLoop",
    "setLoop",
    "getCurrentTime",
    "setCurrentTime",
    "addEventListener",
    "removeEventListener",
];

/// A command sent by the controlling frame to the receiver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFrame {
    pub context: String,
    pub version: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener: Option<String>,
}

impl CommandFrame {
    pub fn new(method: &str) -> Self {
        Self {
            context: CONTEXT.to_string(),
            version: VERSION.to_string(),
            method: method.to_string(),
            value: None,
            listener: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_listener(mut self, listener: &str) -> Self {
        self.listener = Some(listener.to_string());
        self
    }

    pub fn is_player_js(&self) -> bool {
        self.context == CONTEXT
    }
}

/// A frame sent by the receiver: either an event notification or the
/// callback answer to a `get*` command (carrying the command's listener
/// token and no event name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundFrame {
    pub context: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl OutboundFrame {
    pub fn event(name: &str, value: Option<Value>) -> Self {
        Self {
            context: CONTEXT.to_string(),
            version: VERSION.to_string(),
            event: Some(name.to_string()),
            listener: None,
            value,
        }
    }

    pub fn callback(listener: &str, value: Value) -> Self {
        Self {
            context: CONTEXT.to_string(),
            version: VERSION.to_string(),
            event: None,
            listener: Some(listener.to_string()),
            value: Some(value),
        }
    }

    pub fn is_player_js(&self) -> bool {
        self.context == CONTEXT
    }
}

/// Payload of the `ready` event, advertising the supported surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    pub events: Vec<String>,
    pub methods: Vec<String>,
}

/// Payload of `timeupdate` events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeUpdatePayload {
    pub seconds: f64,
    pub duration: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frame_round_trips() {
        let frame = CommandFrame::new("setVolume")
            .with_value(50.into())
            .with_listener("listener-3");
        let json = serde_json::to_string(&frame).unwrap();
        let parsed: CommandFrame = serde_json::from_str(&json).unwrap();
        assert!(parsed.is_player_js());
        assert_eq!(parsed.method, "setVolume");
        assert_eq!(parsed.value, Some(50.into()));
        assert_eq!(parsed.listener.as_deref(), Some("listener-3"));
    }

    #[test]
    fn foreign_context_is_detectable() {
        let raw = r#"{"context":"other-widget","version":"1.0","method":"play"}"#;
        let parsed: CommandFrame = serde_json::from_str(raw).unwrap();
        assert!(!parsed.is_player_js());
    }

    #[test]
    fn event_frame_omits_empty_fields() {
        let frame = OutboundFrame::event("ended", None);
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["event"], "ended");
        assert!(json.get("listener").is_none());
        assert!(json.get("value").is_none());
    }
}
