//! Remote-control error taxonomy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReceiverError {
    /// A receiver must never be constructed against a null playback target.
    #[error("No playback target available")]
    NoPlaybackTarget,

    #[error("Malformed protocol frame: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    #[error("Message channel closed")]
    ChannelClosed,

    #[error("Timed out waiting for a response to '{0}'")]
    ResponseTimeout(String),
}
