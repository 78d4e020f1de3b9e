//! Playback controller for the embeddable audio player.
//!
//! Owns the media engine handle, exposes control operations and derived
//! [`PlayerState`] snapshots, and drives the playing tick loop that
//! republishes state and enforces the auto-stop cap.

pub mod controller;
pub mod events;
pub mod state;
pub mod stop_at;

pub use controller::PlayerController;
pub use events::{PlayerEvent, PlayerEventBus};
pub use state::PlayerState;
pub use stop_at::StopAt;
