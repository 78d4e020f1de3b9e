//! player.js-compatible remote-control layer.
//!
//! [`Receiver`] adapts a [`embplayer::PlayerController`] to the player.js
//! JSON command/event protocol; [`RemotePlayer`] is the matching controller
//! side. Both are transport-agnostic: frames travel over plain string
//! message channels ([`port::MessagePort`]), so a WebSocket, postMessage
//! bridge or in-process pair can carry them unchanged.

pub mod client;
pub mod error;
pub mod port;
pub mod protocol;
pub mod receiver;

pub use client::RemotePlayer;
pub use error::ReceiverError;
pub use port::{port_pair, MessagePort};
pub use receiver::Receiver;
