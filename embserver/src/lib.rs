//! Host application for the embeddable audio player.
//!
//! Wires the playback controller to an HTTP/WebSocket surface: state and
//! source APIs, an SSE event stream, the player.js receiver endpoint, the
//! embed shell with its error-recovery convention, and the protocol
//! conformance harness.

pub mod embed;
pub mod harness;
pub mod routes;
pub mod server;

pub use harness::{ConformanceReport, HarnessError};
pub use routes::AppState;
pub use server::{Server, ServerBuilder, ServerInfo};
