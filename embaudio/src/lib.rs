//! Media engine: loads audio sources and plays them through a pluggable
//! backend.
//!
//! The [`AudioBackend`] trait is the seam between playback logic and the
//! actual audio path. Two implementations are provided:
//!
//! - [`DeviceBackend`] decodes with symphonia and renders through the default
//!   cpal output device, with a varispeed read head for playback-rate changes.
//! - [`SimBackend`] is a deterministic in-memory backend for headless tests:
//!   time advances only when the test asks it to (or via a wall clock when
//!   explicitly started).
//!
//! [`AudioHandle`] wraps a backend with media-element semantics: source
//! resolution, identical-source no-ops, and zeroed getters when no source is
//! set.

pub mod backend;
pub mod device;
pub mod error;
pub mod events;
pub mod handle;
pub mod sim;
pub mod source;

pub use backend::AudioBackend;
pub use device::DeviceBackend;
pub use error::{AudioError, MediaErrorCode, MediaErrorInfo};
pub use events::{MediaEvent, MediaEventBus};
pub use handle::AudioHandle;
pub use sim::SimBackend;
pub use source::{cache_busted, resolve_source};
