//! Capability interface of the playback backends.
//!
//! The engine handle drives exactly one backend at a time. Backends are
//! selected at construction (real device output, or the clock-driven fake
//! used under test), never patched onto a shared global.

use tokio::sync::mpsc;

use crate::error::MediaErrorInfo;
use crate::events::MediaEvent;

/// One native playback resource.
///
/// Every method returns immediately; effects are observed through
/// [`MediaEvent`]s and the state getters. Failures surface as an `error`
/// event plus a sticky [`MediaErrorInfo`] readable through [`Self::error`],
/// mirroring how a native media element reports.
pub trait AudioBackend: Send + Sync {
    /// Replaces the current source with `uri` (already resolved) and begins
    /// loading it. Raises `loadeddata` once the first data is playable.
    fn load(&self, uri: &str);

    /// Drops the current source and any buffered data. After this the
    /// backend is sourceless and idle; the handle itself stays reusable.
    fn unload(&self);

    fn play(&self);
    fn pause(&self);

    /// Seeks to `seconds`, clamped to `[0, duration]`.
    fn seek(&self, seconds: f64);

    fn set_rate(&self, rate: f32);
    fn rate(&self) -> f32;

    /// Volume on the native `0.0..=1.0` scale.
    fn set_volume(&self, volume: f32);
    fn volume(&self) -> f32;

    fn set_muted(&self, muted: bool);
    fn muted(&self) -> bool;

    fn set_looping(&self, looping: bool);
    fn looping(&self) -> bool;

    /// Current playback position in seconds (0.0 while unloaded).
    fn position(&self) -> f64;

    /// Total duration in seconds (0.0 while unknown).
    fn duration(&self) -> f64;

    /// True once `loadeddata` has fired for the current source.
    fn is_loaded(&self) -> bool;

    /// True while the transport is not advancing.
    fn is_paused(&self) -> bool;

    /// Sticky error for the current source, if any.
    fn error(&self) -> Option<MediaErrorInfo>;

    /// Subscribes to the backend's lifecycle events.
    fn subscribe(&self) -> mpsc::Receiver<MediaEvent>;
}
