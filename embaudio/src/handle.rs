//! Thin media-element facade over a backend.
//!
//! [`AudioHandle`] owns the current source and mirrors the behaviour of an
//! HTML5 audio element: setting an identical source is a no-op, getters on a
//! sourceless handle return zeros, and unloading stops playback.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::AudioBackend;
use crate::error::MediaErrorInfo;
use crate::events::MediaEvent;
use crate::source::resolve_source;

pub struct AudioHandle {
    backend: Arc<dyn AudioBackend>,
    origin: String,
    /// Fully resolved URI of the current source.
    src: Mutex<Option<String>>,
}

impl AudioHandle {
    /// `origin` is the base URL that relative source paths resolve against.
    pub fn new(backend: Arc<dyn AudioBackend>, origin: impl Into<String>) -> Self {
        Self {
            backend,
            origin: origin.into(),
            src: Mutex::new(None),
        }
    }

    /// Replaces the current source. Setting the same source again (after
    /// resolution) is a no-op so an in-flight load is not restarted; `None`
    /// unloads the current media.
    pub fn set_source(&self, source: Option<&str>) {
        let mut src = self.src.lock().expect("Source mutex poisoned");
        match source {
            None => {
                if src.take().is_some() {
                    debug!("source cleared");
                    self.backend.unload();
                }
            }
            Some(raw) => {
                let resolved = resolve_source(raw, &self.origin);
                if src.as_deref() == Some(resolved.as_str()) {
                    return;
                }
                debug!(src = %resolved, "source changed");
                *src = Some(resolved.clone());
                self.backend.load(&resolved);
            }
        }
    }

    pub fn has_src(&self) -> bool {
        self.src.lock().expect("Source mutex poisoned").is_some()
    }

    /// The fully resolved source URI, the equivalent of `currentSrc`.
    pub fn current_src(&self) -> Option<String> {
        self.src.lock().expect("Source mutex poisoned").clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.backend.is_loaded()
    }

    pub fn is_loading(&self) -> bool {
        self.has_src() && !self.backend.is_loaded() && self.backend.error().is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.backend.is_paused()
    }

    pub fn play(&self) {
        self.backend.play();
    }

    pub fn pause(&self) {
        self.backend.pause();
    }

    pub fn seek(&self, seconds: f64) {
        if self.has_src() {
            self.backend.seek(seconds);
        }
    }

    pub fn position(&self) -> f64 {
        if self.has_src() {
            self.backend.position()
        } else {
            0.0
        }
    }

    pub fn duration(&self) -> f64 {
        if self.has_src() {
            self.backend.duration()
        } else {
            0.0
        }
    }

    pub fn set_rate(&self, rate: f32) {
        self.backend.set_rate(rate);
    }

    pub fn rate(&self) -> f32 {
        self.backend.rate()
    }

    pub fn set_volume(&self, volume: f32) {
        self.backend.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.backend.volume()
    }

    pub fn set_muted(&self, muted: bool) {
        self.backend.set_muted(muted);
    }

    pub fn muted(&self) -> bool {
        self.backend.muted()
    }

    pub fn set_looping(&self, looping: bool) {
        self.backend.set_looping(looping);
    }

    pub fn looping(&self) -> bool {
        self.backend.looping()
    }

    pub fn error(&self) -> Option<MediaErrorInfo> {
        self.backend.error()
    }

    pub fn subscribe(&self) -> mpsc::Receiver<MediaEvent> {
        self.backend.subscribe()
    }

    /// Drops the source and stops playback.
    pub fn unload(&self) {
        self.set_source(None);
    }
}
