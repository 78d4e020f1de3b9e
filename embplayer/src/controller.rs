//! The playback controller: single source of truth for playback state.
//!
//! `PlayerController` exclusively owns the media engine handle. Consumers
//! (UI routes, the remote-control receiver) either call control operations
//! or read [`PlayerState`] snapshots; nothing else mutates the engine.
//!
//! Two background tasks are bound to the controller's lifetime:
//!
//! - the **event pump**, which translates engine media events into
//!   [`PlayerEvent`] publications and restarts the tick loop on `play`;
//! - the **tick loop**, a cancellable periodic task that republishes derived
//!   state while playing and enforces the [`StopAt`] cap. Starting it while
//!   it already runs is a no-op; it stops by itself once playback pauses and
//!   is cancelled unconditionally on shutdown.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use embaudio::{AudioBackend, AudioHandle, MediaEvent};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::events::{PlayerEvent, PlayerEventBus};
use crate::state::PlayerState;
use crate::stop_at::StopAt;

pub struct PlayerController {
    handle: AudioHandle,
    stop_at: Mutex<StopAt>,
    meta: Mutex<Option<Value>>,
    bus: PlayerEventBus,
    tick_interval: Duration,
    /// Handle to the tick task, if running.
    tick_handle: Mutex<Option<JoinHandle<()>>>,
    /// Cancels both background tasks on shutdown.
    cancel: CancellationToken,
}

impl PlayerController {
    /// Creates the controller and spawns its event pump. Must be called from
    /// within a tokio runtime.
    pub fn new(
        backend: Arc<dyn AudioBackend>,
        origin: impl Into<String>,
        tick_interval: Duration,
    ) -> Arc<Self> {
        let controller = Arc::new(Self {
            handle: AudioHandle::new(backend, origin),
            stop_at: Mutex::new(StopAt::new()),
            meta: Mutex::new(None),
            bus: PlayerEventBus::new(),
            tick_interval,
            tick_handle: Mutex::new(None),
            cancel: CancellationToken::new(),
        });
        Self::spawn_pump(&controller);
        controller
    }

    /// Subscribes to state republishes and forwarded media notifications.
    pub fn subscribe(&self) -> mpsc::Receiver<PlayerEvent> {
        self.bus.subscribe()
    }

    // ---- control operations (return immediately, no-ops are silent) ----

    /// Replaces the current source and attaches `meta` to the session. Any
    /// pending auto-stop cap is dropped. Setting the identical resolved URI
    /// again does not reload; `None` makes the session sourceless.
    pub fn change_source(&self, uri: Option<&str>, meta: Option<Value>) {
        self.stop_at
            .lock()
            .expect("Stop-at mutex poisoned")
            .clear();
        *self.meta.lock().expect("Meta mutex poisoned") = meta;
        self.handle.set_source(uri);
        self.publish_state();
    }

    /// Starts playback if paused, optionally seeking first and arming an
    /// auto-stop cap. The cap is (re)set from `end_time` on every call,
    /// including to "none". Also starts the tick loop.
    pub fn control_play(self: &Arc<Self>, seek_time: Option<f64>, end_time: Option<f64>) {
        if self.handle.is_paused() {
            self.handle.play();
        }
        if let Some(t) = seek_time {
            self.handle.seek(t);
        }
        self.stop_at
            .lock()
            .expect("Stop-at mutex poisoned")
            .set(end_time);
        self.start_tick();
    }

    /// Pauses playback and drops any pending auto-stop cap.
    pub fn control_pause(&self) {
        self.handle.pause();
        self.stop_at
            .lock()
            .expect("Stop-at mutex poisoned")
            .clear();
    }

    /// Pauses and detaches the source.
    pub fn control_stop(&self) {
        self.control_pause();
        self.change_source(None, None);
    }

    /// Seeks to `time`; with `autoplay`, starts playback first if paused. A
    /// seek past a pending auto-stop cap disarms the cap.
    pub fn control_seek(self: &Arc<Self>, time: f64, autoplay: bool) {
        if autoplay && self.handle.is_paused() {
            self.handle.play();
            self.start_tick();
        }
        self.handle.seek(time);
        if self
            .stop_at
            .lock()
            .expect("Stop-at mutex poisoned")
            .clear_if_passed(time)
        {
            debug!(time, "seek passed the auto-stop cap; cap cleared");
        }
        self.publish_state();
    }

    /// Sets the playback rate; values <= 0 are ignored.
    pub fn control_change_playback_rate(&self, rate: f32) {
        if rate > 0.0 {
            self.handle.set_rate(rate);
            self.publish_state();
        }
    }

    // ---- native passthroughs used by the remote-control surface ----

    pub fn set_volume(&self, volume: f32) {
        self.handle.set_volume(volume);
    }

    pub fn volume(&self) -> f32 {
        self.handle.volume()
    }

    pub fn set_muted(&self, muted: bool) {
        self.handle.set_muted(muted);
    }

    pub fn muted(&self) -> bool {
        self.handle.muted()
    }

    pub fn set_looping(&self, looping: bool) {
        self.handle.set_looping(looping);
    }

    pub fn looping(&self) -> bool {
        self.handle.looping()
    }

    /// Best-effort current position (0 while unloaded).
    pub fn position(&self) -> f64 {
        self.handle.position()
    }

    /// Best-effort duration (0 while unloaded).
    pub fn duration(&self) -> f64 {
        self.handle.duration()
    }

    /// The fully resolved source URI, if any.
    pub fn source(&self) -> Option<String> {
        self.handle.current_src()
    }

    // ---- derived state ----

    /// Snapshot of the current session state. While a source is loading,
    /// position and duration are absent and the rate falls back to 1.0.
    pub fn state(&self) -> PlayerState {
        let source = self.handle.current_src();
        let error = self.handle.error();
        let loaded = self.handle.is_loaded();
        let loading = self.handle.is_loading();
        let playing = source.is_some() && !self.handle.is_paused() && error.is_none();
        PlayerState {
            is_playing: playing,
            is_loading: loading,
            is_loaded: loaded,
            seek_time: loaded.then(|| self.handle.position()),
            duration: loaded.then(|| self.handle.duration()),
            playback_rate: if loaded { self.handle.rate() } else { 1.0 },
            source,
            meta: self.meta.lock().expect("Meta mutex poisoned").clone(),
            error,
        }
    }

    /// Cancels the background tasks and releases the media resource.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(handle) = self
            .tick_handle
            .lock()
            .expect("Tick handle mutex poisoned")
            .take()
        {
            handle.abort();
        }
        self.handle.unload();
        debug!("player controller shut down");
    }

    // ---- internals ----

    fn publish_state(&self) {
        self.bus.publish(PlayerEvent::State(self.state()));
    }

    /// Starts the tick loop. Idempotent: a live loop is left alone.
    fn start_tick(self: &Arc<Self>) {
        let mut guard = self
            .tick_handle
            .lock()
            .expect("Tick handle mutex poisoned");
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }

        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let period = self.tick_interval;
        *guard = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                if !controller.tick() {
                    break;
                }
            }
        }));
    }

    /// One tick: republish state, enforce the auto-stop cap. Returns false
    /// when the loop should stop (playback no longer running).
    fn tick(&self) -> bool {
        let state = self.state();
        self.bus.publish(PlayerEvent::State(state.clone()));

        if state.is_playing {
            let position = self.handle.position();
            if self
                .stop_at
                .lock()
                .expect("Stop-at mutex poisoned")
                .should_stop(position)
            {
                debug!(position, "auto-stop cap reached, pausing");
                self.control_pause();
                return false;
            }
        }
        state.is_playing
    }

    /// Spawns the media-event pump for the controller's lifetime.
    fn spawn_pump(this: &Arc<Self>) {
        let mut events = this.handle.subscribe();
        let weak = Arc::downgrade(this);
        let cancel = this.cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                let Some(controller) = weak.upgrade() else {
                    break;
                };
                controller.on_media_event(event);
            }
        });
    }

    fn on_media_event(self: &Arc<Self>, event: MediaEvent) {
        match event {
            MediaEvent::Play => {
                self.start_tick();
                self.bus.publish(PlayerEvent::Play);
                self.publish_state();
            }
            MediaEvent::Pause => {
                self.bus.publish(PlayerEvent::Pause);
                self.publish_state();
            }
            MediaEvent::Ended => {
                self.stop_at
                    .lock()
                    .expect("Stop-at mutex poisoned")
                    .clear();
                self.bus.publish(PlayerEvent::Ended);
                self.publish_state();
            }
            MediaEvent::LoadedData => self.publish_state(),
            MediaEvent::TimeUpdate { seconds, duration } => {
                self.bus.publish(PlayerEvent::TimeUpdate { seconds, duration });
            }
            MediaEvent::Error(info) => {
                error!(src = %info.src, code = ?info.code, message = %info.message, "media error");
                self.bus.publish(PlayerEvent::Error(info));
                self.publish_state();
            }
        }
    }
}

impl Drop for PlayerController {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embaudio::SimBackend;
    use tokio::time::sleep;

    const ORIGIN: &str = "http://localhost:8080";
    const TICK: Duration = Duration::from_millis(10);

    fn controller_with_sim() -> (Arc<SimBackend>, Arc<PlayerController>) {
        let backend = SimBackend::new(30.0);
        let controller =
            PlayerController::new(backend.clone() as Arc<dyn AudioBackend>, ORIGIN, TICK);
        (backend, controller)
    }

    /// Gives the pump and tick tasks a chance to run.
    async fn settle() {
        sleep(Duration::from_millis(60)).await;
    }

    #[tokio::test]
    async fn play_and_pause_reflect_the_most_recent_intent() {
        let (_backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), None);
        controller.control_play(None, None);
        assert!(controller.state().is_playing);

        controller.control_pause();
        assert!(!controller.state().is_playing);

        controller.control_play(None, None);
        assert!(controller.state().is_playing);
        controller.shutdown();
    }

    #[tokio::test]
    async fn seek_is_observed_in_the_next_snapshot() {
        let (_backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), None);
        controller.control_play(None, None);
        controller.control_seek(12.5, false);
        assert_eq!(controller.state().seek_time, Some(12.5));
        controller.shutdown();
    }

    #[tokio::test]
    async fn end_time_auto_stops_playback() {
        let (backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), None);
        controller.control_play(None, Some(5.0));
        assert!(controller.state().is_playing);

        backend.advance(6.0);
        settle().await;

        let state = controller.state();
        assert!(!state.is_playing, "cap at 5.0 should have paused playback");
        assert_eq!(state.seek_time, Some(6.0));
        controller.shutdown();
    }

    #[tokio::test]
    async fn seeking_past_the_end_time_clears_the_cap() {
        let (backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), None);
        controller.control_play(None, Some(5.0));
        controller.control_seek(10.0, false);

        backend.advance(2.0);
        settle().await;

        assert!(
            controller.state().is_playing,
            "a cap that was seeked past must not fire"
        );
        controller.shutdown();
    }

    #[tokio::test]
    async fn identical_source_does_not_reset_position() {
        let (_backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), None);
        controller.control_play(None, None);
        controller.control_seek(7.0, false);

        controller.change_source(Some("/a.mp3"), None);
        let state = controller.state();
        assert_eq!(state.seek_time, Some(7.0));
        assert!(state.is_playing);
        controller.shutdown();
    }

    #[tokio::test]
    async fn stop_detaches_the_source() {
        let (_backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), None);
        controller.control_play(None, None);
        controller.control_stop();

        let state = controller.state();
        assert!(!state.is_playing);
        assert!(state.source.is_none());
        assert!(state.seek_time.is_none());
        controller.shutdown();
    }

    #[tokio::test]
    async fn media_errors_are_recorded_and_published() {
        let (_backend, controller) = controller_with_sim();
        let mut events = controller.subscribe();
        controller.change_source(Some("/fail.mp3"), None);
        settle().await;

        let state = controller.state();
        assert!(state.error.is_some());
        assert!(!state.is_loading, "an errored source is not loading");
        assert!(!state.is_playing);

        let mut saw_error = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, PlayerEvent::Error(_)) {
                saw_error = true;
            }
        }
        assert!(saw_error);
        controller.shutdown();
    }

    #[tokio::test]
    async fn loaded_source_reports_full_state() {
        let (_backend, controller) = controller_with_sim();
        controller.change_source(Some("/a.mp3"), serde_json::json!({"title": "A"}).into());
        controller.control_play(None, None);
        settle().await;

        let state = controller.state();
        assert!(state.is_loaded);
        assert!(!state.is_loading);
        assert!(state.is_playing);
        assert_eq!(state.source.as_deref(), Some("http://localhost:8080/a.mp3"));
        assert_eq!(state.duration, Some(30.0));
        assert_eq!(state.meta.as_ref().unwrap()["title"], "A");
        controller.shutdown();
    }
}
