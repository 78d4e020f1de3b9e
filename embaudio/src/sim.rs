//! Clock-driven fake backend.
//!
//! `SimBackend` implements the full [`AudioBackend`] contract without
//! touching an audio device: position advances when [`SimBackend::advance`]
//! is called (deterministic, used by tests) or when the optional wall-clock
//! ticker is running (used by the protocol harness on headless machines).
//!
//! Loading is instantaneous. A URI whose path contains `fail` loads into an
//! error state, which is how tests exercise the media-error path. A `dur=N`
//! query parameter overrides the reported duration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::debug;

use crate::backend::AudioBackend;
use crate::error::{MediaErrorCode, MediaErrorInfo};
use crate::events::{MediaEvent, MediaEventBus};

const CLOCK_PERIOD: Duration = Duration::from_millis(50);
/// Minimum spacing of timeupdate events from the wall-clock ticker.
const TIMEUPDATE_PERIOD: Duration = Duration::from_millis(250);

#[derive(Debug, Default)]
struct SimState {
    src: Option<String>,
    playing: bool,
    loaded: bool,
    position: f64,
    duration: f64,
    rate: f32,
    volume: f32,
    muted: bool,
    looping: bool,
    error: Option<MediaErrorInfo>,
}

pub struct SimBackend {
    state: Mutex<SimState>,
    bus: MediaEventBus,
    default_duration: f64,
    clock_stop: Arc<AtomicBool>,
    clock_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SimBackend {
    pub fn new(default_duration: f64) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SimState {
                rate: 1.0,
                volume: 1.0,
                ..SimState::default()
            }),
            bus: MediaEventBus::new(),
            default_duration,
            clock_stop: Arc::new(AtomicBool::new(false)),
            clock_handle: Mutex::new(None),
        })
    }

    /// Advances the simulated position by `seconds` of wall time, scaled by
    /// the playback rate. No-op unless loaded and playing.
    pub fn advance(&self, seconds: f64) {
        let mut fired = Vec::new();
        {
            let mut state = self.state.lock().expect("Sim state mutex poisoned");
            if !state.playing || !state.loaded {
                return;
            }
            state.position += seconds * state.rate as f64;
            if state.position >= state.duration {
                if state.looping && state.duration > 0.0 {
                    state.position %= state.duration;
                } else {
                    state.position = state.duration;
                    state.playing = false;
                    fired.push(MediaEvent::Ended);
                }
            }
            fired.insert(
                0,
                MediaEvent::TimeUpdate {
                    seconds: state.position,
                    duration: state.duration,
                },
            );
        }
        for event in fired {
            self.bus.publish(event);
        }
    }

    /// Starts a wall-clock ticker so simulated playback advances in real
    /// time. Idempotent; stopped by [`Self::stop_clock`] or drop.
    pub fn start_clock(self: &Arc<Self>) {
        let mut handle = self.clock_handle.lock().expect("Sim clock mutex poisoned");
        if handle.is_some() {
            return;
        }
        self.clock_stop.store(false, Ordering::SeqCst);

        let backend = Arc::clone(self);
        let stop = Arc::clone(&self.clock_stop);
        *handle = Some(
            std::thread::Builder::new()
                .name("sim-audio-clock".to_string())
                .spawn(move || {
                    let mut last = Instant::now();
                    let mut last_update = Instant::now();
                    while !stop.load(Ordering::SeqCst) {
                        std::thread::sleep(CLOCK_PERIOD);
                        let now = Instant::now();
                        let dt = now.duration_since(last).as_secs_f64();
                        last = now;
                        if now.duration_since(last_update) >= TIMEUPDATE_PERIOD {
                            last_update = now;
                            backend.advance(dt);
                        } else {
                            backend.advance_silently(dt);
                        }
                    }
                })
                .expect("Failed to spawn sim clock thread"),
        );
    }

    pub fn stop_clock(&self) {
        self.clock_stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self
            .clock_handle
            .lock()
            .expect("Sim clock mutex poisoned")
            .take()
        {
            let _ = handle.join();
        }
    }

    /// Like [`Self::advance`] but suppresses the timeupdate event, keeping
    /// the wall-clock ticker at the native ~4 Hz timeupdate cadence.
    fn advance_silently(&self, seconds: f64) {
        let mut ended = false;
        {
            let mut state = self.state.lock().expect("Sim state mutex poisoned");
            if !state.playing || !state.loaded {
                return;
            }
            state.position += seconds * state.rate as f64;
            if state.position >= state.duration {
                if state.looping && state.duration > 0.0 {
                    state.position %= state.duration;
                } else {
                    state.position = state.duration;
                    state.playing = false;
                    ended = true;
                }
            }
        }
        if ended {
            self.bus.publish(MediaEvent::Ended);
        }
    }

    fn duration_for(&self, uri: &str) -> f64 {
        uri.split_once('?')
            .map(|(_, query)| query)
            .into_iter()
            .flat_map(|query| query.split('&'))
            .find_map(|pair| pair.strip_prefix("dur="))
            .and_then(|value| value.parse::<f64>().ok())
            .unwrap_or(self.default_duration)
    }
}

impl Drop for SimBackend {
    fn drop(&mut self) {
        self.clock_stop.store(true, Ordering::SeqCst);
    }
}

impl AudioBackend for SimBackend {
    fn load(&self, uri: &str) {
        let event;
        {
            let mut state = self.state.lock().expect("Sim state mutex poisoned");
            state.src = Some(uri.to_string());
            state.position = 0.0;
            state.playing = false;

            // Path segment "fail" simulates a decode/network failure.
            let path = uri.split('?').next().unwrap_or(uri);
            if path.contains("fail") {
                state.loaded = false;
                state.duration = 0.0;
                let error =
                    MediaErrorInfo::new(MediaErrorCode::Network, "simulated media error", uri);
                state.error = Some(error.clone());
                event = MediaEvent::Error(error);
            } else {
                state.loaded = true;
                state.duration = self.duration_for(uri);
                state.error = None;
                event = MediaEvent::LoadedData;
            }
        }
        debug!(src = %uri, "sim backend loaded source");
        self.bus.publish(event);
    }

    fn unload(&self) {
        let mut state = self.state.lock().expect("Sim state mutex poisoned");
        state.src = None;
        state.playing = false;
        state.loaded = false;
        state.position = 0.0;
        state.duration = 0.0;
        state.error = None;
    }

    fn play(&self) {
        let started = {
            let mut state = self.state.lock().expect("Sim state mutex poisoned");
            if state.src.is_none() || state.playing {
                false
            } else {
                state.playing = true;
                true
            }
        };
        if started {
            self.bus.publish(MediaEvent::Play);
        }
    }

    fn pause(&self) {
        let paused = {
            let mut state = self.state.lock().expect("Sim state mutex poisoned");
            if state.playing {
                state.playing = false;
                true
            } else {
                false
            }
        };
        if paused {
            self.bus.publish(MediaEvent::Pause);
        }
    }

    fn seek(&self, seconds: f64) {
        let mut state = self.state.lock().expect("Sim state mutex poisoned");
        if state.src.is_none() {
            return;
        }
        state.position = seconds.clamp(0.0, state.duration);
    }

    fn set_rate(&self, rate: f32) {
        if rate > 0.0 {
            self.state.lock().expect("Sim state mutex poisoned").rate = rate;
        }
    }

    fn rate(&self) -> f32 {
        self.state.lock().expect("Sim state mutex poisoned").rate
    }

    fn set_volume(&self, volume: f32) {
        self.state.lock().expect("Sim state mutex poisoned").volume = volume.clamp(0.0, 1.0);
    }

    fn volume(&self) -> f32 {
        self.state.lock().expect("Sim state mutex poisoned").volume
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().expect("Sim state mutex poisoned").muted = muted;
    }

    fn muted(&self) -> bool {
        self.state.lock().expect("Sim state mutex poisoned").muted
    }

    fn set_looping(&self, looping: bool) {
        self.state.lock().expect("Sim state mutex poisoned").looping = looping;
    }

    fn looping(&self) -> bool {
        self.state.lock().expect("Sim state mutex poisoned").looping
    }

    fn position(&self) -> f64 {
        self.state.lock().expect("Sim state mutex poisoned").position
    }

    fn duration(&self) -> f64 {
        self.state.lock().expect("Sim state mutex poisoned").duration
    }

    fn is_loaded(&self) -> bool {
        self.state.lock().expect("Sim state mutex poisoned").loaded
    }

    fn is_paused(&self) -> bool {
        !self.state.lock().expect("Sim state mutex poisoned").playing
    }

    fn error(&self) -> Option<MediaErrorInfo> {
        self.state
            .lock()
            .expect("Sim state mutex poisoned")
            .error
            .clone()
    }

    fn subscribe(&self) -> mpsc::Receiver<MediaEvent> {
        self.bus.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_play_advance_end() {
        let sim = SimBackend::new(10.0);
        let mut events = sim.subscribe();

        sim.load("sim:tone");
        assert!(matches!(events.try_recv(), Ok(MediaEvent::LoadedData)));
        assert!(sim.is_loaded());
        assert_eq!(sim.duration(), 10.0);

        sim.play();
        assert!(matches!(events.try_recv(), Ok(MediaEvent::Play)));
        assert!(!sim.is_paused());

        sim.advance(4.0);
        assert!((sim.position() - 4.0).abs() < 1e-9);

        sim.advance(7.0);
        assert_eq!(sim.position(), 10.0);
        assert!(sim.is_paused());

        // timeupdate then ended
        assert!(matches!(events.try_recv(), Ok(MediaEvent::TimeUpdate { .. })));
        assert!(matches!(events.try_recv(), Ok(MediaEvent::TimeUpdate { .. })));
        assert!(matches!(events.try_recv(), Ok(MediaEvent::Ended)));
    }

    #[test]
    fn rate_scales_advancement() {
        let sim = SimBackend::new(100.0);
        sim.load("sim:tone");
        sim.set_rate(2.0);
        sim.play();
        sim.advance(3.0);
        assert!((sim.position() - 6.0).abs() < 1e-9);
    }

    #[test]
    fn looping_wraps_instead_of_ending() {
        let sim = SimBackend::new(5.0);
        sim.load("sim:tone");
        sim.set_looping(true);
        sim.play();
        sim.advance(7.0);
        assert!((sim.position() - 2.0).abs() < 1e-9);
        assert!(!sim.is_paused());
    }

    #[test]
    fn duration_override_via_query() {
        let sim = SimBackend::new(30.0);
        sim.load("sim:tone?dur=12.5");
        assert_eq!(sim.duration(), 12.5);
    }

    #[test]
    fn failing_source_reports_error() {
        let sim = SimBackend::new(30.0);
        let mut events = sim.subscribe();
        sim.load("sim:fail");
        assert!(matches!(events.try_recv(), Ok(MediaEvent::Error(_))));
        let error = sim.error().unwrap();
        assert_eq!(error.code, MediaErrorCode::Network);
        assert!(!sim.is_loaded());
    }

    #[test]
    fn play_without_source_is_a_no_op() {
        let sim = SimBackend::new(30.0);
        let mut events = sim.subscribe();
        sim.play();
        assert!(sim.is_paused());
        assert!(events.try_recv().is_err());
    }
}
