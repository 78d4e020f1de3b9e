//! Real playback backend: symphonia decode feeding a cpal output stream.
//!
//! A dedicated worker thread owns the decoder and the output stream and
//! processes control commands; the [`AudioBackend`] methods only send
//! commands or flip shared parameters, so every call returns immediately.

mod decoder;
mod output;

pub use output::BUFFER_WATERMARK_SECS;

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::backend::AudioBackend;
use crate::error::{AudioError, MediaErrorInfo};
use crate::events::{MediaEvent, MediaEventBus};

use decoder::SourceDecoder;
use output::{AudioOutput, FrameBuffer, OutputParams};

/// Worker poll period; bounds command latency and decode-ahead cadence.
const POLL_PERIOD: Duration = Duration::from_millis(25);
/// Cadence of timeupdate events while playing.
const TIMEUPDATE_PERIOD: Duration = Duration::from_millis(250);

enum DeviceCommand {
    Load(String),
    Unload,
    Seek(f64),
    Shutdown,
}

#[derive(Default)]
struct DeviceShared {
    src: Option<String>,
    loaded: bool,
    looping: bool,
    position: f64,
    duration: f64,
    error: Option<MediaErrorInfo>,
}

pub struct DeviceBackend {
    commands: Sender<DeviceCommand>,
    shared: Arc<Mutex<DeviceShared>>,
    params: OutputParams,
    bus: MediaEventBus,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DeviceBackend {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Mutex::new(DeviceShared::default()));
        let params = OutputParams::default();
        let bus = MediaEventBus::new();

        let worker = {
            let shared = shared.clone();
            let params = params.clone();
            let bus = bus.clone();
            std::thread::Builder::new()
                .name("embaudio-device".to_string())
                .spawn(move || worker_loop(rx, shared, params, bus))
                .expect("Failed to spawn device worker thread")
        };

        Arc::new(Self {
            commands: tx,
            shared,
            params,
            bus,
            worker: Mutex::new(Some(worker)),
        })
    }

    fn send(&self, command: DeviceCommand) {
        if self.commands.send(command).is_err() {
            warn!("device worker is gone; command dropped");
        }
    }
}

impl Drop for DeviceBackend {
    fn drop(&mut self) {
        let _ = self.commands.send(DeviceCommand::Shutdown);
        if let Some(handle) = self.worker.lock().expect("Worker mutex poisoned").take() {
            let _ = handle.join();
        }
    }
}

impl AudioBackend for DeviceBackend {
    fn load(&self, uri: &str) {
        self.send(DeviceCommand::Load(uri.to_string()));
    }

    fn unload(&self) {
        self.send(DeviceCommand::Unload);
    }

    fn play(&self) {
        let has_src = self
            .shared
            .lock()
            .expect("Device shared mutex poisoned")
            .src
            .is_some();
        if !has_src {
            return;
        }
        if !self.params.playing.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.bus.publish(MediaEvent::Play);
        }
    }

    fn pause(&self) {
        if self.params.playing.swap(false, std::sync::atomic::Ordering::SeqCst) {
            self.bus.publish(MediaEvent::Pause);
        }
    }

    fn seek(&self, seconds: f64) {
        self.send(DeviceCommand::Seek(seconds));
    }

    fn set_rate(&self, rate: f32) {
        if rate > 0.0 {
            self.params.rate.store(rate);
        }
    }

    fn rate(&self) -> f32 {
        self.params.rate.load()
    }

    fn set_volume(&self, volume: f32) {
        self.params.volume.store(volume.clamp(0.0, 1.0));
    }

    fn volume(&self) -> f32 {
        self.params.volume.load()
    }

    fn set_muted(&self, muted: bool) {
        self.params
            .muted
            .store(muted, std::sync::atomic::Ordering::Relaxed);
    }

    fn muted(&self) -> bool {
        self.params.muted.load(std::sync::atomic::Ordering::Relaxed)
    }

    fn set_looping(&self, looping: bool) {
        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .looping = looping;
    }

    fn looping(&self) -> bool {
        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .looping
    }

    fn position(&self) -> f64 {
        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .position
    }

    fn duration(&self) -> f64 {
        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .duration
    }

    fn is_loaded(&self) -> bool {
        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .loaded
    }

    fn is_paused(&self) -> bool {
        !self.params.playing.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn error(&self) -> Option<MediaErrorInfo> {
        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .error
            .clone()
    }

    fn subscribe(&self) -> mpsc::Receiver<MediaEvent> {
        self.bus.subscribe()
    }
}

/// State owned by the worker thread.
struct Worker {
    shared: Arc<Mutex<DeviceShared>>,
    params: OutputParams,
    bus: MediaEventBus,
    output: Option<AudioOutput>,
    decoder: Option<SourceDecoder>,
    last_timeupdate: Instant,
}

fn worker_loop(
    rx: Receiver<DeviceCommand>,
    shared: Arc<Mutex<DeviceShared>>,
    params: OutputParams,
    bus: MediaEventBus,
) {
    let mut worker = Worker {
        shared,
        params,
        bus,
        output: None,
        decoder: None,
        last_timeupdate: Instant::now(),
    };

    loop {
        match rx.recv_timeout(POLL_PERIOD) {
            Ok(DeviceCommand::Load(uri)) => worker.handle_load(&uri),
            Ok(DeviceCommand::Unload) => worker.handle_unload(),
            Ok(DeviceCommand::Seek(seconds)) => worker.handle_seek(seconds),
            Ok(DeviceCommand::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        worker.pump();
    }

    worker
        .params
        .playing
        .store(false, std::sync::atomic::Ordering::SeqCst);
    debug!("device worker stopped");
}

impl Worker {
    fn fail(&mut self, err: AudioError, uri: &str) {
        error!(src = %uri, code = ?err.media_code(), error = %err, "media error");
        let info = err.into_media_error(uri);
        {
            let mut shared = self.shared.lock().expect("Device shared mutex poisoned");
            shared.error = Some(info.clone());
            shared.loaded = false;
        }
        self.params
            .playing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.bus.publish(MediaEvent::Error(info));
    }

    fn buffer(&self) -> Option<Arc<Mutex<FrameBuffer>>> {
        self.output.as_ref().map(|o| o.buffer())
    }

    fn handle_load(&mut self, uri: &str) {
        self.decoder = None;
        self.params
            .playing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        {
            let mut shared = self.shared.lock().expect("Device shared mutex poisoned");
            shared.src = Some(uri.to_string());
            shared.loaded = false;
            shared.error = None;
            shared.position = 0.0;
            shared.duration = 0.0;
        }

        if self.output.is_none() {
            match AudioOutput::open(self.params.clone()) {
                Ok(output) => {
                    debug!(device_rate = output.device_rate(), "output stream opened");
                    self.output = Some(output);
                }
                Err(err) => return self.fail(err, uri),
            }
        }

        let decoder = match SourceDecoder::open(uri) {
            Ok(d) => d,
            Err(err) => return self.fail(err, uri),
        };

        debug!(
            src = %uri,
            sample_rate = decoder.sample_rate(),
            channels = decoder.channels(),
            duration = ?decoder.duration_secs(),
            "source opened"
        );

        if let Some(buffer) = self.buffer() {
            buffer
                .lock()
                .expect("Frame buffer mutex poisoned")
                .reset(decoder.sample_rate(), 0.0);
        }
        {
            let mut shared = self.shared.lock().expect("Device shared mutex poisoned");
            shared.duration = decoder.duration_secs().unwrap_or(0.0);
        }
        self.decoder = Some(decoder);

        // Pre-buffer so the first data is playable before loadeddata fires.
        self.decode_ahead(uri.to_string());
        if self
            .shared
            .lock()
            .expect("Device shared mutex poisoned")
            .error
            .is_some()
        {
            return;
        }

        self.shared
            .lock()
            .expect("Device shared mutex poisoned")
            .loaded = true;
        self.bus.publish(MediaEvent::LoadedData);
    }

    fn handle_unload(&mut self) {
        self.decoder = None;
        self.params
            .playing
            .store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(buffer) = self.buffer() {
            buffer
                .lock()
                .expect("Frame buffer mutex poisoned")
                .reset(44100, 0.0);
        }
        let mut shared = self.shared.lock().expect("Device shared mutex poisoned");
        shared.src = None;
        shared.loaded = false;
        shared.position = 0.0;
        shared.duration = 0.0;
        shared.error = None;
    }

    fn handle_seek(&mut self, seconds: f64) {
        let buffer = self.buffer();
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };
        let duration = self
            .shared
            .lock()
            .expect("Device shared mutex poisoned")
            .duration;
        let target = if duration > 0.0 {
            seconds.clamp(0.0, duration)
        } else {
            seconds.max(0.0)
        };
        match decoder.seek(target) {
            Ok(actual) => {
                if let Some(buffer) = buffer {
                    buffer
                        .lock()
                        .expect("Frame buffer mutex poisoned")
                        .reset(decoder.sample_rate(), actual);
                }
                self.shared
                    .lock()
                    .expect("Device shared mutex poisoned")
                    .position = actual;
            }
            Err(err) => warn!(target, error = %err, "seek failed"),
        }
    }

    /// Fills the frame buffer up to the watermark.
    fn decode_ahead(&mut self, uri: String) {
        let Some(buffer) = self.buffer() else { return };
        let Some(decoder) = self.decoder.as_mut() else {
            return;
        };

        loop {
            {
                let buf = buffer.lock().expect("Frame buffer mutex poisoned");
                if buf.end_of_stream() || buf.buffered_secs() >= BUFFER_WATERMARK_SECS {
                    return;
                }
            }
            match decoder.decode_next() {
                Ok(Some(samples)) => {
                    buffer
                        .lock()
                        .expect("Frame buffer mutex poisoned")
                        .push_interleaved(&samples);
                }
                Ok(None) => {
                    buffer
                        .lock()
                        .expect("Frame buffer mutex poisoned")
                        .mark_end();
                    return;
                }
                Err(err) => {
                    self.fail(err, &uri);
                    return;
                }
            }
        }
    }

    /// Periodic work: decode ahead, refresh position, detect end of stream,
    /// emit timeupdates.
    fn pump(&mut self) {
        if self.decoder.is_none() {
            return;
        }
        let uri = self
            .shared
            .lock()
            .expect("Device shared mutex poisoned")
            .src
            .clone()
            .unwrap_or_default();

        self.decode_ahead(uri);
        let Some(buffer) = self.buffer() else { return };

        let (position, finished) = {
            let buf = buffer.lock().expect("Frame buffer mutex poisoned");
            (buf.position_secs(), buf.finished())
        };

        let (duration, looping) = {
            let mut shared = self.shared.lock().expect("Device shared mutex poisoned");
            shared.position = position;
            (shared.duration, shared.looping)
        };

        let playing = self
            .params
            .playing
            .load(std::sync::atomic::Ordering::SeqCst);

        if playing && finished {
            if looping {
                if let Some(decoder) = self.decoder.as_mut() {
                    if let Ok(actual) = decoder.seek(0.0) {
                        buffer
                            .lock()
                            .expect("Frame buffer mutex poisoned")
                            .reset(decoder.sample_rate(), actual);
                    }
                }
            } else {
                self.params
                    .playing
                    .store(false, std::sync::atomic::Ordering::SeqCst);
                let mut shared = self.shared.lock().expect("Device shared mutex poisoned");
                if shared.duration > 0.0 {
                    shared.position = shared.duration;
                }
                drop(shared);
                self.bus.publish(MediaEvent::Ended);
            }
            return;
        }

        if playing && self.last_timeupdate.elapsed() >= TIMEUPDATE_PERIOD {
            self.last_timeupdate = Instant::now();
            self.bus.publish(MediaEvent::TimeUpdate {
                seconds: position,
                duration,
            });
        }
    }
}
