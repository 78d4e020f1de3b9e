//! cpal output stream fed from a shared frame buffer.
//!
//! The decode thread pushes stereo frames at the source sample rate; the
//! device callback reads them through a varispeed head whose step is
//! `source_rate * playback_rate / device_rate`, with linear interpolation
//! between frames. Rate changes therefore take effect on the very next
//! callback without rebuilding the stream.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Stream, StreamConfig};

use crate::error::AudioError;

/// Keep roughly half a second of source audio buffered ahead of the head.
pub const BUFFER_WATERMARK_SECS: f64 = 0.5;

/// Frame buffer shared between the decode thread and the device callback.
pub struct FrameBuffer {
    /// Stereo frames at the source sample rate.
    frames: VecDeque<[f32; 2]>,
    /// Source sample rate of the buffered frames.
    source_rate: u32,
    /// Fractional read position into `frames`.
    phase: f64,
    /// Source frames consumed since the last reset.
    consumed: f64,
    /// Position (seconds) the buffer was reset at (load or seek target).
    base_secs: f64,
    /// Decode thread reached end of stream; drain then finish.
    end_of_stream: bool,
    /// Everything buffered has been played out.
    starved: bool,
}

impl FrameBuffer {
    fn new() -> Self {
        Self {
            frames: VecDeque::new(),
            source_rate: 44100,
            phase: 0.0,
            consumed: 0.0,
            base_secs: 0.0,
            starved: false,
            end_of_stream: false,
        }
    }

    /// Drops buffered audio and restarts position accounting at `base_secs`.
    pub fn reset(&mut self, source_rate: u32, base_secs: f64) {
        self.frames.clear();
        self.source_rate = source_rate;
        self.phase = 0.0;
        self.consumed = 0.0;
        self.base_secs = base_secs;
        self.end_of_stream = false;
        self.starved = false;
    }

    pub fn push_interleaved(&mut self, samples: &[f32]) {
        for pair in samples.chunks_exact(2) {
            self.frames.push_back([pair[0], pair[1]]);
        }
        self.starved = false;
    }

    pub fn mark_end(&mut self) {
        self.end_of_stream = true;
    }

    /// Seconds of source audio buffered ahead of the read head.
    pub fn buffered_secs(&self) -> f64 {
        (self.frames.len() as f64 - self.phase).max(0.0) / self.source_rate as f64
    }

    /// Current playback position in seconds.
    pub fn position_secs(&self) -> f64 {
        self.base_secs + (self.consumed + self.phase) / self.source_rate as f64
    }

    /// True once end of stream was marked and all frames were played.
    pub fn finished(&self) -> bool {
        self.end_of_stream && self.starved
    }

    pub fn end_of_stream(&self) -> bool {
        self.end_of_stream
    }
}

/// f32 stored in an atomic, for parameters read inside the callback.
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Playback parameters shared between the backend (writer) and the device
/// callback (reader). Created by the backend so that volume, mute and rate
/// survive across output stream (re)creation.
#[derive(Clone)]
pub struct OutputParams {
    pub playing: Arc<AtomicBool>,
    pub volume: Arc<AtomicF32>,
    pub muted: Arc<AtomicBool>,
    pub rate: Arc<AtomicF32>,
}

impl Default for OutputParams {
    fn default() -> Self {
        Self {
            playing: Arc::new(AtomicBool::new(false)),
            volume: Arc::new(AtomicF32::new(1.0)),
            muted: Arc::new(AtomicBool::new(false)),
            rate: Arc::new(AtomicF32::new(1.0)),
        }
    }
}

/// Output device wrapper. The stream runs for the lifetime of the value;
/// pausing is done by flipping `params.playing`, which makes the callback
/// emit silence without consuming frames.
pub struct AudioOutput {
    _stream: Stream,
    buffer: Arc<Mutex<FrameBuffer>>,
    device_rate: u32,
}

impl AudioOutput {
    pub fn open(params: OutputParams) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoOutputDevice)?;
        let config = device
            .default_output_config()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        let device_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let buffer = Arc::new(Mutex::new(FrameBuffer::new()));

        let stream = match config.sample_format() {
            cpal::SampleFormat::F32 => Self::build_stream::<f32>(
                &device,
                &config.into(),
                channels,
                device_rate,
                buffer.clone(),
                params,
            )?,
            cpal::SampleFormat::I16 => Self::build_stream::<i16>(
                &device,
                &config.into(),
                channels,
                device_rate,
                buffer.clone(),
                params,
            )?,
            cpal::SampleFormat::U16 => Self::build_stream::<u16>(
                &device,
                &config.into(),
                channels,
                device_rate,
                buffer.clone(),
                params,
            )?,
            format => {
                return Err(AudioError::UnsupportedSampleFormat(format!("{format:?}")));
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::Stream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            buffer,
            device_rate,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &cpal::Device,
        config: &StreamConfig,
        channels: usize,
        device_rate: u32,
        buffer: Arc<Mutex<FrameBuffer>>,
        params: OutputParams,
    ) -> Result<Stream, AudioError> {
        let OutputParams {
            playing,
            volume,
            muted,
            rate,
        } = params;
        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let silence = T::from_sample(0.0f32);
                    if !playing.load(Ordering::Relaxed) {
                        data.fill(silence);
                        return;
                    }

                    let gain = if muted.load(Ordering::Relaxed) {
                        0.0
                    } else {
                        volume.load()
                    };

                    let mut buf = buffer.lock().expect("Frame buffer mutex poisoned");
                    let step = buf.source_rate as f64 * rate.load() as f64 / device_rate as f64;

                    for out_frame in data.chunks_exact_mut(channels) {
                        let idx = buf.phase.floor() as usize;
                        // Need idx+1 for interpolation; hold back one frame
                        // until end of stream lets us flush it.
                        let limit = if buf.end_of_stream {
                            buf.frames.len()
                        } else {
                            buf.frames.len().saturating_sub(1)
                        };
                        if idx >= limit {
                            if buf.end_of_stream {
                                buf.starved = true;
                            }
                            out_frame.fill(silence);
                            continue;
                        }

                        let frac = (buf.phase - idx as f64) as f32;
                        let a = buf.frames[idx];
                        let b = *buf.frames.get(idx + 1).unwrap_or(&a);
                        let left = (a[0] + (b[0] - a[0]) * frac) * gain;
                        let right = (a[1] + (b[1] - a[1]) * frac) * gain;

                        out_frame[0] = T::from_sample(left.clamp(-1.0, 1.0));
                        if channels > 1 {
                            out_frame[1] = T::from_sample(right.clamp(-1.0, 1.0));
                            for extra in out_frame.iter_mut().skip(2) {
                                *extra = silence;
                            }
                        }

                        buf.phase += step;
                    }

                    // Retire frames the head has fully passed.
                    let done = buf.phase.floor() as usize;
                    let drop_count = done.min(buf.frames.len());
                    buf.frames.drain(..drop_count);
                    buf.phase -= drop_count as f64;
                    buf.consumed += drop_count as f64;
                },
                move |err| {
                    tracing::error!(error = %err, "audio output stream error");
                },
                None,
            )
            .map_err(|e| AudioError::Stream(e.to_string()))?;
        Ok(stream)
    }

    pub fn buffer(&self) -> Arc<Mutex<FrameBuffer>> {
        self.buffer.clone()
    }

    pub fn device_rate(&self) -> u32 {
        self.device_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_buffer_tracks_position() {
        let mut buf = FrameBuffer::new();
        buf.reset(10, 2.0);
        buf.push_interleaved(&[0.0; 40]); // 20 frames at 10 Hz = 2 s

        assert_eq!(buf.position_secs(), 2.0);
        assert!((buf.buffered_secs() - 2.0).abs() < 1e-9);

        buf.phase = 5.0;
        assert!((buf.position_secs() - 2.5).abs() < 1e-9);
    }

    #[test]
    fn finished_requires_end_and_starvation() {
        let mut buf = FrameBuffer::new();
        buf.reset(44100, 0.0);
        assert!(!buf.finished());
        buf.mark_end();
        assert!(!buf.finished());
        buf.starved = true;
        assert!(buf.finished());
    }
}
