//! Symphonia-backed decoding of one source to interleaved stereo f32.

use std::fs::File;
use std::io::{Cursor, Read};

use symphonia::core::audio::{AudioBufferRef, SampleBuffer};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::error::AudioError;
use crate::source::{classify, SourceKind};

pub struct SourceDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    duration_secs: Option<f64>,
}

impl std::fmt::Debug for SourceDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceDecoder")
            .field("track_id", &self.track_id)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs)
            .finish_non_exhaustive()
    }
}

impl SourceDecoder {
    /// Opens a resolved source URI. HTTP(S) bodies are fetched up front so
    /// the decoder always works on a seekable byte source.
    pub fn open(uri: &str) -> Result<Self, AudioError> {
        let (media_source, extension): (Box<dyn MediaSource>, Option<String>) = match classify(uri)
        {
            SourceKind::Http(url) => {
                let mut response =
                    ureq::get(&url)
                        .call()
                        .map_err(|e| AudioError::SourceOpen {
                            uri: uri.to_string(),
                            reason: e.to_string(),
                        })?;
                let mut bytes = Vec::new();
                response
                    .body_mut()
                    .as_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|e| AudioError::SourceOpen {
                        uri: uri.to_string(),
                        reason: e.to_string(),
                    })?;
                let ext = url
                    .split('?')
                    .next()
                    .and_then(|path| path.rsplit('.').next())
                    .map(str::to_string);
                (Box::new(Cursor::new(bytes)), ext)
            }
            SourceKind::File(path) => {
                let file = File::open(&path).map_err(|e| AudioError::SourceOpen {
                    uri: uri.to_string(),
                    reason: e.to_string(),
                })?;
                let ext = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_string);
                (Box::new(file), ext)
            }
        };

        let mss = MediaSourceStream::new(media_source, Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(&ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::Probe(e.to_string()))?;

        let format = probed.format;
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(AudioError::NoAudioTrack)?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);
        let duration_secs = track
            .codec_params
            .n_frames
            .map(|frames| frames as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::Decode(e.to_string()))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
            duration_secs,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Decodes the next packet into interleaved stereo f32 frames.
    /// Returns `Ok(None)` at end of stream. Mono is duplicated onto both
    /// channels; extra channels beyond the first two are dropped.
    pub fn decode_next(&mut self) -> Result<Option<Vec<f32>>, AudioError> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => return Ok(Some(to_stereo_f32(decoded))),
                Err(SymphoniaError::DecodeError(e)) => {
                    // Recoverable corrupt packet; skip it.
                    tracing::debug!(error = %e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(AudioError::Decode(e.to_string())),
            }
        }
    }

    /// Seeks to `seconds` and returns the position actually reached.
    pub fn seek(&mut self, seconds: f64) -> Result<f64, AudioError> {
        let time = Time::new(seconds.trunc() as u64, seconds.fract());
        let seeked_to = self
            .format
            .seek(
                SeekMode::Coarse,
                SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| AudioError::Seek(e.to_string()))?;
        self.decoder.reset();
        Ok(seeked_to.actual_ts as f64 / self.sample_rate as f64)
    }

}

/// Copies a decoded buffer into interleaved stereo f32.
fn to_stereo_f32(buf: AudioBufferRef) -> Vec<f32> {
    let spec = *buf.spec();
    let channels = spec.channels.count().max(1);
    let mut sample_buf = SampleBuffer::<f32>::new(buf.capacity() as u64, spec);
    sample_buf.copy_interleaved_ref(buf);
    let samples = sample_buf.samples();

    let frames = samples.len() / channels;
    let mut out = Vec::with_capacity(frames * 2);
    for frame in samples.chunks_exact(channels) {
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { left };
        out.push(left);
        out.push(right);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Writes a 16-bit PCM mono WAV of `secs` seconds of silence.
    fn write_wav(path: &std::path::Path, sample_rate: u32, secs: f64) {
        let n_samples = (sample_rate as f64 * secs) as u32;
        let data_len = n_samples * 2;
        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(b"RIFF").unwrap();
        f.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        f.write_all(b"WAVEfmt ").unwrap();
        f.write_all(&16u32.to_le_bytes()).unwrap();
        f.write_all(&1u16.to_le_bytes()).unwrap(); // PCM
        f.write_all(&1u16.to_le_bytes()).unwrap(); // mono
        f.write_all(&sample_rate.to_le_bytes()).unwrap();
        f.write_all(&(sample_rate * 2).to_le_bytes()).unwrap();
        f.write_all(&2u16.to_le_bytes()).unwrap();
        f.write_all(&16u16.to_le_bytes()).unwrap();
        f.write_all(b"data").unwrap();
        f.write_all(&data_len.to_le_bytes()).unwrap();
        f.write_all(&vec![0u8; data_len as usize]).unwrap();
    }

    #[test]
    fn decodes_a_wav_file_to_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 8000, 0.5);

        let mut decoder = SourceDecoder::open(path.to_str().unwrap()).unwrap();
        assert_eq!(decoder.sample_rate(), 8000);
        assert_eq!(decoder.channels(), 1);
        let duration = decoder.duration_secs().unwrap();
        assert!((duration - 0.5).abs() < 0.05, "duration {duration}");

        let mut frames = 0usize;
        while let Some(samples) = decoder.decode_next().unwrap() {
            assert_eq!(samples.len() % 2, 0);
            frames += samples.len() / 2;
        }
        assert_eq!(frames, 4000);
    }

    #[test]
    fn missing_file_is_a_source_open_error() {
        let err = SourceDecoder::open("/nonexistent/audio.wav").unwrap_err();
        assert!(matches!(err, AudioError::SourceOpen { .. }));
    }
}
