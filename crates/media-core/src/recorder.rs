//! Recording pipeline (C11).
//!
//! Produces one stereo WAV file per call: left channel is the audio received
//! from the caller, right channel is the audio sent to them. Both legs
//! arrive as G.711-encoded RTP payloads at whatever packetization interval
//! the call uses; each is decoded, resampled to the recorder's configured
//! output rate, and queued. [`CallRecorder::flush_aligned`] interleaves
//! whatever whole stereo frames both queues can currently supply — received
//! and sent audio are not timestamp-correlated here, so if one leg is
//! temporarily silent (nothing pushed) while the other keeps flowing, the
//! aligned portion simply waits; `finalize` pads the shorter queue with
//! zero-silence rather than drop samples, which is the documented recording
//! drift policy (see DESIGN.md's Open Question decision).

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::collections::VecDeque;

use hound::{SampleFormat, WavSpec, WavWriter};

use crate::codec::{decode_alaw, decode_mulaw};
use crate::error::{Error, Result};
use crate::processing::format::Resampler;
use crate::types::payload_types;

/// Records one call's received/sent audio to a stereo WAV file.
pub struct CallRecorder {
    writer: WavWriter<BufWriter<File>>,
    received_resampler: Resampler,
    sent_resampler: Resampler,
    received_queue: VecDeque<i16>,
    sent_queue: VecDeque<i16>,
}

impl CallRecorder {
    /// Open `path` for writing and start a new stereo recording at
    /// `output_rate_hz`. Both legs are assumed to arrive at G.711's native
    /// 8kHz and are resampled up (or passed through) to `output_rate_hz`.
    pub fn create(path: impl AsRef<Path>, output_rate_hz: u32) -> Result<Self> {
        let spec = WavSpec {
            channels: 2,
            sample_rate: output_rate_hz,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let file = File::create(path)?;
        let writer = WavWriter::new(BufWriter::new(file), spec)
            .map_err(|e| Error::Other(format!("failed to open WAV writer: {e}")))?;

        Ok(Self {
            writer,
            received_resampler: Resampler::new(8000, output_rate_hz, 5)?,
            sent_resampler: Resampler::new(8000, output_rate_hz, 5)?,
            received_queue: VecDeque::new(),
            sent_queue: VecDeque::new(),
        })
    }

    /// Feed a decoded chunk of audio received from the caller.
    pub fn push_received(&mut self, encoded: &[u8], payload_type: u8) -> Result<()> {
        let samples = decode_and_resample(encoded, payload_type, &mut self.received_resampler)?;
        self.received_queue.extend(samples);
        self.flush_aligned()
    }

    /// Feed a decoded chunk of audio sent to the caller.
    pub fn push_sent(&mut self, encoded: &[u8], payload_type: u8) -> Result<()> {
        let samples = decode_and_resample(encoded, payload_type, &mut self.sent_resampler)?;
        self.sent_queue.extend(samples);
        self.flush_aligned()
    }

    /// Write out as many interleaved stereo sample pairs as both queues can
    /// currently supply, leaving any excess on the longer queue for the next flush.
    fn flush_aligned(&mut self) -> Result<()> {
        let aligned = self.received_queue.len().min(self.sent_queue.len());
        for _ in 0..aligned {
            let left = self.received_queue.pop_front().unwrap();
            let right = self.sent_queue.pop_front().unwrap();
            self.writer
                .write_sample(left)
                .map_err(|e| Error::Other(format!("WAV write failed: {e}")))?;
            self.writer
                .write_sample(right)
                .map_err(|e| Error::Other(format!("WAV write failed: {e}")))?;
        }
        Ok(())
    }

    /// Pad whichever queue is shorter with silence so the final flush still
    /// produces aligned stereo pairs, then finalize the WAV file (patches
    /// the RIFF/data chunk sizes in the header).
    pub fn finalize(mut self) -> Result<()> {
        let target = self.received_queue.len().max(self.sent_queue.len());
        self.received_queue.resize(target, 0);
        self.sent_queue.resize(target, 0);
        self.flush_aligned()?;
        self.writer
            .finalize()
            .map_err(|e| Error::Other(format!("WAV finalize failed: {e}")))
    }
}

fn decode_and_resample(encoded: &[u8], payload_type: u8, resampler: &mut Resampler) -> Result<Vec<i16>> {
    let pcm_bytes = match payload_type {
        payload_types::PCMA => decode_alaw(encoded),
        _ => decode_mulaw(encoded),
    };
    let samples: Vec<i16> = pcm_bytes
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect();
    resampler.resample(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_mulaw;
    use tempfile::NamedTempFile;

    fn encoded_silence(samples: usize) -> Vec<u8> {
        let pcm = vec![0u8; samples * 2];
        encode_mulaw(&pcm).unwrap()
    }

    #[test]
    fn alternating_pushes_produce_aligned_stereo_output() {
        let file = NamedTempFile::new().unwrap();
        let mut recorder = CallRecorder::create(file.path(), 16000).unwrap();

        for _ in 0..50 {
            recorder.push_received(&encoded_silence(160), payload_types::PCMU).unwrap();
            recorder.push_sent(&encoded_silence(160), payload_types::PCMU).unwrap();
        }

        recorder.finalize().unwrap();

        let reader = hound::WavReader::open(file.path()).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 16000);
    }

    #[test]
    fn unbalanced_legs_are_padded_on_finalize_not_dropped() {
        let file = NamedTempFile::new().unwrap();
        let mut recorder = CallRecorder::create(file.path(), 16000).unwrap();

        recorder.push_received(&encoded_silence(160), payload_types::PCMU).unwrap();
        recorder.push_received(&encoded_silence(160), payload_types::PCMU).unwrap();
        recorder.push_sent(&encoded_silence(160), payload_types::PCMU).unwrap();

        recorder.finalize().unwrap();

        let mut reader = hound::WavReader::open(file.path()).unwrap();
        let total_samples = reader.samples::<i16>().count();
        assert!(total_samples > 0);
        assert_eq!(total_samples % 2, 0);
    }
}
