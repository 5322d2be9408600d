//! Voice Activity Detection (C3).
//!
//! A tri-state detector — `Silence`, `Speaking`, `Transitional` — rather than
//! a binary voice/not-voice flag. Energy crossing the configured threshold
//! doesn't flip the reported state immediately: it has to hold for
//! `attack_ms` before `Silence` confirms into `Speaking`, and hold below
//! threshold for `release_ms` before `Speaking` confirms back into
//! `Silence`. While a crossing is being timed out the detector reports
//! `Transitional`, so a caller gating on "is this definitely speech" can
//! treat `Transitional` the same as the state it's leaving without flapping
//! on a single loud click or a brief pause between words.

use std::time::Duration;
use tracing::trace;
use crate::types::AudioFrame;

/// Configuration for voice activity detection.
#[derive(Debug, Clone, Copy)]
pub struct VadConfig {
    /// RMS energy threshold, normalized to `[0.0, 1.0]` against full-scale 16-bit PCM.
    pub threshold: f32,
    /// Sample rate the incoming PCM is at, needed to convert sample counts to durations.
    pub sample_rate_hz: u32,
    /// How long energy must stay above `threshold` before confirming `Speaking`.
    pub attack_ms: u32,
    /// How long energy must stay below `threshold` before confirming `Silence`.
    pub release_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            sample_rate_hz: 8000,
            attack_ms: 200,
            release_ms: 600,
        }
    }
}

/// Voice activity state, as reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Confirmed quiet: no dwell timer running.
    Silence,
    /// Confirmed voice: no dwell timer running.
    Speaking,
    /// A threshold crossing is being timed out; the detector hasn't committed yet.
    Transitional,
}

/// Result of analyzing one chunk of PCM.
#[derive(Debug, Clone, Copy)]
pub struct VadResult {
    /// Reported tri-state activity.
    pub state: VadState,
    /// Normalized RMS energy of the analyzed chunk, `[0.0, 1.0]`.
    pub rms: f32,
}

/// Which confirmed state the detector is currently dwelling away from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Confirmed {
    Silence,
    Speaking,
}

/// Tri-state voice activity detector with attack/release hysteresis.
pub struct VoiceActivityDetector {
    config: VadConfig,
    confirmed: Confirmed,
    dwell: Duration,
}

impl VoiceActivityDetector {
    /// Create a new detector starting from confirmed silence.
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            confirmed: Confirmed::Silence,
            dwell: Duration::ZERO,
        }
    }

    /// Analyze one chunk of 16-bit little-endian PCM.
    ///
    /// An empty or odd-length buffer can't be interpreted as samples and is
    /// reported as silence with zero energy rather than erroring — this is a
    /// detector on a best-effort audio tap, not a codec boundary.
    pub fn process(&mut self, pcm: &[u8]) -> VadResult {
        if pcm.is_empty() || pcm.len() % 2 != 0 {
            return VadResult {
                state: VadState::Silence,
                rms: 0.0,
            };
        }

        let sample_count = pcm.len() / 2;
        let rms = rms_normalized(pcm);
        let above = rms >= self.config.threshold;
        let chunk_duration =
            Duration::from_secs_f64(sample_count as f64 / self.config.sample_rate_hz as f64);

        let state = match self.confirmed {
            Confirmed::Silence => {
                if above {
                    self.dwell += chunk_duration;
                    if self.dwell >= Duration::from_millis(self.config.attack_ms as u64) {
                        self.confirmed = Confirmed::Speaking;
                        self.dwell = Duration::ZERO;
                        VadState::Speaking
                    } else {
                        VadState::Transitional
                    }
                } else {
                    self.dwell = Duration::ZERO;
                    VadState::Silence
                }
            }
            Confirmed::Speaking => {
                if !above {
                    self.dwell += chunk_duration;
                    if self.dwell >= Duration::from_millis(self.config.release_ms as u64) {
                        self.confirmed = Confirmed::Silence;
                        self.dwell = Duration::ZERO;
                        VadState::Silence
                    } else {
                        VadState::Transitional
                    }
                } else {
                    self.dwell = Duration::ZERO;
                    VadState::Speaking
                }
            }
        };

        trace!("vad: rms={:.4} above={} confirmed={:?} -> {:?}", rms, above, self.confirmed, state);

        VadResult { state, rms }
    }

    /// Analyze a pre-decoded [`AudioFrame`] by reinterpreting its samples as bytes.
    pub fn process_frame(&mut self, frame: &AudioFrame) -> VadResult {
        let mut bytes = Vec::with_capacity(frame.samples.len() * 2);
        for s in &frame.samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        self.process(&bytes)
    }

    /// Reset to confirmed silence with no dwell time accumulated.
    pub fn reset(&mut self) {
        self.confirmed = Confirmed::Silence;
        self.dwell = Duration::ZERO;
    }
}

fn rms_normalized(pcm: &[u8]) -> f32 {
    let sum_squares: f64 = pcm
        .chunks_exact(2)
        .map(|c| {
            let sample = i16::from_le_bytes([c[0], c[1]]) as f64;
            sample * sample
        })
        .sum();
    let sample_count = pcm.len() / 2;
    let rms = (sum_squares / sample_count as f64).sqrt();
    (rms / 32768.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(amplitude: i16, samples: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(samples * 2);
        for i in 0..samples {
            let v = if i % 2 == 0 { amplitude } else { -amplitude };
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[test]
    fn empty_input_is_silence() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let result = vad.process(&[]);
        assert_eq!(result.state, VadState::Silence);
        assert_eq!(result.rms, 0.0);
    }

    #[test]
    fn odd_length_input_is_silence() {
        let mut vad = VoiceActivityDetector::new(VadConfig::default());
        let result = vad.process(&[0u8, 1, 2]);
        assert_eq!(result.state, VadState::Silence);
    }

    #[test]
    fn sustained_loud_audio_confirms_speaking_after_attack() {
        let config = VadConfig {
            threshold: 0.02,
            sample_rate_hz: 8000,
            attack_ms: 200,
            release_ms: 600,
        };
        let mut vad = VoiceActivityDetector::new(config);

        // Loud 20ms chunks (160 samples) at a sample rate of 8000Hz: 10 chunks = 200ms.
        let loud = tone(10_000, 160);
        let mut last = VadState::Silence;
        for i in 0..10 {
            last = vad.process(&loud).state;
            if i < 9 {
                assert_eq!(last, VadState::Transitional, "chunk {i} should still be transitional");
            }
        }
        assert_eq!(last, VadState::Speaking);
    }

    #[test]
    fn brief_dip_does_not_flip_to_silence() {
        let config = VadConfig {
            threshold: 0.02,
            sample_rate_hz: 8000,
            attack_ms: 200,
            release_ms: 600,
        };
        let mut vad = VoiceActivityDetector::new(config);

        let loud = tone(10_000, 160);
        for _ in 0..10 {
            vad.process(&loud);
        }
        assert_eq!(vad.confirmed, Confirmed::Speaking);

        let quiet = tone(0, 160);
        let result = vad.process(&quiet);
        assert_eq!(result.state, VadState::Transitional);
    }

    #[test]
    fn quiet_confirms_silence_after_release() {
        let config = VadConfig {
            threshold: 0.02,
            sample_rate_hz: 8000,
            attack_ms: 200,
            release_ms: 600,
        };
        let mut vad = VoiceActivityDetector::new(config);

        let loud = tone(10_000, 160);
        for _ in 0..10 {
            vad.process(&loud);
        }

        let quiet = tone(0, 160);
        let mut last = VadState::Speaking;
        for _ in 0..30 {
            last = vad.process(&quiet).state;
        }
        assert_eq!(last, VadState::Silence);
    }
}
