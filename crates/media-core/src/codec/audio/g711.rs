//! G.711 audio codec (C1).
//!
//! Implements both μ-law (PCMU) and A-law (PCMA) variants. G.711 is stateless:
//! each 16-bit linear PCM sample maps to exactly one 8-bit codeword and back,
//! independent of any neighboring sample. The free functions below
//! (`encode_mulaw`/`decode_mulaw`/`encode_alaw`/`decode_alaw`) operate directly
//! on byte buffers and are what the rest of the pipeline (jitter buffer,
//! playout loop, recording pipeline) calls; [`G711Codec`] wraps them in the
//! frame-oriented [`AudioCodec`] trait for callers that prefer that shape.

use tracing::{debug, trace};
use crate::error::{CodecError, Result};
use crate::types::{AudioFrame, SampleRate};
use super::common::{AudioCodec, CodecInfo};

/// G.711 codec variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum G711Variant {
    /// μ-law (PCMU) - Used primarily in North America and Japan
    MuLaw,
    /// A-law (PCMA) - Used primarily in Europe and rest of world
    ALaw,
}

/// G.711 codec configuration
#[derive(Debug, Clone)]
pub struct G711Config {
    /// Codec variant (μ-law or A-law)
    pub variant: G711Variant,
    /// Sample rate (typically 8000 Hz for telephony)
    pub sample_rate: u32,
    /// Number of channels (typically 1 for telephony)
    pub channels: u8,
    /// Frame size in milliseconds (typically 10ms or 20ms)
    pub frame_size_ms: f32,
}

impl Default for G711Config {
    fn default() -> Self {
        Self {
            variant: G711Variant::MuLaw,
            sample_rate: 8000,
            channels: 1,
            frame_size_ms: 20.0,
        }
    }
}

/// G.711 codec implementation
pub struct G711Codec {
    config: G711Config,
    frame_size: usize,
}

impl G711Codec {
    /// Create a new G.711 codec
    pub fn new(sample_rate: SampleRate, channels: u8, config: G711Config) -> Result<Self> {
        let sample_rate_hz = sample_rate.as_hz();

        if channels == 0 || channels > 2 {
            return Err(CodecError::InvalidParameters {
                details: format!("Invalid channel count: {}", channels),
            }
            .into());
        }

        if !matches!(sample_rate_hz, 8000 | 16000 | 48000) {
            return Err(CodecError::InvalidParameters {
                details: format!("Unsupported sample rate: {}Hz", sample_rate_hz),
            }
            .into());
        }

        let frame_size = ((sample_rate_hz as f32 * config.frame_size_ms / 1000.0) as usize) * channels as usize;

        debug!(
            "Creating G.711 {:?} codec: {}Hz, {}ch, {}ms frames",
            config.variant, sample_rate_hz, channels, config.frame_size_ms
        );

        Ok(Self {
            config: G711Config {
                sample_rate: sample_rate_hz,
                channels,
                ..config
            },
            frame_size,
        })
    }

    /// Create a μ-law codec
    pub fn mu_law(sample_rate: SampleRate, channels: u8) -> Result<Self> {
        let config = G711Config {
            variant: G711Variant::MuLaw,
            ..Default::default()
        };
        Self::new(sample_rate, channels, config)
    }

    /// Create an A-law codec
    pub fn a_law(sample_rate: SampleRate, channels: u8) -> Result<Self> {
        let config = G711Config {
            variant: G711Variant::ALaw,
            ..Default::default()
        };
        Self::new(sample_rate, channels, config)
    }
}

impl AudioCodec for G711Codec {
    fn encode(&mut self, audio_frame: &AudioFrame) -> Result<Vec<u8>> {
        if audio_frame.samples.len() != self.frame_size {
            return Err(CodecError::InvalidFrameSize {
                expected: self.frame_size,
                actual: audio_frame.samples.len(),
            }
            .into());
        }

        let encoded = match self.config.variant {
            G711Variant::MuLaw => audio_frame.samples.iter().map(|&s| linear_to_mulaw(s)).collect(),
            G711Variant::ALaw => audio_frame.samples.iter().map(|&s| linear_to_alaw(s)).collect(),
        };

        trace!(
            "G.711 {:?} encoded {} samples to {} bytes",
            self.config.variant,
            audio_frame.samples.len(),
            audio_frame.samples.len()
        );

        Ok(encoded)
    }

    fn decode(&mut self, encoded_data: &[u8]) -> Result<AudioFrame> {
        let samples = match self.config.variant {
            G711Variant::MuLaw => encoded_data.iter().map(|&b| mulaw_to_linear(b)).collect(),
            G711Variant::ALaw => encoded_data.iter().map(|&b| alaw_to_linear(b)).collect(),
        };

        trace!(
            "G.711 {:?} decoded {} bytes to samples",
            self.config.variant,
            encoded_data.len()
        );

        Ok(AudioFrame::new(samples, self.config.sample_rate, self.config.channels, 0))
    }

    fn get_info(&self) -> CodecInfo {
        CodecInfo {
            name: match self.config.variant {
                G711Variant::MuLaw => "PCMU".to_string(),
                G711Variant::ALaw => "PCMA".to_string(),
            },
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            bitrate: self.config.sample_rate * 8,
        }
    }

    fn reset(&mut self) {
        debug!("G.711 {:?} codec reset (stateless)", self.config.variant);
    }
}

/// Encode 16-bit linear PCM (little-endian byte pairs) to μ-law codewords.
///
/// `pcm` must have an even length; each pair of bytes is one `i16` sample.
pub fn encode_mulaw(pcm: &[u8]) -> Result<Vec<u8>> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::InvalidLength { length: pcm.len() }.into());
    }
    Ok(pcm
        .chunks_exact(2)
        .map(|c| linear_to_mulaw(i16::from_le_bytes([c[0], c[1]])))
        .collect())
}

/// Decode μ-law codewords to 16-bit linear PCM (little-endian byte pairs).
pub fn decode_mulaw(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        out.extend_from_slice(&mulaw_to_linear(byte).to_le_bytes());
    }
    out
}

/// Encode 16-bit linear PCM (little-endian byte pairs) to A-law codewords.
///
/// `pcm` must have an even length; each pair of bytes is one `i16` sample.
pub fn encode_alaw(pcm: &[u8]) -> Result<Vec<u8>> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::InvalidLength { length: pcm.len() }.into());
    }
    Ok(pcm
        .chunks_exact(2)
        .map(|c| linear_to_alaw(i16::from_le_bytes([c[0], c[1]])))
        .collect())
}

/// Decode A-law codewords to 16-bit linear PCM (little-endian byte pairs).
pub fn decode_alaw(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() * 2);
    for &byte in data {
        out.extend_from_slice(&alaw_to_linear(byte).to_le_bytes());
    }
    out
}

const MULAW_BIAS: i16 = 0x84;
const MULAW_CLIP: i16 = 8159;

fn linear_to_mulaw(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80 } else { 0x00 };
    let mut magnitude = if sample < 0 { sample.wrapping_neg() } else { sample };

    if magnitude > MULAW_CLIP {
        magnitude = MULAW_CLIP;
    }

    magnitude += MULAW_BIAS;

    let mut exponent = 7;
    for i in (0..7).rev() {
        if magnitude >= (1 << (i + 8)) {
            exponent = i + 1;
            break;
        }
        if i == 0 {
            exponent = 0;
        }
    }

    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;
    let mulaw = sign | (exponent << 4) | mantissa;

    !mulaw as u8
}

fn mulaw_to_linear(mulaw: u8) -> i16 {
    let mulaw = !mulaw;

    let sign = mulaw & 0x80;
    let exponent = (mulaw >> 4) & 0x07;
    let mantissa = mulaw & 0x0F;

    let magnitude = if exponent == 0 {
        ((mantissa as i16) << 4) + 8
    } else {
        (((mantissa as i16) << 4) + 0x108) << (exponent - 1)
    };

    let magnitude = magnitude - MULAW_BIAS;

    if sign != 0 {
        -magnitude
    } else {
        magnitude
    }
}

const ALAW_CLIP: i16 = 8159;

fn linear_to_alaw(sample: i16) -> u8 {
    let sign = if sample < 0 { 0x80 } else { 0x00 };
    let mut magnitude = if sample < 0 { sample.wrapping_neg() } else { sample };

    if magnitude > ALAW_CLIP {
        magnitude = ALAW_CLIP;
    }

    let alaw = if magnitude < 32 {
        sign | ((magnitude >> 1) & 0x0F) as u8
    } else {
        let mut exponent = 7;
        for i in (1..8).rev() {
            if magnitude >= (1 << (i + 4)) {
                exponent = i;
                break;
            }
        }

        let mantissa = ((magnitude >> (exponent + 1)) & 0x0F) as u8;
        sign | ((exponent - 1) << 4) | mantissa
    };

    alaw ^ 0x55
}

fn alaw_to_linear(alaw: u8) -> i16 {
    let alaw = alaw ^ 0x55;

    let sign = alaw & 0x80;
    let exponent = (alaw >> 4) & 0x07;
    let mantissa = alaw & 0x0F;

    let magnitude = if exponent == 0 {
        (mantissa << 1) + 1
    } else {
        ((mantissa << 1) + 33) << exponent
    } as i16;

    if sign != 0 {
        -magnitude
    } else {
        magnitude
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SampleRate;

    #[test]
    fn test_g711_mulaw_creation() {
        let codec = G711Codec::mu_law(SampleRate::Rate8000, 1);
        assert!(codec.is_ok());

        let codec = codec.unwrap();
        let info = codec.get_info();
        assert_eq!(info.name, "PCMU");
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
    }

    #[test]
    fn test_g711_alaw_creation() {
        let codec = G711Codec::a_law(SampleRate::Rate8000, 1);
        assert!(codec.is_ok());

        let codec = codec.unwrap();
        let info = codec.get_info();
        assert_eq!(info.name, "PCMA");
        assert_eq!(info.sample_rate, 8000);
        assert_eq!(info.channels, 1);
    }

    #[test]
    fn test_mulaw_encode_decode_frame() {
        let mut codec = G711Codec::mu_law(SampleRate::Rate8000, 1).unwrap();

        let samples: Vec<i16> = (0..160).map(|i| (i as i16 * 10) % 1000).collect();
        let frame = AudioFrame::new(samples, 8000, 1, 0);

        let encoded = codec.encode(&frame).unwrap();
        assert_eq!(encoded.len(), 160);

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.samples.len(), 160);
        assert_eq!(decoded.sample_rate, 8000);
        assert_eq!(decoded.channels, 1);
    }

    #[test]
    fn test_alaw_encode_decode_frame() {
        let mut codec = G711Codec::a_law(SampleRate::Rate8000, 1).unwrap();

        let samples: Vec<i16> = (0..160).map(|i| (i as i16 * 10) % 1000).collect();
        let frame = AudioFrame::new(samples, 8000, 1, 0);

        let encoded = codec.encode(&frame).unwrap();
        assert_eq!(encoded.len(), 160);

        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.samples.len(), 160);
    }

    #[test]
    fn test_invalid_frame_size() {
        let mut codec = G711Codec::mu_law(SampleRate::Rate8000, 1).unwrap();

        let samples = vec![0i16; 80]; // should be 160 for 20ms at 8kHz
        let frame = AudioFrame::new(samples, 8000, 1, 0);

        let result = codec.encode(&frame);
        assert!(result.is_err());
        assert!(matches!(
            result.unwrap_err(),
            crate::error::Error::Codec(CodecError::InvalidFrameSize { .. })
        ));
    }

    #[test]
    fn test_mulaw_byte_roundtrip() {
        let samples: Vec<i16> = vec![0, 100, -100, 1000, -1000, i16::MAX, i16::MIN + 1];
        let mut pcm = Vec::new();
        for s in &samples {
            pcm.extend_from_slice(&s.to_le_bytes());
        }

        let encoded = encode_mulaw(&pcm).unwrap();
        assert_eq!(encoded.len(), samples.len());

        let decoded = decode_mulaw(&encoded);
        assert_eq!(decoded.len(), pcm.len());

        // Zero should decode back close to zero.
        let first = i16::from_le_bytes([decoded[0], decoded[1]]);
        assert!(first.abs() < 200);
    }

    #[test]
    fn test_alaw_byte_roundtrip() {
        let samples: Vec<i16> = vec![0, 100, -100, 1000, -1000];
        let mut pcm = Vec::new();
        for s in &samples {
            pcm.extend_from_slice(&s.to_le_bytes());
        }

        let encoded = encode_alaw(&pcm).unwrap();
        assert_eq!(encoded.len(), samples.len());

        let decoded = decode_alaw(&encoded);
        assert_eq!(decoded.len(), pcm.len());
    }

    #[test]
    fn test_encode_rejects_odd_length() {
        let pcm = vec![0u8, 1, 2]; // 3 bytes, not a whole number of i16 samples
        let err = encode_mulaw(&pcm).unwrap_err();
        assert!(matches!(err, crate::error::Error::Codec(CodecError::InvalidLength { length: 3 })));
    }
}
