//! TTS ingest and framer (C6).
//!
//! Converts a stream of TTS-engine audio chunks — arbitrary-length `f32` PCM
//! at whatever rate the engine renders, arriving at whatever cadence the
//! engine's network round-trips allow — into fixed-size, profile-encoded
//! [`Frame`]s pushed onto a [`JitterBuffer`] for the playout loop (C5) to
//! drain. Two latency sources get hidden here rather than surfacing as
//! stutter on the call: the TTS engine's first-chunk round trip (absorbed by
//! pre-buffering `pre_buffer_chunks` chunks before framing starts) and the
//! mismatch between the engine's native chunk size and the call leg's
//! packetization interval (absorbed by carrying unconsumed samples over
//! between chunks). G.711 encoding of ready frames is fanned out across a
//! bounded worker pool sized by `WorkerPoolConfig`, since it's the only
//! CPU-bound step in an otherwise I/O-bound pipeline.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::buffer::JitterBuffer;
use crate::codec::{encode_alaw, encode_mulaw};
use crate::config::{PlayoutConfig, WorkerPoolConfig};
use crate::error::Result;
use crate::playout::PlayoutState;
use crate::processing::format::ResamplerCache;
use crate::types::{payload_types, Frame, MediaProfile};

/// One chunk of synthesized audio from a TTS engine.
#[derive(Debug, Clone)]
pub struct TtsChunk {
    /// `f32` PCM samples in `[-1.0, 1.0]`, mono.
    pub samples: Vec<f32>,
    /// The rate these samples were rendered at.
    pub sample_rate_hz: u32,
}

/// A source of TTS audio, abstracting over whatever TTS engine client is in
/// use. `next_chunk` returning `Ok(None)` signals the utterance finished
/// normally; `Err` aborts the current PlayScript (surfaced as
/// [`crate::error::Error::TtsStreamError`] by callers).
#[async_trait]
pub trait TtsSource: Send {
    /// Pull the next chunk, or `None` at end of utterance.
    async fn next_chunk(&mut self) -> Result<Option<TtsChunk>>;
}

/// Converts TTS chunks into encoded frames and pushes them onto a jitter buffer.
pub struct TtsFramer {
    profile: MediaProfile,
    resampler_cache: ResamplerCache,
    pending_samples: Mutex<Vec<i16>>,
    next_timestamp: u32,
    encoder_pool: rayon::ThreadPool,
}

impl TtsFramer {
    /// Construct a framer targeting `profile`'s rate, with a resampler cache
    /// configured for `resampler_quality` (the legacy 0-10 knob) and an
    /// encoder worker pool sized per `worker_pool`.
    pub fn new(profile: MediaProfile, resampler_quality: u8, worker_pool: WorkerPoolConfig) -> Self {
        let encoder_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_pool.encoder_parallelism)
            .thread_name(|i| format!("tts-encoder-{i}"))
            .build()
            .expect("thread pool with a positive thread count");

        Self {
            resampler_cache: ResamplerCache::new(profile.sample_rate_hz, resampler_quality),
            profile,
            pending_samples: Mutex::new(Vec::new()),
            next_timestamp: 0,
            encoder_pool,
        }
    }

    /// Drive `source` to completion, pushing framed, encoded [`Frame`]s onto
    /// `buffer` as they become available, and advancing `state`'s byte
    /// counters and `tts_stream_finished` flag as C5 expects.
    ///
    /// If `cancel` is already cancelled when this is called, the buffer is
    /// closed immediately without pre-buffering anything. If cancellation
    /// arrives mid-stream, whatever was already pulled into the pre-buffer or
    /// mid-flight is still framed and pushed (nothing is discarded), but no
    /// trailing partial frame is flushed and no further chunks are pulled.
    ///
    /// Returns the wall-clock time spent generating audio, for the caller
    /// (C7) to report back as `play_script`'s result.
    pub async fn ingest(
        &mut self,
        source: &mut dyn TtsSource,
        buffer: &JitterBuffer,
        playout_config: &PlayoutConfig,
        state: &PlayoutState,
        cancel: &CancellationToken,
    ) -> Result<Duration> {
        let start = Instant::now();

        if cancel.is_cancelled() {
            buffer.close();
            return Ok(start.elapsed());
        }

        let mut prebuffer = Vec::with_capacity(playout_config.pre_buffer_chunks);
        let mut cancelled = false;
        while prebuffer.len() < playout_config.pre_buffer_chunks {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                chunk = source.next_chunk() => {
                    match chunk? {
                        Some(c) if c.samples.is_empty() => continue,
                        Some(c) => prebuffer.push(c),
                        None => break,
                    }
                }
            }
        }
        debug!("tts framer pre-buffered {} chunks", prebuffer.len());

        for chunk in &prebuffer {
            self.frame_chunk(chunk, buffer, state)?;
        }

        if !cancelled {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        cancelled = true;
                        break;
                    }
                    chunk = source.next_chunk() => {
                        match chunk? {
                            Some(c) => self.frame_chunk(&c, buffer, state)?,
                            None => break,
                        }
                    }
                }
            }
        }

        if !cancelled {
            self.flush_partial_frame(buffer, state)?;
        }
        state.mark_finished();
        buffer.close();
        Ok(start.elapsed())
    }

    fn frame_chunk(&mut self, chunk: &TtsChunk, buffer: &JitterBuffer, state: &PlayoutState) -> Result<()> {
        let resampled = self
            .resampler_cache
            .get_or_create(chunk.sample_rate_hz)?
            .resample_f32(&chunk.samples)?;

        let frame_len = self.profile.samples_per_frame();
        let ready: Vec<Vec<i16>> = {
            let mut pending = self.pending_samples.lock().unwrap();
            pending.extend(resampled);
            let mut frames = Vec::new();
            while pending.len() >= frame_len {
                frames.push(pending.drain(..frame_len).collect());
            }
            frames
        };

        self.encode_and_push(ready, buffer, state)
    }

    fn flush_partial_frame(&mut self, buffer: &JitterBuffer, state: &PlayoutState) -> Result<()> {
        let frame_len = self.profile.samples_per_frame();
        let trailing = {
            let mut pending = self.pending_samples.lock().unwrap();
            if pending.is_empty() {
                return Ok(());
            }
            pending.resize(frame_len, 0);
            std::mem::take(&mut *pending)
        };
        self.encode_and_push(vec![trailing], buffer, state)
    }

    /// Encode `frames` (each exactly one packetization interval of PCM) in
    /// parallel on the encoder pool, then push them onto `buffer` in their
    /// original order.
    fn encode_and_push(&mut self, frames: Vec<Vec<i16>>, buffer: &JitterBuffer, state: &PlayoutState) -> Result<()> {
        if frames.is_empty() {
            return Ok(());
        }

        let payload_type = self.profile.payload_type;
        let encoded: Vec<Result<Vec<u8>>> = self.encoder_pool.install(|| {
            use rayon::prelude::*;
            frames
                .par_iter()
                .map(|samples| encode_frame(payload_type, samples))
                .collect()
        });

        for result in encoded {
            let encoded = result?;
            let frame = Frame::new(Bytes::from(encoded), &self.profile, self.next_timestamp);
            state.add_generated(frame.payload.len() as u64);
            self.next_timestamp = self.next_timestamp.wrapping_add(self.profile.samples_per_frame() as u32);
            // The framer is the sole writer; a closed buffer means the
            // playout loop (and the call leg it serves) is gone, so there's
            // nothing more useful to do with this frame than drop it.
            let _ = buffer.push(frame);
        }
        Ok(())
    }
}

fn encode_frame(payload_type: u8, samples: &[i16]) -> Result<Vec<u8>> {
    let mut pcm_bytes = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        pcm_bytes.extend_from_slice(&s.to_le_bytes());
    }
    match payload_type {
        payload_types::PCMA => encode_alaw(&pcm_bytes),
        _ => encode_mulaw(&pcm_bytes),
    }
}
