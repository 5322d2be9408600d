//! Central runtime configuration (AM1).
//!
//! Every tunable the pipeline's components read is collected here rather than
//! scattered as ad-hoc constants, mirroring how `media-core`'s own
//! `engine::config` centralizes engine-wide settings. Call-scoped code
//! constructs one `PipelineConfig` (typically from environment/config-file
//! defaults merged with per-call overrides) and passes `&PipelineConfig`
//! down to whichever components need it.

use std::time::Duration;

/// Jitter buffer (C4) tuning.
#[derive(Debug, Clone, Copy)]
pub struct JitterBufferConfig {
    /// Frames the playout loop wants queued before leaving `Warmup` (at 20ms/frame
    /// this is the high watermark the spec calls `jitter_waterline`).
    pub waterline_frames: usize,
    /// Frames below which the playout loop drops from `Emit` into `Rebuffer`.
    pub low_watermark_frames: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            waterline_frames: 300,
            low_watermark_frames: 100,
        }
    }
}

/// TTS ingest / playout (C5, C6) tuning.
#[derive(Debug, Clone, Copy)]
pub struct PlayoutConfig {
    /// RTP packetization interval driving the playout loop's pacing tick.
    pub ptime_ms: u32,
    /// How many TTS-framed chunks to pre-buffer before starting emission, to
    /// hide TTS cold-start latency behind silence the caller won't notice.
    pub pre_buffer_chunks: usize,
}

impl Default for PlayoutConfig {
    fn default() -> Self {
        Self {
            ptime_ms: 20,
            pre_buffer_chunks: 3,
        }
    }
}

/// Voice activity detection (C3) tuning.
#[derive(Debug, Clone, Copy)]
pub struct VadTuning {
    /// Normalized RMS energy threshold.
    pub threshold: f32,
    /// Dwell time before confirming speech.
    pub attack_ms: u32,
    /// Dwell time before confirming silence.
    pub release_ms: u32,
    /// Additional debounce applied by the auto-responder (C7) consumer on
    /// top of the detector's own attack/release hysteresis, to absorb a
    /// single dropped/garbled frame without treating it as a state flip.
    pub debounce_ms: u32,
}

impl Default for VadTuning {
    fn default() -> Self {
        Self {
            threshold: 0.02,
            attack_ms: 200,
            release_ms: 600,
            debounce_ms: 100,
        }
    }
}

/// Resampler (C2) tuning.
#[derive(Debug, Clone, Copy)]
pub struct ResamplerTuning {
    /// Legacy 0-10 quality knob; see `ResampleQuality::from_level`.
    pub quality: u8,
}

impl Default for ResamplerTuning {
    fn default() -> Self {
        Self { quality: 7 }
    }
}

/// Call manager (C9, C10) timeouts and sweep interval.
#[derive(Debug, Clone, Copy)]
pub struct CallManagerConfig {
    /// How long to wait for the secure media context (DTLS-SRTP, an external
    /// black box here) before failing call setup.
    pub secure_context_timeout: Duration,
    /// How long to wait for hangup signalling to complete before force-terminating.
    pub hangup_timeout: Duration,
    /// How long a signalling delivery attempt waits before being retried/declared failed.
    pub notification_timeout: Duration,
    /// Interval between idle-call sweeps.
    pub cleanup_interval: Duration,
    /// How long a call can sit idle (no media activity) before the sweep reclaims it.
    pub idle_context_ttl: Duration,
}

impl Default for CallManagerConfig {
    fn default() -> Self {
        Self {
            secure_context_timeout: Duration::from_millis(10_000),
            hangup_timeout: Duration::from_millis(10_000),
            notification_timeout: Duration::from_millis(2_000),
            cleanup_interval: Duration::from_millis(5_000),
            idle_context_ttl: Duration::from_millis(30_000),
        }
    }
}

/// Recording pipeline (C11) tuning.
#[derive(Debug, Clone, Copy)]
pub struct RecorderConfig {
    /// Output WAV sample rate; both legs are resampled to this rate before interleaving.
    pub output_rate_hz: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self { output_rate_hz: 16_000 }
    }
}

/// Worker pool (AM5) sizing for parallel codec encoding.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    /// Number of encoder worker threads.
    pub encoder_parallelism: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            encoder_parallelism: (num_cpus::get() / 2).max(1),
        }
    }
}

/// Aggregate pipeline configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineConfig {
    pub jitter_buffer: JitterBufferConfig,
    pub playout: PlayoutConfig,
    pub vad: VadTuning,
    pub resampler: ResamplerTuning,
    pub call_manager: CallManagerConfig,
    pub recorder: RecorderConfig,
    pub worker_pool: WorkerPoolConfig,
}
