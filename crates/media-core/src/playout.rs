//! Playout loop (C5).
//!
//! Drains the jitter buffer (C4) at the negotiated packetization interval and
//! hands each [`Frame`] to its `on_frame` sink (ordinarily the audio bridge's
//! outbound RTP path). Grounded on the same queue/underrun/paced-sleep shape
//! as this codebase's local-hardware audio playback thread, but async
//! (`tokio::time::sleep` instead of `thread::sleep`) and network-destined
//! instead of device-destined.
//!
//! [`PlayoutState`] is the shared byte-counter/gate bookkeeping the spec's
//! data model assigns to C5; it is constructed once per `play_script` session
//! by the auto-responder (C7) and handed to both the TTS framer (which
//! advances `total_bytes_generated` and flips `tts_stream_finished`) and this
//! loop (which owns everything else).
//!
//! Loop phases (distinct from [`PlayoutState`] — this is the FSM the loop
//! itself walks through, not the shared counters):
//! - `Warmup`: waiting for the jitter buffer to reach `waterline_frames`
//!   before emitting anything, so a slow-starting TTS stream doesn't open
//!   with stutter.
//! - `Emit`: popping one frame per tick and sending it on.
//! - `Rebuffer`: the buffer ran dry mid-stream; back off with bounded waits
//!   before resuming, rather than spinning or stalling indefinitely.
//! - `Shutdown`: `should_stop`, cancellation, or natural completion; the loop
//!   exits and trips the completion watch exactly once.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::buffer::JitterBuffer;
use crate::codec::{encode_alaw, encode_mulaw};
use crate::config::{JitterBufferConfig, PlayoutConfig};
use crate::types::{payload_types, Frame, MediaProfile};

/// Shared counters and gate state for one `play_script` session (spec §3's
/// `PlayoutState`). Constructed by the auto-responder (C7), written by both
/// the TTS framer (C6) and this playout loop (C5).
pub struct PlayoutState {
    /// Set by the TTS framer once its source is exhausted and the trailing
    /// partial frame has been flushed.
    pub tts_stream_finished: AtomicBool,
    /// Set by `signal_playout_complete`/`stop` on the auto-responder; the
    /// loop checks this every tick and at every wait point.
    pub should_stop: AtomicBool,
    /// The half-duplex VAD gate: `false` while the remote party is talking.
    pub should_send_audio: AtomicBool,
    /// Encoded bytes pushed onto the jitter buffer so far this session.
    pub total_bytes_generated: AtomicU64,
    /// Encoded bytes handed to `on_frame` so far this session.
    pub total_bytes_sent: AtomicU64,
    /// Consecutive ticks where a real frame wasn't available to send.
    pub empty_frame_count: AtomicU32,
    /// The last frame actually sent, repeated once on a bare miss before
    /// falling back to silence.
    pub last_sent_frame: Mutex<Option<Frame>>,
    /// EWMA of the adaptive per-tick delay, in milliseconds.
    pub smoothed_delay_ms: Mutex<f64>,
}

impl PlayoutState {
    /// A fresh session's counters: nothing generated, nothing sent, gate
    /// open (the responder starts assuming it may speak; the half-duplex
    /// gate closes it as soon as uplink VAD says otherwise).
    pub fn new(ptime_ms: u32) -> Self {
        Self {
            tts_stream_finished: AtomicBool::new(false),
            should_stop: AtomicBool::new(false),
            should_send_audio: AtomicBool::new(true),
            total_bytes_generated: AtomicU64::new(0),
            total_bytes_sent: AtomicU64::new(0),
            empty_frame_count: AtomicU32::new(0),
            last_sent_frame: Mutex::new(None),
            smoothed_delay_ms: Mutex::new(ptime_ms as f64),
        }
    }

    pub fn mark_finished(&self) {
        self.tts_stream_finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.tts_stream_finished.load(Ordering::Acquire)
    }

    pub fn add_generated(&self, bytes: u64) {
        self.total_bytes_generated.fetch_add(bytes, Ordering::AcqRel);
    }

    pub fn generated(&self) -> u64 {
        self.total_bytes_generated.load(Ordering::Acquire)
    }

    pub fn sent(&self) -> u64 {
        self.total_bytes_sent.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    pub fn set_gate(&self, open: bool) {
        self.should_send_audio.store(open, Ordering::Release);
    }

    pub fn gate_open(&self) -> bool {
        self.should_send_audio.load(Ordering::Acquire)
    }

    /// The completion condition from spec §3: the producer is done, the
    /// buffer is empty, and every generated byte has been sent.
    pub fn is_complete(&self, buffer_depth: usize) -> bool {
        self.is_finished() && buffer_depth == 0 && self.sent() >= self.generated()
    }
}

/// Loop-internal FSM phase, observable via [`PlayoutLoop::phase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    /// Accumulating frames before the first emission.
    Warmup,
    /// Steady-state: one real frame emitted per tick.
    Emit,
    /// Buffer ran dry; backing off before resuming emission.
    Rebuffer,
    /// Drained, stopped, or cancelled; the loop has exited.
    Shutdown,
}

impl LoopPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Warmup,
            1 => Self::Emit,
            2 => Self::Rebuffer,
            _ => Self::Shutdown,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Warmup => 0,
            Self::Emit => 1,
            Self::Rebuffer => 2,
            Self::Shutdown => 3,
        }
    }
}

/// Events the playout loop reports.
#[derive(Debug, Clone)]
pub enum PlayoutEvent {
    /// The loop transitioned to a new phase.
    PhaseChanged(LoopPhase),
    /// A silence frame was substituted for a missing real frame.
    Underrun,
    /// One frame was handed to the outbound sink — the spec's
    /// `OutgoingAudioGenerated` event.
    OutgoingAudioGenerated(Frame),
}

/// Drains a [`JitterBuffer`] at a paced, adaptively-corrected cadence,
/// honoring the half-duplex gate and underrun-substitution policy, and emits
/// frames to `on_frame`.
pub struct PlayoutLoop {
    buffer: Arc<JitterBuffer>,
    profile: MediaProfile,
    jitter_config: JitterBufferConfig,
    playout_config: PlayoutConfig,
    state: Arc<PlayoutState>,
    phase: Arc<AtomicU8>,
    events_tx: mpsc::UnboundedSender<PlayoutEvent>,
    silence_frame: bytes::Bytes,
}

impl PlayoutLoop {
    /// Construct a playout loop over `buffer`, sharing `state` with the TTS
    /// framer that feeds it. Returns the loop plus a receiver for
    /// [`PlayoutEvent`]s; call [`Self::run`] to drive it.
    pub fn new(
        buffer: Arc<JitterBuffer>,
        profile: MediaProfile,
        jitter_config: JitterBufferConfig,
        playout_config: PlayoutConfig,
        state: Arc<PlayoutState>,
    ) -> (Self, mpsc::UnboundedReceiver<PlayoutEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let silence_pcm = vec![0u8; profile.frame_bytes_pcm16()];
        let silence_encoded = match profile.payload_type {
            payload_types::PCMA => encode_alaw(&silence_pcm),
            _ => encode_mulaw(&silence_pcm),
        };
        let silence_frame = bytes::Bytes::from(silence_encoded.expect("even-length PCM"));

        (
            Self {
                buffer,
                profile,
                jitter_config,
                playout_config,
                state,
                phase: Arc::new(AtomicU8::new(LoopPhase::Warmup.as_u8())),
                events_tx,
                silence_frame,
            },
            events_rx,
        )
    }

    /// Current FSM phase, safe to poll from another task.
    pub fn phase(&self) -> LoopPhase {
        LoopPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, new_phase: LoopPhase) {
        if self.phase() != new_phase {
            self.phase.store(new_phase.as_u8(), Ordering::Release);
            let _ = self.events_tx.send(PlayoutEvent::PhaseChanged(new_phase));
        }
    }

    /// Drive the loop to completion, sending each emitted frame to
    /// `on_frame`. `completion_tx` is flipped to `true` exactly once, at
    /// whichever exit condition is hit first: natural completion,
    /// `should_stop`, or the sink closing.
    pub async fn run<F>(&self, completion_tx: watch::Sender<bool>, mut on_frame: F)
    where
        F: FnMut(Frame) -> bool,
    {
        let ptime_ms = self.playout_config.ptime_ms;
        let mut timestamp: u32 = 0;

        // Warmup: wait for the waterline, natural completion with data
        // already queued, or an early stop, polling every 100ms.
        loop {
            if self.state.stop_requested() {
                self.finish(completion_tx);
                return;
            }
            let depth = self.buffer.depth();
            if depth >= self.jitter_config.waterline_frames
                || (self.state.is_finished() && depth > 0)
                || self.buffer.is_closed()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.set_phase(LoopPhase::Emit);

        loop {
            let tick_start = Instant::now();

            if self.state.stop_requested() {
                self.finish(completion_tx);
                return;
            }

            // Rebuffer: back off in bounded steps if the buffer ran low and
            // the producer isn't done yet, then proceed regardless.
            if self.buffer.depth() < self.jitter_config.low_watermark_frames && !self.state.is_finished() {
                self.set_phase(LoopPhase::Rebuffer);
                for k in 0..5u32 {
                    if self.state.stop_requested() {
                        self.finish(completion_tx);
                        return;
                    }
                    if self.buffer.depth() >= self.jitter_config.low_watermark_frames || self.state.is_finished() {
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis((50 + 50 * k) as u64)).await;
                }
                self.set_phase(LoopPhase::Emit);
            }

            let Some(frame) = self.get_next_frame(&mut timestamp).await else {
                self.finish(completion_tx);
                return;
            };

            let _ = self.events_tx.send(PlayoutEvent::OutgoingAudioGenerated(frame.clone()));
            if !on_frame(frame) {
                debug!("playout loop stopping: frame sink closed");
                self.finish(completion_tx);
                return;
            }

            let depth = self.buffer.depth();
            let f = if depth == 0 {
                1.02
            } else if depth < self.jitter_config.low_watermark_frames {
                1.01
            } else if depth > self.jitter_config.waterline_frames {
                0.99
            } else {
                1.00
            };
            let d = ptime_ms as f64 * f;
            let smoothed = {
                let mut s = self.state.smoothed_delay_ms.lock().unwrap();
                *s = 0.3 * d + 0.7 * *s;
                s.clamp(0.95 * ptime_ms as f64, 1.05 * ptime_ms as f64)
            };

            let elapsed = tick_start.elapsed();
            let sleep_for = Duration::from_secs_f64(smoothed / 1000.0).saturating_sub(elapsed);
            if !sleep_for.is_zero() {
                tokio::time::sleep(sleep_for).await;
            }
        }
    }

    /// `get_next_frame` from spec §4.6: honors the half-duplex gate, the
    /// single-retry-then-repeat-last-frame underrun policy, and the
    /// completion condition. Returns `None` when the loop should exit.
    async fn get_next_frame(&self, timestamp: &mut u32) -> Option<Frame> {
        let frame = if self.state.gate_open() {
            match self.buffer.try_pop() {
                Some(frame) => {
                    *self.state.last_sent_frame.lock().unwrap() = Some(frame.clone());
                    self.state.empty_frame_count.store(0, Ordering::Release);
                    self.state.total_bytes_sent.fetch_add(frame.payload.len() as u64, Ordering::AcqRel);
                    frame
                }
                None => {
                    let depth = self.buffer.depth();
                    if self.state.is_complete(depth) {
                        return None;
                    }
                    self.state.empty_frame_count.fetch_add(1, Ordering::AcqRel);
                    let retry = if self.state.empty_frame_count.load(Ordering::Acquire) == 1 && !self.state.is_finished() {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                        self.buffer.try_pop()
                    } else {
                        None
                    };
                    match retry {
                        Some(frame) => {
                            *self.state.last_sent_frame.lock().unwrap() = Some(frame.clone());
                            self.state.empty_frame_count.store(0, Ordering::Release);
                            self.state.total_bytes_sent.fetch_add(frame.payload.len() as u64, Ordering::AcqRel);
                            frame
                        }
                        None => {
                            let _ = self.events_tx.send(PlayoutEvent::Underrun);
                            trace!("playout underrun at ts={timestamp}, substituting");
                            match self.state.last_sent_frame.lock().unwrap().clone() {
                                Some(last) => Frame::new(last.payload, &self.profile, *timestamp),
                                None => Frame::new(self.silence_frame.clone(), &self.profile, *timestamp),
                            }
                        }
                    }
                }
            }
        } else {
            Frame::new(self.silence_frame.clone(), &self.profile, *timestamp)
        };

        *timestamp = timestamp.wrapping_add(self.profile.samples_per_frame() as u32);
        Some(frame)
    }

    fn finish(&self, completion_tx: watch::Sender<bool>) {
        self.set_phase(LoopPhase::Shutdown);
        let _ = completion_tx.send(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_n_frames(buffer: &JitterBuffer, profile: &MediaProfile, n: usize) {
        for i in 0..n {
            let payload = bytes::Bytes::from(vec![0xFFu8; profile.frame_bytes_encoded()]);
            buffer
                .push(Frame::new(payload, profile, i as u32 * profile.samples_per_frame() as u32))
                .unwrap();
        }
    }

    #[tokio::test]
    async fn warmup_waits_for_waterline_then_emits() {
        let profile = MediaProfile::g711_mulaw();
        let buffer = Arc::new(JitterBuffer::new());
        let jitter_config = JitterBufferConfig {
            waterline_frames: 3,
            low_watermark_frames: 1,
        };
        push_n_frames(&buffer, &profile, 3);
        buffer.close();

        let state = Arc::new(PlayoutState::new(20));
        state.mark_finished();
        let (playout, _events) = PlayoutLoop::new(buffer, profile, jitter_config, PlayoutConfig::default(), state.clone());
        assert_eq!(playout.phase(), LoopPhase::Warmup);

        let emitted = Arc::new(Mutex::new(0usize));
        let emitted_clone = emitted.clone();
        let (tx, mut rx) = watch::channel(false);
        playout
            .run(tx, move |_frame| {
                *emitted_clone.lock().unwrap() += 1;
                true
            })
            .await;

        assert_eq!(*emitted.lock().unwrap(), 3);
        assert_eq!(playout.phase(), LoopPhase::Shutdown);
        assert!(*rx.borrow_and_update());
        assert_eq!(state.sent(), state.generated());
    }

    #[tokio::test]
    async fn underrun_repeats_last_frame_then_silence() {
        let profile = MediaProfile::g711_mulaw();
        let buffer = Arc::new(JitterBuffer::new());
        let jitter_config = JitterBufferConfig {
            waterline_frames: 1,
            low_watermark_frames: 1,
        };
        push_n_frames(&buffer, &profile, 1);
        // Left open: the loop must substitute rather than shut down once
        // that one frame is drained.

        let state = Arc::new(PlayoutState::new(20));
        state.add_generated(profile.frame_bytes_encoded() as u64);
        let (playout, mut events) =
            PlayoutLoop::new(buffer.clone(), profile, jitter_config, PlayoutConfig::default(), state);

        let count = Arc::new(Mutex::new(0usize));
        let count_clone = count.clone();
        let (tx, _rx) = watch::channel(false);
        let run = tokio::spawn(async move {
            playout
                .run(tx, move |_f| {
                    let mut c = count_clone.lock().unwrap();
                    *c += 1;
                    *c < 5
                })
                .await;
        });

        let mut saw_underrun = false;
        while let Some(event) = events.recv().await {
            if matches!(event, PlayoutEvent::Underrun) {
                saw_underrun = true;
                break;
            }
        }
        assert!(saw_underrun);
        run.abort();
    }

    #[tokio::test]
    async fn gate_closed_emits_silence_without_draining_buffer() {
        let profile = MediaProfile::g711_mulaw();
        let buffer = Arc::new(JitterBuffer::new());
        let jitter_config = JitterBufferConfig {
            waterline_frames: 1,
            low_watermark_frames: 1,
        };
        push_n_frames(&buffer, &profile, 5);
        buffer.close();

        let state = Arc::new(PlayoutState::new(20));
        state.set_gate(false);
        let (playout, _events) = PlayoutLoop::new(buffer.clone(), profile, jitter_config, PlayoutConfig::default(), state.clone());

        let (tx, _rx) = watch::channel(false);
        let run = tokio::spawn(async move {
            playout.run(tx, |_f| true).await;
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        run.abort();
        assert_eq!(buffer.depth(), 5, "gated loop must not drain the buffer");
        assert_eq!(state.sent(), 0);
    }
}
