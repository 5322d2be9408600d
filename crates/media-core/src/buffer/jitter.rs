//! Jitter buffer (C4): an unbounded FIFO of encoded [`Frame`]s sitting between
//! the TTS framer (C6) and the playout loop (C5).
//!
//! Unlike the RTP-receive jitter buffers elsewhere in this codebase — which
//! reorder packets by RTP sequence number and adapt a playout delay from
//! measured network jitter — this buffer serves a single writer (the framer)
//! and a single reader (the playout loop) over frames that are already in
//! produced order. There is nothing to reorder; the only job is to decouple
//! the framer's production rate from the playout loop's paced consumption
//! rate, and to let the playout loop observe queue depth without blocking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::types::Frame;

struct Inner {
    frames: VecDeque<Frame>,
    closed: bool,
}

/// A FIFO of [`Frame`]s shared between one writer and one reader.
///
/// `depth()` is lock-free (an `AtomicUsize` kept in step with the queue) so
/// the playout loop can poll it every tick to decide whether to stay in
/// `Warmup`, continue `Emit`, or drop into `Rebuffer` without contending with
/// the writer.
pub struct JitterBuffer {
    inner: Mutex<Inner>,
    depth: AtomicUsize,
    notify: Notify,
}

impl JitterBuffer {
    /// Create an empty, open jitter buffer.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                frames: VecDeque::new(),
                closed: false,
            }),
            depth: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    /// Push a frame onto the back of the queue.
    ///
    /// Returns [`Error::WriteToClosedBuffer`] if `close()` was already called;
    /// the framer should treat that as "the reader went away, stop producing".
    pub fn push(&self, frame: Frame) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(Error::WriteToClosedBuffer);
        }
        inner.frames.push_back(frame);
        self.depth.store(inner.frames.len(), Ordering::Release);
        drop(inner);
        self.notify.notify_one();
        Ok(())
    }

    /// Pop the oldest frame, waiting for one to arrive if the queue is empty
    /// and not yet closed. Returns `None` once the buffer is closed and
    /// drained — the end-of-stream signal the playout loop watches for.
    pub async fn pop(&self) -> Option<Frame> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(frame) = inner.frames.pop_front() {
                    self.depth.store(inner.frames.len(), Ordering::Release);
                    return Some(frame);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Pop the oldest frame without waiting; `None` means "empty right now",
    /// which the caller must distinguish from end-of-stream via [`Self::is_closed`].
    pub fn try_pop(&self) -> Option<Frame> {
        let mut inner = self.inner.lock().unwrap();
        let frame = inner.frames.pop_front();
        self.depth.store(inner.frames.len(), Ordering::Release);
        frame
    }

    /// Current queue depth, in frames. Lock-free; safe to poll frequently.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }

    /// Mark the buffer closed: no further pushes will be accepted, and once
    /// drained, `pop()` resolves to `None` rather than waiting forever.
    pub fn close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Whether the writer side has closed this buffer.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

impl Default for JitterBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MediaProfile;
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame(ts: u32) -> Frame {
        let profile = MediaProfile::g711_mulaw();
        Frame::new(Bytes::from(vec![0u8; 160]), &profile, ts)
    }

    #[tokio::test]
    async fn push_then_pop_preserves_order() {
        let buf = JitterBuffer::new();
        buf.push(frame(0)).unwrap();
        buf.push(frame(160)).unwrap();
        assert_eq!(buf.depth(), 2);

        let first = buf.pop().await.unwrap();
        assert_eq!(first.timestamp, 0);
        assert_eq!(buf.depth(), 1);

        let second = buf.pop().await.unwrap();
        assert_eq!(second.timestamp, 160);
        assert_eq!(buf.depth(), 0);
    }

    #[tokio::test]
    async fn pop_waits_for_a_push() {
        let buf = Arc::new(JitterBuffer::new());
        let reader = {
            let buf = buf.clone();
            tokio::spawn(async move { buf.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        buf.push(frame(0)).unwrap();

        let got = reader.await.unwrap();
        assert!(got.is_some());
    }

    #[tokio::test]
    async fn close_then_drain_yields_none() {
        let buf = JitterBuffer::new();
        buf.push(frame(0)).unwrap();
        buf.close();

        assert!(buf.pop().await.is_some());
        assert!(buf.pop().await.is_none());
    }

    #[test]
    fn push_after_close_is_rejected() {
        let buf = JitterBuffer::new();
        buf.close();
        assert!(matches!(buf.push(frame(0)), Err(Error::WriteToClosedBuffer)));
    }
}
