//! Audio bridge (C8).
//!
//! The seam between this crate and the RTP/SIP stack, which is treated as an
//! external black box throughout this pipeline (no `rtp-core` dependency is
//! carried here — see DESIGN.md). [`RtpPacket`] is a minimal, self-contained
//! stand-in for whatever packet type the real transport hands over; adapting
//! from the actual transport's packet type to this one is the integration
//! point a caller outside this crate owns.
//!
//! Unlike the two-leg relay pattern this codebase uses elsewhere (forwarding
//! RTP between two call legs untouched), the audio bridge here is one-leg:
//! it decodes inbound G.711 to PCM and fans it out to the VAD/auto-responder
//! and the recording tap, and it accepts outbound encoded [`Frame`]s from the
//! playout loop and re-wraps them as outbound RTP packets with a
//! monotonically advancing sequence number and SSRC.

use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::mpsc;
use tracing::warn;

use crate::codec::{decode_alaw, decode_mulaw};
use crate::types::{payload_types, Frame, MediaProfile, PayloadType};

/// A minimal RTP packet representation local to this crate. Real transport
/// packets carry far more (extensions, padding, CSRC list); this crate only
/// ever needs the fields the playout/recording paths touch.
#[derive(Debug, Clone)]
pub struct RtpPacket {
    pub payload: bytes::Bytes,
    pub payload_type: PayloadType,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

/// One tap of inbound, decoded PCM — handed to the VAD/auto-responder and,
/// independently, to the recording pipeline.
#[derive(Debug, Clone)]
pub struct InboundPcm {
    /// 16-bit little-endian PCM.
    pub pcm: Vec<u8>,
    pub timestamp: u32,
}

/// Bridges one call leg's RTP stream to/from this crate's PCM-oriented pipeline.
pub struct AudioBridge {
    profile: MediaProfile,
    ssrc: u32,
    next_sequence: AtomicU16,
    inbound_tap_tx: mpsc::UnboundedSender<InboundPcm>,
    outbound_tx: mpsc::UnboundedSender<RtpPacket>,
}

impl AudioBridge {
    /// Construct a bridge for `profile`, sending decoded inbound PCM to
    /// `inbound_tap_tx` and encoded outbound RTP to `outbound_tx`.
    pub fn new(
        profile: MediaProfile,
        ssrc: u32,
        inbound_tap_tx: mpsc::UnboundedSender<InboundPcm>,
        outbound_tx: mpsc::UnboundedSender<RtpPacket>,
    ) -> Self {
        Self {
            profile,
            ssrc,
            next_sequence: AtomicU16::new(0),
            inbound_tap_tx,
            outbound_tx,
        }
    }

    /// Handle one inbound RTP packet: decode its G.711 payload to PCM and
    /// forward it to the inbound tap. Packets with an unrecognized payload
    /// type (e.g. DTMF telephone-events) are passed through untouched to the
    /// tap's timestamp bookkeeping but produce no PCM.
    pub fn on_inbound(&self, packet: &RtpPacket) {
        let pcm = match packet.payload_type {
            payload_types::PCMU => decode_mulaw(&packet.payload),
            payload_types::PCMA => decode_alaw(&packet.payload),
            payload_types::TELEPHONE_EVENT => return,
            other => {
                warn!("audio bridge: unrecognized inbound payload type {other}, dropping");
                return;
            }
        };

        let _ = self.inbound_tap_tx.send(InboundPcm {
            pcm,
            timestamp: packet.timestamp,
        });
    }

    /// Hand one outbound, already-encoded [`Frame`] (from the playout loop)
    /// to the RTP transport, wrapping it with this bridge's SSRC and the
    /// next sequence number.
    pub fn send_outbound(&self, frame: Frame) -> bool {
        let sequence_number = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let packet = RtpPacket {
            payload: frame.payload,
            payload_type: frame.payload_type,
            sequence_number,
            timestamp: frame.timestamp,
            ssrc: self.ssrc,
        };
        self.outbound_tx.send(packet).is_ok()
    }

    /// The negotiated media profile this bridge was constructed for.
    pub fn profile(&self) -> &MediaProfile {
        &self.profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_mulaw;

    #[tokio::test]
    async fn inbound_pcmu_packet_decodes_to_pcm() {
        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let bridge = AudioBridge::new(MediaProfile::g711_mulaw(), 0xDEADBEEF, tap_tx, out_tx);

        let pcm: Vec<i16> = (0..160).collect();
        let mut pcm_bytes = Vec::new();
        for s in &pcm {
            pcm_bytes.extend_from_slice(&s.to_le_bytes());
        }
        let encoded = encode_mulaw(&pcm_bytes).unwrap();

        bridge.on_inbound(&RtpPacket {
            payload: bytes::Bytes::from(encoded),
            payload_type: payload_types::PCMU,
            sequence_number: 1,
            timestamp: 0,
            ssrc: 1,
        });

        let tapped = tap_rx.recv().await.unwrap();
        assert_eq!(tapped.pcm.len(), 320);
    }

    #[tokio::test]
    async fn outbound_frames_get_sequential_numbers_and_bridge_ssrc() {
        let (tap_tx, _tap_rx) = mpsc::unbounded_channel();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let profile = MediaProfile::g711_mulaw();
        let bridge = AudioBridge::new(profile, 42, tap_tx, out_tx);

        for ts in [0u32, 160, 320] {
            let frame = Frame::new(bytes::Bytes::from(vec![0xFFu8; 160]), &profile, ts);
            assert!(bridge.send_outbound(frame));
        }

        let p0 = out_rx.recv().await.unwrap();
        let p1 = out_rx.recv().await.unwrap();
        let p2 = out_rx.recv().await.unwrap();
        assert_eq!([p0.sequence_number, p1.sequence_number, p2.sequence_number], [0, 1, 2]);
        assert!([p0.ssrc, p1.ssrc, p2.ssrc].iter().all(|&s| s == 42));
    }

    #[tokio::test]
    async fn telephone_event_is_ignored_not_decoded() {
        let (tap_tx, mut tap_rx) = mpsc::unbounded_channel();
        let (out_tx, _out_rx) = mpsc::unbounded_channel();
        let bridge = AudioBridge::new(MediaProfile::g711_mulaw(), 1, tap_tx, out_tx);

        bridge.on_inbound(&RtpPacket {
            payload: bytes::Bytes::from(vec![0u8; 4]),
            payload_type: payload_types::TELEPHONE_EVENT,
            sequence_number: 1,
            timestamp: 0,
            ssrc: 1,
        });

        assert!(tap_rx.try_recv().is_err());
    }
}
