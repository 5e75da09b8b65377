//! Pairs A and B packets into frames.
//!
//! The assembler is a two-state machine. It holds at most one A payload
//! while waiting for the B that completes it:
//!
//! | state   | on A                          | on B                       |
//! |---------|-------------------------------|----------------------------|
//! | `Empty` | keep A, go to `HaveA`         | drop orphan B              |
//! | `HaveA` | drop old A, keep new A        | emit `A ++ B`, go `Empty`  |
//!
//! So `(A1, A2, B)` yields exactly one frame, built from `A2`.

use crate::packet_scanner::{Packet, PacketKind};
use log::debug;

/// One A payload followed by one B payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    /// Joins the two halves of a frame.
    pub fn from_halves(a: &[u8], b: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(a.len() + b.len());
        bytes.extend_from_slice(a);
        bytes.extend_from_slice(b);
        Self { bytes }
    }

    /// The raw frame bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of bytes in the frame.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the frame holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<Vec<u8>> for Frame {
    fn from(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }
}

#[derive(Debug, Clone, Default)]
enum AssemblerState {
    #[default]
    Empty,
    HaveA(Vec<u8>),
}

/// Turns an ordered stream of [Packet]s into [Frame]s.
#[derive(Debug, Clone, Default)]
pub struct FrameAssembler {
    state: AssemblerState,
    frames_emitted: u64,
    dropped_a: u64,
    orphan_b: u64,
}

impl FrameAssembler {
    /// A new assembler with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet; returns a frame if this packet completed one.
    pub fn push(&mut self, packet: Packet) -> Option<Frame> {
        match (packet.kind, std::mem::take(&mut self.state)) {
            (PacketKind::A, AssemblerState::Empty) => {
                self.state = AssemblerState::HaveA(packet.payload);
                None
            }
            (PacketKind::A, AssemblerState::HaveA(_)) => {
                self.dropped_a += 1;
                debug!("A packet replaced before its B arrived");
                self.state = AssemblerState::HaveA(packet.payload);
                None
            }
            (PacketKind::B, AssemblerState::HaveA(a)) => {
                self.frames_emitted += 1;
                Some(Frame::from_halves(&a, &packet.payload))
            }
            (PacketKind::B, AssemblerState::Empty) => {
                self.orphan_b += 1;
                debug!("Dropped B packet with no A before it");
                None
            }
        }
    }

    /// Feeds a batch of packets in order and collects the completed frames.
    pub fn assemble(&mut self, packets: impl IntoIterator<Item = Packet>) -> Vec<Frame> {
        packets.into_iter().filter_map(|p| self.push(p)).collect()
    }

    /// Whether an A payload is waiting for its B.
    pub fn has_pending(&self) -> bool {
        matches!(self.state, AssemblerState::HaveA(_))
    }

    /// Frames emitted since creation.
    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    /// A payloads replaced by a newer A before completion.
    pub fn dropped_a(&self) -> u64 {
        self.dropped_a
    }

    /// B payloads that arrived with no A pending.
    pub fn orphan_b(&self) -> u64 {
        self.orphan_b
    }

    /// All packets thrown away by the assembler.
    pub fn dropped(&self) -> u64 {
        self.dropped_a + self.orphan_b
    }
}
