//! Carves packets out of the raw byte stream coming from the glove.
//!
//! On the wire every packet looks like this:
//!
//! ```text
//! | marker (4) | discriminator (1) | sensor type (1) | payload (L_A or L_B) |
//! ```
//!
//! The scanner is a best-effort resynchronizing parser. Garbage before a
//! marker is thrown away, an unknown discriminator skips a single byte, and a
//! packet whose payload has not fully arrived yet is kept for the next call.

use crate::config::{ConfigError, GloveConfig, PacketLayout, HEADER_LEN, MARKER_LEN};
use log::debug;

/// Which half of a frame a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// The first half of a frame.
    A,
    /// The second half of a frame.
    B,
}

/// A single packet pulled out of the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Which half of a frame this is.
    pub kind: PacketKind,
    /// The byte after the discriminator. Carried along, never interpreted.
    pub sensor_type: u8,
    /// Exactly `payload_len` bytes for this kind.
    pub payload: Vec<u8>,
}

/// Why the scanner stepped over part of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A marker was followed by a discriminator we do not know.
    UnknownDiscriminator(u8),
}

/// Result of one attempt to pull a packet from the front of the buffer.
///
/// None of these is an error the caller has to handle: a [ScanStep::Skip]
/// just means scanning resumes further along.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// A complete packet was removed from the buffer.
    Packet(Packet),
    /// Part of the buffer was stepped over; scan again.
    Skip(SkipReason),
    /// The buffer does not hold a complete packet yet.
    NeedMore,
}

/// Owns the receive buffer and turns chunks of bytes into [Packet]s.
#[derive(Debug, Clone)]
pub struct PacketScanner {
    marker: [u8; MARKER_LEN],
    packet_a: PacketLayout,
    packet_b: PacketLayout,
    retain_len: usize,
    buffer: Vec<u8>,
    bytes_discarded: u64,
    unknown_discriminators: u64,
    packets: u64,
}

impl PacketScanner {
    /// Builds a scanner for the packet layout described by `config`.
    pub fn new(config: &GloveConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            marker: config.marker,
            packet_a: config.packet_a,
            packet_b: config.packet_b,
            retain_len: config.max_packet_len(),
            buffer: Vec::with_capacity(config.read_chunk_size + config.max_packet_len()),
            bytes_discarded: 0,
            unknown_discriminators: 0,
            packets: 0,
        })
    }

    /// Appends `chunk` to the buffer and returns every complete packet now
    /// available, in arrival order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Packet> {
        self.buffer.extend_from_slice(chunk);

        let mut packets = Vec::new();
        loop {
            match self.scan_step() {
                ScanStep::Packet(packet) => packets.push(packet),
                ScanStep::Skip(reason) => debug!("Scanner skipped a byte: {:?}", reason),
                ScanStep::NeedMore => break,
            }
        }
        packets
    }

    /// Tries to remove one packet from the front of the buffer.
    pub fn scan_step(&mut self) -> ScanStep {
        let Some(pos) = self.find_marker() else {
            self.trim_unmatched();
            return ScanStep::NeedMore;
        };

        if pos > 0 {
            self.discard_front(pos);
        }

        if self.buffer.len() < HEADER_LEN {
            return ScanStep::NeedMore;
        }

        let discriminator = self.buffer[MARKER_LEN];
        let Some((kind, payload_len)) = self.lookup(discriminator) else {
            self.unknown_discriminators += 1;
            self.discard_front(1);
            return ScanStep::Skip(SkipReason::UnknownDiscriminator(discriminator));
        };

        let packet_len = HEADER_LEN + payload_len;
        if self.buffer.len() < packet_len {
            return ScanStep::NeedMore;
        }

        let sensor_type = self.buffer[MARKER_LEN + 1];
        let payload = self.buffer[HEADER_LEN..packet_len].to_vec();
        self.buffer.drain(..packet_len);
        self.packets += 1;

        ScanStep::Packet(Packet {
            kind,
            sensor_type,
            payload,
        })
    }

    fn lookup(&self, discriminator: u8) -> Option<(PacketKind, usize)> {
        if discriminator == self.packet_a.discriminator {
            Some((PacketKind::A, self.packet_a.payload_len))
        } else if discriminator == self.packet_b.discriminator {
            Some((PacketKind::B, self.packet_b.payload_len))
        } else {
            None
        }
    }

    fn find_marker(&self) -> Option<usize> {
        self.buffer
            .windows(MARKER_LEN)
            .position(|window| window == self.marker)
    }

    // With no marker in sight, the tail may still hold the start of one. Keep
    // a whole packet's worth so nothing that could belong to a packet is lost.
    fn trim_unmatched(&mut self) {
        if self.buffer.len() > self.retain_len {
            let excess = self.buffer.len() - self.retain_len;
            self.discard_front(excess);
        }
    }

    fn discard_front(&mut self, n: usize) {
        self.buffer.drain(..n);
        self.bytes_discarded += n as u64;
    }

    /// Bytes currently held for the next call.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Total bytes thrown away while resynchronizing.
    pub fn bytes_discarded(&self) -> u64 {
        self.bytes_discarded
    }

    /// Markers that were followed by an unrecognized discriminator.
    pub fn unknown_discriminators(&self) -> u64 {
        self.unknown_discriminators
    }

    /// Packets emitted since creation.
    pub fn packets(&self) -> u64 {
        self.packets
    }
}

/// Encodes a packet the way the glove puts it on the wire. Used by tests and
/// by anything that needs to replay captured payloads.
pub fn encode_packet(
    marker: &[u8; MARKER_LEN],
    discriminator: u8,
    sensor_type: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(marker);
    out.push(discriminator);
    out.push(sensor_type);
    out.extend_from_slice(payload);
    out
}
