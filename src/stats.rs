//! Counters for everything the pipeline drops or delivers.
//!
//! The acquisition thread publishes into a shared [PipelineStats]; anyone
//! holding the `Arc` can take a [StatsSnapshot] at any time.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// Live counters, written by the acquisition thread.
#[derive(Debug)]
pub struct PipelineStats {
    started: Instant,
    bytes_read: AtomicU64,
    bytes_discarded: AtomicU64,
    unknown_discriminators: AtomicU64,
    packets: AtomicU64,
    frames: AtomicU64,
    dropped_a: AtomicU64,
    orphan_b: AtomicU64,
    remap_errors: AtomicU64,
    queue_drops: AtomicU64,
    queue_depth: AtomicU64,
}

/// A consistent-enough copy of [PipelineStats] at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatsSnapshot {
    /// Time since the stats were created.
    pub elapsed: Duration,
    /// Bytes received from the transport.
    pub bytes_read: u64,
    /// Bytes thrown away while resynchronizing.
    pub bytes_discarded: u64,
    /// Markers followed by an unknown discriminator.
    pub unknown_discriminators: u64,
    /// Packets pulled from the stream.
    pub packets: u64,
    /// Frames assembled and remapped.
    pub frames: u64,
    /// A packets replaced before their B arrived.
    pub dropped_a: u64,
    /// B packets with no A before them.
    pub orphan_b: u64,
    /// Frames the remapper refused.
    pub remap_errors: u64,
    /// Samples lost to a full queue.
    pub queue_drops: u64,
    /// Samples waiting in the queue.
    pub queue_depth: u64,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            started: Instant::now(),
            bytes_read: AtomicU64::new(0),
            bytes_discarded: AtomicU64::new(0),
            unknown_discriminators: AtomicU64::new(0),
            packets: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            dropped_a: AtomicU64::new(0),
            orphan_b: AtomicU64::new(0),
            remap_errors: AtomicU64::new(0),
            queue_drops: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
        }
    }
}

impl PipelineStats {
    /// Zeroed counters, with the clock starting now.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite every counter with the totals in `snapshot`. Only the
    /// producer calls this, so plain stores are enough.
    pub fn publish(&self, snapshot: &StatsSnapshot) {
        let store = |counter: &AtomicU64, value: u64| counter.store(value, Ordering::Relaxed);
        store(&self.bytes_read, snapshot.bytes_read);
        store(&self.bytes_discarded, snapshot.bytes_discarded);
        store(&self.unknown_discriminators, snapshot.unknown_discriminators);
        store(&self.packets, snapshot.packets);
        store(&self.frames, snapshot.frames);
        store(&self.dropped_a, snapshot.dropped_a);
        store(&self.orphan_b, snapshot.orphan_b);
        store(&self.remap_errors, snapshot.remap_errors);
        store(&self.queue_drops, snapshot.queue_drops);
        store(&self.queue_depth, snapshot.queue_depth);
    }

    /// Copy every counter out.
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        StatsSnapshot {
            elapsed: self.started.elapsed(),
            bytes_read: load(&self.bytes_read),
            bytes_discarded: load(&self.bytes_discarded),
            unknown_discriminators: load(&self.unknown_discriminators),
            packets: load(&self.packets),
            frames: load(&self.frames),
            dropped_a: load(&self.dropped_a),
            orphan_b: load(&self.orphan_b),
            remap_errors: load(&self.remap_errors),
            queue_drops: load(&self.queue_drops),
            queue_depth: load(&self.queue_depth),
        }
    }
}

impl StatsSnapshot {
    /// Frames per second since the stats were created.
    pub fn frame_rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.frames as f64 / secs
        } else {
            0.0
        }
    }

    /// Packets lost by the frame assembler.
    pub fn packet_drops(&self) -> u64 {
        self.dropped_a + self.orphan_b
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "frames: {} ({:.1} Hz) | packets: {} | dropped packets: {} | queue: {} (dropped {}) | skipped bytes: {}",
            self.frames,
            self.frame_rate(),
            self.packets,
            self.packet_drops(),
            self.queue_depth,
            self.queue_drops,
            self.bytes_discarded,
        )
    }
}
