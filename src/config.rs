//! Typed configuration for the capture pipeline.
//!
//! A [GloveConfig] is read once at startup, either from a [ron] file or from
//! [GloveConfig::default()], which matches the documented glove protocol.
//! In a file it looks like this (every field may be omitted):
//!
//! ```text
//! (
//!     marker: (0xAA, 0x55, 0x03, 0x99),
//!     packet_a: (discriminator: 0x01, payload_len: 128),
//!     packet_b: (discriminator: 0x02, payload_len: 144),
//!     queue_capacity: 1000,
//!     backpressure: DropOldest,
//! )
//! ```

use serde::{Deserialize, Serialize};
use std::{borrow::Cow, fmt, fs, io, path::Path, time::Duration};

/// Length of the synchronization marker in bytes.
pub const MARKER_LEN: usize = 4;

/// Marker, discriminator and sensor-type tag.
pub const HEADER_LEN: usize = MARKER_LEN + 2;

/// Largest accepted [GloveConfig::queue_capacity].
pub const MAX_QUEUE_CAPACITY: usize = 1_000_000;

/// Largest accepted [GloveConfig::read_chunk_size], 1 MiB.
pub const MAX_READ_CHUNK: usize = 1 << 20;

/// Largest accepted payload length for either packet kind.
pub const MAX_PAYLOAD_LEN: usize = 1 << 16;

/// Which side of a [crate::frame_queue::FrameQueue] gives way when it is full.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// Evict the oldest queued item to make room for the new one.
    #[default]
    DropOldest,
    /// Reject the new item and keep the queue as it is.
    DropNewest,
}

/// The discriminator byte of a packet kind and the payload length it implies.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct PacketLayout {
    /// Byte following the marker that identifies this packet kind.
    pub discriminator: u8,
    /// Number of payload bytes after the header.
    pub payload_len: usize,
}

/// Everything the pipeline needs to know, validated once by
/// [GloveConfig::validate()].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct GloveConfig {
    /// Synchronization marker preceding every packet.
    pub marker: [u8; MARKER_LEN],
    /// First half of a frame.
    pub packet_a: PacketLayout,
    /// Second half of a frame.
    pub packet_b: PacketLayout,
    /// Maximum number of sensor samples waiting for a consumer.
    pub queue_capacity: usize,
    /// What to do when the queue is full.
    pub backpressure: BackpressurePolicy,
    /// A sensor counts as active when its value is strictly above this.
    pub activity_threshold: u8,
    /// Serial line speed.
    pub baud_rate: u32,
    /// How long a single transport read may block.
    pub read_timeout_ms: u64,
    /// Size of the buffer handed to each transport read.
    pub read_chunk_size: usize,
}

impl Default for GloveConfig {
    fn default() -> Self {
        Self {
            marker: [0xAA, 0x55, 0x03, 0x99],
            packet_a: PacketLayout {
                discriminator: 0x01,
                payload_len: 128,
            },
            packet_b: PacketLayout {
                discriminator: 0x02,
                payload_len: 144,
            },
            queue_capacity: 1000,
            backpressure: BackpressurePolicy::DropOldest,
            activity_threshold: 0,
            baud_rate: 921_600,
            read_timeout_ms: 100,
            read_chunk_size: 4096,
        }
    }
}

/// Errors raised while loading or validating a [GloveConfig]. All of them
/// are fatal: the pipeline refuses to start.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    IoError(io::Error),

    /// The config file is not valid RON.
    RonSpannedError(ron::de::SpannedError),

    /// Both packet kinds use the same discriminator byte.
    DuplicateDiscriminator(u8),

    /// A packet kind has an empty payload.
    EmptyPayload(u8),

    /// A packet kind's payload is longer than [MAX_PAYLOAD_LEN].
    PayloadTooLarge(u8),

    /// The queue cannot hold a single item.
    ZeroQueueCapacity,

    /// The queue capacity is above [MAX_QUEUE_CAPACITY].
    QueueCapacityTooLarge(usize),

    /// Transport reads would never return any bytes.
    ZeroReadChunk,

    /// The read chunk size is above [MAX_READ_CHUNK].
    ReadChunkTooLarge(usize),

    /// Reads would never time out, so a stop request could hang forever.
    ZeroReadTimeout,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("ron error: {}", error)),
            CE::DuplicateDiscriminator(d) => {
                Cow::from(format!("both packet kinds use discriminator {:#04x}", d))
            }
            CE::EmptyPayload(d) => {
                Cow::from(format!("packet {:#04x} has a zero payload length", d))
            }
            CE::PayloadTooLarge(d) => Cow::from(format!(
                "packet {:#04x} payload is longer than {} bytes",
                d, MAX_PAYLOAD_LEN
            )),
            CE::ZeroQueueCapacity => Cow::from("queue capacity must be at least 1"),
            CE::QueueCapacityTooLarge(n) => Cow::from(format!(
                "queue capacity {} is above the limit of {}",
                n, MAX_QUEUE_CAPACITY
            )),
            CE::ZeroReadChunk => Cow::from("read chunk size must be at least 1"),
            CE::ReadChunkTooLarge(n) => Cow::from(format!(
                "read chunk size {} is above the limit of {}",
                n, MAX_READ_CHUNK
            )),
            CE::ZeroReadTimeout => Cow::from("read timeout must be at least 1 ms"),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

impl From<ron::de::SpannedError> for ConfigError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::RonSpannedError(value)
    }
}

impl GloveConfig {
    /// Read and validate a config from a RON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        text.parse()
    }

    /// Checks every invariant the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.packet_a.discriminator == self.packet_b.discriminator {
            return Err(ConfigError::DuplicateDiscriminator(
                self.packet_a.discriminator,
            ));
        }
        for layout in [self.packet_a, self.packet_b] {
            if layout.payload_len == 0 {
                return Err(ConfigError::EmptyPayload(layout.discriminator));
            }
            if layout.payload_len > MAX_PAYLOAD_LEN {
                return Err(ConfigError::PayloadTooLarge(layout.discriminator));
            }
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::ZeroQueueCapacity);
        }
        if self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(ConfigError::QueueCapacityTooLarge(self.queue_capacity));
        }
        if self.read_chunk_size == 0 {
            return Err(ConfigError::ZeroReadChunk);
        }
        if self.read_chunk_size > MAX_READ_CHUNK {
            return Err(ConfigError::ReadChunkTooLarge(self.read_chunk_size));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ZeroReadTimeout);
        }
        Ok(())
    }

    /// Length of an assembled frame, `L_A + L_B`.
    pub fn frame_len(&self) -> usize {
        self.packet_a.payload_len + self.packet_b.payload_len
    }

    /// Length of the longest packet on the wire, header included.
    pub fn max_packet_len(&self) -> usize {
        HEADER_LEN + self.packet_a.payload_len.max(self.packet_b.payload_len)
    }

    /// [GloveConfig::read_timeout_ms] as a [Duration].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Serialize to pretty RON, the same format [GloveConfig::from_path()]
    /// accepts.
    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

impl std::str::FromStr for GloveConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: GloveConfig = ron::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
