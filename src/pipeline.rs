//! Scanner, assembler and remapper chained together.
//!
//! [GlovePipeline] is plain single-threaded code: bytes go in, [SensorSample]s
//! come out. The acquisition thread drives one, and so can tests or a replay
//! of a captured byte dump.

use crate::config::{ConfigError, GloveConfig};
use crate::frame_assembler::FrameAssembler;
use crate::packet_scanner::PacketScanner;
use crate::remapper::{SensorMap, SensorRemapper};
use crate::sensor_table::{SensorTable, SensorTableError};
use crate::stats::StatsSnapshot;

use log::warn;
use std::{error::Error, fmt, sync::Arc, time::SystemTime};

/// One remapped frame, stamped on arrival.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    /// Position of this frame in the capture, starting at 0.
    pub frame_number: u64,
    /// When the frame was completed.
    pub timestamp: SystemTime,
    /// Value of every assigned sensor.
    pub values: SensorMap,
}

/// Anything that stops a pipeline from being built.
#[derive(Debug)]
pub enum PipelineError {
    /// The packet layout or queue settings are invalid.
    Config(ConfigError),
    /// The sensor table does not fit the frame layout.
    SensorTable(SensorTableError),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::Config(e) => write!(f, "config error: {}", e),
            PipelineError::SensorTable(e) => write!(f, "sensor table error: {}", e),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Config(e) => Some(e),
            PipelineError::SensorTable(e) => Some(e),
        }
    }
}

impl From<ConfigError> for PipelineError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<SensorTableError> for PipelineError {
    fn from(value: SensorTableError) -> Self {
        Self::SensorTable(value)
    }
}

/// The byte-to-sample chain, with its counters.
#[derive(Debug, Clone)]
pub struct GlovePipeline {
    scanner: PacketScanner,
    assembler: FrameAssembler,
    remapper: SensorRemapper,
    bytes_read: u64,
    remap_errors: u64,
    next_frame: u64,
}

impl GlovePipeline {
    /// Validates `config` and `table` together and builds the chain.
    pub fn new(config: &GloveConfig, table: Arc<SensorTable>) -> Result<Self, PipelineError> {
        let scanner = PacketScanner::new(config)?;
        let remapper = SensorRemapper::new(table, config.frame_len())?
            .with_activity_threshold(config.activity_threshold);

        Ok(Self {
            scanner,
            assembler: FrameAssembler::new(),
            remapper,
            bytes_read: 0,
            remap_errors: 0,
            next_frame: 0,
        })
    }

    /// Push a chunk of received bytes through and collect the finished samples.
    pub fn process(&mut self, chunk: &[u8]) -> Vec<SensorSample> {
        self.bytes_read += chunk.len() as u64;

        let packets = self.scanner.feed(chunk);
        let frames = self.assembler.assemble(packets);

        let mut samples = Vec::with_capacity(frames.len());
        for frame in frames {
            match self.remapper.remap(&frame) {
                Ok(values) => {
                    samples.push(SensorSample {
                        frame_number: self.next_frame,
                        timestamp: SystemTime::now(),
                        values,
                    });
                    self.next_frame += 1;
                }
                Err(e) => {
                    self.remap_errors += 1;
                    warn!("Dropping frame: {}", e);
                }
            }
        }
        samples
    }

    /// The remapper, for region statistics on delivered samples.
    pub fn remapper(&self) -> &SensorRemapper {
        &self.remapper
    }

    /// Totals for everything this pipeline has seen. Queue fields are left
    /// at zero; the queue owner fills them in.
    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            bytes_read: self.bytes_read,
            bytes_discarded: self.scanner.bytes_discarded(),
            unknown_discriminators: self.scanner.unknown_discriminators(),
            packets: self.scanner.packets(),
            frames: self.next_frame,
            dropped_a: self.assembler.dropped_a(),
            orphan_b: self.assembler.orphan_b(),
            remap_errors: self.remap_errors,
            ..StatsSnapshot::default()
        }
    }
}
