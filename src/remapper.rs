//! Turns a frame into per-sensor values.
//!
//! Offsets in the [SensorTable] are checked against the frame length once,
//! when the [SensorRemapper] is built. After that every [SensorRemapper::remap()]
//! call only has to check that the frame has the length it was built for.

use crate::frame_assembler::Frame;
use crate::sensor_table::{SensorId, SensorTable, SensorTableError};

use std::{collections::BTreeMap, fmt, sync::Arc};

/// Number of trailing frame bytes holding accelerometer and gyroscope data.
pub const IMU_LEN: usize = 16;

/// Current value of every assigned sensor.
pub type SensorMap = BTreeMap<SensorId, u8>;

/// A frame did not have the length the remapper was validated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemapError {
    /// The frame is not `expected` bytes long.
    FrameLength {
        /// The validated frame length.
        expected: usize,
        /// The length of the frame that was passed in.
        actual: usize,
    },
}

impl fmt::Display for RemapError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RemapError::FrameLength { expected, actual } => {
                write!(f, "expected a {}-byte frame, got {} bytes", expected, actual)
            }
        }
    }
}

impl std::error::Error for RemapError {}

/// Summary of the sensors in one region for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionStats {
    /// Largest value in the region.
    pub max: u8,
    /// Smallest value in the region.
    pub min: u8,
    /// Average value in the region.
    pub mean: f64,
    /// Sensors whose value is above the activity threshold.
    pub active_count: usize,
    /// Sensors that contributed a value.
    pub sensor_count: usize,
}

/// Maps frames to [SensorMap]s using a shared [SensorTable].
#[derive(Debug, Clone)]
pub struct SensorRemapper {
    table: Arc<SensorTable>,
    frame_len: usize,
    activity_threshold: u8,
}

impl SensorRemapper {
    /// Validates `table` against `frame_len` and builds a remapper. Fails if
    /// any assigned offset falls outside the frame.
    pub fn new(table: Arc<SensorTable>, frame_len: usize) -> Result<Self, SensorTableError> {
        table.validate(frame_len)?;
        Ok(Self {
            table,
            frame_len,
            activity_threshold: 0,
        })
    }

    /// Sets the value a sensor must exceed to count as active.
    pub fn with_activity_threshold(mut self, threshold: u8) -> Self {
        self.activity_threshold = threshold;
        self
    }

    /// The table this remapper reads from.
    pub fn table(&self) -> &SensorTable {
        &self.table
    }

    /// The frame length every offset was validated against.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Reads every assigned sensor out of `frame`. Unassigned sensors are
    /// left out; sensors sharing an offset all get the same value.
    pub fn remap(&self, frame: &Frame) -> Result<SensorMap, RemapError> {
        let bytes = self.checked(frame)?;
        Ok(self
            .table
            .assigned()
            .filter_map(|s| s.index().map(|i| (s.id, bytes[i])))
            .collect())
    }

    /// Folds the values of `region` in `map` into a [RegionStats]. `None` if
    /// no sensor of the region is present in `map`.
    pub fn region_stats(&self, map: &SensorMap, region: &str) -> Option<RegionStats> {
        let values: Vec<u8> = self
            .table
            .sensors_in_region(region)
            .filter_map(|s| map.get(&s.id).copied())
            .collect();

        let max = *values.iter().max()?;
        let min = *values.iter().min()?;
        let sum: u64 = values.iter().map(|&v| v as u64).sum();

        Some(RegionStats {
            max,
            min,
            mean: sum as f64 / values.len() as f64,
            active_count: values
                .iter()
                .filter(|&&v| v > self.activity_threshold)
                .count(),
            sensor_count: values.len(),
        })
    }

    /// [SensorRemapper::region_stats()] for every region in the table.
    pub fn all_region_stats(&self, map: &SensorMap) -> BTreeMap<String, RegionStats> {
        self.table
            .regions()
            .into_iter()
            .filter_map(|r| self.region_stats(map, r).map(|s| (r.to_owned(), s)))
            .collect()
    }

    /// The accelerometer/gyroscope block at the end of the frame.
    pub fn imu_bytes<'a>(&self, frame: &'a Frame) -> Result<&'a [u8], RemapError> {
        let bytes = self.checked(frame)?;
        Ok(&bytes[bytes.len().saturating_sub(IMU_LEN)..])
    }

    fn checked<'a>(&self, frame: &'a Frame) -> Result<&'a [u8], RemapError> {
        if frame.len() != self.frame_len {
            return Err(RemapError::FrameLength {
                expected: self.frame_len,
                actual: frame.len(),
            });
        }
        Ok(frame.as_bytes())
    }
}
