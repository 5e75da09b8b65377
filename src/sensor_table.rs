//! The static table describing where each glove sensor lives in a frame.
//!
//! The table comes from the hardware documentation as a CSV file:
//!
//! ```text
//! sensor_id,x_mm,y_mm,region,data_frame_index
//! 1,12.5,140.0,thumb_tip,19
//! 7,,,palm,-1
//! ```
//!
//! `data_frame_index` is 1-based, as printed in the documentation. `-1`
//! marks a sensor with no channel of its own. Several sensors may share an
//! index when the hardware multiplexes them onto one channel.
//!
//! A [SensorTable] is loaded once and never changes afterwards, so it is
//! handed around behind an `Arc` without any locking.

use nom::{
    branch::alt,
    bytes::complete::take_while,
    character::complete::{char, i32, u16},
    combinator::{all_consuming, eof, map},
    multi::separated_list1,
    number::complete::double,
    sequence::delimited,
    Finish, IResult,
};

use std::{
    borrow::Cow,
    collections::{BTreeMap, BTreeSet},
    fmt, fs, io,
    path::Path,
    str::FromStr,
};

/// Identifier of a physical sensor on the glove.
pub type SensorId = u16;

/// CSV marker for a sensor without a channel.
pub const UNASSIGNED: i32 = -1;

/// Where a sensor sits on the glove, in millimetres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Horizontal position.
    pub x_mm: f64,
    /// Vertical position.
    pub y_mm: f64,
}

/// One row of the sensor table.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorDescriptor {
    /// The sensor's identifier.
    pub id: SensorId,
    /// 1-based byte offset within a frame, `None` when unassigned.
    pub offset: Option<u16>,
    /// The region of the hand this sensor belongs to, e.g. `thumb_tip`.
    pub region: String,
    /// Physical position, when the documentation gives one.
    pub position: Option<Position>,
}

impl SensorDescriptor {
    /// 0-based index into a frame, `None` when unassigned.
    pub fn index(&self) -> Option<usize> {
        self.offset.and_then(|o| (o as usize).checked_sub(1))
    }
}

/// Errors raised while loading or validating a [SensorTable]. They are
/// configuration errors and stop the program from starting.
#[derive(Debug)]
pub enum SensorTableError {
    /// Reading the table file failed.
    IoError(io::Error),

    /// The input has no header line.
    MissingHeader,

    /// The header lacks a required column.
    MissingColumn(&'static str),

    /// A line could not be parsed.
    Parse {
        /// 1-based line number in the input.
        line: usize,
        /// What went wrong.
        message: String,
    },

    /// An offset that is neither a valid 1-based index nor [UNASSIGNED].
    InvalidOffset {
        /// The offending sensor.
        sensor: SensorId,
        /// The value found in the table.
        offset: i32,
    },

    /// The same sensor id appears twice.
    DuplicateSensor(SensorId),

    /// An offset points past the end of the frame.
    OffsetOutOfBounds {
        /// The offending sensor.
        sensor: SensorId,
        /// Its 1-based offset.
        offset: u16,
        /// The frame length it was checked against.
        frame_len: usize,
    },
}

impl fmt::Display for SensorTableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use SensorTableError as STE;
        let msg = match self {
            STE::IoError(error) => Cow::from(format!("io error: {}", error)),
            STE::MissingHeader => Cow::from("sensor table has no header line"),
            STE::MissingColumn(name) => Cow::from(format!("sensor table has no `{}` column", name)),
            STE::Parse { line, message } => Cow::from(format!("line {}: {}", line, message)),
            STE::InvalidOffset { sensor, offset } => {
                Cow::from(format!("sensor {} has invalid offset {}", sensor, offset))
            }
            STE::DuplicateSensor(sensor) => Cow::from(format!("sensor {} listed twice", sensor)),
            STE::OffsetOutOfBounds {
                sensor,
                offset,
                frame_len,
            } => Cow::from(format!(
                "sensor {} offset {} is outside a {}-byte frame",
                sensor, offset, frame_len
            )),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for SensorTableError {}

impl From<io::Error> for SensorTableError {
    fn from(value: io::Error) -> Self {
        Self::IoError(value)
    }
}

fn parse_quoted(s: &str) -> IResult<&str, &str> {
    delimited(char('"'), take_while(|c| c != '"'), char('"'))(s)
}

fn parse_field(s: &str) -> IResult<&str, &str> {
    alt((parse_quoted, map(take_while(|c| c != ','), str::trim)))(s)
}

fn parse_row(s: &str) -> IResult<&str, Vec<&str>> {
    all_consuming(separated_list1(char(','), parse_field))(s)
}

fn parse_sensor_id(s: &str) -> IResult<&str, SensorId> {
    all_consuming(u16)(s)
}

fn parse_offset(s: &str) -> IResult<&str, i32> {
    all_consuming(i32)(s)
}

fn parse_coordinate(s: &str) -> IResult<&str, Option<f64>> {
    alt((map(all_consuming(double), Some), map(eof, |_| None)))(s)
}

fn field_error(line: usize, column: &str, value: &str) -> SensorTableError {
    SensorTableError::Parse {
        line,
        message: format!("bad `{}` value {:?}", column, value),
    }
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    sensor_id: usize,
    region: usize,
    offset: usize,
    x_mm: Option<usize>,
    y_mm: Option<usize>,
}

impl Columns {
    fn from_header(names: &[&str]) -> Result<Self, SensorTableError> {
        let find = |name: &str| names.iter().position(|n| n.eq_ignore_ascii_case(name));
        let required = |name: &'static str| find(name).ok_or(SensorTableError::MissingColumn(name));
        Ok(Self {
            sensor_id: required("sensor_id")?,
            region: required("region")?,
            offset: required("data_frame_index")?,
            x_mm: find("x_mm"),
            y_mm: find("y_mm"),
        })
    }
}

fn parse_descriptor(
    fields: &[&str],
    columns: &Columns,
    line: usize,
) -> Result<SensorDescriptor, SensorTableError> {
    let get = |idx: usize| fields.get(idx).copied().unwrap_or("");
    let coordinate = |idx: Option<usize>, name: &str| -> Result<Option<f64>, SensorTableError> {
        match idx {
            Some(idx) => parse_coordinate(get(idx))
                .finish()
                .map(|(_, v)| v)
                .map_err(|_| field_error(line, name, get(idx))),
            None => Ok(None),
        }
    };

    let raw_id = get(columns.sensor_id);
    let (_, id) = parse_sensor_id(raw_id)
        .finish()
        .map_err(|_| field_error(line, "sensor_id", raw_id))?;

    let raw_offset = get(columns.offset);
    let (_, offset) = parse_offset(raw_offset)
        .finish()
        .map_err(|_| field_error(line, "data_frame_index", raw_offset))?;
    let offset = match offset {
        UNASSIGNED => None,
        o if o >= 1 && o <= u16::MAX as i32 => Some(o as u16),
        o => return Err(SensorTableError::InvalidOffset { sensor: id, offset: o }),
    };

    let position = match (
        coordinate(columns.x_mm, "x_mm")?,
        coordinate(columns.y_mm, "y_mm")?,
    ) {
        (Some(x_mm), Some(y_mm)) => Some(Position { x_mm, y_mm }),
        (None, None) => None,
        _ => {
            return Err(SensorTableError::Parse {
                line,
                message: format!("sensor {} has only one coordinate", id),
            })
        }
    };

    Ok(SensorDescriptor {
        id,
        offset,
        region: get(columns.region).to_owned(),
        position,
    })
}

/// The immutable set of [SensorDescriptor]s, ordered by sensor id.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorTable {
    sensors: Vec<SensorDescriptor>,
    by_id: BTreeMap<SensorId, usize>,
}

impl SensorTable {
    /// Builds a table from descriptors, rejecting duplicate ids and zero
    /// offsets.
    pub fn new(mut sensors: Vec<SensorDescriptor>) -> Result<Self, SensorTableError> {
        sensors.sort_by_key(|s| s.id);

        let mut by_id = BTreeMap::new();
        for (i, sensor) in sensors.iter().enumerate() {
            if sensor.offset == Some(0) {
                return Err(SensorTableError::InvalidOffset {
                    sensor: sensor.id,
                    offset: 0,
                });
            }
            if by_id.insert(sensor.id, i).is_some() {
                return Err(SensorTableError::DuplicateSensor(sensor.id));
            }
        }

        Ok(Self { sensors, by_id })
    }

    /// Reads a table from a CSV file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SensorTableError> {
        fs::read_to_string(path)?.parse()
    }

    /// Checks that every assigned offset fits in a frame of `frame_len`
    /// bytes. Called once before any frame is remapped.
    pub fn validate(&self, frame_len: usize) -> Result<(), SensorTableError> {
        for sensor in &self.sensors {
            if let Some(offset) = sensor.offset {
                if offset as usize > frame_len {
                    return Err(SensorTableError::OffsetOutOfBounds {
                        sensor: sensor.id,
                        offset,
                        frame_len,
                    });
                }
            }
        }
        Ok(())
    }

    /// Every sensor, ordered by id.
    pub fn sensors(&self) -> &[SensorDescriptor] {
        &self.sensors
    }

    /// Number of sensors, assigned or not.
    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    /// Whether the table has no sensors.
    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    /// Looks a sensor up by id.
    pub fn get(&self, id: SensorId) -> Option<&SensorDescriptor> {
        self.by_id.get(&id).map(|&i| &self.sensors[i])
    }

    /// Sensors that have a channel.
    pub fn assigned(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.sensors.iter().filter(|s| s.offset.is_some())
    }

    /// Sensors without a channel.
    pub fn unassigned(&self) -> impl Iterator<Item = &SensorDescriptor> {
        self.sensors.iter().filter(|s| s.offset.is_none())
    }

    /// Distinct region names, sorted.
    pub fn regions(&self) -> Vec<&str> {
        self.sensors
            .iter()
            .map(|s| s.region.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Sensors belonging to `region`.
    pub fn sensors_in_region<'a>(
        &'a self,
        region: &'a str,
    ) -> impl Iterator<Item = &'a SensorDescriptor> + 'a {
        self.sensors.iter().filter(move |s| s.region == region)
    }

    /// Ids of the sensors read from the 1-based `offset`.
    pub fn sensors_at_offset(&self, offset: u16) -> Vec<SensorId> {
        self.sensors
            .iter()
            .filter(|s| s.offset == Some(offset))
            .map(|s| s.id)
            .collect()
    }

    /// Sorted, de-duplicated assigned offsets.
    pub fn unique_offsets(&self) -> Vec<u16> {
        self.sensors
            .iter()
            .filter_map(|s| s.offset)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Offsets read by more than one sensor, with the sensors sharing them.
    pub fn shared_offsets(&self) -> BTreeMap<u16, Vec<SensorId>> {
        let mut groups: BTreeMap<u16, Vec<SensorId>> = BTreeMap::new();
        for sensor in &self.sensors {
            if let Some(offset) = sensor.offset {
                groups.entry(offset).or_default().push(sensor.id);
            }
        }
        groups.retain(|_, ids| ids.len() > 1);
        groups
    }
}

impl FromStr for SensorTable {
    type Err = SensorTableError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Spreadsheet exports often start with a UTF-8 byte order mark.
        let s = s.strip_prefix('\u{feff}').unwrap_or(s);
        let mut lines = s
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| !l.trim().is_empty());

        let (header_line, header) = lines.next().ok_or(SensorTableError::MissingHeader)?;
        let (_, names) = parse_row(header)
            .finish()
            .map_err(|e| SensorTableError::Parse {
                line: header_line,
                message: format!("{:?}", e.code),
            })?;
        let columns = Columns::from_header(&names)?;

        let mut sensors = Vec::new();
        for (line, text) in lines {
            let (_, fields) = parse_row(text)
                .finish()
                .map_err(|e| SensorTableError::Parse {
                    line,
                    message: format!("{:?}", e.code),
                })?;
            sensors.push(parse_descriptor(&fields, &columns, line)?);
        }

        SensorTable::new(sensors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
sensor_id,x_mm,y_mm,region,data_frame_index
10,12.5,140.0,index_tip,22
11,13.0,138.5,index_tip,21
20,,,index_body,5
21,,,index_body,5
22,,,index_body,5
30,1.0,2.0,palm,-1
";

    #[test]
    fn parses_rows() {
        let table: SensorTable = TABLE.parse().unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(
            table.get(10),
            Some(&SensorDescriptor {
                id: 10,
                offset: Some(22),
                region: "index_tip".to_owned(),
                position: Some(Position {
                    x_mm: 12.5,
                    y_mm: 140.0
                }),
            })
        );
        assert_eq!(table.get(10).unwrap().index(), Some(21));
        assert_eq!(table.get(20).unwrap().position, None);
        assert_eq!(table.get(30).unwrap().offset, None);
        assert_eq!(table.get(99), None);
    }

    #[test]
    fn columns_may_be_reordered_and_quoted() {
        let text = "region,data_frame_index,sensor_id\n\"palm\",7,3\r\n";
        let table: SensorTable = text.parse().unwrap();

        let sensor = table.get(3).unwrap();
        assert_eq!(sensor.region, "palm");
        assert_eq!(sensor.offset, Some(7));
        assert_eq!(sensor.position, None);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let text = format!("\u{feff}{}", TABLE);
        let table: SensorTable = text.parse().unwrap();

        assert_eq!(table.len(), 6);
        assert_eq!(table.get(10).unwrap().offset, Some(22));
    }

    #[test]
    fn byte_order_mark_in_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\xEF\xBB\xBFsensor_id,region,data_frame_index\r\n4,palm,9\r\n")
            .unwrap();

        let table = SensorTable::from_path(file.path()).unwrap();
        assert_eq!(table.get(4).unwrap().offset, Some(9));
    }

    #[test]
    fn queries() {
        let table: SensorTable = TABLE.parse().unwrap();

        assert_eq!(table.assigned().count(), 5);
        assert_eq!(
            table.unassigned().map(|s| s.id).collect::<Vec<_>>(),
            vec![30]
        );
        assert_eq!(table.regions(), vec!["index_body", "index_tip", "palm"]);
        assert_eq!(table.sensors_in_region("index_tip").count(), 2);
        assert_eq!(table.sensors_at_offset(5), vec![20, 21, 22]);
        assert_eq!(table.unique_offsets(), vec![5, 21, 22]);
        assert_eq!(
            table.shared_offsets(),
            BTreeMap::from([(5, vec![20, 21, 22])])
        );
    }

    #[test]
    fn rejects_bad_offsets() {
        let zero = "sensor_id,region,data_frame_index\n1,palm,0\n";
        assert!(matches!(
            zero.parse::<SensorTable>(),
            Err(SensorTableError::InvalidOffset { sensor: 1, offset: 0 })
        ));

        let negative = "sensor_id,region,data_frame_index\n1,palm,-4\n";
        assert!(matches!(
            negative.parse::<SensorTable>(),
            Err(SensorTableError::InvalidOffset {
                sensor: 1,
                offset: -4
            })
        ));
    }

    #[test]
    fn rejects_duplicates_and_garbage() {
        let dup = "sensor_id,region,data_frame_index\n1,palm,3\n1,palm,4\n";
        assert!(matches!(
            dup.parse::<SensorTable>(),
            Err(SensorTableError::DuplicateSensor(1))
        ));

        let junk = "sensor_id,region,data_frame_index\nten,palm,3\n";
        assert!(matches!(
            junk.parse::<SensorTable>(),
            Err(SensorTableError::Parse { line: 2, .. })
        ));

        let lonely = "sensor_id,x_mm,y_mm,region,data_frame_index\n1,4.0,,palm,3\n";
        assert!(matches!(
            lonely.parse::<SensorTable>(),
            Err(SensorTableError::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn rejects_missing_columns() {
        assert!(matches!(
            "".parse::<SensorTable>(),
            Err(SensorTableError::MissingHeader)
        ));
        assert!(matches!(
            "sensor_id,region\n1,palm\n".parse::<SensorTable>(),
            Err(SensorTableError::MissingColumn("data_frame_index"))
        ));
    }

    #[test]
    fn validates_against_frame_length() {
        let table: SensorTable = TABLE.parse().unwrap();
        assert!(table.validate(272).is_ok());
        assert!(table.validate(22).is_ok());
        assert!(matches!(
            table.validate(21),
            Err(SensorTableError::OffsetOutOfBounds {
                sensor: 10,
                offset: 22,
                frame_len: 21
            })
        ));
    }

    #[test]
    fn reads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", TABLE).unwrap();

        let table = SensorTable::from_path(file.path()).unwrap();
        assert_eq!(table.len(), 6);
    }
}
