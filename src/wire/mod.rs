use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

mod codec;

pub use codec::{read_record, write_record, WireError};

/// Size of the NUL-padded category field
pub const CATEGORY_LEN: usize = 12;

/// Total size of one wire record (category + x + y + measurement)
pub const RECORD_LEN: usize = CATEGORY_LEN + 4 + 4 + 4;

/// Measurement value used to announce that a sensor has left the field.
///
/// Any negative measurement is treated as a departure; this is the exact
/// value the relay emits.
pub const DEPARTURE_SENTINEL: f32 = -1.0;

/// Grid bounds (inclusive) for sensor coordinates
pub const GRID_MIN: i32 = 0;
pub const GRID_MAX: i32 = 9;

/// Measurement category of a sensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Temperature,
    Humidity,
    AirQuality,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::Temperature,
        Category::Humidity,
        Category::AirQuality,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Temperature => "temperature",
            Category::Humidity => "humidity",
            Category::AirQuality => "air_quality",
        }
    }

    /// Stable slot index, used by the registry's per-category collections
    pub fn index(&self) -> usize {
        match self {
            Category::Temperature => 0,
            Category::Humidity => 1,
            Category::AirQuality => 2,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| WireError::UnknownCategory(s.to_string()))
    }
}

/// Fixed grid position of a sensor
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Coordinate {
    pub x: i32,
    pub y: i32,
}

impl Coordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance, computed in single precision.
    ///
    /// Defined for any pair of coordinates, including ones far off the grid.
    pub fn distance_to(&self, other: &Coordinate) -> f32 {
        let dx = (i64::from(self.x) - i64::from(other.x)) as f32;
        let dy = (i64::from(self.y) - i64::from(other.y)) as f32;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn in_grid(&self) -> bool {
        (GRID_MIN..=GRID_MAX).contains(&self.x) && (GRID_MIN..=GRID_MAX).contains(&self.y)
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

/// SensorReading is the single record type exchanged between agents and the relay.
///
/// Registration, periodic reports, fan-out copies and departure notices all
/// share this layout:
///
/// ```text
/// offset  size  field
///      0    12  category, ASCII, NUL padded (at least one NUL)
///     12     4  x, i32 little-endian
///     16     4  y, i32 little-endian
///     20     4  measurement, f32 little-endian (< 0 means departed)
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    pub category: Category,
    pub coordinate: Coordinate,
    pub measurement: f32,
}

impl SensorReading {
    pub fn new(category: Category, coordinate: Coordinate, measurement: f32) -> Self {
        Self {
            category,
            coordinate,
            measurement,
        }
    }

    /// Departure notice for a sensor that left the field
    pub fn departure(category: Category, coordinate: Coordinate) -> Self {
        Self::new(category, coordinate, DEPARTURE_SENTINEL)
    }

    pub fn is_departure(&self) -> bool {
        self.measurement < 0.0
    }

    /// Encode into the fixed wire layout
    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut buf = [0u8; RECORD_LEN];
        let name = self.category.as_str().as_bytes();
        buf[..name.len()].copy_from_slice(name);
        buf[12..16].copy_from_slice(&self.coordinate.x.to_le_bytes());
        buf[16..20].copy_from_slice(&self.coordinate.y.to_le_bytes());
        buf[20..24].copy_from_slice(&self.measurement.to_le_bytes());
        buf
    }

    /// Decode one record from the fixed wire layout
    pub fn decode(buf: &[u8; RECORD_LEN]) -> Result<Self, WireError> {
        let raw = &buf[..CATEGORY_LEN];
        let end = raw
            .iter()
            .position(|&b| b == 0)
            .ok_or(WireError::UnterminatedCategory)?;
        let name = String::from_utf8_lossy(&raw[..end]);
        let category: Category = name.parse()?;

        let x = i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]);
        let y = i32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
        let measurement = f32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);

        Ok(Self::new(category, Coordinate::new(x, y), measurement))
    }
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sensor in {} measurement {:.4}",
            self.category, self.coordinate, self.measurement
        )
    }
}
