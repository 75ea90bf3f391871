//! Coordinate system metadata consumed by grid geometries.

/// Direction in which the values of a world axis increase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AxisDirection {
    East,
    West,
    North,
    South,
    Up,
    Down,
    Other,
}

impl AxisDirection {
    /// `true` for West, South and Down.
    pub fn is_negative(self) -> bool {
        matches!(self, AxisDirection::West | AxisDirection::South | AxisDirection::Down)
    }

    /// `true` for North and Up.
    pub fn points_up(self) -> bool {
        matches!(self, AxisDirection::North | AxisDirection::Up)
    }
}

/// Representation of a coordinate reference system.
///
/// The system is identified by a definition string which can be an EPSG
/// identifier (`"EPSG:4326"`), a Proj4 definition or a WKT definition, and
/// carries one direction per axis.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CoordinateSystem {
    definition: String,
    epsg: Option<u32>,
    axes: Vec<AxisDirection>,
}

impl CoordinateSystem {
    /// Creates a coordinate system from the given EPSG code and axes.
    pub fn from_epsg(code: u32, axes: Vec<AxisDirection>) -> Self {
        Self {
            definition: format!("EPSG:{}", code),
            epsg: Some(code),
            axes,
        }
    }

    /// Creates a coordinate system from a Proj4 or WKT definition string.
    pub fn from_definition(definition: &str, axes: Vec<AxisDirection>) -> Self {
        Self {
            definition: definition.to_string(),
            epsg: None,
            axes,
        }
    }

    /// WGS84 longitude/latitude (EPSG:4326) in east/north order.
    pub fn wgs84() -> Self {
        Self::from_epsg(4326, vec![AxisDirection::East, AxisDirection::North])
    }

    /// Web Mercator (EPSG:3857).
    pub fn web_mercator() -> Self {
        Self::from_epsg(3857, vec![AxisDirection::East, AxisDirection::North])
    }

    /// Returns the EPSG code for this coordinate system, if available.
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn dimension(&self) -> usize {
        self.axes.len()
    }

    pub fn axis(&self, i: usize) -> Option<AxisDirection> {
        self.axes.get(i).copied()
    }

    /// Per-axis inversion flags for mapping a grid onto this system.
    ///
    /// Grid columns grow to the right and rows grow downward, so the second
    /// axis is inverted when its world direction points up; every other axis
    /// is inverted when its world direction is negative.
    pub fn default_axis_inversion(&self) -> Vec<bool> {
        self.axes
            .iter()
            .enumerate()
            .map(|(i, dir)| if i == 1 { dir.points_up() } else { dir.is_negative() })
            .collect()
    }
}
