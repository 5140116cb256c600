use std::fmt;

/// Cartesian pose: x, y, z in millimetres, roll, pitch, yaw in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Pose {
            x,
            y,
            z,
            roll,
            pitch,
            yaw,
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}, {}, {})",
            self.x, self.y, self.z, self.roll, self.pitch, self.yaw
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub label: String,
    pub approach: Pose,
    pub measure: Pose,
}

/// Status prefix carried by a sensor frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    AlertHigh,
    AlertLow,
}

impl FrameStatus {
    pub const PREFIXES: [(&'static str, FrameStatus); 3] = [
        ("OK:", FrameStatus::Ok),
        ("ALERTA_ALTA:", FrameStatus::AlertHigh),
        ("ALERTA_BAJA:", FrameStatus::AlertLow),
    ];

    pub fn from_line(line: &str) -> Option<Self> {
        Self::PREFIXES
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix))
            .map(|(_, status)| *status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParsedFrame {
    pub status: FrameStatus,
    pub temperature: f64,
    pub humidity: f64,
    pub voltage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusFlag {
    Ok,
    AlertHigh,
    AlertLow,
}

impl StatusFlag {
    pub fn is_alert(self) -> bool {
        self != StatusFlag::Ok
    }
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusFlag::Ok => "OK",
            StatusFlag::AlertHigh => "ALERT_HIGH",
            StatusFlag::AlertLow => "ALERT_LOW",
        };
        f.write_str(name)
    }
}

/// A classified reading. `current` is simulated, never measured.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature: f64,
    pub humidity: f64,
    pub voltage: f64,
    pub current: f64,
    pub status: StatusFlag,
    pub unit_count: u8,
}

impl Reading {
    pub fn is_plausible(&self) -> bool {
        self.unit_count == 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccumulationRecord {
    pub label: String,
    pub reading: Reading,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LocationAverages {
    pub label: String,
    pub temperature: f64,
    pub humidity: f64,
    pub voltage: f64,
    pub current: f64,
    pub unit_count: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub locations: Vec<LocationAverages>,
    pub mean_current: f64,
    pub power_watts: f64,
    pub energy_kwh: f64,
    pub total_units: u64,
}
