use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use tokio::time::Duration;

use crate::alert::{AlertLimits, SmtpSettings};
use crate::models::{Pose, Waypoint};

const DEFAULT_ARM_ADDRESS: &str = "192.168.1.153";
const DEFAULT_ARM_PORT: u16 = 502;
const DEFAULT_ARM_SPEED: f64 = 500.0;
const DEFAULT_DWELL_SECS: u64 = 10;
const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
const DEFAULT_SERIAL_BAUD: u32 = 115_200;
const DEFAULT_SERIAL_TIMEOUT_SECS: u64 = 3;
const DEFAULT_CSV_PATH: &str = "historial_mediciones_robot.csv";
const DEFAULT_LINE_VOLTAGE: f64 = 220.0;
const DEFAULT_HIGH_TEMP_LIMIT: f64 = 60.0;
const DEFAULT_LOW_TEMP_LIMIT: f64 = 10.0;
const DEFAULT_CURRENT_CEILING: f64 = 2.0;
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 465;

// (label, approach, measure)
const DEFAULT_PATTERN: [(&str, Pose, Pose); 4] = [
    (
        "Punto 1",
        Pose::new(269.0, -279.0, 250.0, -180.0, 0.0, -90.0),
        Pose::new(269.0, -279.0, 132.0, -180.0, 0.0, -90.0),
    ),
    (
        "Punto 2",
        Pose::new(269.0, -130.0, 250.0, -180.0, 0.0, -90.0),
        Pose::new(274.0, -130.0, 132.0, -180.0, 0.0, -90.0),
    ),
    (
        "Punto 3",
        Pose::new(269.0, 60.0, 250.0, -180.0, 0.0, -90.0),
        Pose::new(269.0, 60.0, 132.0, -180.0, 0.0, -90.0),
    ),
    (
        "Punto 4",
        Pose::new(269.0, 277.0, 250.0, -180.0, 0.0, -90.0),
        Pose::new(269.0, 277.0, 132.0, -180.0, 0.0, -90.0),
    ),
];

#[derive(Debug, Clone)]
pub struct CycleConfig {
    pub arm_address: String,
    pub arm_port: u16,
    pub arm_speed: f64,
    pub dwell: Duration,
    pub serial_port: String,
    pub serial_baud: u32,
    pub serial_timeout: Duration,
    pub csv_path: PathBuf,
    pub line_voltage: f64,
    pub limits: AlertLimits,
    pub smtp: SmtpSettings,
    pub waypoints: Vec<Waypoint>,
}

fn env_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|e| format!("{} has an invalid value '{}': {}", key, value, e).into()),
        Err(_) => Ok(default),
    }
}

fn required(key: &str) -> Result<String, Box<dyn std::error::Error>> {
    env::var(key).map_err(|_| format!("{} environment variable not set", key).into())
}

fn parse_pose(text: &str) -> Result<Pose, String> {
    let values = text
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid coordinate in '{}': {}", text, e))?;

    match values.as_slice() {
        [x, y, z, roll, pitch, yaw] => Ok(Pose::new(*x, *y, *z, *roll, *pitch, *yaw)),
        _ => Err(format!(
            "expected 6 coordinates in '{}', found {}",
            text,
            values.len()
        )),
    }
}

/// Parse `label=x,y,z,r,p,w/x,y,z,r,p,w;...` into waypoints
pub fn parse_waypoints(list: &str) -> Result<Vec<Waypoint>, String> {
    let mut waypoints = Vec::new();

    for entry in list.split(';') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let (label, poses) = entry
            .split_once('=')
            .ok_or_else(|| format!("waypoint '{}' is missing '='", entry))?;
        let (approach, measure) = poses
            .split_once('/')
            .ok_or_else(|| format!("waypoint '{}' is missing '/'", entry))?;

        let label = label.trim();
        if label.is_empty() {
            return Err(format!("waypoint '{}' has an empty label", entry));
        }

        waypoints.push(Waypoint {
            label: label.to_string(),
            approach: parse_pose(approach)?,
            measure: parse_pose(measure)?,
        });
    }

    if waypoints.is_empty() {
        return Err("WAYPOINTS contains no waypoints".to_string());
    }
    Ok(waypoints)
}

pub fn default_waypoints() -> Vec<Waypoint> {
    DEFAULT_PATTERN
        .iter()
        .map(|(label, approach, measure)| Waypoint {
            label: label.to_string(),
            approach: *approach,
            measure: *measure,
        })
        .collect()
}

impl CycleConfig {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        // Load environment variables
        dotenv::dotenv().ok();

        let mail_user = required("MAIL_USER")?;
        let mail_password = required("MAIL_PASSWORD")?;
        let recipient = env::var("MAIL_TO").unwrap_or_else(|_| mail_user.clone());

        let waypoints = match env::var("WAYPOINTS") {
            Ok(list) => parse_waypoints(&list)?,
            Err(_) => default_waypoints(),
        };

        let current_ceiling = env_or("CURRENT_CEILING", DEFAULT_CURRENT_CEILING)?;

        Ok(CycleConfig {
            arm_address: env_or("ARM_ADDRESS", DEFAULT_ARM_ADDRESS.to_string())?,
            arm_port: env_or("ARM_PORT", DEFAULT_ARM_PORT)?,
            arm_speed: env_or("ARM_SPEED", DEFAULT_ARM_SPEED)?,
            dwell: Duration::from_secs(env_or("DWELL_SECS", DEFAULT_DWELL_SECS)?),
            serial_port: env_or("SERIAL_PORT", DEFAULT_SERIAL_PORT.to_string())?,
            serial_baud: env_or("SERIAL_BAUD", DEFAULT_SERIAL_BAUD)?,
            serial_timeout: Duration::from_secs(env_or(
                "SERIAL_TIMEOUT_SECS",
                DEFAULT_SERIAL_TIMEOUT_SECS,
            )?),
            csv_path: PathBuf::from(env_or("CSV_PATH", DEFAULT_CSV_PATH.to_string())?),
            line_voltage: env_or("LINE_VOLTAGE", DEFAULT_LINE_VOLTAGE)?,
            limits: AlertLimits {
                high_temperature: env_or("HIGH_TEMP_LIMIT", DEFAULT_HIGH_TEMP_LIMIT)?,
                low_temperature: env_or("LOW_TEMP_LIMIT", DEFAULT_LOW_TEMP_LIMIT)?,
                current_ceiling,
            },
            smtp: SmtpSettings {
                host: env_or("SMTP_HOST", DEFAULT_SMTP_HOST.to_string())?,
                port: env_or("SMTP_PORT", DEFAULT_SMTP_PORT)?,
                user: mail_user,
                password: mail_password,
                recipient,
            },
            waypoints,
        })
    }
}
