/// Sensor frame decoding
///
/// The microcontroller emits one line per measurement:
/// `<STATUS>:T=<temp>,H=<humidity>,V=<voltage>`
/// where STATUS is `OK`, `ALERTA_ALTA` or `ALERTA_BAJA`. Only the position
/// of the three fields is trusted, their names are not checked.
use thiserror::Error;

use crate::models::{FrameStatus, ParsedFrame};

/// Substring the firmware prints when the temperature/humidity probe fails
pub const HARDWARE_FAULT_SENTINEL: &str = "ErrorT_H";

const FIELD_DELIMITER: char = ',';
const STATUS_DELIMITER: char = ':';
const REQUIRED_FIELDS: usize = 3;

/// Why a raw line did not yield a reading. None of these are faults.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("empty line (read timeout)")]
    Timeout,
    #[error("sensor reported a read fault")]
    HardwareFault,
    #[error("ignoring startup line: {0}")]
    StartupNoise(String),
    #[error("malformed line: {0}")]
    Malformed(String),
}

/// Decode one raw line from the sensor transport
///
/// # Arguments
/// * `raw` - Line as read from the transport, trailing newline allowed
///
/// # Returns
/// ParsedFrame with the frame status and the first three field values,
/// or the reason the line was rejected
pub fn parse_frame(raw: &str) -> Result<ParsedFrame, RejectReason> {
    let line = raw.trim();

    if line.is_empty() {
        return Err(RejectReason::Timeout);
    }
    if line.contains(HARDWARE_FAULT_SENTINEL) {
        return Err(RejectReason::HardwareFault);
    }

    // Boot chatter from the microcontroller has none of the known prefixes
    let status = match FrameStatus::from_line(line) {
        Some(status) => status,
        None => return Err(RejectReason::StartupNoise(line.to_string())),
    };

    let malformed = || RejectReason::Malformed(line.to_string());

    let (_, payload) = line.split_once(STATUS_DELIMITER).ok_or_else(malformed)?;
    let fields: Vec<&str> = payload.split(FIELD_DELIMITER).collect();
    if fields.len() < REQUIRED_FIELDS {
        return Err(malformed());
    }

    let value = |field: &str| -> Result<f64, RejectReason> {
        // Only the text between the first and second '=' is the value
        field
            .split('=')
            .nth(1)
            .and_then(|value| value.trim().parse::<f64>().ok())
            .filter(|value| value.is_finite())
            .ok_or_else(malformed)
    };

    Ok(ParsedFrame {
        status,
        temperature: value(fields[0])?,
        humidity: value(fields[1])?,
        voltage: value(fields[2])?,
    })
}
