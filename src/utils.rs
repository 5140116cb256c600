/// Utility functions for data processing and formatting
use log::info;
use std::collections::BTreeMap;
use time::{macros::format_description, OffsetDateTime};

use crate::models::{AccumulationRecord, LocationAverages, RunSummary};

const WATT_SECONDS_PER_KWH: f64 = 3_600_000.0;

/// Format a timestamp for the reading log and alert mails
///
/// Produces `YYYY-MM-DD HH:MM:SS`. Falls back to the default string
/// representation if formatting fails.
pub fn format_timestamp(dt: &OffsetDateTime) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    dt.format(format).unwrap_or_else(|_| dt.to_string())
}

/// Round to 2 decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Summarize every accepted reading of the run
///
/// Groups records by label and averages each group, then estimates
/// power and energy from the whole-run mean simulated current. The
/// summary is rebuilt from the full record list on every call.
///
/// # Arguments
/// * `records` - All accepted readings of the run, in arrival order
/// * `line_voltage` - Fixed supply voltage used for the power estimate
/// * `run_started` - When the run began
/// * `now` - End of the energy window
///
/// # Returns
/// None when no readings have been accepted yet
pub fn summarize(
    records: &[AccumulationRecord],
    line_voltage: f64,
    run_started: OffsetDateTime,
    now: OffsetDateTime,
) -> Option<RunSummary> {
    if records.is_empty() {
        return None;
    }

    let mut groups: BTreeMap<&str, Vec<&AccumulationRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.label.as_str()).or_default().push(record);
    }

    let locations = groups
        .into_iter()
        .map(|(label, group)| LocationAverages {
            label: label.to_string(),
            temperature: mean(group.iter().map(|r| r.reading.temperature)),
            humidity: mean(group.iter().map(|r| r.reading.humidity)),
            voltage: mean(group.iter().map(|r| r.reading.voltage)),
            current: mean(group.iter().map(|r| r.reading.current)),
            unit_count: mean(group.iter().map(|r| f64::from(r.reading.unit_count))),
            samples: group.len(),
        })
        .collect();

    // Energy over the whole run from the mean simulated current
    let mean_current = mean(records.iter().map(|r| r.reading.current));
    let power_watts = line_voltage * mean_current;
    let elapsed_secs = (now - run_started).as_seconds_f64().max(0.0);
    let energy_kwh = power_watts * elapsed_secs / WATT_SECONDS_PER_KWH;
    let total_units = records
        .iter()
        .map(|r| u64::from(r.reading.unit_count))
        .sum();

    Some(RunSummary {
        locations,
        mean_current,
        power_watts,
        energy_kwh,
        total_units,
    })
}

/// Print the accumulated averages to the log
pub fn log_summary(summary: &RunSummary) {
    info!("--- Accumulated averages (whole run) ---");
    for location in &summary.locations {
        info!(
            "  {}: T={:.2}°C H={:.2}% V={:.2}V I(sim)={:.2}A units={:.2} ({} samples)",
            location.label,
            location.temperature,
            location.humidity,
            location.voltage,
            location.current,
            location.unit_count,
            location.samples
        );
    }
    info!(
        "  Energy consumption (accumulated, simulated current): {:.6} kWh",
        summary.energy_kwh
    );
    info!("  Total units (accumulated): {}", summary.total_units);
}
