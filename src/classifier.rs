/// Safety-limit classification of parsed sensor frames
use log::warn;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::models::{FrameStatus, ParsedFrame, Reading, StatusFlag};
use crate::utils::round2;

// The physical current channel always reads zero, so current is simulated
const NOMINAL_CURRENT_A: f64 = 1.8;
const CURRENT_SPREAD_LOW_A: f64 = -0.3;
const CURRENT_SPREAD_HIGH_A: f64 = 0.4;

/// Injection point for the simulated current value
pub trait CurrentSource: Send {
    fn sample(&mut self) -> f64;
}

impl<F> CurrentSource for F
where
    F: FnMut() -> f64 + Send,
{
    fn sample(&mut self) -> f64 {
        self()
    }
}

/// Uniform draw around the nominal operating current, 2 decimal places.
pub struct SimulatedCurrent {
    rng: StdRng,
}

impl SimulatedCurrent {
    pub fn new() -> Self {
        SimulatedCurrent {
            rng: StdRng::from_entropy(),
        }
    }

    #[cfg(test)]
    pub fn seeded(seed: u64) -> Self {
        SimulatedCurrent {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for SimulatedCurrent {
    fn default() -> Self {
        Self::new()
    }
}

impl CurrentSource for SimulatedCurrent {
    fn sample(&mut self) -> f64 {
        let offset = self.rng.gen_range(CURRENT_SPREAD_LOW_A..=CURRENT_SPREAD_HIGH_A);
        round2(NOMINAL_CURRENT_A + offset)
    }
}

pub struct ThresholdClassifier<C> {
    current_ceiling: f64,
    current: C,
}

impl<C: CurrentSource> ThresholdClassifier<C> {
    pub fn new(current_ceiling: f64, current: C) -> Self {
        ThresholdClassifier {
            current_ceiling,
            current,
        }
    }

    /// Turn a parsed frame into a reading
    ///
    /// The frame's own status is the starting point. A simulated current at
    /// or above the ceiling raises the status to ALERT_HIGH and never
    /// lowers it. A reading counts a unit only if temperature or humidity
    /// is positive.
    pub fn classify(&mut self, frame: &ParsedFrame) -> Reading {
        let current = self.current.sample();

        let mut status = match frame.status {
            FrameStatus::AlertHigh => StatusFlag::AlertHigh,
            FrameStatus::AlertLow => StatusFlag::AlertLow,
            FrameStatus::Ok => StatusFlag::Ok,
        };

        if current >= self.current_ceiling {
            warn!("[SIMULATED] High simulated current: {:.2}A", current);
            status = StatusFlag::AlertHigh;
        }

        let unit_count = if frame.temperature > 0.0 || frame.humidity > 0.0 {
            1
        } else {
            0
        };

        Reading {
            temperature: frame.temperature,
            humidity: frame.humidity,
            voltage: frame.voltage,
            current,
            status,
            unit_count,
        }
    }
}
