pub mod controller;

pub use controller::{CycleController, CycleSettings, RunOutcome};
