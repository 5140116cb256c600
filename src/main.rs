mod alert;
mod classifier;
mod config;
mod cycle;
mod models;
mod robot;
mod sensor;
mod storage;
mod utils;

use log::{error, info};
use std::process::ExitCode;

use alert::{AlertDispatcher, SmtpNotifier};
use classifier::{SimulatedCurrent, ThresholdClassifier};
use config::CycleConfig;
use cycle::{CycleController, CycleSettings, RunOutcome};
use robot::XArmDriver;
use sensor::SerialSensor;
use storage::ReadingStore;

const EXIT_FATAL: u8 = 1;
const EXIT_ALERT_HALT: u8 = 2;

async fn run(config: CycleConfig) -> Result<RunOutcome, Box<dyn std::error::Error>> {
    let notifier = SmtpNotifier::new(&config.smtp)?;

    info!(
        "--- Connecting to arm at {}:{} ---",
        config.arm_address, config.arm_port
    );
    let arm = XArmDriver::connect(&config.arm_address, config.arm_port).await?;

    let mut controller = CycleController::new(
        arm,
        SerialSensor::new(
            config.serial_port.clone(),
            config.serial_baud,
            config.serial_timeout,
        ),
        ThresholdClassifier::new(config.limits.current_ceiling, SimulatedCurrent::new()),
        ReadingStore::new(config.csv_path.clone()),
        AlertDispatcher::new(notifier, config.limits),
        config.waypoints.clone(),
        CycleSettings {
            speed: config.arm_speed,
            dwell: config.dwell,
            line_voltage: config.line_voltage,
        },
    );

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(());
        }
    });

    // Run the cycle or wait for the shutdown signal
    let outcome = tokio::select! {
        result = controller.start() => result,
        _ = &mut rx => {
            info!("Interrupted by operator (Ctrl+C)");
            Ok(RunOutcome::Interrupted)
        }
    };

    // The arm is released on every path once it has connected.
    // A further Ctrl+C abandons the homing move.
    info!("Shutting down arm (Ctrl+C again to abandon)");
    controller
        .shutdown_or_abort(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;
    Ok(outcome?)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    info!("--- Starting inspection cycle ---");

    // Load configuration
    let config = match CycleConfig::new() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let code = match run(config).await {
        Ok(RunOutcome::Interrupted) => ExitCode::SUCCESS,
        Ok(RunOutcome::AlertHalt { batch, status }) => {
            info!("Halted on {} at batch {}", status, batch);
            ExitCode::from(EXIT_ALERT_HALT)
        }
        Err(e) => {
            error!("Fatal error: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    };

    info!("--- Inspection cycle disconnected ---");
    code
}
