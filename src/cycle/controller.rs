/// Inspection cycle: waypoint visits, reading acceptance and alert halts
use log::{debug, error, info, warn};
use std::future::Future;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::{sleep, Duration};

use crate::alert::{AlertDispatcher, Notifier};
use crate::classifier::{CurrentSource, ThresholdClassifier};
use crate::models::{Reading, RunSummary, StatusFlag, Waypoint};
use crate::robot::{Arm, ArmError};
use crate::sensor::{parse_frame, SensorLink, SensorLinkError};
use crate::storage::{ReadingStore, StoreError};
use crate::utils::{format_timestamp, log_summary, summarize};

const MODE_POSITION: u8 = 0;
const STATE_READY: u8 = 0;

/// Faults that end the run. Per-reading problems never show up here.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("arm fault: {0}")]
    Arm(#[from] ArmError),
    #[error("sensor transport fault: {0}")]
    Sensor(#[from] SensorLinkError),
    #[error("reading log unavailable: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    Idle,
    Approaching,
    Measuring,
    ReadingSensor,
    Accepted,
    Rejected,
    Retracting,
    NextWaypoint,
    AlertHalt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleState {
    pub waypoint_index: usize,
    /// Starts at 1 and never resets during a run
    pub batch_counter: u64,
    pub alert_raised: bool,
}

impl Default for CycleState {
    fn default() -> Self {
        CycleState {
            waypoint_index: 0,
            batch_counter: 1,
            alert_raised: false,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CycleSettings {
    pub speed: f64,
    pub dwell: Duration,
    pub line_voltage: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AlertHalt { batch: u64, status: StatusFlag },
    Interrupted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternOutcome {
    Completed,
    Halted(StatusFlag),
}

enum VisitOutcome {
    Continue,
    Halt(StatusFlag),
}

pub struct CycleController<A, S, N, C> {
    arm: A,
    sensor: S,
    classifier: ThresholdClassifier<C>,
    store: ReadingStore,
    dispatcher: AlertDispatcher<N>,
    waypoints: Vec<Waypoint>,
    settings: CycleSettings,
    state: CycleState,
    phase: CyclePhase,
    run_started: OffsetDateTime,
    last_summary: Option<RunSummary>,
}

impl<A, S, N, C> CycleController<A, S, N, C>
where
    A: Arm,
    S: SensorLink,
    N: Notifier,
    C: CurrentSource,
{
    pub fn new(
        arm: A,
        sensor: S,
        classifier: ThresholdClassifier<C>,
        store: ReadingStore,
        dispatcher: AlertDispatcher<N>,
        waypoints: Vec<Waypoint>,
        settings: CycleSettings,
    ) -> Self {
        CycleController {
            arm,
            sensor,
            classifier,
            store,
            dispatcher,
            waypoints,
            settings,
            state: CycleState::default(),
            phase: CyclePhase::Idle,
            run_started: OffsetDateTime::now_utc(),
            last_summary: None,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub fn last_summary(&self) -> Option<&RunSummary> {
        self.last_summary.as_ref()
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!("Cycle phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    /// Bring the arm to a known state and create the reading log
    ///
    /// A log that cannot be created stops the run before any inspection
    /// motion.
    pub async fn prepare(&mut self) -> Result<(), CycleError> {
        info!("Initialising arm");
        self.arm.enable_motion().await?;
        self.arm.set_mode(MODE_POSITION).await?;
        self.arm.set_state(STATE_READY).await?;
        self.arm.reset(true).await?;
        info!("Arm connected and initialised");

        self.store.init().await?;
        Ok(())
    }

    /// Prepare, then repeat the waypoint pattern until an alert halts it
    pub async fn start(&mut self) -> Result<RunOutcome, CycleError> {
        self.prepare().await?;
        self.run().await
    }

    /// Repeat the waypoint pattern until an alert halts it
    pub async fn run(&mut self) -> Result<RunOutcome, CycleError> {
        loop {
            info!("--- Starting {}-point pattern ---", self.waypoints.len());
            match self.run_pattern().await? {
                PatternOutcome::Completed => {
                    info!("--- Pattern finished, repeating ---");
                }
                PatternOutcome::Halted(status) => {
                    info!("--- Stopping routine (alert processed) ---");
                    return Ok(RunOutcome::AlertHalt {
                        batch: self.state.batch_counter,
                        status,
                    });
                }
            }
        }
    }

    /// Visit every waypoint once, stopping at the first alert
    pub async fn run_pattern(&mut self) -> Result<PatternOutcome, CycleError> {
        for index in 0..self.waypoints.len() {
            self.state.waypoint_index = index;
            let waypoint = self.waypoints[index].clone();

            if let VisitOutcome::Halt(status) = self.visit(&waypoint).await? {
                return Ok(PatternOutcome::Halted(status));
            }
        }
        Ok(PatternOutcome::Completed)
    }

    async fn visit(&mut self, waypoint: &Waypoint) -> Result<VisitOutcome, CycleError> {
        let batch = format!("Lote {}", self.state.batch_counter);
        let speed = self.settings.speed;

        self.enter(CyclePhase::Approaching);
        info!("[{}] Moving to approach position ({})", batch, waypoint.label);
        self.arm.move_to(&waypoint.approach, speed, true).await?;

        self.enter(CyclePhase::Measuring);
        info!("[{}] Lowering sensor to measure", batch);
        self.arm.move_to(&waypoint.measure, speed, true).await?;
        info!(
            "[{}] Measuring (waiting {} seconds)",
            batch,
            self.settings.dwell.as_secs()
        );
        sleep(self.settings.dwell).await;

        self.enter(CyclePhase::ReadingSensor);
        let raw = self.sensor.read_frame().await?;
        let reading = match parse_frame(&raw) {
            Ok(frame) => Some(self.classifier.classify(&frame)),
            Err(reason) => {
                warn!("[{}] Frame rejected: {}", batch, reason);
                None
            }
        };

        match reading {
            Some(reading) if reading.is_plausible() => {
                self.enter(CyclePhase::Accepted);
                self.accept(&batch, &reading).await;
            }
            _ => {
                self.enter(CyclePhase::Rejected);
                warn!("[{}] Reading failed, nothing stored for this batch", batch);
            }
        }

        // The sensor stays at the measurement pose when an alert halts the cycle
        if let Some(reading) = reading.filter(|r| r.status.is_alert()) {
            self.enter(CyclePhase::AlertHalt);
            self.state.alert_raised = true;
            if let Err(e) = self
                .dispatcher
                .dispatch(reading.temperature, reading.current, reading.status)
                .await
            {
                warn!("[{}] Alert not delivered, halting anyway: {}", batch, e);
            }
            return Ok(VisitOutcome::Halt(reading.status));
        }

        self.enter(CyclePhase::Retracting);
        info!("[{}] Measurement complete, retracting sensor", batch);
        self.arm.move_to(&waypoint.approach, speed, true).await?;

        self.state.batch_counter += 1;
        self.enter(CyclePhase::NextWaypoint);
        Ok(VisitOutcome::Continue)
    }

    async fn accept(&mut self, batch: &str, reading: &Reading) {
        info!(
            "   ... T={}°C, H={}%, V={:.2}V, I(sim)={:.2}A, units={} (status={})",
            reading.temperature,
            reading.humidity,
            reading.voltage,
            reading.current,
            reading.unit_count,
            reading.status
        );

        let timestamp = format_timestamp(&OffsetDateTime::now_utc());
        if let Err(e) = self.store.append(batch, reading, &timestamp).await {
            warn!("[{}] Reading kept in memory only: {}", batch, e);
        }

        self.last_summary = summarize(
            self.store.records(),
            self.settings.line_voltage,
            self.run_started,
            OffsetDateTime::now_utc(),
        );
        match &self.last_summary {
            Some(summary) => log_summary(summary),
            None => info!("No data to analyse"),
        }
    }

    /// Return the arm home and release the connection
    ///
    /// Best effort: failures are logged and the sequence keeps going.
    pub async fn shutdown(&mut self) {
        info!("--- Routine finished ---");
        info!("Returning to home position (reset)");
        if let Err(e) = self.arm.reset(true).await {
            error!("Reset during shutdown failed: {}", e);
        }
        info!("Disconnecting from arm");
        if let Err(e) = self.arm.disconnect().await {
            error!("Disconnect failed: {}", e);
        }
    }

    /// Run `shutdown` unless `abort` resolves first
    ///
    /// Returns false when the sequence was abandoned part way.
    pub async fn shutdown_or_abort<F>(&mut self, abort: F) -> bool
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = self.shutdown() => true,
            _ = abort => {
                warn!("Shutdown abandoned, the arm may not be at home");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::mailer::NotifyError;
    use crate::alert::message::AlertMessage;
    use crate::alert::AlertLimits;
    use crate::models::Pose;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::collections::VecDeque;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum ArmCall {
        EnableMotion,
        SetMode(u8),
        SetState(u8),
        Reset,
        MoveTo(Pose),
        Disconnect,
    }

    #[derive(Clone, Default)]
    struct FakeArm {
        calls: Arc<Mutex<Vec<ArmCall>>>,
        // Homing never finishes
        stall_reset: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Arm for FakeArm {
        async fn enable_motion(&mut self) -> Result<(), ArmError> {
            self.calls.lock().unwrap().push(ArmCall::EnableMotion);
            Ok(())
        }

        async fn set_mode(&mut self, mode: u8) -> Result<(), ArmError> {
            self.calls.lock().unwrap().push(ArmCall::SetMode(mode));
            Ok(())
        }

        async fn set_state(&mut self, state: u8) -> Result<(), ArmError> {
            self.calls.lock().unwrap().push(ArmCall::SetState(state));
            Ok(())
        }

        async fn reset(&mut self, _wait: bool) -> Result<(), ArmError> {
            self.calls.lock().unwrap().push(ArmCall::Reset);
            if self.stall_reset.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn move_to(&mut self, pose: &Pose, _speed: f64, wait: bool) -> Result<(), ArmError> {
            assert!(wait, "inspection motion must block");
            self.calls.lock().unwrap().push(ArmCall::MoveTo(*pose));
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), ArmError> {
            self.calls.lock().unwrap().push(ArmCall::Disconnect);
            Ok(())
        }
    }

    struct ScriptedSensor {
        lines: VecDeque<String>,
    }

    #[async_trait]
    impl SensorLink for ScriptedSensor {
        async fn read_frame(&mut self) -> Result<String, SensorLinkError> {
            self.lines.pop_front().ok_or_else(|| {
                SensorLinkError::Read(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "script exhausted",
                ))
            })
        }
    }

    #[derive(Clone, Default)]
    struct Outbox {
        sent: Arc<Mutex<Vec<AlertMessage>>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn send(&self, message: &AlertMessage) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                let bad: Result<lettre::message::Mailbox, _> = "unreachable".parse();
                return Err(bad.unwrap_err().into());
            }
            Ok(())
        }
    }

    struct FixedCurrent(f64);

    impl CurrentSource for FixedCurrent {
        fn sample(&mut self) -> f64 {
            self.0
        }
    }

    const LIMITS: AlertLimits = AlertLimits {
        high_temperature: 60.0,
        low_temperature: 10.0,
        current_ceiling: 2.0,
    };

    const OK_FRAME: &str = "OK:T=25.0,H=40.0,V=220.0";
    const HIGH_FRAME: &str = "ALERTA_ALTA:T=65.0,H=40.0,V=219.0";

    fn waypoint(n: usize) -> Waypoint {
        let y = n as f64 * 100.0;
        Waypoint {
            label: format!("Punto {}", n + 1),
            approach: Pose::new(269.0, y, 250.0, -180.0, 0.0, -90.0),
            measure: Pose::new(269.0, y, 132.0, -180.0, 0.0, -90.0),
        }
    }

    type TestController = CycleController<FakeArm, ScriptedSensor, Outbox, FixedCurrent>;

    fn controller(
        lines: &[&str],
        current: f64,
        waypoints: usize,
        csv: &Path,
        outbox: Outbox,
    ) -> (TestController, FakeArm) {
        let arm = FakeArm::default();
        let controller = CycleController::new(
            arm.clone(),
            ScriptedSensor {
                lines: lines.iter().map(|l| l.to_string()).collect(),
            },
            ThresholdClassifier::new(LIMITS.current_ceiling, FixedCurrent(current)),
            ReadingStore::new(csv),
            AlertDispatcher::new(outbox, LIMITS),
            (0..waypoints).map(waypoint).collect(),
            CycleSettings {
                speed: 500.0,
                dwell: Duration::ZERO,
                line_voltage: 220.0,
            },
        );
        (controller, arm)
    }

    fn csv_rows(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .map(|contents| contents.lines().count().saturating_sub(1))
            .unwrap_or(0)
    }

    fn moves(arm: &FakeArm) -> Vec<Pose> {
        arm.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|call| match call {
                ArmCall::MoveTo(pose) => Some(*pose),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn ok_frame_is_persisted_and_cycle_continues() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let outbox = Outbox::default();
        let (mut controller, arm) = controller(&[OK_FRAME], 1.9, 1, &csv, outbox.clone());
        controller.prepare().await.unwrap();

        let outcome = controller.run_pattern().await.unwrap();

        assert_eq!(outcome, PatternOutcome::Completed);
        assert_eq!(controller.store().records().len(), 1);
        let reading = controller.store().records()[0].reading;
        assert_eq!(reading.status, StatusFlag::Ok);
        assert_eq!(reading.unit_count, 1);
        assert_eq!(reading.current, 1.9);
        assert_eq!(controller.store().records()[0].label, "Lote 1");
        assert_eq!(csv_rows(&csv), 1);
        assert!(outbox.sent.lock().unwrap().is_empty());
        assert_eq!(controller.state().batch_counter, 2);
        assert_eq!(controller.phase(), CyclePhase::NextWaypoint);

        let wp = waypoint(0);
        assert_eq!(moves(&arm), vec![wp.approach, wp.measure, wp.approach]);

        let summary = controller.last_summary().unwrap();
        assert_eq!(summary.total_units, 1);
        assert_eq!(summary.locations[0].temperature, 25.0);
    }

    #[tokio::test]
    async fn high_alert_frame_dispatches_and_halts() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let outbox = Outbox::default();
        let (mut controller, arm) = controller(&[HIGH_FRAME], 1.9, 3, &csv, outbox.clone());

        let outcome = controller.start().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::AlertHalt {
                batch: 1,
                status: StatusFlag::AlertHigh
            }
        );
        assert!(controller.state().alert_raised);
        assert_eq!(controller.phase(), CyclePhase::AlertHalt);
        assert_eq!(controller.store().records().len(), 1);
        assert_eq!(csv_rows(&csv), 1);

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text_body.contains("65.0°C"));

        // No retraction after the alert
        let wp = waypoint(0);
        assert_eq!(moves(&arm), vec![wp.approach, wp.measure]);
    }

    #[tokio::test]
    async fn empty_frame_is_skipped_and_batch_advances() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let outbox = Outbox::default();
        let (mut controller, _) = controller(&[""], 1.9, 1, &csv, outbox.clone());
        controller.prepare().await.unwrap();

        let outcome = controller.run_pattern().await.unwrap();

        assert_eq!(outcome, PatternOutcome::Completed);
        assert!(controller.store().records().is_empty());
        assert_eq!(csv_rows(&csv), 0);
        assert_eq!(controller.state().batch_counter, 2);
        assert!(controller.last_summary().is_none());
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let (mut controller, _) =
            controller(&["OK:T=abc,H=40.0,V=1"], 1.9, 1, &csv, Outbox::default());
        controller.prepare().await.unwrap();

        let outcome = controller.run_pattern().await.unwrap();

        assert_eq!(outcome, PatternOutcome::Completed);
        assert!(controller.store().records().is_empty());
        assert_eq!(csv_rows(&csv), 0);
        assert_eq!(controller.state().batch_counter, 2);
        assert!(!controller.state().alert_raised);
    }

    #[tokio::test]
    async fn simulated_current_escalates_ok_frame() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let outbox = Outbox::default();
        let (mut controller, _) = controller(&[OK_FRAME], 2.05, 2, &csv, outbox.clone());

        let outcome = controller.start().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::AlertHalt {
                batch: 1,
                status: StatusFlag::AlertHigh
            }
        );
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn implausible_alert_frame_halts_without_persisting() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let outbox = Outbox::default();
        let (mut controller, _) =
            controller(&["ALERTA_BAJA:T=0,H=0,V=1"], 1.8, 2, &csv, outbox.clone());

        let outcome = controller.start().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::AlertHalt {
                batch: 1,
                status: StatusFlag::AlertLow
            }
        );
        assert!(controller.store().records().is_empty());
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failed_mail_still_halts() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let outbox = Outbox {
            fail: true,
            ..Default::default()
        };
        let (mut controller, _) = controller(&[HIGH_FRAME], 1.9, 2, &csv, outbox.clone());

        let outcome = controller.start().await.unwrap();

        assert!(matches!(outcome, RunOutcome::AlertHalt { .. }));
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn pattern_repeats_until_alert() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let lines = [OK_FRAME, "", "boot: rst:0x1", OK_FRAME, "ErrorT_H", HIGH_FRAME];
        let (mut controller, arm) = controller(&lines, 1.9, 2, &csv, Outbox::default());

        let outcome = controller.start().await.unwrap();

        // Five completed visits over two full patterns plus the alerting one
        assert_eq!(
            outcome,
            RunOutcome::AlertHalt {
                batch: 6,
                status: StatusFlag::AlertHigh
            }
        );
        assert_eq!(controller.state().waypoint_index, 1);
        assert_eq!(controller.store().records().len(), 3);
        assert_eq!(csv_rows(&csv), 3);
        let labels: Vec<&str> = controller
            .store()
            .records()
            .iter()
            .map(|r| r.label.as_str())
            .collect();
        assert_eq!(labels, vec!["Lote 1", "Lote 4", "Lote 6"]);
        // 5 visits with retraction, 1 without
        assert_eq!(moves(&arm).len(), 5 * 3 + 2);
    }

    #[tokio::test]
    async fn sensor_transport_fault_ends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let (mut controller, _) = controller(&[OK_FRAME], 1.9, 2, &csv, Outbox::default());

        let result = controller.start().await;

        assert!(matches!(result, Err(CycleError::Sensor(_))));
        assert_eq!(controller.store().records().len(), 1);
    }

    #[tokio::test]
    async fn prepare_initialises_arm_before_log() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("log.csv");
        let (mut controller, arm) = controller(&[], 1.9, 1, &csv, Outbox::default());

        controller.prepare().await.unwrap();

        assert_eq!(
            *arm.calls.lock().unwrap(),
            vec![
                ArmCall::EnableMotion,
                ArmCall::SetMode(0),
                ArmCall::SetState(0),
                ArmCall::Reset
            ]
        );
        assert!(csv.exists());
    }

    #[tokio::test]
    async fn log_failure_at_startup_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("missing").join("log.csv");
        let (mut controller, arm) = controller(&[OK_FRAME], 1.9, 1, &csv, Outbox::default());

        let result = controller.start().await;

        assert!(matches!(result, Err(CycleError::Store(_))));
        assert!(moves(&arm).is_empty());
    }

    #[tokio::test]
    async fn append_failure_keeps_aggregating() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("missing").join("log.csv");
        let (mut controller, _) = controller(&[OK_FRAME], 1.9, 1, &csv, Outbox::default());

        let outcome = controller.run_pattern().await.unwrap();

        assert_eq!(outcome, PatternOutcome::Completed);
        assert_eq!(controller.store().records().len(), 1);
        assert_eq!(controller.last_summary().unwrap().total_units, 1);
    }

    #[tokio::test]
    async fn shutdown_resets_then_disconnects() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, arm) =
            controller(&[], 1.9, 1, &dir.path().join("log.csv"), Outbox::default());

        controller.shutdown().await;

        assert_eq!(
            *arm.calls.lock().unwrap(),
            vec![ArmCall::Reset, ArmCall::Disconnect]
        );
    }

    #[tokio::test]
    async fn shutdown_completes_without_abort() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, arm) =
            controller(&[], 1.9, 1, &dir.path().join("log.csv"), Outbox::default());

        let completed = controller
            .shutdown_or_abort(std::future::pending::<()>())
            .await;

        assert!(completed);
        assert_eq!(
            *arm.calls.lock().unwrap(),
            vec![ArmCall::Reset, ArmCall::Disconnect]
        );
    }

    #[tokio::test]
    async fn second_interrupt_abandons_stalled_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (mut controller, arm) =
            controller(&[], 1.9, 1, &dir.path().join("log.csv"), Outbox::default());
        arm.stall_reset.store(true, Ordering::SeqCst);

        let completed = controller
            .shutdown_or_abort(sleep(Duration::from_millis(50)))
            .await;

        assert!(!completed);
        assert_eq!(*arm.calls.lock().unwrap(), vec![ArmCall::Reset]);
    }

    const NON_ALERT_FRAMES: [&str; 6] = [
        OK_FRAME,
        "",
        "ErrorT_H",
        "rst:0x1 (POWERON_RESET)",
        "OK:T=abc,H=40.0,V=1",
        "OK:T=0,H=0,V=219.5",
    ];

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn batch_counter_and_persistence_invariants(
            picks in proptest::collection::vec(0usize..NON_ALERT_FRAMES.len(), 0..20),
            waypoints in 1usize..5,
        ) {
            let mut lines: Vec<&str> = picks.iter().map(|i| NON_ALERT_FRAMES[*i]).collect();
            lines.push(HIGH_FRAME);
            let plausible = picks.iter().filter(|i| **i == 0).count() + 1;

            let dir = tempfile::tempdir().unwrap();
            let csv = dir.path().join("log.csv");
            let (mut controller, _) = controller(&lines, 1.9, waypoints, &csv, Outbox::default());

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let outcome = runtime.block_on(controller.start()).unwrap();

            prop_assert_eq!(
                outcome,
                RunOutcome::AlertHalt { batch: picks.len() as u64 + 1, status: StatusFlag::AlertHigh }
            );
            prop_assert_eq!(controller.store().records().len(), plausible);
            prop_assert_eq!(csv_rows(&csv), plausible);
            prop_assert!(controller.store().records().iter().all(|r| r.reading.unit_count == 1));
        }
    }
}
