//! Sensor polling loop with leak evaluation and hysteresis-gated alerts

use crate::alert::{AlertDecision, AlertGate, AlertSink, DEFAULT_ALERT_THRESHOLD, GateState, alert_message};
use crate::config::Config;
use crate::errors::{MonitorError, Result};
use crate::history::{DEFAULT_HISTORY_CAPACITY, RollingHistory, Trend};
use crate::sensor::{LeakPercentage, Reading, SensorConfig};
use crate::transport::SensorReadingSource;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Failures logged at warn level before a sensor goes quiet.
const MAX_LOUD_FAILURES: u32 = 10;

/// Tunables for a [`SensorMonitor`].
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub fetch_timeout: Duration,
    pub alert_threshold_percent: f64,
    pub history_capacity: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_millis(3000),
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl From<&Config> for MonitorSettings {
    fn from(config: &Config) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout,
            alert_threshold_percent: config.alert_threshold_percent,
            history_capacity: config.history_capacity,
        }
    }
}

/// Derived state for one sensor. Only the poll loop mutates it.
#[derive(Debug, Clone)]
struct SensorState {
    last_reading: Option<Reading>,
    last_leak: Option<LeakPercentage>,
    history: RollingHistory,
    gate: AlertGate,
    consecutive_failures: u32,
    total_failures: u64,
    alerts_sent: u64,
    last_error: Option<String>,
}

impl SensorState {
    fn new(history_capacity: usize) -> Self {
        Self {
            last_reading: None,
            last_leak: None,
            history: RollingHistory::new(history_capacity),
            gate: AlertGate::new(),
            consecutive_failures: 0,
            total_failures: 0,
            alerts_sent: 0,
            last_error: None,
        }
    }
}

/// Alert decided during a cycle, awaiting delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAlert {
    pub sensor_id: String,
    pub message: String,
}

/// What happened during one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    pub updated: Vec<String>,
    pub failed: Vec<String>,
    pub alerts: Vec<PendingAlert>,
}

/// Immutable view of one sensor after a cycle.
#[derive(Debug, Clone, Serialize)]
pub struct SensorSnapshot {
    pub id: String,
    pub name: String,
    pub last_raw: Option<i64>,
    pub last_read_at: Option<DateTime<Utc>>,
    pub leak: Option<LeakPercentage>,
    pub remaining: Option<f64>,
    pub history: Vec<LeakPercentage>,
    pub remaining_history: Vec<f64>,
    pub average: Option<f64>,
    pub peak: Option<LeakPercentage>,
    pub trend: Trend,
    pub gate: GateState,
    pub threshold_percent: f64,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub alerts_sent: u64,
    pub last_error: Option<String>,
}

/// Immutable view of the whole monitor, published after every cycle.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub monitor_id: String,
    pub cycle: u64,
    pub taken_at: DateTime<Utc>,
    pub sensors: Vec<SensorSnapshot>,
}

impl MonitorSnapshot {
    pub fn sensor(&self, sensor_id: &str) -> Option<&SensorSnapshot> {
        self.sensors.iter().find(|s| s.id == sensor_id)
    }
}

/// Polls every registered sensor, keeps its history and gates its alerts.
pub struct SensorMonitor {
    monitor_id: String,
    sensors: Vec<SensorConfig>,
    states: HashMap<String, SensorState>,
    source: Arc<dyn SensorReadingSource>,
    sink: Arc<dyn AlertSink>,
    settings: MonitorSettings,
    cycle: u64,
    snapshots: watch::Sender<Arc<MonitorSnapshot>>,
}

impl SensorMonitor {
    /// Register sensors. Every gate starts Armed and every history empty.
    pub fn new(
        sensors: Vec<SensorConfig>,
        source: Arc<dyn SensorReadingSource>,
        sink: Arc<dyn AlertSink>,
        settings: MonitorSettings,
    ) -> Result<Self> {
        if sensors.is_empty() {
            return Err(MonitorError::Config("no sensors to monitor".to_string()));
        }

        if settings.fetch_timeout.is_zero() {
            return Err(MonitorError::Config("fetch_timeout must be greater than 0".to_string()));
        }

        let mut seen = HashSet::new();
        for sensor in &sensors {
            sensor.validate()?;
            if !seen.insert(sensor.id.clone()) {
                return Err(MonitorError::Config(format!("duplicate sensor id {}", sensor.id)));
            }
        }

        let states = sensors
            .iter()
            .map(|sensor| (sensor.id.clone(), SensorState::new(settings.history_capacity)))
            .collect();

        let monitor_id = Uuid::new_v4().to_string();
        let (snapshots, _) = watch::channel(Arc::new(MonitorSnapshot {
            monitor_id: monitor_id.clone(),
            cycle: 0,
            taken_at: Utc::now(),
            sensors: Vec::new(),
        }));

        let monitor = Self {
            monitor_id,
            sensors,
            states,
            source,
            sink,
            settings,
            cycle: 0,
            snapshots,
        };
        monitor.publish();

        Ok(monitor)
    }

    pub fn monitor_id(&self) -> &str {
        &self.monitor_id
    }

    pub fn sensors(&self) -> &[SensorConfig] {
        &self.sensors
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Leak percentage for a reading under a sensor's calibration.
    pub fn on_reading(sensor: &SensorConfig, reading: &Reading) -> LeakPercentage {
        sensor.leak_percentage(reading.value)
    }

    /// Threshold in force for a sensor.
    pub fn threshold_for(&self, sensor: &SensorConfig) -> f64 {
        sensor
            .threshold_percent
            .unwrap_or(self.settings.alert_threshold_percent)
    }

    /// Append to a sensor's rolling history.
    pub fn record_history(&mut self, sensor_id: &str, leak: LeakPercentage) -> Result<()> {
        let state = self.state_mut(sensor_id)?;
        state.history.push(leak);
        Ok(())
    }

    /// Run a leak value through a sensor's gate.
    pub fn evaluate_alert(
        &mut self,
        sensor_id: &str,
        leak: LeakPercentage,
        threshold_percent: f64,
    ) -> Result<AlertDecision> {
        let state = self.state_mut(sensor_id)?;
        Ok(state.gate.evaluate(leak, threshold_percent))
    }

    fn state_mut(&mut self, sensor_id: &str) -> Result<&mut SensorState> {
        self.states
            .get_mut(sensor_id)
            .ok_or_else(|| MonitorError::UnknownSensor(sensor_id.to_string()))
    }

    /// Receiver for the snapshots published after each cycle.
    pub fn subscribe(&self) -> watch::Receiver<Arc<MonitorSnapshot>> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> Arc<MonitorSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// One full cycle: fetch every sensor, apply the results, deliver alerts.
    pub async fn poll_once(&mut self) -> CycleReport {
        let outcomes = self.fetch_all().await;
        let report = self.apply(outcomes);
        self.dispatch(&report.alerts).await;
        report
    }

    /// Fetch all sensors concurrently, each bounded by the fetch timeout.
    async fn fetch_all(&self) -> Vec<Result<Reading>> {
        let fetch_timeout = self.settings.fetch_timeout;

        let fetches = self.sensors.iter().map(|sensor| async move {
            match timeout(fetch_timeout, self.source.fetch(sensor)).await {
                Ok(result) => result,
                Err(_) => Err(MonitorError::Transport(format!(
                    "fetch timed out after {}ms",
                    fetch_timeout.as_millis()
                ))),
            }
        });

        join_all(fetches).await
    }

    /// Merge fetch outcomes into per-sensor state. Synchronous, so a reading
    /// either lands fully or not at all.
    fn apply(&mut self, outcomes: Vec<Result<Reading>>) -> CycleReport {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };

        for (index, outcome) in outcomes.into_iter().enumerate() {
            let Some(sensor) = self.sensors.get(index).cloned() else {
                continue;
            };

            match outcome {
                Ok(reading) => match self.apply_reading(&sensor, reading) {
                    Ok(alert) => {
                        report.updated.push(sensor.id.clone());
                        report.alerts.extend(alert);
                    }
                    Err(e) => {
                        error!(sensor_id = %sensor.id, "Failed to apply reading: {}", e);
                        report.failed.push(sensor.id.clone());
                    }
                },
                Err(e) => {
                    self.record_failure(&sensor, &e);
                    report.failed.push(sensor.id.clone());
                }
            }
        }

        self.publish();

        debug!(
            cycle = report.cycle,
            updated = report.updated.len(),
            failed = report.failed.len(),
            alerts = report.alerts.len(),
            "Poll cycle complete"
        );

        report
    }

    fn apply_reading(&mut self, sensor: &SensorConfig, reading: Reading) -> Result<Option<PendingAlert>> {
        let leak = Self::on_reading(sensor, &reading);
        let threshold = self.threshold_for(sensor);

        self.record_history(&sensor.id, leak)?;
        let decision = self.evaluate_alert(&sensor.id, leak, threshold)?;

        let state = self.state_mut(&sensor.id)?;
        if state.consecutive_failures > 0 {
            info!(
                sensor_id = %sensor.id,
                "Sensor recovered after {} failed fetches",
                state.consecutive_failures
            );
        }
        state.last_reading = Some(reading);
        state.last_leak = Some(leak);
        state.consecutive_failures = 0;
        state.last_error = None;

        match decision {
            AlertDecision::Dispatch => {
                state.alerts_sent += 1;
                info!(sensor_id = %sensor.id, %leak, threshold, "Leak threshold crossed");
                Ok(Some(PendingAlert {
                    sensor_id: sensor.id.clone(),
                    message: alert_message(sensor, leak),
                }))
            }
            AlertDecision::Rearm => {
                info!(sensor_id = %sensor.id, %leak, threshold, "Leak back under threshold, alert re-armed");
                Ok(None)
            }
            AlertDecision::Hold => Ok(None),
        }
    }

    fn record_failure(&mut self, sensor: &SensorConfig, err: &MonitorError) {
        let Ok(state) = self.state_mut(&sensor.id) else {
            return;
        };

        state.consecutive_failures += 1;
        state.total_failures += 1;
        state.last_error = Some(err.to_string());

        let attempts = state.consecutive_failures;
        if !err.is_transport() {
            error!(sensor_id = %sensor.id, "Fetch failed with a non-transport error: {}", err);
        } else if attempts < MAX_LOUD_FAILURES {
            warn!(sensor_id = %sensor.id, "Fetch failed (attempt {}): {}", attempts, err);
        } else if attempts == MAX_LOUD_FAILURES {
            error!(
                sensor_id = %sensor.id,
                "Sensor failed {} consecutive fetches, further failures logged at debug: {}",
                attempts,
                err
            );
        } else {
            debug!(sensor_id = %sensor.id, "Fetch failed (attempt {}): {}", attempts, err);
        }
    }

    /// Deliver alerts. A failing sink is logged; the gate stays Fired.
    async fn dispatch(&self, alerts: &[PendingAlert]) {
        for alert in alerts {
            if let Err(e) = self.sink.notify(&alert.sensor_id, &alert.message).await {
                error!(sensor_id = %alert.sensor_id, "Failed to deliver alert: {}", e);
            }
        }
    }

    fn build_snapshot(&self) -> MonitorSnapshot {
        let sensors = self
            .sensors
            .iter()
            .filter_map(|sensor| {
                let state = self.states.get(&sensor.id)?;
                let history = state.history.to_vec();

                Some(SensorSnapshot {
                    id: sensor.id.clone(),
                    name: sensor.name.clone(),
                    last_raw: state.last_reading.as_ref().map(|r| r.value),
                    last_read_at: state.last_reading.as_ref().map(|r| r.taken_at),
                    leak: state.last_leak,
                    remaining: state.last_leak.map(LeakPercentage::remaining),
                    remaining_history: history.iter().map(|l| l.remaining()).collect(),
                    history,
                    average: state.history.average(),
                    peak: state.history.peak(),
                    trend: state.history.trend(),
                    gate: state.gate.state(),
                    threshold_percent: self.threshold_for(sensor),
                    consecutive_failures: state.consecutive_failures,
                    total_failures: state.total_failures,
                    alerts_sent: state.alerts_sent,
                    last_error: state.last_error.clone(),
                })
            })
            .collect();

        MonitorSnapshot {
            monitor_id: self.monitor_id.clone(),
            cycle: self.cycle,
            taken_at: Utc::now(),
            sensors,
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(Arc::new(self.build_snapshot()));
    }

    /// Poll on a fixed period until `cancel` fires.
    ///
    /// The fetch phase is abandoned on cancellation; alerts already decided
    /// are still delivered before the loop exits.
    #[instrument(skip(self, cancel), fields(monitor_id = %self.monitor_id))]
    pub async fn run(&mut self, period: Duration, cancel: CancellationToken) -> Result<()> {
        if period.is_zero() {
            return Err(MonitorError::Config("poll interval must be greater than 0".to_string()));
        }

        info!(
            "Starting sensor monitor for {} sensors every {}ms",
            self.sensors.len(),
            period.as_millis()
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let outcomes = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                outcomes = self.fetch_all() => outcomes,
            };

            let report = self.apply(outcomes);
            self.dispatch(&report.alerts).await;
        }

        info!("Sensor monitor stopped after {} cycles", self.cycle);
        Ok(())
    }

    /// Spawn the poll loop on the runtime.
    pub fn start(self, period: Duration, cancel: CancellationToken) -> Result<MonitorHandle> {
        if period.is_zero() {
            return Err(MonitorError::Config("poll interval must be greater than 0".to_string()));
        }

        if self.settings.fetch_timeout >= period {
            warn!(
                "Fetch timeout {}ms is not shorter than the poll interval {}ms",
                self.settings.fetch_timeout.as_millis(),
                period.as_millis()
            );
        }

        let snapshots = self.subscribe();
        let task_cancel = cancel.clone();
        let mut monitor = self;

        let task = tokio::spawn(async move {
            if let Err(e) = monitor.run(period, task_cancel).await {
                error!("Sensor monitor failed: {}", e);
            }
            monitor
        });

        Ok(MonitorHandle {
            cancel,
            task,
            snapshots,
        })
    }
}

/// Running monitor task.
pub struct MonitorHandle {
    cancel: CancellationToken,
    task: JoinHandle<SensorMonitor>,
    snapshots: watch::Receiver<Arc<MonitorSnapshot>>,
}

impl MonitorHandle {
    pub fn snapshots(&self) -> watch::Receiver<Arc<MonitorSnapshot>> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> Arc<MonitorSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the loop and wait for it, handing the monitor back.
    pub async fn stop(self) -> Result<SensorMonitor> {
        self.cancel.cancel();
        self.task
            .await
            .map_err(|e| MonitorError::Other(format!("monitor task failed: {}", e)))
    }
}
