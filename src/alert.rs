//! Hysteresis-gated leak alerts and the sinks that deliver them

use crate::errors::{MonitorError, Result};
use crate::sensor::{LeakPercentage, SensorConfig};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::warn;

/// Default notification threshold in percent.
pub const DEFAULT_ALERT_THRESHOLD: f64 = 20.0;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    /// Next above-threshold reading dispatches a notification
    Armed,
    /// Already notified for the current excursion
    Fired,
}

/// Outcome of evaluating one leak value against a gate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlertDecision {
    /// Armed -> Fired, a notification must be sent
    Dispatch,
    /// Fired -> Armed, value dropped back to or below threshold
    Rearm,
    /// No transition
    Hold,
}

/// Per-sensor two-state latch. One notification per excursion above threshold.
#[derive(Debug, Clone, Copy)]
pub struct AlertGate {
    state: GateState,
}

impl AlertGate {
    pub fn new() -> Self {
        Self { state: GateState::Armed }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn evaluate(&mut self, leak: LeakPercentage, threshold_percent: f64) -> AlertDecision {
        let above = leak.value() > threshold_percent;

        match (self.state, above) {
            (GateState::Armed, true) => {
                self.state = GateState::Fired;
                AlertDecision::Dispatch
            }
            (GateState::Fired, false) => {
                self.state = GateState::Armed;
                AlertDecision::Rearm
            }
            _ => AlertDecision::Hold,
        }
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new()
    }
}

/// User-visible text for a leak alert.
pub fn alert_message(sensor: &SensorConfig, leak: LeakPercentage) -> String {
    format!("Leak at {}: {}", sensor.name.to_uppercase(), leak)
}

/// Receives leak notifications. Delivery at most once per excursion is the
/// monitor's job, not the sink's.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn notify(&self, sensor_id: &str, message: &str) -> Result<()>;
}

/// Emits each alert as a structured warning event.
#[derive(Debug, Default, Clone)]
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn notify(&self, sensor_id: &str, message: &str) -> Result<()> {
        warn!(sensor_id, alert = message, "Leak alert");
        Ok(())
    }
}

/// Notification delivered to a front-end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub sensor_id: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Forwards alerts over a channel to whatever renders them.
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl AlertSink for ChannelAlertSink {
    async fn notify(&self, sensor_id: &str, message: &str) -> Result<()> {
        let notification = Notification {
            sensor_id: sensor_id.to_string(),
            message: message.to_string(),
            raised_at: Utc::now(),
        };

        self.tx
            .send(notification)
            .map_err(|_| MonitorError::Other("notification receiver dropped".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leak(value: f64) -> LeakPercentage {
        LeakPercentage::new(value)
    }

    #[test]
    fn test_gate_starts_armed() {
        assert_eq!(AlertGate::new().state(), GateState::Armed);
    }

    #[test]
    fn test_single_dispatch_per_excursion() {
        let mut gate = AlertGate::new();
        let decisions: Vec<AlertDecision> = [10.0, 25.0, 30.0, 15.0, 28.0]
            .into_iter()
            .map(|value| gate.evaluate(leak(value), 20.0))
            .collect();

        assert_eq!(
            decisions,
            vec![
                AlertDecision::Hold,
                AlertDecision::Dispatch,
                AlertDecision::Hold,
                AlertDecision::Rearm,
                AlertDecision::Dispatch,
            ]
        );
        assert_eq!(gate.state(), GateState::Fired);
    }

    #[test]
    fn test_value_at_threshold_rearms() {
        let mut gate = AlertGate::new();
        assert_eq!(gate.evaluate(leak(20.0), 20.0), AlertDecision::Hold);
        assert_eq!(gate.evaluate(leak(20.1), 20.0), AlertDecision::Dispatch);
        assert_eq!(gate.evaluate(leak(20.0), 20.0), AlertDecision::Rearm);
        assert_eq!(gate.evaluate(leak(5.0), 20.0), AlertDecision::Hold);
        assert_eq!(gate.state(), GateState::Armed);
    }

    #[test]
    fn test_alert_message_format() {
        let sensor = SensorConfig::gas("gas-tank", "Tank", 2500.0, 4000.0, "/api/gas").unwrap();
        assert_eq!(alert_message(&sensor, leak(25.26)), "Leak at TANK: 25.3%");
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelAlertSink::new();
        sink.notify("gas-tank", "Leak at TANK: 30.0%").await.unwrap();

        let notification = rx.recv().await.unwrap();
        assert_eq!(notification.sensor_id, "gas-tank");
        assert_eq!(notification.message, "Leak at TANK: 30.0%");
    }

    #[tokio::test]
    async fn test_channel_sink_reports_closed_receiver() {
        let (sink, rx) = ChannelAlertSink::new();
        drop(rx);
        assert!(sink.notify("gas-tank", "Leak").await.is_err());
    }
}
