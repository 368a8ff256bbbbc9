//! Sensor calibration, raw readings and derived leak percentages

use crate::errors::{MonitorError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a sensor's raw value comes from.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorEndpoint {
    /// GET `{base}{path}` returning `{ "valor": <int> }`
    Gas { path: String },
    /// One channel of the latest entry of the water list endpoint
    Water { channel: WaterChannel },
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WaterChannel {
    Sensor1,
    Sensor2,
    Sensor3,
}

impl fmt::Display for WaterChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaterChannel::Sensor1 => write!(f, "sensor1"),
            WaterChannel::Sensor2 => write!(f, "sensor2"),
            WaterChannel::Sensor3 => write!(f, "sensor3"),
        }
    }
}

/// Identity and calibration of one monitored sensor.
///
/// `baseline` is the raw value considered "no leak" and `max_value` the raw
/// value considered a full leak. The monitor never mutates a config after
/// it has been registered.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SensorConfig {
    pub id: String,
    pub name: String,
    pub baseline: f64,
    pub max_value: f64,
    pub endpoint: SensorEndpoint,
    /// Overrides the monitor-wide alert threshold for this sensor
    #[serde(default)]
    pub threshold_percent: Option<f64>,
}

impl SensorConfig {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        baseline: f64,
        max_value: f64,
        endpoint: SensorEndpoint,
    ) -> Result<Self> {
        let config = Self {
            id: id.into(),
            name: name.into(),
            baseline,
            max_value,
            endpoint,
            threshold_percent: None,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn gas(
        id: impl Into<String>,
        name: impl Into<String>,
        baseline: f64,
        max_value: f64,
        path: impl Into<String>,
    ) -> Result<Self> {
        Self::new(id, name, baseline, max_value, SensorEndpoint::Gas { path: path.into() })
    }

    pub fn water(
        id: impl Into<String>,
        name: impl Into<String>,
        baseline: f64,
        max_value: f64,
        channel: WaterChannel,
    ) -> Result<Self> {
        Self::new(id, name, baseline, max_value, SensorEndpoint::Water { channel })
    }

    pub fn with_threshold(mut self, threshold_percent: f64) -> Self {
        self.threshold_percent = Some(threshold_percent);
        self
    }

    /// Check the calibration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(MonitorError::Config("sensor id cannot be empty".to_string()));
        }

        if !self.baseline.is_finite() || !self.max_value.is_finite() {
            return Err(MonitorError::Config(format!(
                "sensor {} calibration must be finite",
                self.id
            )));
        }

        if self.max_value <= self.baseline {
            return Err(MonitorError::Config(format!(
                "sensor {} max_value ({}) must be greater than baseline ({})",
                self.id, self.max_value, self.baseline
            )));
        }

        if let Some(threshold) = self.threshold_percent {
            if !(0.0..=100.0).contains(&threshold) {
                return Err(MonitorError::Config(format!(
                    "sensor {} threshold must be within 0-100, got {}",
                    self.id, threshold
                )));
            }
        }

        Ok(())
    }

    /// Linear interpolation of a raw value between baseline and max_value.
    pub fn leak_percentage(&self, raw: i64) -> LeakPercentage {
        let diff = raw as f64 - self.baseline;
        if diff <= 0.0 {
            return LeakPercentage::ZERO;
        }

        let span = self.max_value - self.baseline;
        LeakPercentage::new(diff * 100.0 / span)
    }
}

/// A raw sensor value at a point in time.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    pub value: i64,
    pub taken_at: DateTime<Utc>,
}

impl Reading {
    pub fn new(sensor_id: impl Into<String>, value: i64) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            value,
            taken_at: Utc::now(),
        }
    }
}

/// Leak indicator clamped to `[0, 100]`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, PartialOrd)]
#[serde(transparent)]
pub struct LeakPercentage(f64);

impl LeakPercentage {
    pub const ZERO: LeakPercentage = LeakPercentage(0.0);
    pub const FULL: LeakPercentage = LeakPercentage(100.0);

    /// NaN maps to zero.
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 100.0))
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Share of the reading still considered "no leak".
    pub fn remaining(self) -> f64 {
        (100.0 - self.0).max(0.0)
    }
}

impl fmt::Display for LeakPercentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}
