//! Configuration management for the sensor monitor

use crate::alert::DEFAULT_ALERT_THRESHOLD;
use crate::errors::{MonitorError, Result};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::sensor::{SensorConfig, SensorEndpoint};
use crate::settings::Settings;
use crate::transport::ClientConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the sensor service; falls back to the persisted setting
    pub base_url: Option<String>,

    /// Base URL of the login service; falls back to the sensor base URL
    pub auth_base_url: Option<String>,

    /// Period between poll cycles
    pub poll_interval: Duration,

    /// Bound on each individual fetch; must be shorter than the poll interval
    pub fetch_timeout: Duration,

    /// Leak percentage above which a notification fires
    pub alert_threshold_percent: f64,

    /// Entries kept in each sensor's rolling history
    pub history_capacity: usize,

    /// Path of the fan actuator endpoint
    pub fan_path: String,

    /// Path of the water list endpoint
    pub water_path: String,

    /// Directory holding the settings and image stores
    pub data_dir: PathBuf,

    /// Sensors to monitor
    pub sensors: Vec<SensorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: None,
            auth_base_url: None,
            poll_interval: Duration::from_secs(5),
            fetch_timeout: Duration::from_millis(3000),
            alert_threshold_percent: DEFAULT_ALERT_THRESHOLD,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            fan_path: "/api/ventilador".to_string(),
            water_path: "datos".to_string(),
            data_dir: PathBuf::from(".sentryhouse"),
            sensors: default_sensors(),
        }
    }
}

/// Tank and kitchen gas sensors with their bench calibration.
pub fn default_sensors() -> Vec<SensorConfig> {
    vec![
        SensorConfig {
            id: "gas-tank".to_string(),
            name: "Tank".to_string(),
            baseline: 2500.0,
            max_value: 4000.0,
            endpoint: SensorEndpoint::Gas {
                path: "/api/gas".to_string(),
            },
            threshold_percent: None,
        },
        SensorConfig {
            id: "gas-kitchen".to_string(),
            name: "Kitchen".to_string(),
            baseline: 3200.0,
            max_value: 4500.0,
            endpoint: SensorEndpoint::Gas {
                path: "/api/gasCocina".to_string(),
            },
            threshold_percent: None,
        },
    ]
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(base_url) = lookup("BASE_URL") {
            config.base_url = Some(base_url);
        }

        if let Some(auth_base_url) = lookup("AUTH_BASE_URL") {
            config.auth_base_url = Some(auth_base_url);
        }

        if let Some(interval) = lookup("POLL_INTERVAL_SECONDS") {
            if let Ok(seconds) = interval.parse::<u64>() {
                config.poll_interval = Duration::from_secs(seconds);
            }
        }

        if let Some(timeout) = lookup("FETCH_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.fetch_timeout = Duration::from_millis(ms);
            }
        }

        if let Some(threshold) = lookup("ALERT_THRESHOLD_PERCENT") {
            if let Ok(percent) = threshold.parse() {
                config.alert_threshold_percent = percent;
            }
        }

        if let Some(capacity) = lookup("HISTORY_CAPACITY") {
            if let Ok(size) = capacity.parse() {
                config.history_capacity = size;
            }
        }

        if let Some(fan_path) = lookup("FAN_PATH") {
            config.fan_path = fan_path;
        }

        if let Some(water_path) = lookup("WATER_PATH") {
            config.water_path = water_path;
        }

        if let Some(data_dir) = lookup("DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Some(sensors_file) = lookup("SENSORS_FILE") {
            config.sensors = load_sensors_file(Path::new(&sensors_file))?;
        }

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.poll_interval.is_zero() {
            return Err("poll_interval must be greater than 0".to_string());
        }

        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be greater than 0".to_string());
        }

        if self.fetch_timeout >= self.poll_interval {
            return Err("fetch_timeout must be shorter than poll_interval".to_string());
        }

        if !(0.0..=100.0).contains(&self.alert_threshold_percent) {
            return Err("alert_threshold_percent must be within 0-100".to_string());
        }

        if self.history_capacity == 0 {
            return Err("history_capacity must be greater than 0".to_string());
        }

        if self.sensors.is_empty() {
            return Err("at least one sensor must be configured".to_string());
        }

        let mut seen = HashSet::new();
        for sensor in &self.sensors {
            if !seen.insert(sensor.id.as_str()) {
                return Err(format!("duplicate sensor id {}", sensor.id));
            }
            sensor.validate().map_err(|e| e.to_string())?;
        }

        Ok(())
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn images_path(&self) -> PathBuf {
        self.data_dir.join("sensor_images.json")
    }

    /// Explicit base URL first, then the persisted setting, then the default.
    pub fn resolve_base_url(&self, settings: &Settings) -> String {
        self.base_url.clone().unwrap_or_else(|| settings.base_url())
    }

    pub fn client_config(&self, base_url: impl Into<String>) -> ClientConfig {
        ClientConfig {
            base_url: base_url.into(),
            timeout: self.fetch_timeout,
            water_path: self.water_path.clone(),
            fan_path: self.fan_path.clone(),
        }
    }
}

/// Read a JSON array of sensor definitions.
pub fn load_sensors_file(path: &Path) -> Result<Vec<SensorConfig>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        MonitorError::Config(format!("cannot read sensors file {}: {}", path.display(), e))
    })?;

    let sensors: Vec<SensorConfig> = serde_json::from_str(&contents)?;
    for sensor in &sensors {
        sensor.validate()?;
    }

    Ok(sensors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.sensors.len(), 2);
        assert_eq!(config.alert_threshold_percent, 20.0);
    }

    #[test]
    fn test_from_vars_overrides() {
        let config = Config::from_vars(vars(&[
            ("BASE_URL", "http://10.0.0.7:3000"),
            ("POLL_INTERVAL_SECONDS", "10"),
            ("FETCH_TIMEOUT_MS", "1500"),
            ("ALERT_THRESHOLD_PERCENT", "30"),
            ("HISTORY_CAPACITY", "20"),
            ("DATA_DIR", "/tmp/sentry"),
        ]))
        .unwrap();

        assert_eq!(config.base_url.as_deref(), Some("http://10.0.0.7:3000"));
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.fetch_timeout, Duration::from_millis(1500));
        assert_eq!(config.alert_threshold_percent, 30.0);
        assert_eq!(config.history_capacity, 20);
        assert_eq!(config.settings_path(), PathBuf::from("/tmp/sentry/settings.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unparseable_values_keep_defaults() {
        let config = Config::from_vars(vars(&[("POLL_INTERVAL_SECONDS", "soon")])).unwrap();
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_timeout_must_be_shorter_than_interval() {
        let config = Config {
            fetch_timeout: Duration::from_secs(5),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_sensor_ids_rejected() {
        let mut config = Config::default();
        let duplicate = config.sensors[0].clone();
        config.sensors.push(duplicate);
        assert!(config.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn test_sensors_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "water-1", "name": "Main", "baseline": 0, "max_value": 100,
                 "endpoint": {{"kind": "water", "channel": "sensor1"}}, "threshold_percent": 30}}]"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = Config::from_vars(vars(&[("SENSORS_FILE", path.as_str())])).unwrap();
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensors[0].id, "water-1");
    }

    #[test]
    fn test_invalid_sensors_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"id": "bad", "name": "Bad", "baseline": 10, "max_value": 5,
                 "endpoint": {{"kind": "gas", "path": "/api/gas"}}}}]"#
        )
        .unwrap();

        assert!(load_sensors_file(file.path()).is_err());
        assert!(load_sensors_file(Path::new("/nonexistent/sensors.json")).is_err());
    }
}
