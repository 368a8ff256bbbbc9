//! SentryHouse Sensor Monitor Library
//!
//! This library polls remote gas and water sensors, turns raw readings into
//! leak percentages, keeps a short trend history per sensor and raises one
//! notification per threshold excursion. It also drives the remote fan,
//! performs the credential login and persists local settings.

pub mod actuator;
pub mod alert;
pub mod auth;
pub mod config;
pub mod errors;
pub mod history;
pub mod images;
pub mod monitor;
pub mod sensor;
pub mod settings;
pub mod store;
pub mod transport;

pub use actuator::{ActuatorState, FanController, ToggleOutcome};
pub use alert::{AlertDecision, AlertGate, AlertSink, ChannelAlertSink, GateState, TracingAlertSink};
pub use auth::{Credentials, LoginOutcome, Session};
pub use config::Config;
pub use errors::{MonitorError, Result};
pub use history::{RollingHistory, Trend};
pub use monitor::{MonitorHandle, MonitorSettings, MonitorSnapshot, SensorMonitor};
pub use sensor::{LeakPercentage, Reading, SensorConfig, SensorEndpoint};
pub use transport::{ApiClient, ClientCache, ClientConfig, SensorReadingSource, make_client};
