//! HTTP transport for the sensor, actuator and login endpoints

use crate::actuator::ActuatorState;
use crate::auth::{Credentials, Session};
use crate::errors::{MonitorError, Result};
use crate::sensor::{Reading, SensorConfig, SensorEndpoint, WaterChannel};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// Source of raw sensor readings. Implementations do not retry; the next
/// poll cycle is the retry.
#[async_trait]
pub trait SensorReadingSource: Send + Sync {
    async fn fetch(&self, sensor: &SensorConfig) -> Result<Reading>;
}

/// Everything needed to build an [`ApiClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub water_path: String,
    pub fan_path: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
            water_path: "datos".to_string(),
            fan_path: "/api/ventilador".to_string(),
        }
    }
}

/// Build a client for the given configuration.
pub fn make_client(config: &ClientConfig) -> Result<ApiClient> {
    let client = Client::builder()
        .timeout(config.timeout)
        .user_agent(format!("sentryhouse_monitor/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(MonitorError::Http)?;

    Ok(ApiClient {
        client,
        config: config.clone(),
    })
}

/// Holds the current client and rebuilds it only when the configuration changes.
#[derive(Debug, Default)]
pub struct ClientCache {
    current: Option<ApiClient>,
}

impl ClientCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_for(&mut self, config: &ClientConfig) -> Result<&ApiClient> {
        let stale = self
            .current
            .as_ref()
            .is_none_or(|client| client.config() != config);

        if stale {
            debug!("Building HTTP client for {}", config.base_url);
            self.current = Some(make_client(config)?);
        }

        self.current
            .as_ref()
            .ok_or_else(|| MonitorError::Other("client cache empty after rebuild".to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GasPayload {
    valor: i64,
}

/// One entry of the water list endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WaterSample {
    pub sensor1: f64,
    pub sensor2: f64,
    pub sensor3: f64,
}

impl WaterSample {
    pub fn channel(&self, channel: WaterChannel) -> f64 {
        match channel {
            WaterChannel::Sensor1 => self.sensor1,
            WaterChannel::Sensor2 => self.sensor2,
            WaterChannel::Sensor3 => self.sensor3,
        }
    }
}

/// Client for the remote home service.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
}

impl ApiClient {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Raw value of a gas channel.
    pub async fn gas_value(&self, path: &str) -> Result<i64> {
        let payload: GasPayload = self.get_json(path).await?;
        Ok(payload.valor)
    }

    /// Full water list, oldest first as served.
    pub async fn water_samples(&self) -> Result<Vec<WaterSample>> {
        let path = self.config.water_path.clone();
        self.get_json(&path).await
    }

    pub async fn fan_state(&self) -> Result<ActuatorState> {
        let path = self.config.fan_path.clone();
        self.get_json(&path).await
    }

    pub async fn set_fan_state(&self, desired: ActuatorState) -> Result<ActuatorState> {
        let url = self.url(&self.config.fan_path);
        debug!("POST {} with {:?}", url, desired);

        let response = self.send(self.client.post(&url).json(&desired)).await?;
        let response = Self::check_status(response, &url).await?;
        response.json().await.map_err(MonitorError::Http)
    }

    /// Any non-success status is reported as rejected credentials.
    pub async fn login(&self, credentials: &Credentials) -> Result<Session> {
        let url = self.url("/api/login");
        debug!("POST {} for {}", url, credentials.email);

        let response = self.send(self.client.post(&url).json(credentials)).await?;
        let status = response.status();

        if status.is_success() {
            return response.json().await.map_err(MonitorError::Http);
        }

        Err(MonitorError::Auth(format!("login rejected with status {}", status)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self.send(self.client.get(&url)).await?;
        let response = Self::check_status(response, &url).await?;
        response.json().await.map_err(MonitorError::Http)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Response> {
        timeout(self.config.timeout, request.send())
            .await
            .map_err(|_| MonitorError::Transport("Request timeout".to_string()))?
            .map_err(MonitorError::Http)
    }

    /// Map non-success responses to transport errors.
    async fn check_status(response: Response, url: &str) -> Result<Response> {
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let error_body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

        let error_message = match status {
            StatusCode::BAD_REQUEST => format!("Bad request to {}: {}", url, error_body),
            StatusCode::UNAUTHORIZED => format!("Unauthorized for {}: {}", url, error_body),
            StatusCode::FORBIDDEN => format!("Forbidden for {}: {}", url, error_body),
            StatusCode::NOT_FOUND => format!("Endpoint not found: {}", url),
            StatusCode::TOO_MANY_REQUESTS => format!("Rate limited by {}", url),
            s if s.is_server_error() => format!("Server error {} from {}: {}", s, url, error_body),
            s => format!("Unexpected response {} from {}: {}", s, url, error_body),
        };

        Err(MonitorError::Transport(error_message))
    }

    /// Check that the base URL answers at all.
    pub async fn test_connectivity(&self) -> bool {
        match self.send(self.client.get(&self.config.base_url)).await {
            Ok(response) => {
                info!(
                    "Connectivity test against {} answered {}",
                    self.config.base_url,
                    response.status()
                );
                true
            }
            Err(e) => {
                info!("Connectivity test against {} failed: {}", self.config.base_url, e);
                false
            }
        }
    }
}

#[async_trait]
impl SensorReadingSource for ApiClient {
    async fn fetch(&self, sensor: &SensorConfig) -> Result<Reading> {
        let value = match &sensor.endpoint {
            SensorEndpoint::Gas { path } => self.gas_value(path).await?,
            SensorEndpoint::Water { channel } => {
                let samples = self.water_samples().await?;
                let latest = samples.last().ok_or_else(|| {
                    MonitorError::Transport("water endpoint returned no samples".to_string())
                })?;

                let raw = latest.channel(*channel);
                if !raw.is_finite() {
                    return Err(MonitorError::Transport(format!(
                        "water {} value is not a number",
                        channel
                    )));
                }
                raw.round() as i64
            }
        };

        debug!(sensor_id = %sensor.id, value, "Fetched reading");
        Ok(Reading::new(sensor.id.clone(), value))
    }
}
