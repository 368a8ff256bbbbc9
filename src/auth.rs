//! Plaintext credential login

use crate::errors::MonitorError;
use crate::transport::ApiClient;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Clone, Serialize)]
pub struct Credentials {
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "contrasena")]
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into().trim().to_string(),
            password: password.into(),
        }
    }
}

// Keeps the password out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Login response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    #[serde(rename = "correo")]
    pub email: String,
    #[serde(rename = "cotizacionId")]
    pub quote_id: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Accepted(Session),
    /// The service refused the credentials
    Rejected,
    /// The service could not be reached or answered garbage
    ConnectionFailed(String),
}

impl LoginOutcome {
    pub fn user_message(&self) -> String {
        match self {
            LoginOutcome::Accepted(session) => format!("Welcome {}", session.email),
            LoginOutcome::Rejected => "Incorrect email or password".to_string(),
            LoginOutcome::ConnectionFailed(reason) => format!("Connection error: {}", reason),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, LoginOutcome::Accepted(_))
    }
}

pub async fn login(client: &ApiClient, credentials: &Credentials) -> LoginOutcome {
    match client.login(credentials).await {
        Ok(session) => {
            info!(user_id = %session.id, "Login accepted for {}", session.email);
            LoginOutcome::Accepted(session)
        }
        Err(MonitorError::Auth(reason)) => {
            warn!("Login rejected for {}: {}", credentials.email, reason);
            LoginOutcome::Rejected
        }
        Err(e) => {
            warn!("Login request failed: {}", e);
            LoginOutcome::ConnectionFailed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ClientConfig, make_client};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> ApiClient {
        make_client(&ClientConfig::new(server.uri(), Duration::from_secs(2))).unwrap()
    }

    #[tokio::test]
    async fn test_accepted_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .and(body_json(json!({ "correo": "ana@example.com", "contrasena": "s3cret" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "u-17",
                "correo": "ana@example.com",
                "cotizacionId": 42
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let outcome = login(&client, &Credentials::new(" ana@example.com ", "s3cret")).await;

        assert_eq!(
            outcome,
            LoginOutcome::Accepted(Session {
                id: "u-17".to_string(),
                email: "ana@example.com".to_string(),
                quote_id: 42,
            })
        );
        assert_eq!(outcome.user_message(), "Welcome ana@example.com");
    }

    #[tokio::test]
    async fn test_rejected_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let outcome = login(&client, &Credentials::new("ana@example.com", "wrong")).await;

        assert_eq!(outcome, LoginOutcome::Rejected);
        assert_eq!(outcome.user_message(), "Incorrect email or password");
    }

    #[tokio::test]
    async fn test_connection_failure_is_distinct() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = make_client(&ClientConfig::new(
            format!("http://127.0.0.1:{}", port),
            Duration::from_secs(2),
        ))
        .unwrap();

        let outcome = login(&client, &Credentials::new("ana@example.com", "s3cret")).await;
        assert!(matches!(outcome, LoginOutcome::ConnectionFailed(_)));
        assert!(outcome.user_message().starts_with("Connection error"));
    }

    #[tokio::test]
    async fn test_server_error_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let outcome = login(&client, &Credentials::new("ana@example.com", "s3cret")).await;
        assert_eq!(outcome, LoginOutcome::Rejected);
        assert_eq!(outcome.user_message(), "Incorrect email or password");
    }

    #[tokio::test]
    async fn test_malformed_session_is_a_connection_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let outcome = login(&client, &Credentials::new("ana@example.com", "s3cret")).await;
        assert!(matches!(outcome, LoginOutcome::ConnectionFailed(_)));
    }

    #[test]
    fn test_debug_hides_password() {
        let rendered = format!("{:?}", Credentials::new("ana@example.com", "s3cret"));
        assert!(!rendered.contains("s3cret"));
    }
}
