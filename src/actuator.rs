//! Remote fan actuator with a locally cached mirror of its state

use crate::errors::Result;
use crate::transport::ApiClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// On/off state as served by the remote service.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActuatorState {
    #[serde(rename = "estado")]
    pub on: bool,
}

impl ActuatorState {
    pub fn label(self) -> &'static str {
        if self.on { "on" } else { "off" }
    }
}

/// Remote side of an actuator.
#[async_trait]
pub trait ActuatorRemote: Send + Sync {
    async fn fetch_state(&self) -> Result<ActuatorState>;
    async fn command_state(&self, desired: ActuatorState) -> Result<ActuatorState>;
}

#[async_trait]
impl ActuatorRemote for ApiClient {
    async fn fetch_state(&self) -> Result<ActuatorState> {
        self.fan_state().await
    }

    async fn command_state(&self, desired: ActuatorState) -> Result<ActuatorState> {
        self.set_fan_state(desired).await
    }
}

/// Result of a toggle request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ToggleOutcome {
    /// State after the command, or after resynchronizing when it failed
    pub state: ActuatorState,
    /// Whether the remote accepted the command
    pub applied: bool,
}

/// Keeps the cached fan state in step with the remote.
///
/// The cache is never updated on assumption: a failed command is followed by
/// a read of the remote state, and if that read fails too the cache stays as
/// it was.
pub struct FanController<R: ActuatorRemote> {
    remote: R,
    cached: Option<ActuatorState>,
}

impl<R: ActuatorRemote> FanController<R> {
    pub fn new(remote: R) -> Self {
        Self { remote, cached: None }
    }

    pub fn cached(&self) -> Option<ActuatorState> {
        self.cached
    }

    /// Re-read the remote state into the cache.
    pub async fn refresh(&mut self) -> Result<ActuatorState> {
        let state = self.remote.fetch_state().await?;
        self.cached = Some(state);
        Ok(state)
    }

    pub async fn set_state(&mut self, desired: bool) -> Result<ToggleOutcome> {
        let desired = ActuatorState { on: desired };

        match self.remote.command_state(desired).await {
            Ok(state) => {
                info!("Fan switched {}", state.label());
                self.cached = Some(state);
                Ok(ToggleOutcome { state, applied: true })
            }
            Err(command_error) => {
                warn!(
                    "Fan command {} failed, resynchronizing: {}",
                    desired.label(),
                    command_error
                );

                match self.refresh().await {
                    Ok(state) => Ok(ToggleOutcome { state, applied: false }),
                    Err(resync_error) => {
                        warn!("Fan resync failed, cached state is stale: {}", resync_error);
                        Err(command_error)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::MonitorError;
    use std::sync::Mutex;

    /// Remote whose state and failure modes are set by the test.
    struct ScriptedRemote {
        state: Mutex<ActuatorState>,
        fail_commands: bool,
        fail_reads: bool,
    }

    impl ScriptedRemote {
        fn new(on: bool, fail_commands: bool, fail_reads: bool) -> Self {
            Self {
                state: Mutex::new(ActuatorState { on }),
                fail_commands,
                fail_reads,
            }
        }
    }

    #[async_trait]
    impl ActuatorRemote for ScriptedRemote {
        async fn fetch_state(&self) -> Result<ActuatorState> {
            if self.fail_reads {
                return Err(MonitorError::Transport("connection refused".to_string()));
            }
            Ok(*self.state.lock().unwrap())
        }

        async fn command_state(&self, desired: ActuatorState) -> Result<ActuatorState> {
            if self.fail_commands {
                return Err(MonitorError::Transport("500 Internal Server Error".to_string()));
            }
            *self.state.lock().unwrap() = desired;
            Ok(desired)
        }
    }

    #[tokio::test]
    async fn test_successful_toggle_updates_cache() {
        let mut fan = FanController::new(ScriptedRemote::new(false, false, false));

        let outcome = fan.set_state(true).await.unwrap();
        assert!(outcome.applied);
        assert!(outcome.state.on);
        assert_eq!(fan.cached(), Some(ActuatorState { on: true }));
    }

    #[tokio::test]
    async fn test_failed_toggle_resyncs_from_remote() {
        let mut fan = FanController::new(ScriptedRemote::new(false, true, false));

        let outcome = fan.set_state(true).await.unwrap();
        assert!(!outcome.applied);
        assert!(!outcome.state.on);
        assert_eq!(fan.cached(), Some(ActuatorState { on: false }));
    }

    #[tokio::test]
    async fn test_failed_resync_leaves_cache_stale() {
        let mut fan = FanController::new(ScriptedRemote::new(true, false, false));
        fan.set_state(true).await.unwrap();

        fan.remote.fail_commands = true;
        fan.remote.fail_reads = true;

        let err = fan.set_state(false).await.unwrap_err();
        assert!(err.to_string().contains("500"));
        assert_eq!(fan.cached(), Some(ActuatorState { on: true }));
    }

    #[test]
    fn test_wire_format() {
        let state: ActuatorState = serde_json::from_str(r#"{"estado": true}"#).unwrap();
        assert!(state.on);
        assert_eq!(
            serde_json::to_string(&ActuatorState { on: false }).unwrap(),
            r#"{"estado":false}"#
        );
    }
}
