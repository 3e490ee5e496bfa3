//! Lifecycle message types and payloads.
//!
//! Requests and replies travel as JSON payloads. Every request gets exactly
//! one [`LifecycleReply`].

use serde::{Deserialize, Serialize};

use crate::app::{AppId, AppState, Application};
use crate::error::{FailureKind, IsolateError};

pub const START: &str = "lifecycle/start";
pub const PAUSE: &str = "lifecycle/pause";
pub const RESUME: &str = "lifecycle/resume";
pub const DESTROY: &str = "lifecycle/destroy";

/// All lifecycle message types.
pub const MESSAGE_TYPES: [&str; 4] = [START, PAUSE, RESUME, DESTROY];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub app: Application,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Payload of pause and resume requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRequest {
    pub app_id: AppId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestroyRequest {
    pub app_id: AppId,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum LifecycleReply {
    Started { app_id: AppId },
    State { app_id: AppId, state: AppState },
    Failed { kind: FailureKind, message: String },
}

impl LifecycleReply {
    pub fn failed(error: &IsolateError) -> Self {
        LifecycleReply::Failed {
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    /// Turn a `Failed` reply back into an error.
    pub fn into_result(self) -> Result<Self, IsolateError> {
        match self {
            LifecycleReply::Failed { kind, message } => Err(IsolateError::Rejected { kind, message }),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_wire_shape() {
        let reply = LifecycleReply::State {
            app_id: AppId::new(2),
            state: AppState::Paused,
        };
        let json: serde_json::Value = serde_json::to_value(&reply).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"status": "state", "app_id": 2, "state": "paused"})
        );
    }

    #[test]
    fn destroy_force_defaults_to_false() {
        let request: DestroyRequest = serde_json::from_str(r#"{"app_id": 4}"#).unwrap();
        assert!(!request.force);
    }

    #[test]
    fn failed_reply_becomes_rejected_error() {
        let error = IsolateError::NoSuchApp(AppId::new(9));
        let err = LifecycleReply::failed(&error).into_result().unwrap_err();
        assert_eq!(err.kind(), FailureKind::NoSuchApp);
        assert!(err.to_string().contains("application not found: 9"));
    }
}
