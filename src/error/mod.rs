//! Unified error handling for Flowgate
//!
//! Every failure in the core is classified into one of five classes, each
//! carrying a severity, a machine-readable code, and structured details with
//! remediation suggestions. Retryability is decided per class (and per
//! sub-condition) in the `retry` module; this module only classifies.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Error classification used by the retry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorClass {
    Authentication,
    Authorization,
    Network,
    Validation,
    RemoteExecution,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorClass::Authentication => write!(f, "AUTHENTICATION_ERROR"),
            ErrorClass::Authorization => write!(f, "AUTHORIZATION_ERROR"),
            ErrorClass::Network => write!(f, "NETWORK_ERROR"),
            ErrorClass::Validation => write!(f, "VALIDATION_ERROR"),
            ErrorClass::RemoteExecution => write!(f, "REMOTE_EXECUTION_ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Which step of the authentication flow failed. Only the refresh step is
/// ever auto-retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthStep {
    Login,
    Callback,
    Refresh,
}

impl std::fmt::Display for AuthStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthStep::Login => write!(f, "login"),
            AuthStep::Callback => write!(f, "callback"),
            AuthStep::Refresh => write!(f, "refresh"),
        }
    }
}

/// API-level error codes reported by the remote workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteErrorCode {
    WorkflowBusy,
    RateLimited,
    TemporaryFailure,
    Timeout,
    ServiceUnavailable,
    ExecutionFailed,
    InvalidInput,
    Unknown,
}

impl RemoteErrorCode {
    /// Parse an engine-reported code string; unrecognized codes map to
    /// `Unknown` rather than failing.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "WORKFLOW_BUSY" => RemoteErrorCode::WorkflowBusy,
            "RATE_LIMITED" => RemoteErrorCode::RateLimited,
            "TEMPORARY_FAILURE" => RemoteErrorCode::TemporaryFailure,
            "TIMEOUT" => RemoteErrorCode::Timeout,
            "SERVICE_UNAVAILABLE" => RemoteErrorCode::ServiceUnavailable,
            "EXECUTION_FAILED" => RemoteErrorCode::ExecutionFailed,
            "INVALID_INPUT" => RemoteErrorCode::InvalidInput,
            _ => RemoteErrorCode::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteErrorCode::WorkflowBusy => "WORKFLOW_BUSY",
            RemoteErrorCode::RateLimited => "RATE_LIMITED",
            RemoteErrorCode::TemporaryFailure => "TEMPORARY_FAILURE",
            RemoteErrorCode::Timeout => "TIMEOUT",
            RemoteErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            RemoteErrorCode::ExecutionFailed => "EXECUTION_FAILED",
            RemoteErrorCode::InvalidInput => "INVALID_INPUT",
            RemoteErrorCode::Unknown => "UNKNOWN",
        }
    }
}

/// Application error types
#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("Authentication failed during {step}: {message}")]
    Authentication { step: AuthStep, message: String },

    #[error("Access denied: {message}")]
    Authorization {
        message: String,
        required_permissions: Vec<String>,
    },

    #[error("Network error: {message}")]
    Network { message: String, status: Option<u16> },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Workflow engine error: {message}")]
    RemoteExecution {
        message: String,
        code: RemoteErrorCode,
    },

    /// The caller aborted an in-flight operation. Not part of the retry
    /// taxonomy and never retried.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

impl AppError {
    pub fn authentication(step: AuthStep, message: impl Into<String>) -> Self {
        AppError::Authentication {
            step,
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>, required_permissions: Vec<String>) -> Self {
        AppError::Authorization {
            message: message.into(),
            required_permissions,
        }
    }

    pub fn network(message: impl Into<String>, status: Option<u16>) -> Self {
        AppError::Network {
            message: message.into(),
            status,
        }
    }

    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        AppError::Validation {
            message: message.into(),
            field: field.map(str::to_string),
        }
    }

    pub fn remote(code: RemoteErrorCode, message: impl Into<String>) -> Self {
        AppError::RemoteExecution {
            message: message.into(),
            code,
        }
    }

    /// The retry-taxonomy class of this error, or `None` for cancellation.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            AppError::Authentication { .. } => Some(ErrorClass::Authentication),
            AppError::Authorization { .. } => Some(ErrorClass::Authorization),
            AppError::Network { .. } => Some(ErrorClass::Network),
            AppError::Validation { .. } => Some(ErrorClass::Validation),
            AppError::RemoteExecution { .. } => Some(ErrorClass::RemoteExecution),
            AppError::Cancelled(_) => None,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            AppError::Authentication { .. } => Severity::High,
            AppError::Authorization { .. } => Severity::Medium,
            AppError::Network { status: Some(s), .. } if *s >= 500 => Severity::High,
            AppError::Network { .. } => Severity::Medium,
            AppError::Validation { .. } => Severity::Low,
            AppError::RemoteExecution { code, .. } => match code {
                RemoteErrorCode::ExecutionFailed => Severity::High,
                RemoteErrorCode::InvalidInput => Severity::Low,
                _ => Severity::Medium,
            },
            AppError::Cancelled(_) => Severity::Low,
        }
    }

    /// Machine-readable code for logs and API responses.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Authentication { step, .. } => match step {
                AuthStep::Login => "AUTH_LOGIN_FAILED",
                AuthStep::Callback => "AUTH_CALLBACK_FAILED",
                AuthStep::Refresh => "AUTH_REFRESH_FAILED",
            },
            AppError::Authorization { .. } => "ACCESS_DENIED",
            AppError::Network { .. } => "NETWORK_FAILURE",
            AppError::Validation { .. } => "INVALID_INPUT",
            AppError::RemoteExecution { code, .. } => code.as_str(),
            AppError::Cancelled(_) => "CANCELLED",
        }
    }

    /// Remediation hints surfaced to the user alongside terminal failures.
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            AppError::Authentication { step: AuthStep::Refresh, .. } => vec![
                "Sign in again to establish a fresh session",
            ],
            AppError::Authentication { .. } => vec![
                "Check your identity provider credentials",
                "Retry the sign-in flow",
            ],
            AppError::Authorization { .. } => vec![
                "Contact an administrator to request the missing permissions",
                "Sign in with an account that has access to this resource",
            ],
            AppError::Network { status: Some(429), .. } => vec![
                "Too many requests were made; wait a moment before retrying",
            ],
            AppError::Network { .. } => vec![
                "Check your network connection",
                "Try again in a few moments",
            ],
            AppError::Validation { .. } => vec!["Correct the highlighted input and resubmit"],
            AppError::RemoteExecution { code, .. } => match code {
                RemoteErrorCode::WorkflowBusy | RemoteErrorCode::RateLimited => {
                    vec!["The workflow engine is under load; try again shortly"]
                }
                RemoteErrorCode::Timeout => vec![
                    "The workflow took too long to complete",
                    "Check the execution status later or retry with smaller input",
                ],
                RemoteErrorCode::InvalidInput => {
                    vec!["Review the workflow input against its schema"]
                }
                _ => vec!["Retry the workflow, or contact support if the problem persists"],
            },
            AppError::Cancelled(_) => vec![],
        }
    }

    /// Structured details for logging and diagnostic payloads.
    pub fn details(&self) -> Value {
        let mut details = json!({
            "code": self.code(),
            "severity": self.severity(),
            "suggestions": self.suggestions(),
        });
        let extra = match self {
            AppError::Authentication { step, .. } => json!({ "step": step }),
            AppError::Authorization {
                required_permissions,
                ..
            } => json!({ "requiredPermissions": required_permissions }),
            AppError::Network { status, .. } => json!({ "status": status }),
            AppError::Validation { field, .. } => json!({ "field": field }),
            AppError::RemoteExecution { code, .. } => json!({ "engineCode": code }),
            AppError::Cancelled(_) => json!({}),
        };
        if let (Some(base), Some(map)) = (details.as_object_mut(), extra.as_object()) {
            for (k, v) in map {
                base.insert(k.clone(), v.clone());
            }
        }
        details
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "could not reach the remote service".to_string()
        } else {
            err.to_string()
        };
        AppError::Network { message, status }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors.field_errors().keys().next().map(|k| k.to_string());
        AppError::Validation {
            message: errors.to_string(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AppError::authentication(AuthStep::Refresh, "token expired");
        assert_eq!(
            err.to_string(),
            "Authentication failed during refresh: token expired"
        );
    }

    #[test]
    fn test_class_mapping() {
        assert_eq!(
            AppError::network("down", Some(503)).class(),
            Some(ErrorClass::Network)
        );
        assert_eq!(
            AppError::authorization("nope", vec![]).class(),
            Some(ErrorClass::Authorization)
        );
        assert_eq!(AppError::Cancelled("gone".into()).class(), None);
    }

    #[test]
    fn test_severity_scales_with_status() {
        assert_eq!(AppError::network("down", Some(502)).severity(), Severity::High);
        assert_eq!(AppError::network("slow", Some(429)).severity(), Severity::Medium);
        assert!(Severity::Low < Severity::Critical);
    }

    #[test]
    fn test_remote_code_roundtrip() {
        assert_eq!(
            RemoteErrorCode::parse("WORKFLOW_BUSY"),
            RemoteErrorCode::WorkflowBusy
        );
        assert_eq!(RemoteErrorCode::parse("nonsense"), RemoteErrorCode::Unknown);
        assert_eq!(RemoteErrorCode::RateLimited.as_str(), "RATE_LIMITED");
    }

    #[test]
    fn test_details_contains_suggestions() {
        let err = AppError::remote(RemoteErrorCode::Timeout, "too slow");
        let details = err.details();
        assert_eq!(details["code"], "TIMEOUT");
        assert!(details["suggestions"].as_array().unwrap().len() >= 1);
        assert_eq!(details["engineCode"], "TIMEOUT");
    }

    #[test]
    fn test_auth_step_codes() {
        assert_eq!(
            AppError::authentication(AuthStep::Login, "x").code(),
            "AUTH_LOGIN_FAILED"
        );
        assert_eq!(
            AppError::authentication(AuthStep::Refresh, "x").code(),
            "AUTH_REFRESH_FAILED"
        );
    }
}
