//! Workflow registry and execution domain models

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::error::{AppError, Result};

// Requirement strings are "resource:action"; either side may be the wildcard.
lazy_static::lazy_static! {
    pub static ref REQUIRED_PERMISSION_REGEX: regex::Regex =
        regex::Regex::new(r"^(\*|[A-Za-z][A-Za-z0-9_.:-]*):(\*|[A-Za-z][A-Za-z0-9_-]*)$").unwrap();
}

/// A remotely-executable workflow as registered in the policy store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDescriptor {
    #[validate(length(min = 1))]
    pub id: String,
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Value,
    /// "resource:action" strings that must all be satisfied to list or
    /// execute this workflow
    #[serde(default)]
    #[validate(custom(function = "validate_required_permissions"))]
    pub required_permissions: Vec<String>,
}

fn validate_required_permissions(entries: &Vec<String>) -> std::result::Result<(), validator::ValidationError> {
    if entries.iter().all(|e| REQUIRED_PERMISSION_REGEX.is_match(e)) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_required_permission"))
    }
}

/// A parsed "resource:action" requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredPermission {
    pub resource: String,
    pub action: String,
}

impl RequiredPermission {
    pub fn parse(raw: &str) -> Result<Self> {
        // The resource side may itself contain ':' (e.g. "workflow:report"),
        // so split on the last separator.
        let (resource, action) = raw.rsplit_once(':').ok_or_else(|| {
            AppError::validation(
                format!("malformed required permission `{raw}`, expected `resource:action`"),
                Some("requiredPermissions"),
            )
        })?;
        if resource.is_empty() || action.is_empty() {
            return Err(AppError::validation(
                format!("malformed required permission `{raw}`, expected `resource:action`"),
                Some("requiredPermissions"),
            ));
        }
        Ok(Self {
            resource: resource.to_string(),
            action: action.to_string(),
        })
    }
}

/// Lifecycle of a remote execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Succeeded | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Handle returned when an execution is started
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionHandle {
    pub execution_id: String,
    pub status: ExecutionStatus,
}

/// Point-in-time status of an execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStatusReport {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("workflow:execute", "workflow", "execute")]
    #[case("report:read", "report", "read")]
    #[case("*:*", "*", "*")]
    #[case("workflow:report-gen:execute", "workflow:report-gen", "execute")]
    fn test_required_permission_parse(
        #[case] raw: &str,
        #[case] resource: &str,
        #[case] action: &str,
    ) {
        let parsed = RequiredPermission::parse(raw).unwrap();
        assert_eq!(parsed.resource, resource);
        assert_eq!(parsed.action, action);
    }

    #[rstest]
    #[case("noseparator")]
    #[case(":read")]
    #[case("workflow:")]
    #[case("")]
    fn test_required_permission_parse_rejects(#[case] raw: &str) {
        assert!(RequiredPermission::parse(raw).is_err());
    }

    #[test]
    fn test_required_permission_regex() {
        assert!(REQUIRED_PERMISSION_REGEX.is_match("workflow:execute"));
        assert!(REQUIRED_PERMISSION_REGEX.is_match("*:read"));
        assert!(REQUIRED_PERMISSION_REGEX.is_match("report:*"));
        assert!(!REQUIRED_PERMISSION_REGEX.is_match("workflow"));
        assert!(!REQUIRED_PERMISSION_REGEX.is_match(":execute"));
    }

    #[test]
    fn test_descriptor_validation() {
        let wf = WorkflowDescriptor {
            id: "flow-1".to_string(),
            name: "Report".to_string(),
            description: String::new(),
            input_schema: Value::Null,
            output_schema: Value::Null,
            required_permissions: vec!["workflow:execute".to_string()],
        };
        assert!(wf.validate().is_ok());

        let bad = WorkflowDescriptor {
            required_permissions: vec!["not-a-permission".to_string()],
            ..wf
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Succeeded.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }
}
