//! Access control domain models: permissions, conditions, policy config

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use validator::Validate;

use super::workflow::WorkflowDescriptor;

/// Matches any concrete resource or action during evaluation. Never treated
/// as a concrete value to match against.
pub const WILDCARD: &str = "*";

/// Comparison operator for attribute conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionOperator {
    Equals,
    Contains,
    Matches,
}

/// Condition value: a single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::One(value.to_string())
    }
}

/// An attribute predicate attached to a permission.
///
/// `attribute` is a dot path into the user record (e.g.
/// "attributes.department"). A path that does not resolve makes the condition
/// evaluate to false; it never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessCondition {
    pub attribute: String,
    pub operator: ConditionOperator,
    pub value: ConditionValue,
}

/// A grant over a resource. `resource` and each action may be `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[validate(length(min = 1))]
    pub resource: String,
    /// Must be non-empty
    #[validate(length(min = 1))]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<AccessCondition>>,
}

impl Permission {
    pub fn new(resource: impl Into<String>, actions: &[&str]) -> Self {
        Self {
            resource: resource.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            conditions: None,
        }
    }

    pub fn with_conditions(mut self, conditions: Vec<AccessCondition>) -> Self {
        self.conditions = Some(conditions);
        self
    }

    /// De-duplication identity: resource plus the action set, order
    /// insensitive. Conditions are deliberately excluded; first-seen wins.
    pub fn dedup_key(&self) -> (String, BTreeSet<String>) {
        (
            self.resource.clone(),
            self.actions.iter().cloned().collect(),
        )
    }
}

/// Per-domain policy: allowed services plus default and role-based grants.
/// Keyed by exact, case-sensitive email domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DomainServiceMapping {
    #[validate(length(min = 1))]
    pub domain: String,
    #[serde(default)]
    pub allowed_services: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub default_permissions: Vec<Permission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_based_permissions: Option<HashMap<String, Vec<Permission>>>,
}

/// The entire policy store state. Replaced atomically on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlConfig {
    #[serde(default)]
    pub domain_mappings: Vec<DomainServiceMapping>,
    #[serde(default)]
    pub global_permissions: Vec<Permission>,
    #[serde(default)]
    pub workflows: Vec<WorkflowDescriptor>,
}

/// Outcome of an authorization query, with an auditable reason on denial.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessResult {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_permissions: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub missing_conditions: Option<Vec<AccessCondition>>,
}

impl AccessResult {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            ..Default::default()
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }
}
