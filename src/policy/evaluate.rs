//! Access decision evaluation
//!
//! Side-effect free. Every call works against a point-in-time snapshot of the
//! policy store; the evaluator never mutates shared state and is safe to call
//! from any number of concurrent flows.

use std::sync::Arc;

use crate::domain::{
    AccessCondition, AccessResult, ConditionOperator, ConditionValue, RequiredPermission, User,
    WorkflowDescriptor, WILDCARD,
};
use crate::policy::PolicyStore;

/// Closed set of attribute paths conditions may reference. Unknown paths
/// resolve to nothing, which fails the condition rather than erroring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributePath {
    Id,
    Email,
    Name,
    Provider,
    Domain,
    Roles,
    Department,
    Organization,
}

/// Runtime shape of a resolved attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    List(Vec<String>),
}

impl AttributePath {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "id" => Some(AttributePath::Id),
            "email" => Some(AttributePath::Email),
            "name" => Some(AttributePath::Name),
            "provider" => Some(AttributePath::Provider),
            "attributes.domain" => Some(AttributePath::Domain),
            "attributes.roles" => Some(AttributePath::Roles),
            "attributes.department" => Some(AttributePath::Department),
            "attributes.organization" => Some(AttributePath::Organization),
            _ => None,
        }
    }

    pub fn lookup(&self, user: &User) -> Option<AttributeValue> {
        match self {
            AttributePath::Id => Some(AttributeValue::Text(user.id.clone())),
            AttributePath::Email => Some(AttributeValue::Text(user.email.clone())),
            AttributePath::Name => user.name.clone().map(AttributeValue::Text),
            AttributePath::Provider => Some(AttributeValue::Text(user.provider.to_string())),
            AttributePath::Domain => Some(AttributeValue::Text(user.attributes.domain.clone())),
            AttributePath::Roles => Some(AttributeValue::List(user.attributes.roles.clone())),
            AttributePath::Department => user
                .attributes
                .department
                .clone()
                .map(AttributeValue::Text),
            AttributePath::Organization => user
                .attributes
                .organization
                .clone()
                .map(AttributeValue::Text),
        }
    }
}

fn resource_matches(granted: &str, requested: &str) -> bool {
    granted == WILDCARD || granted == requested
}

fn action_matches(granted: &[String], requested: &str) -> bool {
    granted.iter().any(|a| a == WILDCARD || a == requested)
}

/// Evaluate a single condition against the user. Total: unresolvable paths,
/// invalid regexes, and type mismatches all evaluate to false.
pub(crate) fn condition_passes(condition: &AccessCondition, user: &User) -> bool {
    let Some(path) = AttributePath::parse(&condition.attribute) else {
        return false;
    };
    let Some(actual) = path.lookup(user) else {
        return false;
    };

    match condition.operator {
        ConditionOperator::Equals => match (&actual, &condition.value) {
            (AttributeValue::Text(s), ConditionValue::One(v)) => s == v,
            (AttributeValue::List(items), ConditionValue::Many(vs)) => items == vs,
            _ => false,
        },
        ConditionOperator::Contains => match &actual {
            AttributeValue::List(items) => match &condition.value {
                ConditionValue::One(v) => items.contains(v),
                ConditionValue::Many(vs) => vs.iter().any(|v| items.contains(v)),
            },
            AttributeValue::Text(s) => match &condition.value {
                ConditionValue::One(v) => s.contains(v.as_str()),
                ConditionValue::Many(vs) => vs.iter().any(|v| s.contains(v.as_str())),
            },
        },
        ConditionOperator::Matches => {
            let patterns: Vec<&str> = match &condition.value {
                ConditionValue::One(v) => vec![v.as_str()],
                ConditionValue::Many(vs) => vs.iter().map(String::as_str).collect(),
            };
            patterns.iter().any(|pattern| {
                let Ok(re) = regex::Regex::new(pattern) else {
                    return false;
                };
                match &actual {
                    AttributeValue::Text(s) => re.is_match(s),
                    AttributeValue::List(items) => items.iter().any(|i| re.is_match(i)),
                }
            })
        }
    }
}

/// The access decision evaluator.
pub struct AccessEngine {
    store: Arc<PolicyStore>,
}

impl AccessEngine {
    pub fn new(store: Arc<PolicyStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PolicyStore> {
        &self.store
    }

    /// Can this user perform `action` on `resource`?
    pub fn check_access(&self, user: &User, resource: &str, action: &str) -> AccessResult {
        self.check_access_for(user, resource, action, &[])
    }

    /// Like [`check_access`](Self::check_access), with known required
    /// permission strings (e.g. from a workflow descriptor) echoed back on
    /// denial for diagnostics.
    pub fn check_access_for(
        &self,
        user: &User,
        resource: &str,
        action: &str,
        required: &[String],
    ) -> AccessResult {
        let mut missing_conditions: Vec<AccessCondition> = Vec::new();

        for permission in &user.permissions {
            if !resource_matches(&permission.resource, resource) {
                continue;
            }
            if !action_matches(&permission.actions, action) {
                continue;
            }
            match &permission.conditions {
                None => return AccessResult::allow(),
                Some(conditions) if conditions.is_empty() => return AccessResult::allow(),
                Some(conditions) => {
                    let failed: Vec<AccessCondition> = conditions
                        .iter()
                        .filter(|c| !condition_passes(c, user))
                        .cloned()
                        .collect();
                    if failed.is_empty() {
                        return AccessResult::allow();
                    }
                    missing_conditions.extend(failed);
                }
            }
        }

        tracing::debug!(
            user = %user.email,
            resource,
            action,
            "access denied"
        );

        AccessResult {
            allowed: false,
            reason: Some(format!(
                "User is not permitted to perform `{action}` on `{resource}`"
            )),
            required_permissions: if required.is_empty() {
                None
            } else {
                Some(required.to_vec())
            },
            missing_conditions: if missing_conditions.is_empty() {
                None
            } else {
                Some(missing_conditions)
            },
        }
    }

    /// Look up a workflow descriptor from the current snapshot.
    pub fn workflow(&self, workflow_id: &str) -> Option<WorkflowDescriptor> {
        self.store
            .config()
            .workflows
            .into_iter()
            .find(|w| w.id == workflow_id)
    }

    /// Workflows this user may execute: `workflow:<id>`/`execute` must be
    /// allowed AND every entry in `required_permissions` must be separately
    /// satisfied.
    pub fn available_workflows(&self, user: &User) -> Vec<WorkflowDescriptor> {
        self.store
            .config()
            .workflows
            .into_iter()
            .filter(|workflow| self.may_execute(user, workflow))
            .collect()
    }

    pub(crate) fn may_execute(&self, user: &User, workflow: &WorkflowDescriptor) -> bool {
        let resource = format!("workflow:{}", workflow.id);
        if !self.check_access(user, &resource, "execute").allowed {
            return false;
        }
        workflow.required_permissions.iter().all(|raw| {
            match RequiredPermission::parse(raw) {
                Ok(req) => self.check_access(user, &req.resource, &req.action).allowed,
                Err(_) => false,
            }
        })
    }

    /// Services from the user's domain mapping that their permissions grant
    /// read or execute on.
    pub fn available_services(&self, user: &User) -> Vec<String> {
        let config = self.store.config();
        let Some(mapping) = config
            .domain_mappings
            .iter()
            .find(|m| m.domain == user.attributes.domain)
        else {
            return Vec::new();
        };
        mapping
            .allowed_services
            .iter()
            .filter(|service| {
                self.check_access(user, service, "read").allowed
                    || self.check_access(user, service, "execute").allowed
            })
            .cloned()
            .collect()
    }

    pub fn can_access_service(&self, user: &User, service: &str) -> bool {
        self.available_services(user).iter().any(|s| s == service)
    }

    /// Re-resolve the user's permissions from the current snapshot without
    /// re-authentication. Attributes are untouched.
    pub fn update_user_permissions(&self, user: &User) -> User {
        let mut updated = user.clone();
        updated.permissions = self.store.resolve_permissions(&user.attributes);
        updated
    }
}
