//! In-memory policy store
//!
//! Holds the current [`AccessControlConfig`] behind a single read-write lock.
//! Readers take a snapshot by value; writers swap atomically, so a reader
//! mid-evaluation always sees either the entire pre-update or entire
//! post-update config.

use std::sync::{PoisonError, RwLock};

use validator::Validate;

use crate::domain::{
    AccessControlConfig, DomainServiceMapping, Permission, UserAttributes, WorkflowDescriptor,
};
use crate::error::Result;

pub struct PolicyStore {
    config: RwLock<AccessControlConfig>,
}

impl PolicyStore {
    /// Initialise the store from a validated configuration.
    pub fn new(config: AccessControlConfig) -> Result<Self> {
        validate_config(&config)?;
        Ok(Self {
            config: RwLock::new(config),
        })
    }

    /// Current snapshot, by value. Callers can never mutate store state
    /// through the returned config.
    pub fn config(&self) -> AccessControlConfig {
        self.config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomically replace the entire configuration. Takes effect for all
    /// subsequent evaluations; already-issued permission sets are untouched
    /// until the caller re-resolves them.
    pub fn replace_config(&self, new_config: AccessControlConfig) -> Result<()> {
        validate_config(&new_config)?;
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *guard = new_config;
        tracing::info!("access control config replaced");
        Ok(())
    }

    /// Replace the mapping for that domain if present, else append.
    pub fn upsert_domain_mapping(&self, mapping: DomainServiceMapping) -> Result<()> {
        mapping.validate()?;
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match guard
            .domain_mappings
            .iter_mut()
            .find(|m| m.domain == mapping.domain)
        {
            Some(existing) => *existing = mapping,
            None => guard.domain_mappings.push(mapping),
        }
        Ok(())
    }

    /// Replace the workflow with that id if present, else append.
    pub fn upsert_workflow(&self, descriptor: WorkflowDescriptor) -> Result<()> {
        descriptor.validate()?;
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        match guard.workflows.iter_mut().find(|w| w.id == descriptor.id) {
            Some(existing) => *existing = descriptor,
            None => guard.workflows.push(descriptor),
        }
        Ok(())
    }

    /// Resolve the full permission set for the given attributes against the
    /// current snapshot. No caching across calls.
    pub fn resolve_permissions(&self, attributes: &UserAttributes) -> Vec<Permission> {
        let snapshot = self.config();
        super::resolve::resolve(attributes, &snapshot)
    }
}

fn validate_config(config: &AccessControlConfig) -> Result<()> {
    for mapping in &config.domain_mappings {
        mapping.validate()?;
        if let Some(role_grants) = &mapping.role_based_permissions {
            for perms in role_grants.values() {
                for perm in perms {
                    perm.validate()?;
                }
            }
        }
    }
    for perm in &config.global_permissions {
        perm.validate()?;
    }
    for workflow in &config.workflows {
        workflow.validate()?;
    }
    Ok(())
}
