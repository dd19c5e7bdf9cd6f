//! Flowgate - Access Control Engine for Remote Workflow Execution
//!
//! This crate normalizes identity-provider profiles into canonical user
//! attributes, evaluates a declarative attribute-based policy model into
//! concrete permission sets, and gates remote workflow operations behind
//! auditable access decisions. Fallible boundary operations are wrapped by a
//! classified retry layer with bounded exponential backoff.

pub mod config;
pub mod domain;
pub mod error;
pub mod identity;
pub mod policy;
pub mod retry;
pub mod service;
pub mod telemetry;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use policy::{AccessEngine, PolicyStore};
