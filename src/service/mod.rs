//! Service layer: authentication onboarding and gated workflow execution

pub mod auth;
pub mod workflow;

pub use auth::{AuthService, IdentityProviderClient, SessionStore, TokenPair};
pub use workflow::{
    ExecutionOutcome, HttpWorkflowClient, WaitOptions, WorkflowEngineClient, WorkflowService,
};
