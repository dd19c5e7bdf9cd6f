//! Domain models for users, permissions, and workflows

pub mod access;
pub mod user;
pub mod workflow;

pub use access::{
    AccessCondition, AccessControlConfig, AccessResult, ConditionOperator, ConditionValue,
    DomainServiceMapping, Permission, WILDCARD,
};
pub use user::{Provider, User, UserAttributes};
pub use workflow::{
    ExecutionHandle, ExecutionStatus, ExecutionStatusReport, RequiredPermission,
    WorkflowDescriptor,
};
