//! Policy storage, permission resolution, and access decisions

pub mod evaluate;
pub mod resolve;
pub mod store;

pub use evaluate::{AccessEngine, AttributePath, AttributeValue};
pub use resolve::resolve;
pub use store::PolicyStore;
