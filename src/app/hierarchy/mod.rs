//! Geography hierarchy normalization and ordering
//!
//! - [`tokens`] - synonym table folding level names onto API tokens
//! - [`store`] - hierarchy metadata lookup and its explicit memo
//! - [`resolver`] - target selection and canonical ancestor ordering

pub mod resolver;
pub mod store;
pub mod tokens;

pub use resolver::{HierarchyResolver, Resolution};
pub use store::{HierarchyEntry, HierarchyStore, OrderingCache, OrderingKey, StaticHierarchyStore};
pub use tokens::normalize_token;
