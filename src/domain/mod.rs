//! Domain layer types and invariants.

pub mod category;
pub mod error;
pub mod paths;
pub mod schema;
pub mod structure;
