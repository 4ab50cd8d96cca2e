//! Application services: schema evaluation, reconciliation and the content manager.

pub mod content;
pub mod error;
pub mod evaluator;
pub mod reconcile;
pub mod relaxed;
pub mod repos;
pub mod retry;
pub mod sources;
pub mod tree;
pub mod widgets;
