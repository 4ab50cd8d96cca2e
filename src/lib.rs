//! Content-schema loading and caching engine.
//!
//! Discovers compiled collection definitions on disk, reconciles them with the
//! persisted content structure and serves the resulting category tree through
//! a bounded, TTL-aware cache.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
