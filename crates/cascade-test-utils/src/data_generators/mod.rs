//! Test data generators for the Cascade Platform.
//!
//! This module provides fixture process models. Each returns an unbuilt
//! [`ProcessDefinitionBuilder`](cascade_engine::ProcessDefinitionBuilder) so a
//! test can modify it before deploying.

mod models;

pub use models::*;
