//! Environment setup builders for testing the Cascade engine.
//!
//! This module provides a builder for a [`RuntimeService`](cascade_engine::RuntimeService)
//! wired to the in-memory store, a controllable clock and recording doubles.

pub mod test_engine;

pub use test_engine::*;
