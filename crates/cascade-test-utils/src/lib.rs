//! Testing utilities for the Cascade Platform.
//!
//! This crate provides standardized testing utilities for the Cascade engine,
//! including fixture process models, an engine harness wired to the in-memory
//! store and a controllable clock, recording listeners, repository mocks,
//! assertion utilities for activity-instance trees, and test logging setup.

pub mod assertions;
pub mod builders;
pub mod data_generators;
pub mod logging;
pub mod mocks;

/// Re-export commonly used types for convenience
pub use mockall;

pub use builders::test_engine::{TestEngine, TestEngineBuilder, RECORDING_LISTENER};
pub use data_generators::ProcessModels;
pub use logging::init_test_logging;
pub use mocks::event_handler::RecordingEventHandler;
pub use mocks::listeners::{FailingListener, RecordingListener};
