//! Assertion utilities for validating Cascade engine state.
//!
//! This module provides helper functions for comparing activity-instance trees
//! and checking migrated instance state, making tests more concise and readable.

mod process_state;

pub use process_state::*;
