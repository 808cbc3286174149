/// Execution listeners and service task delegates
pub mod delegates;

/// Mutable per-operation view of a process instance
pub(crate) mod working_state;

/// Token-flow interpreter
pub(crate) mod interpreter;

/// Runtime service, the public entry point for process execution
pub mod runtime_service;

/// Process instance migration
pub mod migration;
