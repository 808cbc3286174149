/// Identifier value objects
pub mod ids;

/// Process definition model and builder
pub mod process_definition;

/// Execution tree
pub mod execution;

/// Logical layout and compaction
pub mod layout;

/// Activity-instance tree view
pub mod activity_instance;

/// User tasks
pub mod task;

/// Variables
pub mod variable;

/// Event subscriptions
pub mod event_subscription;

/// Jobs and incidents
pub mod job;

/// Process instance aggregate
pub mod process_instance;

/// Domain events
pub mod events;

/// Repository interfaces
pub mod repository;

/// Time source
pub mod clock;
