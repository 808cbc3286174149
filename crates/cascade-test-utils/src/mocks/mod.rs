//! Mock implementations of key Cascade engine interfaces.
//!
//! Recording doubles for listeners and domain event handlers, and mockall
//! mocks of the repository traits for tests that need to script persistence
//! outcomes such as optimistic lock conflicts.

pub mod event_handler;
pub mod listeners;
pub mod repositories;

pub use event_handler::RecordingEventHandler;
pub use listeners::{FailingListener, ListenerInvocation, RecordingListener};
pub use repositories::MockInstanceRepository;
