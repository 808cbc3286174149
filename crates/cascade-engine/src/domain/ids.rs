//! Identifier value objects

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random identifier
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

string_id!(
    /// Value object: process definition id (`key:version:uuid`)
    ProcessDefinitionId
);
string_id!(
    /// Value object: process instance id, equal to the root execution id
    ProcessInstanceId
);
string_id!(
    /// Value object: execution id
    ExecutionId
);
string_id!(
    /// Value object: activity id inside a process definition
    ActivityId
);
string_id!(
    /// Value object: activity instance or transition instance id
    ActivityInstanceId
);
string_id!(
    /// Value object: user task id
    TaskId
);
string_id!(
    /// Value object: variable instance id
    VariableId
);
string_id!(
    /// Value object: event subscription id
    EventSubscriptionId
);
string_id!(
    /// Value object: job id
    JobId
);
string_id!(
    /// Value object: incident id
    IncidentId
);

impl From<&ProcessInstanceId> for ExecutionId {
    fn from(id: &ProcessInstanceId) -> Self {
        ExecutionId(id.0.clone())
    }
}

impl From<&ProcessInstanceId> for ActivityInstanceId {
    fn from(id: &ProcessInstanceId) -> Self {
        ActivityInstanceId(id.0.clone())
    }
}
