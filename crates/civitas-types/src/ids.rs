//! Type-safe identifier wrappers around `u64` sequence numbers.
//!
//! Agents and groups are identified by strongly-typed IDs so the two can
//! never be mixed up at compile time. IDs are handed out by a monotonic
//! counter owned by the membership registry and are never reused within a
//! run, which keeps iteration order (and therefore every seeded run)
//! reproducible.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a `u64` sequence number.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident, $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// The first identifier handed out in a run.
            pub const FIRST: Self = Self(0);

            /// Wrap a raw sequence number.
            pub const fn new(raw: u64) -> Self {
                Self(raw)
            }

            /// The identifier following this one, or `None` on overflow.
            pub const fn next(self) -> Option<Self> {
                match self.0.checked_add(1) {
                    Some(raw) => Some(Self(raw)),
                    None => None,
                }
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for an individual agent.
    AgentId, "i"
}

define_id! {
    /// Unique identifier for a group of agents.
    GroupId, "g"
}
