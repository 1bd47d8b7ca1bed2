//! Newtype domain identifiers.
//!
//! Every named concept in the batch contract is a distinct newtype wrapping a
//! primitive. This prevents accidentally interchanging, for example, a
//! [`FieldName`] with a [`ModelName`] even though both are strings under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a string identifier is constructed from an empty value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} must not be empty")]
pub struct EmptyIdentifier {
    /// Name of the identifier type that rejected the value.
    pub kind: &'static str,
}

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, from_static(), as_str(),
// Borrow<str>, Display, TryFrom<String> (serde goes through it so
// deserialised values keep the non-empty invariant).
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Creates an identifier from a string literal.
            ///
            /// # Panics
            ///
            /// Panics if `value` is empty. Intended for compile-time constants
            /// only; use [`Self::new`] for data read at runtime.
            pub fn from_static(value: &'static str) -> Self {
                assert!(!value.is_empty(), concat!(stringify!($name), " must not be empty"));
                Self(value.to_owned())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = EmptyIdentifier;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(EmptyIdentifier { kind: stringify!($name) })
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Names one column of a [`crate::Batch`] (and the matching key of every
    /// [`crate::Row`] derived from it).
    ///
    /// Nodes declare the field names they consume and produce; the engine
    /// wires upstream outputs to downstream inputs by these names.
    FieldName
}

string_id! {
    /// Identifies a node instance within the surrounding pipeline.
    ///
    /// Used only for log correlation; the node contract never inspects it.
    NodeId
}

string_id! {
    /// Identifies the back-end model an [`crate::LlmProvider`] talks to
    /// (e.g. `"gpt-3.5-turbo"`).
    ModelName
}

/// Identifies a single node invocation (one call of `execute` on one batch).
///
/// Generated fresh for every [`crate::ExecutionContext`]; attached to the
/// execution span so all row-level activity from one batch can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Uuid);

impl InvocationId {
    /// Generates a new random invocation identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an [`InvocationId`] from an existing UUID (e.g. one issued by the engine).
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
