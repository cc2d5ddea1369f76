//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example, a
//! [`ChapterNumber`] with an [`AttemptIndex`] even though both are `u32` under the
//! hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Macro for 1-based u32 ordinals.
// Generates: struct (Copy, Ord), new() rejecting zero, first(), get(), next(), Display.
// ---------------------------------------------------------------------------
macro_rules! ordinal {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u32", into = "u32")]
        pub struct $name(u32);

        impl $name {
            /// Creates an ordinal, returning `None` for zero (ordinals are 1-based).
            pub fn new(value: u32) -> Option<Self> {
                if value == 0 { None } else { Some(Self(value)) }
            }

            /// The first ordinal, `1`.
            pub fn first() -> Self {
                Self(1)
            }

            /// Returns the underlying integer value.
            pub fn get(self) -> u32 {
                self.0
            }

            /// Returns the following ordinal.
            pub fn next(self) -> Self {
                Self(self.0.saturating_add(1))
            }
        }

        impl TryFrom<u32> for $name {
            type Error = String;

            fn try_from(value: u32) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| format!("{} must be at least 1", stringify!($name)))
            }
        }

        impl From<$name> for u32 {
            fn from(value: $name) -> u32 {
                value.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Ordinals
// ---------------------------------------------------------------------------

ordinal! {
    /// 1-based position of a chapter within a book.
    ///
    /// Unique within a project; numeric order is narrative order.
    ChapterNumber
}

ordinal! {
    /// 1-based index of a draft → edit → critique attempt for one chapter.
    ///
    /// Never exceeds the configured `max_revision_iterations`.
    AttemptIndex
}

impl ChapterNumber {
    /// Returns the chapter `n` positions earlier, or `None` if that would fall
    /// before chapter 1.
    pub fn checked_sub(self, n: u32) -> Option<Self> {
        self.0.checked_sub(n).and_then(Self::new)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — UUID-backed (internally generated)
// ---------------------------------------------------------------------------

/// Identifies a single workflow run (one invocation of `run_project`).
///
/// Generated fresh for every run; recorded on spans so all activity from a
/// single run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a new random run identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Identifiers — String-backed
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a book project.
    ///
    /// Callers usually supply a UUID string; [`ProjectId::generate`] creates one.
    ProjectId
}

impl ProjectId {
    /// Creates a random project identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

string_id! {
    /// Name of a model as understood by the LLM provider (e.g. `"llama3.1:8b"`).
    ModelName
}

string_id! {
    /// Hex-encoded digest of the content of a chapter range.
    ///
    /// Produced by [`crate::summary::content_version_hash`]; compared on every
    /// cache read to detect stale summaries.
    ContentHash
}

impl ContentHash {
    /// Wraps a hex digest produced inside this crate.
    pub(crate) fn from_hex_digest(hex: String) -> Self {
        Self(hex)
    }
}
