//! Store Errors
//!
//! Every failure is local to the `get`/`set` call that triggered it. A failed
//! computation never installs a value, and the affected record stays
//! non-valid so the next read retries it.

use thiserror::Error;

/// Errors produced by the store and by user compute/update functions.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A compute or update function reported a failure.
    ///
    /// User code creates this with [`StoreError::compute`]; the store fills
    /// in the atom name when the error leaves the failing computation.
    #[error("compute failed in {}: {reason}", .atom.as_deref().unwrap_or("<unknown atom>"))]
    Compute {
        atom: Option<String>,
        reason: String,
    },

    /// An atom (transitively) depends on itself.
    #[error("dependency cycle detected: {}", .path.join(" -> "))]
    Cycle { path: Vec<String> },

    /// A primitive write targeted a derived atom.
    #[error("atom {atom} is not a source atom and cannot be written directly")]
    NotWritable { atom: String },

    /// A cached value did not have the type its handle expects.
    #[error("atom {atom} holds a value of an unexpected type")]
    TypeMismatch { atom: String },

    /// Nested computations went deeper than the configured limit.
    #[error("compute depth exceeded {limit} nested evaluations")]
    DepthExceeded { limit: usize },

    /// The store configuration could not be parsed.
    #[error("invalid store configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Create a compute failure from inside a compute or update function.
    pub fn compute(reason: impl Into<String>) -> Self {
        Self::Compute {
            atom: None,
            reason: reason.into(),
        }
    }

    /// Check whether this error reports a dependency cycle.
    pub fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle { .. })
    }

    /// Attach the failing atom's name to a compute error that has none yet.
    pub(crate) fn in_atom(self, name: &str) -> Self {
        match self {
            Self::Compute { atom: None, reason } => Self::Compute {
                atom: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }
}
