//! Errors surfaced by the grant controller.
//!

use std::fmt::Display;

use thiserror::Error;

use crate::remote::RemoteError;

/// The controller operations, used for retry budgets and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Grant, then read back
    Create,
    /// List and reconcile
    Read,
    /// Revoke
    Delete,
}

impl Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Create => write!(f, "creating"),
            Operation::Read => write!(f, "reading"),
            Operation::Delete => write!(f, "revoking"),
        }
    }
}

/// The listed permissions don't line up with the declared grant.
///
/// The data was fetched fine; retrying won't change it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// Nothing matched the declared resource.
    #[error("no permissions found")]
    NoPermissionsFound,
    /// More entries matched than the select split can explain.
    #[error("multiple permissions found for same resource ({0} entries)")]
    MultiplePermissionsFound(usize),
}

/// Everything that can go wrong reconciling a grant.
#[derive(Debug, Error)]
pub enum GrantError {
    /// The service rejected a call, either outright or after the retry
    /// budget ran out.
    #[error("error {operation} permissions (input: {input}): {source}")]
    Remote {
        /// What was being done
        operation: Operation,
        /// The request that was attempted
        input: String,
        /// The service error
        #[source]
        source: RemoteError,
    },
    /// Read matched zero or too many entries.
    #[error("error reading permissions: {0}")]
    Consistency(#[from] ConsistencyError),
    /// The caller cancelled while the operation was in flight. The whole
    /// operation can safely be started over.
    #[error("{operation} permissions was cancelled")]
    Cancelled {
        /// What was being done
        operation: Operation,
    },
    /// The request can't be sent as is.
    #[error("invalid grant request: {0}")]
    InvalidRequest(String),
}

impl GrantError {
    /// The service error behind this one, if any.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            GrantError::Remote { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Whether this is a consistency failure.
    pub fn is_consistency(&self) -> bool {
        matches!(self, GrantError::Consistency(_))
    }

    /// Whether this is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GrantError::Cancelled { .. })
    }
}
