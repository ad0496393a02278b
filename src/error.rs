//! Error types for the tree synchronizer
//!
//! Every variant is recoverable except `MalformedSnapshot`, which aborts the
//! session start. Callers restore the Scanning/pending invariant before an
//! error leaves the synchronizer.

use crate::tree::NodePath;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// Handshake or scan payload is missing identity fields
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),

    /// Toggle or response references a node that is not in the tree
    #[error("unknown path '{0}'")]
    UnknownPath(NodePath),

    /// A fetch for this path is already in flight
    #[error("a scan of '{0}' is already pending")]
    AlreadyPending(NodePath),

    /// No response arrived before the deadline
    #[error("scan of '{0}' timed out")]
    RequestTimeout(NodePath),

    /// The agent answered with a non-sentinel error string
    #[error("agent error{}: {message}", path.as_ref().map(|p| format!(" for '{p}'")).unwrap_or_default())]
    RemoteError {
        path: Option<NodePath>,
        message: String,
    },

    /// The node kind has no remote operation (value leaves, or no tree yet)
    #[error("'{0}' cannot be scanned")]
    NotScannable(NodePath),

    /// The transport refused the outbound request
    #[error("channel error: {0}")]
    Channel(String),
}

pub type SyncResult<T> = Result<T, SyncError>;
