//! Contains the `Error` and `Result` types that this crate uses.

use std::sync::Arc;

use thiserror::Error;

/// The result type returned by all fallible session and transaction operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur while driving the session state machine or the session manager.
///
/// The inner [`ErrorKind`] is wrapped in an `Arc` so that `Error` stays cheaply cloneable, which
/// matters for `with_transaction`'s error channel and for handles shared across tasks.
#[derive(Clone, Debug, Error)]
#[error("{kind}")]
pub struct Error {
    kind: Arc<ErrorKind>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Arc::new(kind),
        }
    }

    /// The kind of error that occurred.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub(crate) fn protocol_misuse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolMisuse {
            message: message.into(),
        })
    }

    pub(crate) fn wire(message: impl Into<String>, source: Option<Error>) -> Self {
        Self::new(ErrorKind::Wire {
            message: message.into(),
            source: source.map(Box::new),
        })
    }

    pub(crate) fn fatal_termination(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FatalTermination {
            message: message.into(),
        })
    }

    pub(crate) fn session_ended() -> Self {
        Self::new(ErrorKind::SessionEnded)
    }

    /// Creates an error from a panic payload caught inside `with_transaction`'s user closure.
    pub(crate) fn from_panic_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "transaction closure panicked".to_string()
        };
        Self::new(ErrorKind::TransactionAborted { message })
    }
}

/// The type of error that occurred.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An operation was requested that is not legal in the session's current state, e.g.
    /// `commit_transaction` with no transaction in progress.
    #[error("protocol misuse: {message}")]
    ProtocolMisuse {
        /// Human-readable description of the misuse.
        message: String,
    },

    /// The wire driver returned an error while executing the commit or abort command. The SSM has
    /// already transitioned to the terminal state regardless of this error.
    #[error("wire error: {message}")]
    Wire {
        /// Human-readable description of the failure.
        message: String,
        /// The underlying error, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    /// The user-supplied closure passed to `with_transaction` returned an error or panicked; the
    /// transaction was aborted as a result.
    #[error("transaction aborted: {message}")]
    TransactionAborted {
        /// Human-readable description of the cause.
        message: String,
    },

    /// The session actor terminated unexpectedly (e.g. a panic inside the actor task). Any
    /// best-effort cleanup abort is logged, not surfaced here.
    #[error("session terminated abnormally: {message}")]
    FatalTermination {
        /// Human-readable description of the termination reason.
        message: String,
    },

    /// The session's actor task has already stopped processing requests (its mailbox is closed),
    /// so the requested operation could not be delivered.
    #[error("session has already ended")]
    SessionEnded,

    /// The topology collaborator could not check out or check in a session.
    #[error("topology error: {message}")]
    Topology {
        /// Human-readable description of the failure.
        message: String,
    },
}

/// A lightweight tag for matching on [`ErrorKind`] variants without borrowing their payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKindTag {
    /// See [`ErrorKind::ProtocolMisuse`].
    ProtocolMisuse,
    /// See [`ErrorKind::Wire`].
    Wire,
    /// See [`ErrorKind::TransactionAborted`].
    TransactionAborted,
    /// See [`ErrorKind::FatalTermination`].
    FatalTermination,
    /// See [`ErrorKind::SessionEnded`].
    SessionEnded,
    /// See [`ErrorKind::Topology`].
    Topology,
}

impl ErrorKind {
    /// Returns a small tag identifying this variant, convenient for tests and callers that want to
    /// match on error category without destructuring.
    pub fn tag(&self) -> ErrorKindTag {
        match self {
            ErrorKind::ProtocolMisuse { .. } => ErrorKindTag::ProtocolMisuse,
            ErrorKind::Wire { .. } => ErrorKindTag::Wire,
            ErrorKind::TransactionAborted { .. } => ErrorKindTag::TransactionAborted,
            ErrorKind::FatalTermination { .. } => ErrorKindTag::FatalTermination,
            ErrorKind::SessionEnded => ErrorKindTag::SessionEnded,
            ErrorKind::Topology { .. } => ErrorKindTag::Topology,
        }
    }
}
