//! The SSM's mailbox message type.
//!
//! All variants but [`Message::AdvanceOperationTime`] are request/reply: the actor replies exactly
//! once via the embedded `oneshot` sender before handling the next message. `AdvanceOperationTime`
//! is a cast, fire-and-forget with no reply.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::{
    cluster_time::OperationTime,
    command::Command,
    error::Result,
    options::TransactionOptions,
    server_session::ServerSession,
    wire::Connection,
};

/// Outcome of `end_implicit_session` against a session that turned out to be explicit: this is a
/// `noop`, not an error, and does not stop the actor.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum EndImplicitOutcome {
    /// The session was implicit and has been ended; here is its recovered server session.
    Ended,
    /// The session was explicit; nothing happened.
    Noop,
}

pub(crate) enum Message {
    StartTransaction {
        options: Option<TransactionOptions>,
        reply: oneshot::Sender<Result<()>>,
    },
    BindSession {
        cmd: Command,
        reply: oneshot::Sender<Result<(Arc<dyn Connection>, Command)>>,
    },
    CommitTransaction {
        reply: oneshot::Sender<Result<()>>,
    },
    AbortTransaction {
        reply: oneshot::Sender<Result<()>>,
    },
    Connection {
        reply: oneshot::Sender<Arc<dyn Connection>>,
    },
    ServerSessionInfo {
        reply: oneshot::Sender<(ServerSession, bool)>,
    },
    AdvanceOperationTime {
        operation_time: OperationTime,
    },
    EndSession {
        reply: oneshot::Sender<ServerSession>,
    },
    EndImplicitSession {
        reply: oneshot::Sender<(EndImplicitOutcome, Option<ServerSession>)>,
    },
}
