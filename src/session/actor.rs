//! The session actor: owns one [`crate::server_session::ServerSession`] and a bound connection,
//! and serves its mailbox one message at a time.

use std::sync::Arc;

use bson::Document;
use tokio::sync::mpsc;

use crate::{
    cluster_time::{self, OperationTime},
    command::Command,
    error::{Error, Result},
    options::{SessionOptions, TransactionOptions},
    server_session::ServerSession,
    session::{
        bind::{self, BindResult},
        messages::{EndImplicitOutcome, Message},
        state::TransactionState,
    },
    wire::{Connection, ADMIN_DATABASE},
};

/// Bounded mailbox capacity. The SSM processes one message at a time regardless of this bound;
/// it only limits how many requests may queue up before a caller's `send` itself awaits.
pub(crate) const MAILBOX_CAPACITY: usize = 32;

macro_rules! log_debug {
    ($($arg:tt)*) => {{
        #[cfg(feature = "tracing-unstable")]
        tracing::debug!($($arg)*);
        #[cfg(not(feature = "tracing-unstable"))]
        let _ = format_args!($($arg)*);
    }};
}

/// The actor's owned data.
pub(crate) struct Session {
    conn: Arc<dyn Connection>,
    server_session: ServerSession,
    wire_version: u32,
    implicit: bool,
    causal_consistency: bool,
    operation_time: Option<OperationTime>,
    session_options: SessionOptions,
    state: TransactionState,
    current_transaction_options: Option<TransactionOptions>,
}

/// A guard that, if dropped while armed, fires a best-effort abort on a detached task. This is
/// how abnormal termination is handled without requiring async work inside a synchronous
/// `Drop::drop`: the actor's ordinary termination path (`Session::terminate`)
/// synchronously awaits the same abort and disarms the guard afterwards, so in the normal case
/// this fires zero times; it only fires if the actor task itself unwinds (e.g. a panic while
/// handling a message) before reaching that cleanup step.
struct AbortOnDrop {
    armed: bool,
    conn: Arc<dyn Connection>,
    server_session: ServerSession,
    write_concern: Option<Document>,
}

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let termination = Error::fatal_termination(
            "session actor terminating abnormally with a transaction in progress; issuing a \
             best-effort abort",
        );
        log_debug!("{termination}");
        let conn = self.conn.clone();
        let cmd = bind::abort_command(&self.server_session, self.write_concern.clone());
        tokio::spawn(async move {
            if let Err(err) = conn.exec_command(cmd, ADMIN_DATABASE).await {
                let err = Error::fatal_termination(format!("best-effort abort on abnormal termination failed: {err}"));
                log_debug!("{err}");
            }
        });
    }
}

impl Session {
    pub(crate) fn new(
        conn: Arc<dyn Connection>,
        server_session: ServerSession,
        wire_version: u32,
        implicit: bool,
        session_options: SessionOptions,
    ) -> Self {
        let causal_consistency = session_options.causal_consistency();
        Self {
            conn,
            server_session,
            wire_version,
            implicit,
            causal_consistency,
            operation_time: None,
            session_options,
            state: TransactionState::NoTransaction,
            current_transaction_options: None,
        }
    }

    /// Spawns the actor on the current Tokio runtime and returns the sender half of its mailbox.
    pub(crate) fn spawn(self) -> mpsc::Sender<Message> {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        tokio::spawn(self.run(rx));
        tx
    }

    fn write_concern_doc(&self) -> Option<Document> {
        let wc = self
            .current_transaction_options
            .as_ref()
            .and_then(|o| o.write_concern.as_ref())?;
        if wc.is_empty() {
            return None;
        }
        bson::to_document(wc).ok()
    }

    fn max_commit_time_ms(&self) -> Option<i64> {
        self.current_transaction_options
            .as_ref()
            .and_then(|o| o.max_commit_time_ms)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Message>) {
        let mut guard = AbortOnDrop {
            armed: false,
            conn: self.conn.clone(),
            server_session: self.server_session.clone(),
            write_concern: None,
        };
        while let Some(message) = rx.recv().await {
            let should_stop = self.handle(message).await;
            guard.armed = self.state == TransactionState::InProgress;
            guard.server_session = self.server_session.clone();
            guard.write_concern = self.write_concern_doc();
            if should_stop {
                break;
            }
        }
        // If the loop exited because every `mpsc::Sender` was dropped (the mailbox-closed case,
        // e.g. a caller dropped its `SessionHandle` without calling `end_session`), no explicit
        // end message ran this cleanup, so run it now. If an explicit end message already ran it,
        // this is a no-op (state is no longer `InProgress`).
        self.abort_if_in_progress().await;
        guard.disarm();
    }

    /// The cleanup step common to every termination path: if a transaction is in progress, issue
    /// the abort command exactly once, synchronously, before the ServerSession is
    /// released to a caller or the actor stops serving its mailbox.
    async fn abort_if_in_progress(&mut self) {
        if self.state == TransactionState::InProgress {
            log_debug!("session actor stopping with a transaction in progress; issuing abort");
            let cmd = bind::abort_command(&self.server_session, self.write_concern_doc());
            let _ = self.conn.exec_command(cmd, ADMIN_DATABASE).await;
            self.state = TransactionState::Aborted;
        }
    }

    /// Handles one mailbox message, returning `true` if the actor should stop serving its
    /// mailbox after this message (i.e. `end_session`, or `end_implicit_session` against an
    /// implicit session).
    async fn handle(&mut self, message: Message) -> bool {
        match message {
            Message::StartTransaction { options, reply } => {
                let _ = reply.send(self.start_transaction(options));
                false
            }
            Message::BindSession { cmd, reply } => {
                let _ = reply.send(self.bind_session(cmd));
                false
            }
            Message::CommitTransaction { reply } => {
                let result = self.commit_transaction().await;
                let _ = reply.send(result);
                false
            }
            Message::AbortTransaction { reply } => {
                let result = self.abort_transaction().await;
                let _ = reply.send(result);
                false
            }
            Message::Connection { reply } => {
                let _ = reply.send(self.conn.clone());
                false
            }
            Message::ServerSessionInfo { reply } => {
                let _ = reply.send((self.server_session.clone(), self.implicit));
                false
            }
            Message::AdvanceOperationTime { operation_time } => {
                cluster_time::advance(&mut self.operation_time, operation_time);
                false
            }
            Message::EndSession { reply } => {
                self.abort_if_in_progress().await;
                let _ = reply.send(self.server_session.clone());
                true
            }
            Message::EndImplicitSession { reply } => {
                if self.implicit {
                    self.abort_if_in_progress().await;
                    let _ = reply.send((EndImplicitOutcome::Ended, Some(self.server_session.clone())));
                    true
                } else {
                    let _ = reply.send((EndImplicitOutcome::Noop, None));
                    false
                }
            }
        }
    }

    fn start_transaction(&mut self, options: Option<TransactionOptions>) -> Result<()> {
        if !self.state.can_start_transaction() {
            return Err(Error::protocol_misuse(
                "transaction already in progress; call commit_transaction or abort_transaction first",
            ));
        }
        self.server_session = self.server_session.next_txn_num();
        let defaults = self.session_options.default_transaction_options.as_ref();
        self.current_transaction_options = Some(match options {
            Some(options) => options.merged_over(defaults),
            None => defaults.cloned().unwrap_or_default(),
        });
        self.state = TransactionState::Starting;
        Ok(())
    }

    fn bind_session(&mut self, cmd: Command) -> Result<(Arc<dyn Connection>, Command)> {
        let BindResult { cmd, new_state } = bind::bind_session(
            cmd,
            self.state,
            self.wire_version,
            &self.server_session,
            self.causal_consistency,
            self.operation_time,
        );
        self.state = new_state;
        Ok((self.conn.clone(), cmd))
    }

    async fn commit_transaction(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Starting => {
                self.state = TransactionState::Committed;
                Ok(())
            }
            TransactionState::InProgress => {
                log_debug!("Running commit transaction");
                let cmd = bind::commit_command(
                    &self.server_session,
                    self.write_concern_doc(),
                    self.max_commit_time_ms(),
                );
                let result = self.conn.exec_command(cmd, ADMIN_DATABASE).await;
                self.state = TransactionState::Committed;
                result
                    .map(|_| ())
                    .map_err(|e| Error::wire("commitTransaction failed", Some(e)))
            }
            TransactionState::NoTransaction | TransactionState::Committed | TransactionState::Aborted => {
                Err(Error::protocol_misuse("no transaction started"))
            }
        }
    }

    async fn abort_transaction(&mut self) -> Result<()> {
        match self.state {
            TransactionState::Starting => {
                self.state = TransactionState::Aborted;
                Ok(())
            }
            TransactionState::InProgress => {
                log_debug!("Running abort transaction");
                let cmd = bind::abort_command(&self.server_session, self.write_concern_doc());
                let result = self.conn.exec_command(cmd, ADMIN_DATABASE).await;
                self.state = TransactionState::Aborted;
                result
                    .map(|_| ())
                    .map_err(|e| Error::wire("abortTransaction failed", Some(e)))
            }
            TransactionState::NoTransaction | TransactionState::Committed | TransactionState::Aborted => {
                Err(Error::protocol_misuse("no transaction started"))
            }
        }
    }
}
