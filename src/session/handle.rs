//! [`SessionHandle`]: the cloneable, public-facing client of a session actor.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::{
    cluster_time::OperationTime,
    command::Command,
    concern::WriteConcern,
    error::{Error, Result},
    options::{SessionOptions, TransactionOptions},
    server_session::ServerSession,
    session::{
        actor::Session,
        messages::{EndImplicitOutcome, Message},
    },
    wire::Connection,
};

/// A handle to a running session actor.
///
/// Cloning a `SessionHandle` does not clone the session: every clone shares the same mailbox, so
/// operations from many callers are still serialized one at a time by the actor behind it.
/// Dropping every clone without calling [`SessionHandle::end_session`] still terminates the
/// session cleanly, since the actor's mailbox closes and it performs the same abort-if-in-progress
/// cleanup it would on an explicit end.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    tx: mpsc::Sender<Message>,
}

impl SessionHandle {
    /// Creates a new session actor bound to `conn` and spawns it, returning a handle to it.
    pub(crate) fn spawn(
        conn: Arc<dyn Connection>,
        server_session: ServerSession,
        wire_version: u32,
        implicit: bool,
        session_options: SessionOptions,
    ) -> Self {
        let session = Session::new(conn, server_session, wire_version, implicit, session_options);
        Self {
            tx: session.spawn(),
        }
    }

    async fn ask<T>(&self, make_msg: impl FnOnce(oneshot::Sender<T>) -> Message) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(make_msg(reply_tx))
            .await
            .map_err(|_| Error::session_ended())?;
        reply_rx.await.map_err(|_| Error::session_ended())
    }

    /// Starts a new transaction on this session with the session's default transaction options.
    ///
    /// Legal from `no_transaction`, `transaction_committed`, or `transaction_aborted`; any other
    /// state is reported as [`crate::error::ErrorKind::ProtocolMisuse`].
    pub async fn start_transaction(&self) -> Result<()> {
        self.start_transaction_with_options(None).await
    }

    /// Starts a new transaction, merging `options` (where set) over the session's default
    /// transaction options.
    pub async fn start_transaction_with_options(
        &self,
        options: Option<TransactionOptions>,
    ) -> Result<()> {
        self.ask(|reply| Message::StartTransaction { options, reply }).await?
    }

    /// Decorates `cmd` with this session's metadata and returns the connection to dispatch it on.
    pub async fn bind_session(&self, cmd: Command) -> Result<(Arc<dyn Connection>, Command)> {
        self.ask(|reply| Message::BindSession { cmd, reply }).await?
    }

    /// Commits the transaction in progress on this session.
    pub async fn commit_transaction(&self) -> Result<()> {
        self.ask(|reply| Message::CommitTransaction { reply }).await?
    }

    /// Aborts the transaction in progress on this session.
    pub async fn abort_transaction(&self) -> Result<()> {
        self.ask(|reply| Message::AbortTransaction { reply }).await?
    }

    /// The connection bound to this session.
    pub async fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.ask(|reply| Message::Connection { reply }).await
    }

    /// The server session and whether this session is implicit.
    pub async fn server_session(&self) -> Result<(ServerSession, bool)> {
        self.ask(|reply| Message::ServerSessionInfo { reply }).await
    }

    /// Advances this session's causal-consistency operation time. Fire-and-forget: does not wait
    /// for the actor to process it.
    pub fn advance_operation_time(&self, operation_time: OperationTime) {
        // A full mailbox would make this `send` block; `try_send` keeps the cast truly
        // non-blocking, at the cost of silently dropping an update if the mailbox is saturated,
        // which only delays (never corrupts) causal-consistency pinning, since the next
        // successful advance still moves `operation_time` forward to its latest value.
        let _ = self.tx.try_send(Message::AdvanceOperationTime { operation_time });
    }

    /// Extracts `operationTime` from a command reply and advances this session's
    /// causal-consistency bookkeeping.
    ///
    /// Only does so when `write_concern` is acknowledged: an unacknowledged write carries no
    /// causal guarantee, so advancing `operation_time` off its reply would let a later
    /// causally-consistent read pin itself to a write that might never have happened. Returns
    /// `doc` unchanged, and is idempotent: replaying the same reply against the same or an
    /// earlier operation time is a no-op.
    pub fn update_session(&self, doc: Command, write_concern: Option<&WriteConcern>) -> Command {
        let acknowledged = write_concern.map(WriteConcern::is_acknowledged).unwrap_or(true);
        if acknowledged {
            if let Ok(operation_time) = doc.get_timestamp("operationTime") {
                self.advance_operation_time(operation_time);
            }
        }
        doc
    }

    /// Ends this session unconditionally, stopping its actor and returning the recovered
    /// [`ServerSession`] for check-in. If a transaction was in progress, an abort is issued first.
    pub async fn end_session(self) -> Result<ServerSession> {
        self.ask(|reply| Message::EndSession { reply }).await
    }

    /// Ends this session only if it is implicit; a no-op against an explicit session.
    ///
    /// Returns `Some(server_session)` if the session was implicit and has been ended, or `None`
    /// if it was explicit and nothing happened.
    pub async fn end_implicit_session(self) -> Result<Option<ServerSession>> {
        let (outcome, server_session) = self
            .ask(|reply| Message::EndImplicitSession { reply })
            .await?;
        match outcome {
            EndImplicitOutcome::Ended => Ok(server_session),
            EndImplicitOutcome::Noop => Ok(None),
        }
    }
}

#[cfg(test)]
mod test {
    use bson::{doc, Timestamp};

    use super::*;
    use crate::{concern::Acknowledgment, options::SessionOptions, topology::mock::MockTopology, Topology};

    async fn handle_with_causal_consistency(topology: &Arc<dyn Topology>) -> SessionHandle {
        let options = SessionOptions::builder().causal_consistency(true).build();
        let outcome = topology.checkout_session(crate::topology::CheckoutKind::Explicit).await;
        let crate::topology::CheckoutOutcome::Ready(session) = outcome else {
            panic!("expected a ready checkout");
        };
        SessionHandle::spawn(session.conn, session.server_session, session.wire_version, false, options)
    }

    #[tokio::test]
    async fn update_session_returns_doc_unchanged() {
        let topology: Arc<dyn Topology> = Arc::new(MockTopology::new(6));
        let handle = handle_with_causal_consistency(&topology).await;
        let reply = doc! { "ok": 1.0, "operationTime": Timestamp { time: 10, increment: 1 } };
        let returned = handle.update_session(reply.clone(), None);
        assert_eq!(returned, reply);
    }

    #[tokio::test]
    async fn update_session_advances_operation_time_when_acknowledged() {
        let topology: Arc<dyn Topology> = Arc::new(MockTopology::new(6));
        let handle = handle_with_causal_consistency(&topology).await;
        let reply = doc! { "ok": 1.0, "operationTime": Timestamp { time: 10, increment: 1 } };
        handle.update_session(reply, None);

        let (_conn, cmd) = handle.bind_session(doc! { "find": "c" }).await.unwrap();
        let rc = cmd.get_document("readConcern").unwrap();
        assert_eq!(
            rc.get_timestamp("afterClusterTime").unwrap(),
            Timestamp { time: 10, increment: 1 }
        );
    }

    #[tokio::test]
    async fn update_session_ignores_unacknowledged_writes() {
        let topology: Arc<dyn Topology> = Arc::new(MockTopology::new(6));
        let handle = handle_with_causal_consistency(&topology).await;
        let reply = doc! { "ok": 1.0, "operationTime": Timestamp { time: 10, increment: 1 } };
        let unacknowledged = WriteConcern::builder().w(Acknowledgment::Nodes(0)).build();
        handle.update_session(reply, Some(&unacknowledged));

        let (_conn, cmd) = handle.bind_session(doc! { "find": "c" }).await.unwrap();
        assert!(!cmd.contains_key("readConcern"));
    }

    #[tokio::test]
    async fn start_transaction_with_options_merges_over_session_defaults() {
        use crate::options::TransactionOptions;

        let topology: Arc<dyn Topology> = Arc::new(MockTopology::new(6));
        let outcome = topology
            .checkout_session(crate::topology::CheckoutKind::Explicit)
            .await;
        let crate::topology::CheckoutOutcome::Ready(session) = outcome else {
            panic!("expected a ready checkout");
        };
        let session_options = SessionOptions::builder()
            .default_transaction_options(
                TransactionOptions::builder()
                    .read_concern(crate::concern::ReadConcern::majority())
                    .write_concern(WriteConcern::builder().w(Acknowledgment::Majority).build())
                    .build(),
            )
            .build();
        let handle = SessionHandle::spawn(
            session.conn,
            session.server_session,
            session.wire_version,
            false,
            session_options,
        );

        let per_call = TransactionOptions::builder()
            .write_concern(WriteConcern::builder().journal(true).build())
            .build();
        handle.start_transaction_with_options(Some(per_call)).await.unwrap();

        let (_conn, cmd) = handle.bind_session(doc! { "insert": "c" }).await.unwrap();
        let rc = cmd.get_document("readConcern").unwrap();
        assert_eq!(rc.get_str("level").unwrap(), "majority");

        handle.commit_transaction().await.unwrap();
    }

    #[tokio::test]
    async fn update_session_tolerates_missing_operation_time() {
        let topology: Arc<dyn Topology> = Arc::new(MockTopology::new(6));
        let handle = handle_with_causal_consistency(&topology).await;
        let reply = doc! { "ok": 1.0 };
        let returned = handle.update_session(reply.clone(), None);
        assert_eq!(returned, reply);
    }
}
