//! The Session Manager: the facade user code drives sessions and transactions through.
//!
//! Owns no per-session data itself: it checks a server session and connection out of a
//! [`Topology`], spawns a session actor bound to them, and hands back a [`SessionHandle`]. This
//! mirrors the shape of a `Client::start_session`/`ClientSession` pairing, but the manager here is
//! a thin checkout/retry/spawn layer rather than also owning the session's state.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::{
    error::{Error, Result},
    options::SessionOptions,
    server_session::ServerSession,
    session::SessionHandle,
    topology::{CheckedOutSession, CheckoutKind, CheckoutOutcome, Topology},
};

/// How many times [`SessionManager`] retries a checkout that returns
/// [`CheckoutOutcome::NewConnection`] before giving up.
///
/// The topology replacing its connection mid-checkout is expected to be rare and transient, so a
/// small, fixed retry budget is used rather than retrying indefinitely.
pub const MAX_CHECKOUT_RETRIES: u32 = 3;

/// Checks sessions in and out of a [`Topology`] and spawns the actor backing each one.
///
/// Cheap to clone: it holds only an `Arc<dyn Topology>`.
#[derive(Clone, Debug)]
pub struct SessionManager {
    topology: Arc<dyn Topology>,
}

impl SessionManager {
    /// Creates a manager backed by `topology`.
    pub fn new(topology: Arc<dyn Topology>) -> Self {
        Self { topology }
    }

    async fn checkout(&self, kind: CheckoutKind) -> Result<CheckedOutSession> {
        for _ in 0..MAX_CHECKOUT_RETRIES {
            match self.topology.checkout_session(kind).await {
                CheckoutOutcome::Ready(session) => return Ok(session),
                CheckoutOutcome::NewConnection => continue,
                CheckoutOutcome::Err(err) => return Err(err),
            }
        }
        Err(Error::new(crate::error::ErrorKind::Topology {
            message: format!(
                "checkout did not stabilize after {MAX_CHECKOUT_RETRIES} attempts (topology kept \
                 replacing its connection)"
            ),
        }))
    }

    /// Starts a new explicit session with `options`, retrying checkout against a topology that
    /// keeps swapping connections.
    pub async fn start_session(&self, options: SessionOptions) -> Result<SessionHandle> {
        let CheckedOutSession {
            server_session,
            conn,
            wire_version,
        } = self.checkout(CheckoutKind::Explicit).await?;
        Ok(SessionHandle::spawn(
            conn,
            server_session,
            wire_version,
            false,
            options,
        ))
    }

    /// Starts a session implicitly for the duration of a single operation, unless `existing` is
    /// already provided, in which case it is returned unchanged.
    pub async fn start_implicit_session(
        &self,
        existing: Option<SessionHandle>,
    ) -> Result<SessionHandle> {
        if let Some(handle) = existing {
            return Ok(handle);
        }
        let CheckedOutSession {
            server_session,
            conn,
            wire_version,
        } = self.checkout(CheckoutKind::Implicit).await?;
        Ok(SessionHandle::spawn(
            conn,
            server_session,
            wire_version,
            true,
            SessionOptions::default(),
        ))
    }

    /// Ends an explicit session, returning its recovered [`ServerSession`] to the topology.
    pub async fn end_session(&self, handle: SessionHandle) -> Result<()> {
        let server_session = handle.end_session().await?;
        self.checkin(server_session).await
    }

    /// Ends a session only if it is implicit, returning its [`ServerSession`] to the topology when
    /// it was.
    pub async fn end_implicit_session(&self, handle: SessionHandle) -> Result<()> {
        if let Some(server_session) = handle.end_implicit_session().await? {
            self.checkin(server_session).await?;
        }
        Ok(())
    }

    async fn checkin(&self, server_session: ServerSession) -> Result<()> {
        self.topology.checkin_session(server_session).await
    }

    /// Acquires a new session, runs `callback` inside a transaction on it, and releases the
    /// session back to the topology on every outcome.
    ///
    /// On success, the transaction is committed and the function's result returned. On failure,
    /// whether `callback` returned an error or panicked, the transaction is aborted and the
    /// original error is returned. `callback` is caught against panics with
    /// [`futures_util::FutureExt::catch_unwind`], so a panic inside it still guarantees the
    /// session is checked back in rather than unwinding past the checkout.
    ///
    /// Neither the Session Manager nor the SSM retries a commit or abort: a single `callback`
    /// invocation runs per call.
    pub async fn with_transaction<F, Fut, T>(
        &self,
        options: SessionOptions,
        mut callback: F,
    ) -> Result<T>
    where
        F: FnMut(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let session = self.start_session(options).await?;
        session.start_transaction().await?;

        let outcome = AssertUnwindSafe(callback(session.clone()))
            .catch_unwind()
            .await;

        let result = match outcome {
            Ok(Ok(value)) => {
                let commit_result = session.commit_transaction().await;
                commit_result.map(|()| value)
            }
            Ok(Err(err)) => {
                let _ = session.abort_transaction().await;
                Err(err)
            }
            Err(payload) => {
                let _ = session.abort_transaction().await;
                Err(Error::from_panic_payload(payload))
            }
        };

        self.end_session(session).await?;
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::mock::MockTopology;

    fn manager_with(topology: Arc<MockTopology>) -> SessionManager {
        SessionManager::new(topology)
    }

    #[tokio::test]
    async fn start_session_checks_out_an_explicit_session() {
        let topology = Arc::new(MockTopology::new(6));
        let manager = manager_with(topology.clone());
        let session = manager.start_session(SessionOptions::default()).await.unwrap();
        let (_server_session, implicit) = session.server_session().await.unwrap();
        assert!(!implicit);
    }

    #[tokio::test]
    async fn start_implicit_session_returns_existing_handle_unchanged() {
        let topology = Arc::new(MockTopology::new(6));
        let manager = manager_with(topology.clone());
        let existing = manager.start_session(SessionOptions::default()).await.unwrap();
        let (existing_server_session, _) = existing.server_session().await.unwrap();

        let returned = manager.start_implicit_session(Some(existing)).await.unwrap();
        let (returned_server_session, implicit) = returned.server_session().await.unwrap();
        assert_eq!(existing_server_session, returned_server_session);
        assert!(!implicit);
    }

    #[tokio::test]
    async fn checkout_retries_past_new_connection_replies() {
        let topology = Arc::new(MockTopology::new(6));
        topology.queue_new_connection_replies(2);
        let manager = manager_with(topology.clone());
        let session = manager.start_session(SessionOptions::default()).await.unwrap();
        let (_server_session, implicit) = session.server_session().await.unwrap();
        assert!(!implicit);
    }

    #[tokio::test]
    async fn checkout_gives_up_after_max_retries() {
        let topology = Arc::new(MockTopology::new(6));
        topology.queue_new_connection_replies(MAX_CHECKOUT_RETRIES);
        let manager = manager_with(topology.clone());
        let result = manager.start_session(SessionOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn end_session_checks_server_session_back_in() {
        let topology = Arc::new(MockTopology::new(6));
        let manager = manager_with(topology.clone());
        let session = manager.start_session(SessionOptions::default()).await.unwrap();
        let (server_session, _) = session.server_session().await.unwrap();
        manager.end_session(session).await.unwrap();
        assert_eq!(topology.checked_in(), vec![server_session]);
    }

    #[tokio::test]
    async fn with_transaction_commits_on_success() {
        let topology = Arc::new(MockTopology::new(6));
        let manager = manager_with(topology.clone());

        let result = manager
            .with_transaction(SessionOptions::default(), |s| async move {
                s.bind_session(bson::doc! { "insert": "c" }).await?;
                Ok(42)
            })
            .await
            .unwrap();
        assert_eq!(result, 42);

        let conn = topology.connection();
        let dispatched = conn.dispatched();
        assert!(dispatched
            .iter()
            .any(|(_, cmd)| cmd.contains_key("commitTransaction")));
        assert_eq!(topology.checked_in().len(), 1);
    }

    #[tokio::test]
    async fn with_transaction_aborts_on_callback_error() {
        let topology = Arc::new(MockTopology::new(6));
        let manager = manager_with(topology.clone());

        let result: Result<()> = manager
            .with_transaction(SessionOptions::default(), |s| async move {
                s.bind_session(bson::doc! { "insert": "c" }).await?;
                Err(Error::protocol_misuse("callback failed"))
            })
            .await;
        assert!(result.is_err());

        let conn = topology.connection();
        let dispatched = conn.dispatched();
        assert!(dispatched
            .iter()
            .any(|(_, cmd)| cmd.contains_key("abortTransaction")));
        assert_eq!(topology.checked_in().len(), 1);
    }
}
