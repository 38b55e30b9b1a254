//! The topology collaborator: checks sessions in and out of a server-side/process-wide pool.
//! Deliberately out of scope beyond this interface, since the real implementation negotiates
//! server sessions, wire versions, and connection lifetimes with a live deployment.

use std::sync::Arc;

use crate::{error::Result, server_session::ServerSession, wire::Connection, BoxFuture};

/// Distinguishes sessions opened by user code from sessions auto-created for a single operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckoutKind {
    /// Opened and ended by user code.
    Explicit,
    /// Auto-created for one operation, ended automatically once it completes.
    Implicit,
}

/// A successfully checked-out session, bundling everything the SSM needs to start running.
#[derive(Debug)]
pub struct CheckedOutSession {
    /// The server session handed out by the pool.
    pub server_session: ServerSession,
    /// The connection the SSM should bind to.
    pub conn: Arc<dyn Connection>,
    /// The wire version advertised by the server this connection is bound to.
    pub wire_version: u32,
}

/// The outcome of a `checkout_session` call.
#[derive(Debug)]
pub enum CheckoutOutcome {
    /// A session was checked out successfully.
    Ready(CheckedOutSession),
    /// The topology replaced the underlying connection while checkout was in flight; a
    /// recoverable condition the Session Manager retries.
    NewConnection,
    /// Checkout failed for a reason the Session Manager should propagate.
    Err(crate::error::Error),
}

/// The topology collaborator consumed by the Session Manager.
///
/// Production implementations negotiate with a live deployment (server selection, wire version
/// discovery, connection pooling); this crate only needs the two operations below and ships an
/// in-memory mock (under `test-util`) for its own tests.
pub trait Topology: Send + Sync + std::fmt::Debug {
    /// Checks out a session of the given `kind`, applying `opts`.
    fn checkout_session<'a>(&'a self, kind: CheckoutKind) -> BoxFuture<'a, CheckoutOutcome>;

    /// Returns a server session to the pool.
    fn checkin_session<'a>(&'a self, server_session: ServerSession) -> BoxFuture<'a, Result<()>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! An in-memory [`Topology`] used by this crate's own tests.

    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::wire::mock::MockConnection;

    /// A topology collaborator backed by a single shared [`MockConnection`] and a fixed wire
    /// version, with an optional queue of `NewConnection` replies to exercise the Session
    /// Manager's checkout retry discipline.
    #[derive(Debug)]
    pub struct MockTopology {
        conn: Arc<MockConnection>,
        wire_version: u32,
        checked_in: Mutex<Vec<ServerSession>>,
        pending_new_connection_replies: Mutex<u32>,
    }

    impl MockTopology {
        /// Creates a mock topology bound to a fresh [`MockConnection`] at the given wire version.
        pub fn new(wire_version: u32) -> Self {
            Self {
                conn: Arc::new(MockConnection::new()),
                wire_version,
                checked_in: Mutex::new(Vec::new()),
                pending_new_connection_replies: Mutex::new(0),
            }
        }

        /// The shared connection every checkout returns.
        pub fn connection(&self) -> Arc<MockConnection> {
            self.conn.clone()
        }

        /// Every server session checked back in so far, in check-in order.
        pub fn checked_in(&self) -> Vec<ServerSession> {
            self.checked_in.lock().unwrap().clone()
        }

        /// Makes the next `n` calls to `checkout_session` return [`CheckoutOutcome::NewConnection`]
        /// before a real session is handed out.
        pub fn queue_new_connection_replies(&self, n: u32) {
            *self.pending_new_connection_replies.lock().unwrap() = n;
        }
    }

    impl Topology for MockTopology {
        fn checkout_session<'a>(&'a self, kind: CheckoutKind) -> BoxFuture<'a, CheckoutOutcome> {
            Box::pin(async move {
                let _ = kind;
                let mut pending = self.pending_new_connection_replies.lock().unwrap();
                if *pending > 0 {
                    *pending -= 1;
                    return CheckoutOutcome::NewConnection;
                }
                CheckoutOutcome::Ready(CheckedOutSession {
                    server_session: ServerSession::new(),
                    conn: self.conn.clone(),
                    wire_version: self.wire_version,
                })
            })
        }

        fn checkin_session<'a>(&'a self, server_session: ServerSession) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                self.checked_in.lock().unwrap().push(server_session);
                Ok(())
            })
        }
    }
}
