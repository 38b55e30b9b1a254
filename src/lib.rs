//! A client-side implementation of MongoDB's session and transaction state machine.
//!
//! This crate owns exactly the session/transaction layer of a MongoDB driver: the per-session
//! logical-session-id/transaction-number bookkeeping, the five-state
//! transaction state machine, command decoration (`lsid`, `txnNumber`, `startTransaction`,
//! `autocommit`, causal-consistency `afterClusterTime`), and the Session Manager facade
//! (`start_session`, `with_transaction`, `end_session`). Wire framing, connection pooling, server
//! selection, and the BSON codec are modeled only as the [`wire::Connection`] and
//! [`topology::Topology`] collaborator traits; a full driver supplies real implementations of
//! both.
//!
//! # Architecture
//!
//! Each session is a single-threaded actor: a [`tokio::task`] that owns its
//! [`server_session::ServerSession`] and [`session::state::TransactionState`] and serves a bounded
//! mailbox one message at a time, so no other synchronization primitive guards its state. Callers
//! interact with it through the cloneable [`session::SessionHandle`], obtained from the
//! [`manager::SessionManager`] facade.

#![warn(missing_docs)]

use std::future::Future;
use std::pin::Pin;

/// A boxed, pinned, `Send` future, used at the collaborator trait boundaries
/// ([`wire::Connection`], [`topology::Topology`]) in place of `async fn` in traits.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod cluster_time;
pub mod command;
pub mod concern;
pub mod error;
pub mod manager;
pub mod options;
pub mod server_session;
pub mod session;
pub mod topology;
pub mod wire;

pub use cluster_time::OperationTime;
pub use error::{Error, ErrorKind, ErrorKindTag, Result};
pub use manager::SessionManager;
pub use options::{SessionOptions, TransactionOptions};
pub use server_session::ServerSession;
pub use session::{handle::SessionHandle, state::TransactionState};
pub use topology::{CheckoutKind, Topology};
pub use wire::Connection;
