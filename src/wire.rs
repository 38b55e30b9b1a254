//! The wire/connection driver collaborator, deliberately out of scope for this crate beyond the
//! interface the session core consumes.

use crate::{command::Command, error::Result, BoxFuture};

/// The database every session-management command targets.
pub const ADMIN_DATABASE: &str = "admin";

/// A handle to a connection usable by the wire driver.
///
/// The session core treats `Connection` as an opaque, shared collaborator: it owns none of the
/// pooling, TLS, or framing logic, and only ever calls [`Connection::exec_command`] against the
/// `admin` database when dispatching `commitTransaction`/`abortTransaction`. Production callers
/// implement this trait over their own pooled, thread-safe wire machinery; test code uses an
/// in-memory mock.
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Executes `command` against `database` on this connection and returns the raw reply
    /// document, or an error surfaced from the wire driver.
    fn exec_command<'a>(&'a self, command: Command, database: &'a str) -> BoxFuture<'a, Result<Command>>;
}

#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    //! An in-memory [`Connection`] used by this crate's own tests and available to downstream
    //! crates that want a quick stand-in under `test-util`.

    use std::sync::Mutex;

    use bson::doc;

    use super::*;

    /// Records every command dispatched to it and replies with a canned or computed response.
    #[derive(Debug, Default)]
    pub struct MockConnection {
        dispatched: Mutex<Vec<(String, Command)>>,
        fail_next: Mutex<Option<String>>,
    }

    impl MockConnection {
        /// Creates a connection with no recorded history.
        pub fn new() -> Self {
            Self::default()
        }

        /// Arranges for the next dispatched command to fail with `message`.
        pub fn fail_next_command(&self, message: impl Into<String>) {
            *self.fail_next.lock().unwrap() = Some(message.into());
        }

        /// All commands dispatched so far, in dispatch order, as `(database, command)` pairs.
        pub fn dispatched(&self) -> Vec<(String, Command)> {
            self.dispatched.lock().unwrap().clone()
        }

        /// The most recently dispatched command, if any.
        pub fn last_dispatched(&self) -> Option<Command> {
            self.dispatched.lock().unwrap().last().map(|(_, cmd)| cmd.clone())
        }
    }

    impl Connection for MockConnection {
        fn exec_command<'a>(
            &'a self,
            command: Command,
            database: &'a str,
        ) -> BoxFuture<'a, Result<Command>> {
            Box::pin(async move {
                self.dispatched
                    .lock()
                    .unwrap()
                    .push((database.to_string(), command));
                if let Some(message) = self.fail_next.lock().unwrap().take() {
                    return Err(crate::error::Error::wire(message, None));
                }
                Ok(doc! { "ok": 1.0 })
            })
        }
    }
}
