//! Pure command-decoration logic behind `bind_session` and the causal-consistency read concern
//! augmentation.
//!
//! Kept free of the actor/mailbox plumbing so it can be exercised directly in unit tests.

use bson::{doc, Bson, Document};

use crate::{
    cluster_time::OperationTime,
    command::{strip_nulls, Command},
    server_session::ServerSession,
    session::state::TransactionState,
};

/// MongoDB wire versions below this do not understand session metadata at all (MongoDB 3.4 and
/// older).
pub const MIN_SESSIONS_WIRE_VERSION: u32 = 6;

/// The result of decorating a command via [`bind_session`].
pub(crate) struct BindResult {
    /// The decorated command, ready to hand to the wire driver.
    pub cmd: Command,
    /// The transaction state after decoration (`Starting` moves to `InProgress`; all other states
    /// are unchanged by binding).
    pub new_state: TransactionState,
}

/// Decorates `cmd` with session metadata appropriate to `state`.
///
/// `wire_version < MIN_SESSIONS_WIRE_VERSION` is a no-op: the command comes back unchanged and the
/// state does not advance.
pub(crate) fn bind_session(
    mut cmd: Command,
    state: TransactionState,
    wire_version: u32,
    server_session: &ServerSession,
    causal_consistency: bool,
    operation_time: Option<OperationTime>,
) -> BindResult {
    if wire_version < MIN_SESSIONS_WIRE_VERSION {
        return BindResult {
            cmd,
            new_state: state,
        };
    }

    cmd.insert("lsid", server_session.lsid());

    let new_state = match state {
        TransactionState::NoTransaction
        | TransactionState::Committed
        | TransactionState::Aborted => {
            apply_read_concern(&mut cmd, causal_consistency, operation_time);
            state
        }
        TransactionState::Starting => {
            cmd.insert("txnNumber", Bson::Int64(server_session.txn_num()));
            cmd.insert("startTransaction", true);
            cmd.insert("autocommit", false);
            apply_read_concern(&mut cmd, causal_consistency, operation_time);
            cmd.remove("writeConcern");
            TransactionState::InProgress
        }
        TransactionState::InProgress => {
            cmd.insert("txnNumber", Bson::Int64(server_session.txn_num()));
            cmd.insert("autocommit", false);
            cmd.remove("readConcern");
            cmd.remove("writeConcern");
            TransactionState::InProgress
        }
    };

    strip_nulls(&mut cmd);
    BindResult { cmd, new_state }
}

/// Applies the causal-consistency read-concern augmentation to `cmd`'s `readConcern` key in
/// place: sets `afterClusterTime` to `operation_time` when `causal_consistency` is set and an
/// operation time has been observed, preserving any other fields the caller already put in
/// `readConcern`. Drops the `readConcern` key entirely if the result would be empty.
pub(crate) fn apply_read_concern(
    cmd: &mut Document,
    causal_consistency: bool,
    operation_time: Option<OperationTime>,
) {
    let existing = cmd.remove("readConcern");

    let mut read_concern = match existing {
        Some(Bson::Document(doc)) => doc,
        Some(_) | None => Document::new(),
    };

    if causal_consistency {
        if let Some(operation_time) = operation_time {
            read_concern.insert("afterClusterTime", operation_time);
        }
    }

    if !read_concern.is_empty() {
        cmd.insert("readConcern", read_concern);
    }
}

/// Builds the `commitTransaction` command document.
pub(crate) fn commit_command(
    server_session: &ServerSession,
    write_concern: Option<Document>,
    max_time_ms: Option<i64>,
) -> Command {
    let mut cmd = doc! {
        "commitTransaction": 1,
        "lsid": server_session.lsid(),
        "txnNumber": Bson::Int64(server_session.txn_num()),
        "autocommit": false,
    };
    crate::command::insert_if_some(&mut cmd, "writeConcern", write_concern);
    crate::command::insert_if_some(&mut cmd, "maxTimeMS", max_time_ms);
    cmd
}

/// Builds the `abortTransaction` command document.
pub(crate) fn abort_command(server_session: &ServerSession, write_concern: Option<Document>) -> Command {
    let mut cmd = doc! {
        "abortTransaction": 1,
        "lsid": server_session.lsid(),
        "txnNumber": Bson::Int64(server_session.txn_num()),
        "autocommit": false,
    };
    crate::command::insert_if_some(&mut cmd, "writeConcern", write_concern);
    cmd
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cluster_time::OperationTime;

    fn session_at(txn_num: i64) -> ServerSession {
        let mut s = ServerSession::new();
        for _ in 0..txn_num {
            s = s.next_txn_num();
        }
        s
    }

    #[test]
    fn wire_version_below_six_is_a_no_op() {
        let session = ServerSession::new();
        let cmd = doc! { "find": "c" };
        let result = bind_session(cmd.clone(), TransactionState::NoTransaction, 5, &session, false, None);
        assert_eq!(result.cmd, cmd);
        assert_eq!(result.new_state, TransactionState::NoTransaction);
    }

    #[test]
    fn no_transaction_state_adds_lsid_and_no_txn_fields() {
        let session = ServerSession::new();
        let cmd = doc! { "find": "c" };
        let result = bind_session(cmd, TransactionState::NoTransaction, 6, &session, false, None);
        assert!(result.cmd.contains_key("lsid"));
        assert!(!result.cmd.contains_key("txnNumber"));
        assert!(!result.cmd.contains_key("startTransaction"));
        assert!(!result.cmd.contains_key("autocommit"));
        assert_eq!(result.new_state, TransactionState::NoTransaction);
    }

    #[test]
    fn starting_transaction_adds_expected_fields_and_drops_write_concern() {
        let session = session_at(1);
        let cmd = doc! { "insert": "c", "documents": [], "writeConcern": { "w": 1 } };
        let result = bind_session(cmd, TransactionState::Starting, 6, &session, false, None);
        assert_eq!(result.cmd.get_i64("txnNumber").unwrap(), 1);
        assert_eq!(result.cmd.get_bool("startTransaction").unwrap(), true);
        assert_eq!(result.cmd.get_bool("autocommit").unwrap(), false);
        assert!(!result.cmd.contains_key("writeConcern"));
        assert_eq!(result.new_state, TransactionState::InProgress);
    }

    #[test]
    fn in_progress_drops_read_and_write_concern() {
        let session = session_at(1);
        let cmd = doc! {
            "find": "c",
            "readConcern": { "level": "majority" },
            "writeConcern": { "w": 1 },
        };
        let result = bind_session(cmd, TransactionState::InProgress, 6, &session, false, None);
        assert!(!result.cmd.contains_key("readConcern"));
        assert!(!result.cmd.contains_key("writeConcern"));
        assert_eq!(result.cmd.get_i64("txnNumber").unwrap(), 1);
        assert!(!result.cmd.contains_key("startTransaction"));
        assert_eq!(result.new_state, TransactionState::InProgress);
    }

    #[test]
    fn causal_consistency_sets_after_cluster_time() {
        let session = ServerSession::new();
        let operation_time = OperationTime {
            time: 1567853627,
            increment: 6,
        };
        let cmd = doc! { "find": "c" };
        let result = bind_session(
            cmd,
            TransactionState::NoTransaction,
            6,
            &session,
            true,
            Some(operation_time),
        );
        let rc = result.cmd.get_document("readConcern").unwrap();
        assert_eq!(rc.get_timestamp("afterClusterTime").unwrap(), operation_time);
    }

    #[test]
    fn no_causal_consistency_omits_read_concern() {
        let session = ServerSession::new();
        let operation_time = OperationTime {
            time: 1567853627,
            increment: 6,
        };
        let cmd = doc! { "find": "c" };
        let result = bind_session(
            cmd,
            TransactionState::NoTransaction,
            6,
            &session,
            false,
            Some(operation_time),
        );
        assert!(!result.cmd.contains_key("readConcern"));
    }

    #[test]
    fn existing_read_concern_fields_are_preserved_alongside_after_cluster_time() {
        let session = ServerSession::new();
        let operation_time = OperationTime { time: 10, increment: 1 };
        let cmd = doc! { "find": "c", "readConcern": { "level": "majority" } };
        let result = bind_session(
            cmd,
            TransactionState::NoTransaction,
            6,
            &session,
            true,
            Some(operation_time),
        );
        let rc = result.cmd.get_document("readConcern").unwrap();
        assert_eq!(rc.get_str("level").unwrap(), "majority");
        assert_eq!(rc.get_timestamp("afterClusterTime").unwrap(), operation_time);
    }

    #[test]
    fn commit_command_shape() {
        let session = session_at(1);
        let cmd = commit_command(&session, None, None);
        assert_eq!(cmd.get_i32("commitTransaction").unwrap(), 1);
        assert_eq!(cmd.get_i64("txnNumber").unwrap(), 1);
        assert_eq!(cmd.get_bool("autocommit").unwrap(), false);
        assert!(!cmd.contains_key("writeConcern"));
        assert!(!cmd.contains_key("maxTimeMS"));
    }

    #[test]
    fn abort_command_shape() {
        let session = session_at(1);
        let cmd = abort_command(&session, Some(doc! { "w": "majority" }));
        assert_eq!(cmd.get_i32("abortTransaction").unwrap(), 1);
        assert_eq!(cmd.get_document("writeConcern").unwrap().get_str("w").unwrap(), "majority");
    }
}
