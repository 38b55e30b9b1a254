//! The closed five-value transaction-state enumeration.

/// The state of the transaction currently associated with a session.
///
/// This is a closed, tagged enumeration rather than a string: transitions between states are
/// handled by exhaustive matches in [`crate::session::bind`] and [`crate::session::actor`], and
/// any (operation, state) pair not covered there is a [`crate::error::ErrorKind::ProtocolMisuse`].
///
/// `Committed` and `Aborted` are not terminal in the FSM sense: a new transaction can be started
/// from either of them, moving back into `Starting`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionState {
    /// No transaction has been started, or the previously started one has concluded and no new
    /// one has been started yet from this state.
    NoTransaction,
    /// `start_transaction` has been called but no statement has been sent yet.
    Starting,
    /// At least one statement has been sent within the current transaction.
    InProgress,
    /// The transaction was committed.
    Committed,
    /// The transaction was aborted.
    Aborted,
}

impl TransactionState {
    /// Whether `start_transaction` is legal from this state: no transaction, committed, or
    /// aborted.
    pub(crate) fn can_start_transaction(self) -> bool {
        matches!(
            self,
            TransactionState::NoTransaction | TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl Default for TransactionState {
    fn default() -> Self {
        TransactionState::NoTransaction
    }
}
