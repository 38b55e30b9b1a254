//! The client-side record of a server-issued logical session id and its transaction-number
//! counter. See [`ServerSession`].

use bson::{spec::BinarySubtype, Binary, Bson};
use uuid::Uuid;

/// Client-side record of a server-issued logical session identifier (`lsid`) and the last
/// transaction number allocated within it.
///
/// `ServerSession` is pure data: it performs no I/O and cannot fail. The only mutator,
/// [`ServerSession::next_txn_num`], returns a new value rather than mutating in place so that the
/// monotonicity invariant is visible at every call site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerSession {
    id: [u8; 16],
    txn_num: i64,
}

impl ServerSession {
    /// Creates a new server session, generating its id client-side from a cryptographically
    /// sound random source.
    pub fn new() -> Self {
        Self {
            id: *Uuid::new_v4().as_bytes(),
            txn_num: 0,
        }
    }

    /// The 16-byte session identifier, as generated by [`ServerSession::new`].
    pub fn id(&self) -> [u8; 16] {
        self.id
    }

    /// The current transaction number. Zero until the first call to
    /// [`ServerSession::next_txn_num`].
    pub fn txn_num(&self) -> i64 {
        self.txn_num
    }

    /// Returns a copy of this session with its transaction number incremented by one.
    ///
    /// # Panics
    ///
    /// Panics on overflow of the 64-bit counter. In practice this counter is effectively
    /// unbounded, so overflow indicates a client defect rather than a condition to recover from.
    #[must_use]
    pub fn next_txn_num(&self) -> Self {
        Self {
            id: self.id,
            txn_num: self
                .txn_num
                .checked_add(1)
                .expect("transaction number overflowed a 64-bit counter"),
        }
    }

    /// The `lsid` subdocument (`{ id: <UUID binary> }`) used to decorate outgoing commands.
    pub fn lsid(&self) -> bson::Document {
        bson::doc! {
            "id": Bson::Binary(Binary {
                subtype: BinarySubtype::Uuid,
                bytes: self.id.to_vec(),
            }),
        }
    }
}

impl Default for ServerSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn new_session_starts_at_txn_zero() {
        let session = ServerSession::new();
        assert_eq!(session.txn_num(), 0);
    }

    #[test]
    fn next_txn_num_is_strictly_increasing() {
        let session = ServerSession::new();
        let mut observed = vec![session.txn_num()];
        let mut current = session;
        for _ in 0..5 {
            current = current.next_txn_num();
            observed.push(current.txn_num());
        }
        assert_eq!(observed, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn next_txn_num_preserves_id() {
        let session = ServerSession::new();
        let advanced = session.next_txn_num();
        assert_eq!(session.id(), advanced.id());
    }

    #[test]
    fn lsid_wraps_id_as_uuid_binary() {
        let session = ServerSession::new();
        let lsid = session.lsid();
        match lsid.get("id") {
            Some(Bson::Binary(bin)) => {
                assert_eq!(bin.subtype, BinarySubtype::Uuid);
                assert_eq!(bin.bytes, session.id().to_vec());
            }
            other => panic!("expected a UUID binary, got {other:?}"),
        }
    }

    #[test]
    fn ids_are_not_trivially_repeated() {
        let a = ServerSession::new();
        let b = ServerSession::new();
        assert_ne!(a.id(), b.id());
    }
}
