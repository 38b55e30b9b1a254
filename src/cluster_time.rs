//! Operation-time bookkeeping used to pin causally-consistent reads.
//!
//! This crate does not gossip full cluster times (signature verification, `$clusterTime`
//! exchange); it tracks only the `operationTime` a server reply carries, enough to pin a
//! causally-consistent read without the rest of cluster-time propagation.

use bson::Timestamp;

/// A cluster timestamp: the pair `(seconds, increment)`, both unsigned 32-bit, ordered
/// lexicographically. This is exactly [`bson::Timestamp`]'s shape, reused here rather than
/// reinvented.
pub type OperationTime = Timestamp;

/// Advances `current` to `candidate` iff `current` is absent or `candidate` is strictly greater
/// under lexicographic order. Returns `true` if `current` was updated.
///
/// This is the pure decision function behind the SSM's `advance_operation_time` cast; the actor
/// calls it against its own state.
pub(crate) fn advance(current: &mut Option<OperationTime>, candidate: OperationTime) -> bool {
    let should_advance = match current {
        None => true,
        Some(existing) => candidate > *existing,
    };
    if should_advance {
        *current = Some(candidate);
    }
    should_advance
}
