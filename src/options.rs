//! Option structs recognized by the session core.

use std::time::Duration;

use serde::Deserialize;
use typed_builder::TypedBuilder;

use crate::concern::{ReadConcern, WriteConcern};

/// Options recognized when checking out or auto-creating a session.
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SessionOptions {
    /// The default options to use for transactions started on this session, absent per-call
    /// overrides.
    pub default_transaction_options: Option<TransactionOptions>,

    /// Whether operations performed in the context of this session should be
    /// causally consistent. Defaults to `false`.
    pub causal_consistency: Option<bool>,
}

impl SessionOptions {
    /// The effective causal-consistency flag, defaulting to `false` when unspecified.
    pub fn causal_consistency(&self) -> bool {
        self.causal_consistency.unwrap_or(false)
    }
}

/// Options recognized when starting or committing a transaction.
#[derive(Clone, Debug, Default, Deserialize, TypedBuilder)]
#[builder(field_defaults(default, setter(into, strip_option)))]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TransactionOptions {
    /// The read concern to apply to the first statement of the transaction.
    pub read_concern: Option<ReadConcern>,

    /// The write concern used on `commitTransaction`/`abortTransaction` and carried through to
    /// write statements.
    pub write_concern: Option<WriteConcern>,

    /// The maximum amount of time to allow a single `commitTransaction` to run, forwarded as
    /// `maxTimeMS`.
    #[serde(rename = "maxCommitTimeMS")]
    pub max_commit_time_ms: Option<i64>,
}

impl TransactionOptions {
    /// Merges `self` over `defaults`: any field left unset in `self` is filled in from
    /// `defaults`.
    pub(crate) fn merged_over(self, defaults: Option<&TransactionOptions>) -> Self {
        let Some(defaults) = defaults else {
            return self;
        };
        Self {
            read_concern: self.read_concern.or_else(|| defaults.read_concern.clone()),
            write_concern: self
                .write_concern
                .or_else(|| defaults.write_concern.clone()),
            max_commit_time_ms: self.max_commit_time_ms.or(defaults.max_commit_time_ms),
        }
    }
}

fn duration_from_millis(ms: i64) -> Duration {
    Duration::from_millis(ms.max(0) as u64)
}

impl TransactionOptions {
    /// The commit/abort write concern as a `Duration`, if present, for callers that want to set a
    /// network timeout from `max_commit_time_ms`.
    pub fn max_commit_time(&self) -> Option<Duration> {
        self.max_commit_time_ms.map(duration_from_millis)
    }
}
