//! Read and write concern types, assembled into `writeConcern`/`readConcern` subdocuments via
//! `serde` and `bson::to_bson`.

use std::time::Duration;

use bson::Timestamp;
use serde::{Deserialize, Serialize, Serializer};
use serde_with::skip_serializing_none;
use typed_builder::TypedBuilder;

/// The `w` field of a [`WriteConcern`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
#[non_exhaustive]
pub enum Acknowledgment {
    /// Requires acknowledgement that the write reached the given number of nodes.
    Nodes(u32),
    /// Requires acknowledgement that the write reached a majority of nodes.
    Majority,
    /// A custom write concern tag set name.
    Custom(String),
}

impl Serialize for Acknowledgment {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Acknowledgment::Majority => serializer.serialize_str("majority"),
            Acknowledgment::Nodes(n) => serializer.serialize_u32(*n),
            Acknowledgment::Custom(tag) => serializer.serialize_str(tag),
        }
    }
}

/// Specifies the level of acknowledgement requested from MongoDB for write operations.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct WriteConcern {
    /// Requests acknowledgement that the write propagated to a given number or variety of nodes.
    pub w: Option<Acknowledgment>,

    /// A time limit for the write concern; if the write has not propagated within it, the server
    /// returns an error (the write itself is not rolled back).
    #[serde(rename = "wtimeout")]
    #[serde(serialize_with = "serialize_duration_as_millis")]
    #[serde(default)]
    pub w_timeout: Option<Duration>,

    /// Requests acknowledgement that the write reached the on-disk journal.
    #[serde(rename = "j")]
    pub journal: Option<bool>,
}

impl WriteConcern {
    /// A write concern is empty (and should be omitted from a command) when none of its fields
    /// are set.
    pub fn is_empty(&self) -> bool {
        self.w.is_none() && self.w_timeout.is_none() && self.journal.is_none()
    }

    /// Whether this write concern is acknowledged. `w: Nodes(0)` is the only unacknowledged form;
    /// the absence of `w` defaults to acknowledged.
    pub fn is_acknowledged(&self) -> bool {
        !matches!(self.w, Some(Acknowledgment::Nodes(0)))
    }
}

fn serialize_duration_as_millis<S>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match duration {
        Some(d) => serializer.serialize_i64(d.as_millis() as i64),
        None => serializer.serialize_none(),
    }
}

/// The level of a [`ReadConcern`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum ReadConcernLevel {
    /// See <https://www.mongodb.com/docs/manual/reference/read-concern-local/>.
    Local,
    /// See <https://www.mongodb.com/docs/manual/reference/read-concern-majority/>.
    Majority,
    /// See <https://www.mongodb.com/docs/manual/reference/read-concern-linearizable/>.
    Linearizable,
    /// See <https://www.mongodb.com/docs/manual/reference/read-concern-available/>.
    Available,
    /// See <https://www.mongodb.com/docs/manual/reference/read-concern-snapshot/>.
    Snapshot,
}

/// Specifies the level of isolation for read operations. `afterClusterTime` is added by the
/// session's causal-consistency bookkeeping, not by callers directly.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
#[builder(field_defaults(default, setter(strip_option)))]
pub struct ReadConcern {
    /// The consistency/isolation level requested.
    pub level: Option<ReadConcernLevel>,

    /// The snapshot read timestamp. Set by the driver when executing in a snapshot session.
    pub at_cluster_time: Option<Timestamp>,

    /// The time of the most recent causally-consistent operation on this session. Filled in by
    /// the SSM, never supplied directly by a caller.
    pub after_cluster_time: Option<Timestamp>,
}

impl ReadConcern {
    /// A read concern with level "majority".
    pub fn majority() -> Self {
        Self {
            level: Some(ReadConcernLevel::Majority),
            ..Default::default()
        }
    }

    /// A read concern with level "local".
    pub fn local() -> Self {
        Self {
            level: Some(ReadConcernLevel::Local),
            ..Default::default()
        }
    }

    /// Whether this read concern would serialize to an empty document.
    pub fn is_empty(&self) -> bool {
        self.level.is_none() && self.at_cluster_time.is_none() && self.after_cluster_time.is_none()
    }
}
