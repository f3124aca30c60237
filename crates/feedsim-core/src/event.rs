//! Event kinds and payload shapes.
//!
//! An [`EventRecord`] is what actually lives in the append-only log: a
//! `seq`, a `tick`, a `kind` tag, and a `payload` that is already rendered to
//! canonical JSON text. Keeping `payload` as a `String` rather than a nested
//! `bincode`-encoded struct is deliberate — it's the thing the persistent
//! layout calls "canonical JSON", with sorted keys and no NaN/Infinity, and
//! the simplest way to guarantee that canonical form is to let
//! `serde_json::to_value` (whose default `Map` is a `BTreeMap`, since this
//! crate never enables `preserve_order`) produce it once at construction
//! time and freeze the result as text.

use serde::{Deserialize, Serialize};
use snafu::Snafu;

use crate::ids::{OpId, PostId, Seq, Tick, TimelineId, UserId};

/// The tag stored alongside an event's canonical JSON payload.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    RunConfig,
    AdvanceTick,
    TimelineServed,
    Action,
}

/// A single row of the append-only event log.
#[derive(Clone, PartialEq, Eq, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
pub struct EventRecord {
    pub seq: Seq,
    pub tick: Tick,
    pub kind: EventKind,
    /// Canonical JSON text, see module docs.
    pub payload: String,
}

#[derive(Debug, Snafu)]
pub enum PayloadError {
    #[snafu(display("payload is not valid JSON"))]
    Json { source: serde_json::Error },
}

/// Canonicalizes `value` to JSON text. `serde_json::to_value`/
/// `to_string` already refuse to encode `NaN`/`Infinity` floats, surfacing
/// that as a `serde_json::Error` like any other encoding failure.
pub fn to_canonical_json<T: Serialize>(value: &T) -> Result<String, PayloadError> {
    let v = serde_json::to_value(value).map_err(|source| PayloadError::Json { source })?;
    serde_json::to_string(&v).map_err(|source| PayloadError::Json { source })
}

pub fn from_canonical_json<T: for<'de> Deserialize<'de>>(payload: &str) -> Result<T, PayloadError> {
    serde_json::from_str(payload).map_err(|source| PayloadError::Json { source })
}

/// `run_started{run_id, started_tick}`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RunStartedPayload {
    pub run_id: crate::ids::RunId,
    pub started_tick: Tick,
}

/// `run_config{run_id, seed, agents, ranking_algorithm, k, ticks}`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct RunConfigPayload {
    pub run_id: crate::ids::RunId,
    pub seed: u64,
    pub agents: u32,
    pub ranking_algorithm: RankingAlgorithm,
    pub k: u32,
    pub ticks: u64,
}

/// `advance_tick{new_tick}`.
#[derive(Clone, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct AdvanceTickPayload {
    pub new_tick: Tick,
}

/// One row of a `timeline_served` event's `items` array.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TimelineItemPayload {
    pub post_id: PostId,
    pub position: u32,
    pub score: f64,
    pub features: FeatureVec,
}

/// The per-item feature vector the Ranker records.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct FeatureVec {
    pub up_votes: u64,
    pub age: u64,
    pub algorithm: RankingAlgorithm,
    pub ranking_version: u32,
}

/// `timeline_served{timeline_id, user_id, k, algorithm, ranking_version,
/// seed, items}`.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TimelineServedPayload {
    pub timeline_id: TimelineId,
    pub user_id: UserId,
    pub k: u32,
    pub algorithm: RankingAlgorithm,
    pub ranking_version: u32,
    pub seed: u64,
    pub items: Vec<TimelineItemPayload>,
}

/// Ranking algorithm selector carried by timelines and `view_timeline`
/// requests.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingAlgorithm {
    New,
    Top,
    Hot,
}

impl RankingAlgorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            RankingAlgorithm::New => "new",
            RankingAlgorithm::Top => "top",
            RankingAlgorithm::Hot => "hot",
        }
    }
}

impl std::str::FromStr for RankingAlgorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(RankingAlgorithm::New),
            "top" => Ok(RankingAlgorithm::Top),
            "hot" => Ok(RankingAlgorithm::Hot),
            other => Err(UnknownAlgorithm { name: other.to_string() }),
        }
    }
}

#[derive(Debug, Clone, Snafu)]
#[snafu(display("unknown ranking algorithm `{name}`"))]
pub struct UnknownAlgorithm {
    pub name: String,
}

/// The kinds of action an `action` event can carry.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Post,
    Comment,
    Like,
    Unlike,
    Follow,
    Unfollow,
}

/// Outcome recorded for an action by the Admission pipeline.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Accepted,
    Rejected,
}

/// Why an action was rejected.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Malformed,
    OffFeed,
    DuplicateVote,
    NoSuchVote,
    SelfFollow,
    DuplicateFollow,
    NoSuchFollow,
    EmptyBody,
}

/// `action{op_id, actor_id, action_type, timeline_id?, position?,
/// target_post_id?, target_user_id?, body?, status, reason?}`.
///
/// Every action type only uses a subset of the optional fields; which ones
/// are required is enforced by [`validate_shape`], not by the type itself —
/// the flat shape here is what actually gets serialized to the log, mirroring
/// how the underlying system records one `action` row regardless of type.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct ActionPayload {
    pub op_id: OpId,
    pub actor_id: UserId,
    pub action_type: ActionType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub timeline_id: Option<TimelineId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_post_id: Option<PostId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub target_user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub body: Option<String>,
    pub status: ActionStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<RejectReason>,
}

/// Checks the structural shape of an action request per action type: which
/// fields must be present, and the few constraints that don't need
/// projection state to evaluate (self-follow, an empty comment body).
/// Referential checks (does the target exist, was it actually exposed) need
/// projection state and are the Admission pipeline's job, not this crate's.
pub fn validate_shape(action: &ActionPayload) -> Result<(), RejectReason> {
    match action.action_type {
        ActionType::Post => {
            if action.timeline_id.is_some() {
                return Err(RejectReason::Malformed);
            }
            match &action.body {
                Some(b) if !b.trim().is_empty() => Ok(()),
                Some(_) => Err(RejectReason::EmptyBody),
                None => Err(RejectReason::Malformed),
            }
        }
        ActionType::Comment => {
            if action.timeline_id.is_none() || action.position.is_none() || action.target_post_id.is_none() {
                return Err(RejectReason::Malformed);
            }
            match &action.body {
                Some(b) if !b.trim().is_empty() => Ok(()),
                Some(_) => Err(RejectReason::EmptyBody),
                None => Err(RejectReason::Malformed),
            }
        }
        ActionType::Like | ActionType::Unlike => {
            if action.timeline_id.is_none() || action.position.is_none() || action.target_post_id.is_none() {
                return Err(RejectReason::Malformed);
            }
            Ok(())
        }
        ActionType::Follow | ActionType::Unfollow => match action.target_user_id {
            None => Err(RejectReason::Malformed),
            Some(target) if target == action.actor_id => Err(RejectReason::SelfFollow),
            Some(_) => Ok(()),
        },
    }
}
