//! Domain types shared by every other crate in the workspace: ids, the
//! event-log record shape, and the portable hash family the ranker and id
//! derivation both build on.
//!
//! Deliberately has no storage engine and no `tokio` dependency: it's a
//! plain value-types library that `-db` and the CLI both depend on.

mod event;
mod hash;
mod ids;
mod macros;

pub use event::{
    from_canonical_json, to_canonical_json, ActionPayload, ActionStatus, ActionType,
    AdvanceTickPayload, EventKind, EventRecord, FeatureVec, PayloadError, RankingAlgorithm,
    RejectReason, RunConfigPayload, RunStartedPayload, TimelineItemPayload, TimelineServedPayload,
    UnknownAlgorithm, validate_shape,
};
pub use hash::{derive_id, mix_seed_with_bytes, splitmix64};
pub use ids::{CommentId, OpId, PostId, RunId, Seq, Tick, TimelineId, UserId};
