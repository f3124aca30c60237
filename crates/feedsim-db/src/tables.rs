//! Database table definitions.
//!
//! Two logical stores share one `redb` file: the append-only event log
//! (`events`, `events_by_op_id`) and the projection tables that are a pure
//! function of that log. `meta` is the Store's own bookkeeping row — `redb`
//! has no native autoincrement, so the `seq`/`tick`/`timeline_counter`
//! high-water marks live here instead of a process-wide counter.

use bincode::{Decode, Encode};
use feedsim_core::{
    ActionStatus, EventRecord, OpId, PostId, RankingAlgorithm, RejectReason, Seq, Tick,
    TimelineId, UserId,
};
use serde::Serialize;

#[macro_export]
macro_rules! def_table {
    ($(#[$outer:meta])*
        $name:ident : $k:ty => $v:ty) => {
        #[allow(unused)]
        $(#[$outer])*
        pub mod $name {
            use super::*;
            pub type Key = $k;
            pub type Value = $v;
            pub type Definition<'a> = redb_bincode::TableDefinition<'a, Key, Value>;
            pub trait ReadableTable: redb_bincode::ReadableTable<Key, Value> {}
            impl<RT> ReadableTable for RT where RT: redb_bincode::ReadableTable<Key, Value> {}
            pub type Table<'a> = redb_bincode::Table<'a, Key, Value>;
            pub const TABLE: Definition = redb_bincode::TableDefinition::new(stringify!($name));
        }
    };
}

// ============================================================================
// STORE BOOKKEEPING
// ============================================================================

def_table! {
    /// The Store's single bookkeeping row: `seq`/`tick`/`timeline_counter`
    /// high-water marks. `redb` has no autoincrement, so these
    /// live here rather than in a process-wide counter.
    meta: () => MetaRecord
}

#[derive(Debug, Clone, Copy, Default, Encode, Decode, Serialize)]
pub struct MetaRecord {
    pub seq_hwm: u64,
    pub current_tick: u64,
    pub timeline_counter: u64,
    pub initialized: bool,
}

// ============================================================================
// EVENT LOG
// ============================================================================

def_table! {
    /// The append-only event log, keyed by its total order.
    events: Seq => EventRecord
}

def_table! {
    /// Secondary index enforcing `op_id` uniqueness across the log and
    /// backing Admission's idempotency check.
    events_by_op_id: OpId => ActionOutcomeRecord
}

/// The idempotency index backing admission's outcome lookup (`action_outcomes`);
/// also doubles as the `events_by_op_id` index value since both are keyed by
/// `op_id` and need the same outcome payload.
#[derive(Debug, Clone, Copy, Encode, Decode, Serialize)]
pub struct ActionOutcomeRecord {
    pub seq: Seq,
    pub status: ActionStatus,
    pub reason: Option<RejectReason>,
}

// ============================================================================
// PROJECTIONS
// ============================================================================

def_table! {
    /// `users(user_id PK, created_tick)`.
    users: UserId => UserRecord
}

#[derive(Debug, Clone, Copy, Encode, Decode, Serialize)]
pub struct UserRecord {
    pub created_tick: Tick,
}

def_table! {
    /// `posts(post_id PK, author_id FK users, body, created_tick, up_votes)`.
    /// Referential integrity (`author_id` names a real user) is
    /// enforced by the Reducer/Admission layer, not by this table.
    posts: PostId => PostRecord
}

#[derive(Debug, Clone, Encode, Decode, Serialize)]
pub struct PostRecord {
    pub author_id: UserId,
    pub body: String,
    pub created_tick: Tick,
    pub up_votes: u64,
}

def_table! {
    /// `comments(comment_id PK, post_id FK posts, author_id FK users, body,
    /// created_tick)`.
    comments: feedsim_core::CommentId => CommentRecord
}

#[derive(Debug, Clone, Encode, Decode, Serialize)]
pub struct CommentRecord {
    pub post_id: PostId,
    pub author_id: UserId,
    pub body: String,
    pub created_tick: Tick,
}

def_table! {
    /// `votes(user_id, post_id, tick, PRIMARY KEY(user_id, post_id))`.
    /// Set semantics: at most one row per `(user_id, post_id)`.
    votes: (UserId, PostId) => VoteRecord
}

#[derive(Debug, Clone, Copy, Encode, Decode, Serialize)]
pub struct VoteRecord {
    pub tick: Tick,
}

def_table! {
    /// `follows(follower_id, followee_id, tick, PRIMARY KEY(follower_id,
    /// followee_id))`. Set semantics, irreflexive (no
    /// self-follow edge is ever inserted).
    follows: (UserId, UserId) => FollowRecord
}

#[derive(Debug, Clone, Copy, Encode, Decode, Serialize)]
pub struct FollowRecord {
    pub tick: Tick,
}

def_table! {
    /// `timelines(timeline_id PK, user_id FK users, tick, algorithm, k,
    /// seed, ranking_version)`.
    timelines: TimelineId => TimelineRecord
}

#[derive(Debug, Clone, Copy, Encode, Decode, Serialize)]
pub struct TimelineRecord {
    pub user_id: UserId,
    pub tick: Tick,
    pub algorithm: RankingAlgorithm,
    pub k: u32,
    pub seed: u64,
    pub ranking_version: u32,
}

def_table! {
    /// `timeline_items(timeline_id FK, position, post_id FK posts, score,
    /// features_blob, PRIMARY KEY(timeline_id, position))`.
    timeline_items: (TimelineId, u32) => TimelineItemRecord
}

#[derive(Debug, Clone, Encode, Decode, Serialize)]
pub struct TimelineItemRecord {
    pub post_id: PostId,
    /// `score` is stored as its bit pattern so the record stays `Ord`/`Eq`
    /// under bincode; `f64` itself only ever needs to round-trip here, never
    /// to be compared, so this loses nothing.
    pub score_bits: u64,
    pub up_votes: u64,
    pub age: u64,
}

impl TimelineItemRecord {
    pub fn score(&self) -> f64 {
        f64::from_bits(self.score_bits)
    }
}
