//! Identifier types for every entity named in the data model.
//!
//! `UserId`, `Seq` and `Tick` are plain counters — nothing about them needs
//! to be collision-resistant, and rendering them as bare integers keeps the
//! canonical JSON payloads readable. `PostId`, `CommentId` and `TimelineId`,
//! in contrast, are derived deterministically from event content via
//! [`crate::hash::derive_id`], so they're opaque 16-byte digests defined
//! with [`crate::macros::define_hash_id`].

use serde::{Deserialize, Serialize};

use crate::hash::derive_id;
use crate::macros::define_hash_id;

/// A simulated user. Assigned by the driver (agent index) and never reused;
/// the projection's `users` table records only the tick it first appeared.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "u{}", self.0)
    }
}

/// Identifies one simulation run. Deliberately just the run's seed: two
/// invocations with the same seed are the same run for replay purposes, and
/// this avoids inventing a second source of nondeterminism (a random run id)
/// in a design whose entire point is reproducibility.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Monotonic logical time. Starts at 0, advanced only by `advance_tick`
/// events; never wall-clock.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tick(pub u64);

impl Tick {
    pub const ZERO: Tick = Tick(0);

    pub fn next(self) -> Tick {
        Tick(self.0 + 1)
    }
}

impl std::ops::Sub for Tick {
    type Output = u64;

    fn sub(self, rhs: Tick) -> u64 {
        self.0.saturating_sub(rhs.0)
    }
}

/// The event log's total order. Starts at 1; 0 is reserved to
/// mean "no prior event" in APIs like `scan(from_seq)`.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Seq(pub u64);

impl Seq {
    pub const FIRST: Seq = Seq(1);

    pub fn next(self) -> Seq {
        Seq(self.0 + 1)
    }
}

/// Caller-supplied idempotency key on `action` events.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, bincode::Encode, bincode::Decode, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(pub String);

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for OpId {
    fn from(s: S) -> Self {
        OpId(s.into())
    }
}

define_hash_id!(
    /// `post_id := H("post", op_id)`.
    PostId
);
define_hash_id!(
    /// `comment_id := H("comment", op_id)`.
    CommentId
);
define_hash_id!(
    /// `timeline_id := H(run_id, user_id, tick, algorithm, seed, counter)`.
    TimelineId
);

impl PostId {
    pub fn derive(op_id: &OpId) -> Self {
        Self::from_bytes(derive_id(&[b"post", op_id.0.as_bytes()]))
    }
}

impl CommentId {
    pub fn derive(op_id: &OpId) -> Self {
        Self::from_bytes(derive_id(&[b"comment", op_id.0.as_bytes()]))
    }
}

impl TimelineId {
    #[allow(clippy::too_many_arguments)]
    pub fn derive(
        run_id: RunId,
        user_id: UserId,
        tick: Tick,
        algorithm: &str,
        seed: u64,
        counter: u64,
    ) -> Self {
        Self::from_bytes(derive_id(&[
            b"timeline",
            &run_id.0.to_le_bytes(),
            &user_id.0.to_le_bytes(),
            &tick.0.to_le_bytes(),
            algorithm.as_bytes(),
            &seed.to_le_bytes(),
            &counter.to_le_bytes(),
        ]))
    }
}
