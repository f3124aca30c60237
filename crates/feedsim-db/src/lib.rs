//! The simulator's storage and kernel crate: the Store, the Projection
//! Reducer, the Ranker, the Timeline Service, Action Admission, the Tick
//! Clock, and read-only KPI computation all live here, on top of the
//! event/id types in `feedsim-core`.
//!
//! Everything that touches `redb` lives in this crate; `feedsim-cli` only
//! ever calls the `pub` functions below and never opens a table directly.

mod admission;
mod errors;
mod kpis;
#[cfg(test)]
mod proptests;
mod ranker;
mod reducer;
mod run;
mod store;
mod tables;
mod tick;
mod timeline;

pub use admission::{act, ActOutcome, ActRequest};
pub use errors::{DbError, DbResult};
pub use kpis::{author_entropy, up_votes_gini};
pub use ranker::RANKING_VERSION;
pub use reducer::{projection_digest, replay_all};
pub use run::start_run;
pub use store::Store;
pub use tables::{
    ActionOutcomeRecord, CommentRecord, FollowRecord, MetaRecord, PostRecord, TimelineItemRecord,
    TimelineRecord, UserRecord, VoteRecord,
};
pub use tick::advance_tick;
pub use timeline::timeline;
