//! Error types for the Store, Reducer, Ranker and Admission.
//!
//! A single `snafu`-derived enum covering every fault domain, each variant
//! capturing an implicit [`Location`] at the error site. Admission-time
//! rejections (`OffFeed`, `DuplicateVote`, ...) are *not* represented here —
//! those are recorded as `rejected` action events (see
//! [`feedsim_core::RejectReason`]), never returned as a `Result::Err`.

use feedsim_core::UnknownAlgorithm;
use snafu::{Location, Snafu};

#[derive(Debug, Snafu)]
pub enum DbError {
    Database {
        source: redb::DatabaseError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Table {
        source: redb::TableError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    Storage {
        source: redb::StorageError,
        #[snafu(implicit)]
        location: Location,
    },
    Transaction {
        #[snafu(source(from(redb::TransactionError, Box::new)))]
        source: Box<redb::TransactionError>,
        #[snafu(implicit)]
        location: Location,
    },
    Commit {
        source: redb::CommitError,
        #[snafu(implicit)]
        location: Location,
    },
    Join {
        source: tokio::task::JoinError,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("database already initialized"))]
    AlreadyInitialized {
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(transparent)]
    UnknownAlgorithm { source: UnknownAlgorithm },
    #[snafu(display("tick regression: attempted {attempted}, current {current}"))]
    TickRegression {
        current: u64,
        attempted: u64,
        #[snafu(implicit)]
        location: Location,
    },
    #[snafu(display("event payload is malformed: {source}"))]
    MalformedPayload {
        source: feedsim_core::PayloadError,
        #[snafu(implicit)]
        location: Location,
    },
}

pub type DbResult<T> = std::result::Result<T, DbError>;
