//! Small shared utilities used by both the kernel crates and the driver.
//!
//! Kept tiny and dependency-free on purpose: error/formatting helpers have
//! no business knowing about storage or domain types.

mod fmt;

pub use self::fmt::{FmtCompact, FmtCompactDisplay};

/// A type-erased error, for boundary code (the CLI) that doesn't want to
/// define its own error enum for a one-off fallible helper.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;
pub type BoxedErrorResult<T> = std::result::Result<T, BoxedError>;
