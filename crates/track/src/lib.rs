//! Event normalizer: converts raw world-mutation notifications into
//! canonical change records and appends them to the change log.
//!
//! Handlers run synchronously inside the host's notification callback,
//! before the engine commits the mutation, so prior state is read from the
//! live world. The one exception is placement confirmation, which is
//! deferred to the next simulation tick via [`ChangeTracker::confirm_placements`].
//!
//! # Invariants
//! - The inspector short-circuit is checked before any other branch.
//! - All records from one handler invocation are appended as one atomic
//!   batch.
//! - Logging failures degrade to a warning; they never block or revert
//!   gameplay.

mod config;
mod tracker;

pub use config::{ConfigError, TrackerConfig};
pub use tracker::{ChangeTracker, TrackOutcome};
