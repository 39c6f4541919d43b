//! Rollback/restore engine: replays a filtered slice of the change log back
//! into the live world.
//!
//! # Invariants
//! - Compound halves are never applied separately: a half missing from the
//!   filtered set is pulled in, and a conflict on either half skips both.
//! - A position whose live state no longer matches what the replay expects
//!   is skipped and reported, never clobbered.
//! - Re-running the same pass performs no further mutation.

mod engine;

pub use engine::{RollbackEngine, RollbackError, RollbackReport};
