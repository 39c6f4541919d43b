//! Shared value types for the blocktrace audit engine.
//!
//! # Invariants
//! - All identities here are value-based; nothing compares by reference.
//! - Actor identities are stable across engine restarts.

pub mod actor;
pub mod time;
pub mod types;

pub use actor::{ActorRef, InvalidActor, entity_type_name, resolve};
pub use time::{now_secs, parse_duration, time_ago};
pub use types::{Action, Actor, ActorKind, BlockPos, GlobalPos, WorldId};
