//! Host-engine boundary: block states, the versioned block registry, world
//! access traits, an in-memory reference world, and the tick-deferred task
//! queue.
//!
//! # Invariants
//! - Block comparison is by value (`type_id` + `variant`), never by
//!   reference identity.
//! - All world mutations flow through [`WorldMutator`].

pub mod block;
pub mod sched;
pub mod world;

pub use block::{
    BLOCK_TABLE_VERSION, BlockDef, BlockKind, BlockState, LiquidKind, block_def, block_from_tree,
    block_tree, compound_partner, decode_block, encode_block, opposite_liquid,
};
pub use sched::TickQueue;
pub use world::{GridWorld, WorldError, WorldMutator, WorldView};
