//! Change log store: append-only, queryable persistence of change records.
//!
//! # Invariants
//! - Records are immutable once stored; corrections are new records.
//! - One `append_batch` call is one durable unit: all records become
//!   visible together or not at all.
//! - `id` is the only total order; timestamps may tie.

mod record;
mod store;

pub use record::{ChangeFilter, ChangeRecord, QueryOrder, RecordDraft};
pub use store::{ChangeLogStore, LogMeta, StoreError};
