use blocktrace_common::{Action, Actor, BlockPos, GlobalPos, WorldId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// The atomic unit of history: one mutation of world state, with enough
/// fidelity to reconstruct the state before and after it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Store-assigned, monotonically increasing. The only total order.
    pub id: u64,
    /// Unix seconds. Collisions are expected; `id` breaks ties.
    pub timestamp: u64,
    pub actor: Actor,
    pub position: GlobalPos,
    pub action: Action,
    /// Codec payload of the full state before the change.
    pub prior: String,
    /// Codec payload of the full state after the change.
    pub posterior: String,
    /// Links the two halves of a single multi-cell object.
    pub compound_group: Option<Uuid>,
    /// Links records produced by one bulk edit gesture.
    pub batch: Option<Uuid>,
}

/// A record not yet inserted; the store assigns the id.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub timestamp: u64,
    pub actor: Actor,
    pub position: GlobalPos,
    pub action: Action,
    pub prior: String,
    pub posterior: String,
    pub compound_group: Option<Uuid>,
    pub batch: Option<Uuid>,
}

impl RecordDraft {
    pub(crate) fn into_record(self, id: u64) -> ChangeRecord {
        ChangeRecord {
            id,
            timestamp: self.timestamp,
            actor: self.actor,
            position: self.position,
            action: self.action,
            prior: self.prior,
            posterior: self.posterior,
            compound_group: self.compound_group,
            batch: self.batch,
        }
    }
}

/// Iteration direction for queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOrder {
    /// Ascending id: chronological, the default.
    #[default]
    Ascending,
    /// Descending id: reverse-chronological, for rollback.
    Descending,
}

/// Conjunctive record filter, constructed per request and never persisted.
#[derive(Debug, Clone)]
pub struct ChangeFilter {
    pub world: WorldId,
    pub center: BlockPos,
    /// Per-axis bounding box half-extent; `None` matches every position in
    /// the world.
    pub radius: Option<i32>,
    /// Inclusive unix-seconds window.
    pub time_from: u64,
    pub time_to: u64,
    /// Stable actor identity (uuid string or numeric tag).
    pub actor: Option<String>,
    pub actions: Option<BTreeSet<Action>>,
}

impl ChangeFilter {
    /// A filter matching everything in `world` around `center`.
    pub fn all(world: WorldId, center: BlockPos) -> Self {
        Self {
            world,
            center,
            radius: None,
            time_from: 0,
            time_to: u64::MAX,
            actor: None,
            actions: None,
        }
    }

    /// Restrict to the last `window_secs` seconds before `now`.
    pub fn since(mut self, now: u64, window_secs: u64) -> Self {
        self.time_from = now.saturating_sub(window_secs);
        self.time_to = now;
        self
    }

    /// Width of the time window in seconds.
    pub fn window_secs(&self) -> u64 {
        self.time_to.saturating_sub(self.time_from)
    }

    /// Whether `record` satisfies every clause of this filter.
    pub fn matches(&self, record: &ChangeRecord) -> bool {
        if record.position.world != self.world {
            return false;
        }
        if let Some(radius) = self.radius
            && !self.center.within_radius(record.position.pos, radius)
        {
            return false;
        }
        if record.timestamp < self.time_from || record.timestamp > self.time_to {
            return false;
        }
        if let Some(actor) = &self.actor
            && record.actor.identity != *actor
        {
            return false;
        }
        if let Some(actions) = &self.actions
            && !actions.contains(&record.action)
        {
            return false;
        }
        true
    }
}
