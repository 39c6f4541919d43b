use crate::config::TrackerConfig;
use blocktrace_codec::CodecError;
use blocktrace_common::{Action, Actor, ActorRef, BlockPos, GlobalPos, now_secs, resolve};
use blocktrace_kernel::{
    BlockKind, BlockState, TickQueue, WorldView, compound_partner, encode_block, opposite_liquid,
};
use blocktrace_store::{ChangeFilter, ChangeLogStore, ChangeRecord, QueryOrder, RecordDraft};
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// What a handler did with a raw notification.
#[derive(Debug)]
pub enum TrackOutcome {
    /// Tracking is off for this event, or logging degraded; nothing stored.
    Ignored,
    /// Records were appended to the change log.
    Logged { records: usize },
    /// Placement queued for next-tick confirmation.
    Deferred,
    /// Inspector short-circuit: the caller must cancel the underlying world
    /// mutation and show `history` (newest first) to the inspecting player.
    Inspected { history: Vec<ChangeRecord> },
}

/// A placement awaiting next-tick confirmation.
#[derive(Debug)]
struct PendingPlacement {
    actor: Actor,
    pos: BlockPos,
    placed: BlockState,
    replaced: BlockState,
}

/// The event normalizer.
///
/// Owns the inspector flag set and the deferred-placement queue; shares the
/// change log with the rollback engine.
pub struct ChangeTracker {
    store: Arc<ChangeLogStore>,
    config: TrackerConfig,
    inspectors: HashSet<Uuid>,
    pending: TickQueue<PendingPlacement>,
}

impl ChangeTracker {
    pub fn new(store: Arc<ChangeLogStore>, config: TrackerConfig) -> Self {
        Self {
            store,
            config,
            inspectors: HashSet::new(),
            pending: TickQueue::new(),
        }
    }

    /// Flip a player's inspector flag; returns the new state.
    pub fn toggle_inspector(&mut self, player: Uuid) -> bool {
        if self.inspectors.remove(&player) {
            false
        } else {
            self.inspectors.insert(player);
            true
        }
    }

    pub fn is_inspector(&self, player: Uuid) -> bool {
        self.inspectors.contains(&player)
    }

    /// Handle a block-break notification.
    ///
    /// Must run before the engine removes the block: prior state, compound
    /// partners, and container contents are read from the live world.
    pub fn on_block_break<W: WorldView>(
        &mut self,
        world: &W,
        actor: &ActorRef,
        pos: BlockPos,
    ) -> TrackOutcome {
        if !self.config.world_enabled(world.world_id()) || !self.config.block_break {
            return TrackOutcome::Ignored;
        }
        if let Some(outcome) = self.inspector_check(world, actor, pos) {
            return outcome;
        }
        let actor = match resolve(actor) {
            Ok(actor) => actor,
            Err(e) => {
                tracing::warn!(error = %e, "dropping break event");
                return TrackOutcome::Ignored;
            }
        };

        let timestamp = now_secs();
        let block = world.block_at(pos);
        let mut drafts = Vec::new();
        let mut group = None;

        let result = (|| -> Result<(), CodecError> {
            if let Some(partner_pos) = compound_partner(block, pos) {
                // The partner cell's prior state must be captured before the
                // engine's own cascade removes it.
                let partner = world.block_at(partner_pos);
                if partner.type_id == block.type_id {
                    let g = Uuid::new_v4();
                    group = Some(g);
                    drafts.push(self.block_draft(
                        world,
                        &actor,
                        timestamp,
                        partner_pos,
                        Action::Break,
                        partner,
                        BlockState::AIR,
                        Some(g),
                        None,
                    )?);
                }
            } else if matches!(block.def().map(|d| d.kind), Some(BlockKind::Container)) {
                if let Some(snapshot) = world.container_at(pos)
                    && !snapshot.is_empty()
                {
                    drafts.push(RecordDraft {
                        timestamp,
                        actor: actor.clone(),
                        position: GlobalPos::new(world.world_id().clone(), pos),
                        action: Action::ContainerChange,
                        prior: snapshot.encode()?,
                        posterior: blocktrace_codec::ContainerSnapshot::empty().encode()?,
                        compound_group: None,
                        batch: None,
                    });
                }
            } else if self.config.natural_break {
                // Neighbors that lose support when the primary block goes.
                for side_pos in pos.neighbors() {
                    let side = world.block_at(side_pos);
                    if let Some(def) = side.def()
                        && def.placeable
                        && !def.solid
                        && def.transparent
                    {
                        drafts.push(self.block_draft(
                            world,
                            &actor,
                            timestamp,
                            side_pos,
                            Action::Break,
                            side,
                            BlockState::AIR,
                            None,
                            None,
                        )?);
                    }
                }
            }

            drafts.push(self.block_draft(
                world,
                &actor,
                timestamp,
                pos,
                Action::Break,
                block,
                BlockState::AIR,
                group,
                None,
            )?);
            Ok(())
        })();
        if let Err(e) = result {
            tracing::warn!(error = %e, %pos, "break not logged");
            return TrackOutcome::Ignored;
        }

        self.commit(drafts)
    }

    /// Handle a block-place notification.
    ///
    /// The engine may still alter or reject the placed block this tick, so
    /// the log attempt is queued and resolved by [`Self::confirm_placements`]
    /// on the next tick.
    pub fn on_block_place<W: WorldView>(
        &mut self,
        world: &W,
        actor: &ActorRef,
        pos: BlockPos,
        placed: BlockState,
    ) -> TrackOutcome {
        if !self.config.world_enabled(world.world_id()) || !self.config.block_place {
            return TrackOutcome::Ignored;
        }
        if let Some(outcome) = self.inspector_check(world, actor, pos) {
            return outcome;
        }
        let actor = match resolve(actor) {
            Ok(actor) => actor,
            Err(e) => {
                tracing::warn!(error = %e, "dropping place event");
                return TrackOutcome::Ignored;
            }
        };

        let replaced = world.block_at(pos);
        self.pending.push(
            world.current_tick() + 1,
            PendingPlacement {
                actor,
                pos,
                placed,
                replaced,
            },
        );
        TrackOutcome::Deferred
    }

    /// Confirm deferred placements. Call once per simulation tick, after the
    /// engine has settled block state.
    ///
    /// Returns the number of records logged. A pending placement whose live
    /// block no longer matches the placed type is abandoned silently: the
    /// engine altered or rejected it, and recording it would invent history.
    pub fn confirm_placements<W: WorldView>(&mut self, world: &W) -> usize {
        let due = self.pending.drain_due(world.current_tick());
        let mut logged = 0;
        for placement in due {
            let live = world.block_at(placement.pos);
            if live.type_id != placement.placed.type_id {
                tracing::debug!(
                    pos = %placement.pos,
                    expected = placement.placed.type_id,
                    found = live.type_id,
                    "placement no longer matches; log abandoned"
                );
                continue;
            }

            let timestamp = now_secs();
            let mut drafts = Vec::new();
            let mut group = None;
            let partner = compound_partner(live, placement.pos)
                .map(|p| (p, world.block_at(p)))
                .filter(|(_, state)| state.type_id == live.type_id);
            if partner.is_some() {
                group = Some(Uuid::new_v4());
            }

            let result = (|| -> Result<(), CodecError> {
                drafts.push(self.block_draft(
                    world,
                    &placement.actor,
                    timestamp,
                    placement.pos,
                    Action::Place,
                    placement.replaced,
                    live,
                    group,
                    None,
                )?);
                if let Some((partner_pos, partner_state)) = partner {
                    drafts.push(self.block_draft(
                        world,
                        &placement.actor,
                        timestamp,
                        partner_pos,
                        Action::Place,
                        BlockState::AIR,
                        partner_state,
                        group,
                        None,
                    )?);
                }
                Ok(())
            })();
            if let Err(e) = result {
                tracing::warn!(error = %e, pos = %placement.pos, "placement not logged");
                continue;
            }

            if let TrackOutcome::Logged { records } = self.commit(drafts) {
                logged += records;
            }
        }
        logged
    }

    /// Handle a liquid-spread notification, before the engine replaces the
    /// target block.
    ///
    /// Only still sources are logged; flowing variants notify on every cell
    /// update and would flood the log.
    pub fn on_block_spread<W: WorldView>(
        &mut self,
        world: &W,
        source_pos: BlockPos,
        target_pos: BlockPos,
    ) -> TrackOutcome {
        if !self.config.world_enabled(world.world_id()) {
            return TrackOutcome::Ignored;
        }
        let source = world.block_at(source_pos);
        let still = matches!(
            source.def().map(|d| d.kind),
            Some(BlockKind::Liquid { still: true, .. })
        );
        if !still {
            return TrackOutcome::Ignored;
        }

        let actor = environment_actor(source);
        let timestamp = now_secs();
        let target = world.block_at(target_pos);
        match self.block_draft(
            world,
            &actor,
            timestamp,
            target_pos,
            Action::Spread,
            target,
            source,
            None,
            None,
        ) {
            Ok(draft) => self.commit(vec![draft]),
            Err(e) => {
                tracing::warn!(error = %e, pos = %target_pos, "spread not logged");
                TrackOutcome::Ignored
            }
        }
    }

    /// Handle a block-burn notification; `cause` is the fire block that
    /// consumed the cell and stands in as the environmental actor.
    pub fn on_block_burn<W: WorldView>(
        &mut self,
        world: &W,
        pos: BlockPos,
        cause: BlockState,
    ) -> TrackOutcome {
        if !self.config.world_enabled(world.world_id()) || !self.config.block_burn {
            return TrackOutcome::Ignored;
        }
        let actor = environment_actor(cause);
        let timestamp = now_secs();
        let burned = world.block_at(pos);
        match self.block_draft(
            world, &actor, timestamp, pos, Action::Burn, burned, cause, None, None,
        ) {
            Ok(draft) => self.commit(vec![draft]),
            Err(e) => {
                tracing::warn!(error = %e, %pos, "burn not logged");
                TrackOutcome::Ignored
            }
        }
    }

    /// Handle a block-form notification (liquid state transition into
    /// `new_state`). The opposite liquid type is the synthetic cause.
    pub fn on_block_form<W: WorldView>(
        &mut self,
        world: &W,
        pos: BlockPos,
        new_state: BlockState,
    ) -> TrackOutcome {
        if !self.config.world_enabled(world.world_id()) || !self.config.liquid_tracking {
            return TrackOutcome::Ignored;
        }
        let block = world.block_at(pos);
        let Some(BlockKind::Liquid { kind, .. }) = block.def().map(|d| d.kind) else {
            return TrackOutcome::Ignored;
        };

        let actor = environment_actor(opposite_liquid(kind));
        let timestamp = now_secs();
        match self.block_draft(
            world, &actor, timestamp, pos, Action::Form, block, new_state, None, None,
        ) {
            Ok(draft) => self.commit(vec![draft]),
            Err(e) => {
                tracing::warn!(error = %e, %pos, "form not logged");
                TrackOutcome::Ignored
            }
        }
    }

    /// Handle a bulk edit from an external tool: `changes` is the shape's
    /// `(position, new block)` set, attributed to one actor and logged as a
    /// single batch so the whole gesture rolls back atomically.
    pub fn on_bulk_edit<W: WorldView>(
        &mut self,
        world: &W,
        actor: &ActorRef,
        changes: &[(BlockPos, BlockState)],
    ) -> TrackOutcome {
        if !self.config.world_enabled(world.world_id())
            || !self.config.external_edits
            || changes.is_empty()
        {
            return TrackOutcome::Ignored;
        }
        let actor = match resolve(actor) {
            Ok(actor) => actor,
            Err(e) => {
                tracing::warn!(error = %e, "dropping bulk edit");
                return TrackOutcome::Ignored;
            }
        };

        let timestamp = now_secs();
        let batch = Uuid::new_v4();
        let mut drafts = Vec::with_capacity(changes.len());
        for &(pos, new_state) in changes {
            let old = world.block_at(pos);
            match self.block_draft(
                world,
                &actor,
                timestamp,
                pos,
                Action::Place,
                old,
                new_state,
                None,
                Some(batch),
            ) {
                Ok(draft) => drafts.push(draft),
                Err(e) => {
                    tracing::warn!(error = %e, %pos, "bulk edit not logged");
                    return TrackOutcome::Ignored;
                }
            }
        }
        self.commit(drafts)
    }

    /// Read-only history for a position, newest first. Inspector markers are
    /// filtered out so inspections do not answer themselves.
    pub fn history_at<W: WorldView>(&self, world: &W, pos: BlockPos) -> Vec<ChangeRecord> {
        let filter = ChangeFilter {
            radius: Some(0),
            time_to: now_secs(),
            ..ChangeFilter::all(world.world_id().clone(), pos)
        };
        match self.store.query(&filter, QueryOrder::Descending) {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.action != Action::InspectMarker)
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, %pos, "history query failed");
                Vec::new()
            }
        }
    }

    /// If the acting player is in inspection mode, answer with history and
    /// signal cancellation instead of logging. Checked before any other
    /// branch; the inspection itself leaves an `InspectMarker` record.
    fn inspector_check<W: WorldView>(
        &self,
        world: &W,
        actor: &ActorRef,
        pos: BlockPos,
    ) -> Option<TrackOutcome> {
        let ActorRef::Player { uuid, .. } = actor else {
            return None;
        };
        if !self.inspectors.contains(uuid) {
            return None;
        }
        let history = self.history_at(world, pos);
        if let Ok(actor) = resolve(actor) {
            let live = world.block_at(pos);
            let marker = self.block_draft(
                world,
                &actor,
                now_secs(),
                pos,
                Action::InspectMarker,
                live,
                live,
                None,
                None,
            );
            match marker {
                Ok(draft) => {
                    if let Err(e) = self.store.append(draft) {
                        tracing::warn!(error = %e, %pos, "inspect marker not logged");
                    }
                }
                Err(e) => tracing::warn!(error = %e, %pos, "inspect marker not encoded"),
            }
        }
        Some(TrackOutcome::Inspected { history })
    }

    #[allow(clippy::too_many_arguments)]
    fn block_draft<W: WorldView>(
        &self,
        world: &W,
        actor: &Actor,
        timestamp: u64,
        pos: BlockPos,
        action: Action,
        prior: BlockState,
        posterior: BlockState,
        compound_group: Option<Uuid>,
        batch: Option<Uuid>,
    ) -> Result<RecordDraft, CodecError> {
        Ok(RecordDraft {
            timestamp,
            actor: actor.clone(),
            position: GlobalPos::new(world.world_id().clone(), pos),
            action,
            prior: encode_block(prior)?,
            posterior: encode_block(posterior)?,
            compound_group,
            batch,
        })
    }

    /// Append drafts as one durable unit; storage failures degrade to a
    /// warning because logging must never block gameplay.
    fn commit(&self, drafts: Vec<RecordDraft>) -> TrackOutcome {
        let count = drafts.len();
        match self.store.append_batch(drafts) {
            Ok(_) => TrackOutcome::Logged { records: count },
            Err(e) => {
                tracing::warn!(error = %e, "change records lost");
                TrackOutcome::Ignored
            }
        }
    }
}

fn environment_actor(state: BlockState) -> Actor {
    Actor {
        kind: blocktrace_common::ActorKind::Environment,
        identity: state.type_id.to_string(),
        display_name: state.name(),
    }
}
