use blocktrace_codec::{CodecError, ContainerSnapshot};
use blocktrace_common::Action;
use blocktrace_kernel::{WorldMutator, decode_block};
use blocktrace_store::{ChangeFilter, ChangeLogStore, ChangeRecord, QueryOrder, StoreError};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Errors that abort a whole pass. Per-entry problems (conflicts, decode or
/// apply failures) are report statuses instead.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one rollback or restore pass.
#[derive(Debug, Clone, Default)]
pub struct RollbackReport {
    /// Entries considered, compound partners included.
    pub matched: usize,
    /// Entries whose target state was written to the world.
    pub applied: usize,
    /// Entries skipped because live state no longer matched expectations.
    pub conflicts: usize,
    /// Entries that failed to decode or apply.
    pub failed: usize,
    /// Width of the filter's time window in seconds.
    pub window_secs: u64,
    pub elapsed: Duration,
}

impl fmt::Display for RollbackReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} applied, {} conflicts, {} failed of {} matched ({}s window, {:?})",
            self.applied, self.conflicts, self.failed, self.matched, self.window_secs, self.elapsed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Rollback,
    Restore,
}

/// Replays filtered change records against the live world.
pub struct RollbackEngine {
    store: Arc<ChangeLogStore>,
}

impl RollbackEngine {
    pub fn new(store: Arc<ChangeLogStore>) -> Self {
        Self { store }
    }

    /// Undo the filtered changes: newest first, reapplying prior states.
    pub fn rollback<W: WorldMutator>(
        &self,
        world: &mut W,
        filter: &ChangeFilter,
    ) -> Result<RollbackReport, RollbackError> {
        self.run(world, filter, Mode::Rollback)
    }

    /// Redo the filtered changes: oldest first, reapplying posterior states.
    pub fn restore<W: WorldMutator>(
        &self,
        world: &mut W,
        filter: &ChangeFilter,
    ) -> Result<RollbackReport, RollbackError> {
        self.run(world, filter, Mode::Restore)
    }

    fn run<W: WorldMutator>(
        &self,
        world: &mut W,
        filter: &ChangeFilter,
        mode: Mode,
    ) -> Result<RollbackReport, RollbackError> {
        let _span = tracing::info_span!("replay_pass", ?mode).entered();
        let start = Instant::now();

        let order = match mode {
            Mode::Rollback => QueryOrder::Descending,
            Mode::Restore => QueryOrder::Ascending,
        };
        let mut records = self.store.query(filter, order)?;
        self.widen_compound_groups(&mut records)?;

        let mut report = RollbackReport {
            matched: records.len(),
            window_secs: filter.window_secs(),
            ..RollbackReport::default()
        };

        let mut handled: HashSet<Uuid> = HashSet::new();
        for i in 0..records.len() {
            match records[i].compound_group {
                Some(group) => {
                    if !handled.insert(group) {
                        continue;
                    }
                    let members: Vec<&ChangeRecord> = records
                        .iter()
                        .filter(|r| r.compound_group == Some(group))
                        .collect();
                    apply_group(world, &members, mode, &mut report);
                }
                None => {
                    apply_group(world, &[&records[i]], mode, &mut report);
                }
            }
        }

        report.elapsed = start.elapsed();
        tracing::info!(
            applied = report.applied,
            conflicts = report.conflicts,
            failed = report.failed,
            "replay pass complete"
        );
        Ok(report)
    }

    /// Pull in compound partners the filter missed, so a group is always
    /// whole in the working set. Partners join right after the member that
    /// matched; order within a group does not matter since the halves target
    /// distinct positions.
    fn widen_compound_groups(&self, records: &mut Vec<ChangeRecord>) -> Result<(), RollbackError> {
        let present: HashSet<u64> = records.iter().map(|r| r.id).collect();
        let mut seen_groups: HashSet<Uuid> = HashSet::new();
        let mut i = 0;
        while i < records.len() {
            if let Some(group) = records[i].compound_group
                && seen_groups.insert(group)
            {
                for member in self.store.group_members(group)? {
                    if !present.contains(&member.id) {
                        records.insert(i + 1, member);
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }
}

/// Apply one record, or both halves of one compound group, to the world.
///
/// The conflict check runs over every member before anything is written: if
/// any half no longer matches the expected live state, the whole group is
/// skipped so halves never separate.
fn apply_group<W: WorldMutator>(
    world: &mut W,
    members: &[&ChangeRecord],
    mode: Mode,
    report: &mut RollbackReport,
) {
    for record in members {
        match live_matches_expected(world, record, mode) {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(
                    id = record.id,
                    pos = %record.position.pos,
                    "live state diverged; skipping as conflict"
                );
                report.conflicts += members.len();
                return;
            }
            Err(e) => {
                tracing::warn!(id = record.id, error = %e, "expected state unreadable");
                report.failed += members.len();
                return;
            }
        }
    }

    for record in members {
        match apply_target(world, record, mode) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(id = record.id, error = %e, "apply failed");
                report.failed += 1;
            }
        }
    }
}

/// Whether the live state at the record's position equals the state the
/// replay expects to find (posterior when rolling back, prior when
/// restoring). Comparison is by value; engine references are never held.
fn live_matches_expected<W: WorldMutator>(
    world: &W,
    record: &ChangeRecord,
    mode: Mode,
) -> Result<bool, CodecError> {
    let expected = match mode {
        Mode::Rollback => &record.posterior,
        Mode::Restore => &record.prior,
    };
    let pos = record.position.pos;
    if record.action == Action::ContainerChange {
        let expected = ContainerSnapshot::decode(expected)?;
        let live = world.container_at(pos).unwrap_or_default();
        Ok(live == expected)
    } else {
        let expected = decode_block(expected)?;
        Ok(world.block_at(pos) == expected)
    }
}

#[derive(Debug, thiserror::Error)]
enum ApplyError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    World(#[from] blocktrace_kernel::WorldError),
}

fn apply_target<W: WorldMutator>(
    world: &mut W,
    record: &ChangeRecord,
    mode: Mode,
) -> Result<(), ApplyError> {
    let target = match mode {
        Mode::Rollback => &record.prior,
        Mode::Restore => &record.posterior,
    };
    let pos = record.position.pos;
    if record.action == Action::ContainerChange {
        let snapshot = ContainerSnapshot::decode(target)?;
        world.set_container(pos, Some(snapshot))?;
    } else {
        world.set_block(pos, decode_block(target)?)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocktrace_codec::ContainerSlot;
    use blocktrace_common::{Actor, ActorKind, BlockPos, GlobalPos, WorldId};
    use blocktrace_kernel::{BlockState, GridWorld, WorldView, encode_block};
    use blocktrace_store::RecordDraft;

    fn actor() -> Actor {
        Actor {
            kind: ActorKind::Player,
            identity: "alice".into(),
            display_name: "alice".into(),
        }
    }

    fn block_draft(
        pos: BlockPos,
        ts: u64,
        action: Action,
        prior: BlockState,
        posterior: BlockState,
        group: Option<Uuid>,
    ) -> RecordDraft {
        RecordDraft {
            timestamp: ts,
            actor: actor(),
            position: GlobalPos::new(WorldId::new("overworld"), pos),
            action,
            prior: encode_block(prior).unwrap(),
            posterior: encode_block(posterior).unwrap(),
            compound_group: group,
            batch: None,
        }
    }

    fn setup() -> (GridWorld, Arc<ChangeLogStore>, RollbackEngine, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(ChangeLogStore::open(tmp.path().join("log")).unwrap());
        let engine = RollbackEngine::new(Arc::clone(&store));
        let world = GridWorld::new(WorldId::new("overworld"));
        (world, store, engine, tmp)
    }

    fn all_filter() -> ChangeFilter {
        ChangeFilter::all(WorldId::new("overworld"), BlockPos::new(0, 0, 0))
    }

    const STONE: BlockState = BlockState {
        type_id: 1,
        variant: 0,
    };
    const GLASS: BlockState = BlockState {
        type_id: 20,
        variant: 0,
    };

    #[test]
    fn rollback_restores_prior_state() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(0, 64, 0);
        // History: stone was placed over air.
        store
            .append(block_draft(pos, 100, Action::Place, BlockState::AIR, STONE, None))
            .unwrap();
        world.set_block(pos, STONE).unwrap();

        let report = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(report.conflicts, 0);
        assert!(world.block_at(pos).is_air());
    }

    #[test]
    fn rollback_walks_history_backwards() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(0, 64, 0);
        // Stone placed, then broken again.
        store
            .append(block_draft(pos, 100, Action::Place, BlockState::AIR, STONE, None))
            .unwrap();
        store
            .append(block_draft(pos, 200, Action::Break, STONE, BlockState::AIR, None))
            .unwrap();
        // Live state after both changes: air.

        let report = engine.rollback(&mut world, &all_filter()).unwrap();
        // Newest first: the break rolls back to stone, then the place rolls
        // back to air. Forward order would conflict immediately.
        assert_eq!(report.applied, 2);
        assert_eq!(report.conflicts, 0);
        assert!(world.block_at(pos).is_air());
    }

    #[test]
    fn conflict_is_skipped_and_reported() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(0, 64, 0);
        store
            .append(block_draft(pos, 100, Action::Place, BlockState::AIR, STONE, None))
            .unwrap();
        // An unrelated later change put glass there instead.
        world.set_block(pos, GLASS).unwrap();

        let mut filter = all_filter();
        filter.time_to = 150;
        let report = engine.rollback(&mut world, &filter).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.conflicts, 1);
        // The newer state is not clobbered.
        assert_eq!(world.block_at(pos), GLASS);
    }

    #[test]
    fn rollback_twice_is_idempotent() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(0, 64, 0);
        store
            .append(block_draft(pos, 100, Action::Place, BlockState::AIR, STONE, None))
            .unwrap();
        world.set_block(pos, STONE).unwrap();

        let first = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(first.applied, 1);
        assert!(world.block_at(pos).is_air());

        // Second pass: live state already equals the target, so the expected
        // (posterior) check finds a divergence and nothing mutates.
        let second = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(second.applied, 0);
        assert!(world.block_at(pos).is_air());
    }

    #[test]
    fn filter_matching_one_half_restores_both() {
        let (mut world, store, engine, _tmp) = setup();
        let lower = BlockPos::new(3, 64, 3);
        let upper = lower.offset(0, 1, 0);
        let group = Uuid::new_v4();
        let door_lower = BlockState::new(64, 0);
        let door_upper = BlockState::new(64, 0x08);
        store
            .append_batch(vec![
                block_draft(upper, 100, Action::Break, door_upper, BlockState::AIR, Some(group)),
                block_draft(lower, 100, Action::Break, door_lower, BlockState::AIR, Some(group)),
            ])
            .unwrap();
        // Both cells are air after the break.

        // Filter pinned to the lower cell only.
        let mut filter = all_filter();
        filter.center = lower;
        filter.radius = Some(0);
        let report = engine.rollback(&mut world, &filter).unwrap();

        assert_eq!(report.matched, 2);
        assert_eq!(report.applied, 2);
        assert_eq!(world.block_at(lower), door_lower);
        assert_eq!(world.block_at(upper), door_upper);
    }

    #[test]
    fn group_conflict_skips_both_halves() {
        let (mut world, store, engine, _tmp) = setup();
        let lower = BlockPos::new(3, 64, 3);
        let upper = lower.offset(0, 1, 0);
        let group = Uuid::new_v4();
        store
            .append_batch(vec![
                block_draft(upper, 100, Action::Break, BlockState::new(64, 0x08), BlockState::AIR, Some(group)),
                block_draft(lower, 100, Action::Break, BlockState::new(64, 0), BlockState::AIR, Some(group)),
            ])
            .unwrap();
        // Someone built glass where the upper half used to be.
        world.set_block(upper, GLASS).unwrap();

        let report = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(report.applied, 0);
        assert_eq!(report.conflicts, 2);
        // Neither half was touched.
        assert!(world.block_at(lower).is_air());
        assert_eq!(world.block_at(upper), GLASS);
    }

    #[test]
    fn restore_redoes_a_rollback() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(0, 64, 0);
        store
            .append(block_draft(pos, 100, Action::Place, BlockState::AIR, STONE, None))
            .unwrap();
        world.set_block(pos, STONE).unwrap();

        engine.rollback(&mut world, &all_filter()).unwrap();
        assert!(world.block_at(pos).is_air());

        let report = engine.restore(&mut world, &all_filter()).unwrap();
        assert_eq!(report.applied, 1);
        assert_eq!(world.block_at(pos), STONE);
    }

    #[test]
    fn restore_walks_history_forwards() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(0, 64, 0);
        store
            .append(block_draft(pos, 100, Action::Place, BlockState::AIR, STONE, None))
            .unwrap();
        store
            .append(block_draft(pos, 200, Action::Place, STONE, GLASS, None))
            .unwrap();
        // World was rolled all the way back to air.

        let report = engine.restore(&mut world, &all_filter()).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(world.block_at(pos), GLASS);
    }

    #[test]
    fn container_contents_are_restored_in_order() {
        let (mut world, store, engine, _tmp) = setup();
        let pos = BlockPos::new(7, 64, 7);
        let chest = BlockState::new(54, 2);
        let contents = ContainerSnapshot {
            slots: vec![
                ContainerSlot {
                    index: 9,
                    item: "diamond".into(),
                    count: 3,
                    meta: None,
                },
                ContainerSlot {
                    index: 1,
                    item: "apple".into(),
                    count: 17,
                    meta: None,
                },
            ],
        };
        // Chest broken with contents: container record first, then the break.
        store
            .append_batch(vec![
                RecordDraft {
                    timestamp: 100,
                    actor: actor(),
                    position: GlobalPos::new(WorldId::new("overworld"), pos),
                    action: Action::ContainerChange,
                    prior: contents.encode().unwrap(),
                    posterior: ContainerSnapshot::empty().encode().unwrap(),
                    compound_group: None,
                    batch: None,
                },
                block_draft(pos, 100, Action::Break, chest, BlockState::AIR, None),
            ])
            .unwrap();

        let report = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(world.block_at(pos), chest);
        assert_eq!(world.container_at(pos).unwrap(), contents);
    }

    #[test]
    fn apply_failure_is_counted_not_fatal() {
        let (mut world, store, engine, _tmp) = setup();
        // A record below the world floor: the expected check sees air and
        // passes, but the write is rejected as out of bounds.
        let bad = BlockPos::new(0, -1000, 0);
        store
            .append(block_draft(bad, 100, Action::Break, STONE, BlockState::AIR, None))
            .unwrap();
        let good = BlockPos::new(1, 64, 0);
        store
            .append(block_draft(good, 100, Action::Break, STONE, BlockState::AIR, None))
            .unwrap();

        let report = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(report.failed, 1);
        assert_eq!(report.applied, 1);
        assert_eq!(world.block_at(good), STONE);
    }

    #[test]
    fn report_carries_the_window() {
        let (mut world, _store, engine, _tmp) = setup();
        let mut filter = all_filter();
        filter.time_from = 1000;
        filter.time_to = 4600;
        let report = engine.rollback(&mut world, &filter).unwrap();
        assert_eq!(report.window_secs, 3600);
        assert_eq!(report.matched, 0);
    }

    /// End-to-end: records produced by the tracker roll back cleanly.
    #[test]
    fn tracker_break_rolls_back() {
        use blocktrace_common::ActorRef;
        use blocktrace_track::{ChangeTracker, TrackerConfig};

        let (mut world, store, engine, _tmp) = setup();
        let mut tracker = ChangeTracker::new(Arc::clone(&store), TrackerConfig::default());
        let lower = BlockPos::new(3, 64, 3);
        let upper = lower.offset(0, 1, 0);
        world.set_block(lower, BlockState::new(64, 0)).unwrap();
        world.set_block(upper, BlockState::new(64, 0x08)).unwrap();

        let player = ActorRef::Player {
            uuid: uuid::Uuid::new_v4(),
            name: "alice".into(),
        };
        tracker.on_block_break(&world, &player, lower);
        // Engine removes both halves.
        world.set_block(lower, BlockState::AIR).unwrap();
        world.set_block(upper, BlockState::AIR).unwrap();

        let report = engine.rollback(&mut world, &all_filter()).unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(world.block_at(lower), BlockState::new(64, 0));
        assert_eq!(world.block_at(upper), BlockState::new(64, 0x08));
    }
}
