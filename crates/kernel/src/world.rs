use crate::block::{BlockKind, BlockState};
use blocktrace_codec::ContainerSnapshot;
use blocktrace_common::{BlockPos, WorldId};
use std::collections::BTreeMap;

/// Errors from world access.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("position {0:?} is outside the world")]
    OutOfBounds(BlockPos),
}

/// Read-only access to live world state.
///
/// The normalizer re-reads blocks through this trait rather than holding on
/// to engine references; the underlying object may be refreshed between
/// notifications, so only value comparison is meaningful.
pub trait WorldView {
    fn world_id(&self) -> &WorldId;

    /// The block at `pos`; air outside any stored cell.
    fn block_at(&self, pos: BlockPos) -> BlockState;

    /// The container inventory at `pos`, if the block there owns one.
    fn container_at(&self, pos: BlockPos) -> Option<ContainerSnapshot>;

    /// Current simulation tick.
    fn current_tick(&self) -> u64;
}

/// Mutating access to live world state, used by the rollback engine's
/// apply phase. Fails only on invalid coordinates.
pub trait WorldMutator: WorldView {
    fn set_block(&mut self, pos: BlockPos, state: BlockState) -> Result<(), WorldError>;

    /// Replace the container contents at `pos`; `None` clears them.
    fn set_container(
        &mut self,
        pos: BlockPos,
        snapshot: Option<ContainerSnapshot>,
    ) -> Result<(), WorldError>;
}

/// In-memory reference world.
///
/// Stands in for the host engine in tests and the CLI demo. Sparse storage:
/// unset cells are air. Uses BTreeMap for deterministic iteration order.
#[derive(Debug)]
pub struct GridWorld {
    id: WorldId,
    blocks: BTreeMap<BlockPos, BlockState>,
    containers: BTreeMap<BlockPos, ContainerSnapshot>,
    tick: u64,
    min_y: i32,
    max_y: i32,
}

impl GridWorld {
    /// Create an empty world with the default vertical range.
    pub fn new(id: WorldId) -> Self {
        Self {
            id,
            blocks: BTreeMap::new(),
            containers: BTreeMap::new(),
            tick: 0,
            min_y: -64,
            max_y: 320,
        }
    }

    /// Advance the simulation by one tick.
    pub fn step(&mut self) {
        self.tick += 1;
    }

    /// Number of non-air cells.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn in_bounds(&self, pos: BlockPos) -> bool {
        pos.y >= self.min_y && pos.y <= self.max_y
    }
}

impl WorldView for GridWorld {
    fn world_id(&self) -> &WorldId {
        &self.id
    }

    fn block_at(&self, pos: BlockPos) -> BlockState {
        self.blocks.get(&pos).copied().unwrap_or(BlockState::AIR)
    }

    fn container_at(&self, pos: BlockPos) -> Option<ContainerSnapshot> {
        self.containers.get(&pos).cloned()
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }
}

impl WorldMutator for GridWorld {
    fn set_block(&mut self, pos: BlockPos, state: BlockState) -> Result<(), WorldError> {
        if !self.in_bounds(pos) {
            return Err(WorldError::OutOfBounds(pos));
        }
        if state.is_air() {
            self.blocks.remove(&pos);
        } else {
            self.blocks.insert(pos, state);
        }
        // A cell that no longer holds a container block cannot keep contents.
        let keeps_container = matches!(state.def().map(|d| d.kind), Some(BlockKind::Container));
        if !keeps_container {
            self.containers.remove(&pos);
        }
        Ok(())
    }

    fn set_container(
        &mut self,
        pos: BlockPos,
        snapshot: Option<ContainerSnapshot>,
    ) -> Result<(), WorldError> {
        if !self.in_bounds(pos) {
            return Err(WorldError::OutOfBounds(pos));
        }
        match snapshot {
            Some(snap) if !snap.is_empty() => {
                self.containers.insert(pos, snap);
            }
            _ => {
                self.containers.remove(&pos);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blocktrace_codec::ContainerSlot;

    fn world() -> GridWorld {
        GridWorld::new(WorldId::new("overworld"))
    }

    #[test]
    fn unset_cells_are_air() {
        let w = world();
        assert!(w.block_at(BlockPos::new(0, 64, 0)).is_air());
        assert_eq!(w.block_count(), 0);
    }

    #[test]
    fn set_and_clear_blocks() {
        let mut w = world();
        let pos = BlockPos::new(1, 64, 1);
        w.set_block(pos, BlockState::new(1, 0)).unwrap();
        assert_eq!(w.block_at(pos), BlockState::new(1, 0));

        w.set_block(pos, BlockState::AIR).unwrap();
        assert!(w.block_at(pos).is_air());
        assert_eq!(w.block_count(), 0);
    }

    #[test]
    fn out_of_bounds_fails() {
        let mut w = world();
        let too_low = BlockPos::new(0, -1000, 0);
        assert!(w.set_block(too_low, BlockState::new(1, 0)).is_err());
        assert!(w.set_container(too_low, None).is_err());
    }

    #[test]
    fn breaking_a_container_clears_contents() {
        let mut w = world();
        let pos = BlockPos::new(2, 64, 2);
        w.set_block(pos, BlockState::new(54, 0)).unwrap();
        w.set_container(
            pos,
            Some(ContainerSnapshot {
                slots: vec![ContainerSlot {
                    index: 0,
                    item: "apple".into(),
                    count: 3,
                    meta: None,
                }],
            }),
        )
        .unwrap();
        assert!(w.container_at(pos).is_some());

        w.set_block(pos, BlockState::AIR).unwrap();
        assert!(w.container_at(pos).is_none());
    }

    #[test]
    fn empty_snapshot_clears_contents() {
        let mut w = world();
        let pos = BlockPos::new(3, 64, 3);
        w.set_block(pos, BlockState::new(54, 0)).unwrap();
        w.set_container(pos, Some(ContainerSnapshot::empty())).unwrap();
        assert!(w.container_at(pos).is_none());
    }

    #[test]
    fn step_advances_tick() {
        let mut w = world();
        w.step();
        w.step();
        assert_eq!(w.current_tick(), 2);
    }
}
