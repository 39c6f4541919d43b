use blocktrace_codec::{CodecError, Payload, Tag, decode, encode};
use blocktrace_common::BlockPos;
use serde::{Deserialize, Serialize};

/// A block in the world: type id plus packed variant bits.
///
/// Doors keep their upper-half flag in bit `0x08` of `variant`; beds keep
/// their facing in bits `0x03` and the head flag in `0x08`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockState {
    pub type_id: u32,
    pub variant: u8,
}

impl BlockState {
    pub const AIR: Self = Self {
        type_id: 0,
        variant: 0,
    };

    pub fn new(type_id: u32, variant: u8) -> Self {
        Self { type_id, variant }
    }

    pub fn is_air(self) -> bool {
        self.type_id == 0
    }

    /// Registry entry for this block's type, if the type is known.
    pub fn def(self) -> Option<&'static BlockDef> {
        block_def(self.type_id)
    }

    /// Display name; unknown types render as `unknown:<id>`.
    pub fn name(self) -> String {
        match self.def() {
            Some(def) => def.name.to_string(),
            None => format!("unknown:{}", self.type_id),
        }
    }
}

/// Liquid families tracked by the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidKind {
    Water,
    Lava,
}

/// Structural role of a block type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Air,
    Plain,
    /// Two-cell vertical structure; variant bit 0x08 marks the upper leaf.
    Door,
    /// Two-cell horizontal structure; variant bits 0x03 are the facing,
    /// 0x08 marks the head.
    Bed,
    /// Owns an inventory.
    Container,
    Liquid {
        kind: LiquidKind,
        still: bool,
    },
    Fire,
}

/// One row of the static block registry.
#[derive(Debug, Clone, Copy)]
pub struct BlockDef {
    pub type_id: u32,
    pub name: &'static str,
    pub solid: bool,
    pub transparent: bool,
    pub placeable: bool,
    pub kind: BlockKind,
}

/// Schema version of the registry table below.
pub const BLOCK_TABLE_VERSION: u32 = 1;

/// Block trait table.
///
/// The host engine keeps its block traits private; until it exposes a
/// registry interface this versioned table is the fallback the normalizer
/// and rollback engine consult.
const BLOCKS: [BlockDef; 16] = [
    BlockDef {
        type_id: 0,
        name: "air",
        solid: false,
        transparent: true,
        placeable: false,
        kind: BlockKind::Air,
    },
    BlockDef {
        type_id: 1,
        name: "stone",
        solid: true,
        transparent: false,
        placeable: true,
        kind: BlockKind::Plain,
    },
    BlockDef {
        type_id: 3,
        name: "dirt",
        solid: true,
        transparent: false,
        placeable: true,
        kind: BlockKind::Plain,
    },
    BlockDef {
        type_id: 5,
        name: "planks",
        solid: true,
        transparent: false,
        placeable: true,
        kind: BlockKind::Plain,
    },
    BlockDef {
        type_id: 8,
        name: "flowing_water",
        solid: false,
        transparent: true,
        placeable: false,
        kind: BlockKind::Liquid {
            kind: LiquidKind::Water,
            still: false,
        },
    },
    BlockDef {
        type_id: 9,
        name: "water",
        solid: false,
        transparent: true,
        placeable: false,
        kind: BlockKind::Liquid {
            kind: LiquidKind::Water,
            still: true,
        },
    },
    BlockDef {
        type_id: 10,
        name: "flowing_lava",
        solid: false,
        transparent: true,
        placeable: false,
        kind: BlockKind::Liquid {
            kind: LiquidKind::Lava,
            still: false,
        },
    },
    BlockDef {
        type_id: 11,
        name: "lava",
        solid: false,
        transparent: true,
        placeable: false,
        kind: BlockKind::Liquid {
            kind: LiquidKind::Lava,
            still: true,
        },
    },
    BlockDef {
        type_id: 20,
        name: "glass",
        solid: true,
        transparent: true,
        placeable: true,
        kind: BlockKind::Plain,
    },
    BlockDef {
        type_id: 26,
        name: "bed",
        solid: false,
        transparent: true,
        placeable: true,
        kind: BlockKind::Bed,
    },
    BlockDef {
        type_id: 31,
        name: "tall_grass",
        solid: false,
        transparent: true,
        placeable: true,
        kind: BlockKind::Plain,
    },
    BlockDef {
        type_id: 50,
        name: "torch",
        solid: false,
        transparent: true,
        placeable: true,
        kind: BlockKind::Plain,
    },
    BlockDef {
        type_id: 51,
        name: "fire",
        solid: false,
        transparent: true,
        placeable: false,
        kind: BlockKind::Fire,
    },
    BlockDef {
        type_id: 54,
        name: "chest",
        solid: true,
        transparent: false,
        placeable: true,
        kind: BlockKind::Container,
    },
    BlockDef {
        type_id: 64,
        name: "wooden_door",
        solid: false,
        transparent: true,
        placeable: true,
        kind: BlockKind::Door,
    },
    BlockDef {
        type_id: 79,
        name: "ice",
        solid: true,
        transparent: true,
        placeable: true,
        kind: BlockKind::Plain,
    },
];

/// Look up a block definition by type id.
pub fn block_def(type_id: u32) -> Option<&'static BlockDef> {
    BLOCKS.iter().find(|def| def.type_id == type_id)
}

/// The still form of the liquid opposite to `kind` (water for lava and
/// vice versa), used as the synthetic cause of form events.
pub fn opposite_liquid(kind: LiquidKind) -> BlockState {
    match kind {
        LiquidKind::Water => BlockState::new(11, 0),
        LiquidKind::Lava => BlockState::new(9, 0),
    }
}

/// If `state` at `pos` is one half of a two-cell structure, the position of
/// its other half.
///
/// Door leaves stack vertically: the upper leaf (variant bit 0x08) looks
/// down, the lower looks up. Bed halves lie along the facing encoded in
/// variant bits 0x03: the head looks back toward the foot, the foot looks
/// forward toward the head.
pub fn compound_partner(state: BlockState, pos: BlockPos) -> Option<BlockPos> {
    match state.def()?.kind {
        BlockKind::Door => {
            let upper = state.variant & 0x08 != 0;
            Some(if upper {
                pos.offset(0, -1, 0)
            } else {
                pos.offset(0, 1, 0)
            })
        }
        BlockKind::Bed => {
            let (dx, dz) = match state.variant & 0x03 {
                0 => (0, 1),  // facing south
                1 => (-1, 0), // facing west
                2 => (0, -1), // facing north
                _ => (1, 0),  // facing east
            };
            let head = state.variant & 0x08 != 0;
            Some(if head {
                pos.offset(-dx, 0, -dz)
            } else {
                pos.offset(dx, 0, dz)
            })
        }
        _ => None,
    }
}

/// Lower a block state into a state tree.
pub fn block_tree(state: BlockState) -> Tag {
    Tag::compound([
        ("id", Tag::Int(state.type_id as i32)),
        ("variant", Tag::Byte(state.variant as i8)),
    ])
}

/// Rebuild a block state from a tree produced by [`block_tree`].
pub fn block_from_tree(tree: &Tag) -> Result<BlockState, CodecError> {
    let type_id = tree
        .get("id")
        .and_then(Tag::as_int)
        .ok_or_else(|| CodecError::CorruptPayload("block tree missing id".into()))?;
    let variant = tree
        .get("variant")
        .and_then(Tag::as_byte)
        .ok_or_else(|| CodecError::CorruptPayload("block tree missing variant".into()))?;
    Ok(BlockState::new(type_id as u32, variant as u8))
}

/// Encode a block state straight to a durable payload.
pub fn encode_block(state: BlockState) -> Result<Payload, CodecError> {
    encode(&block_tree(state))
}

/// Decode a payload produced by [`encode_block`].
pub fn decode_block(payload: &str) -> Result<BlockState, CodecError> {
    block_from_tree(&decode(payload)?)
}
