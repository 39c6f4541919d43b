use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a world (dimension) within the host engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldId(pub String);

impl WorldId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Integer block coordinate within a world.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Offset this position by a delta on each axis.
    pub fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// The six axis-adjacent neighbors (down, up, north, south, west, east).
    pub fn neighbors(self) -> [Self; 6] {
        [
            self.offset(0, -1, 0),
            self.offset(0, 1, 0),
            self.offset(0, 0, -1),
            self.offset(0, 0, 1),
            self.offset(-1, 0, 0),
            self.offset(1, 0, 0),
        ]
    }

    /// Whether `other` lies within a per-axis bounding box of `radius`
    /// centered on `self`.
    pub fn within_radius(self, other: Self, radius: i32) -> bool {
        (self.x - other.x).abs() <= radius
            && (self.y - other.y).abs() <= radius
            && (self.z - other.z).abs() <= radius
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A block position qualified by the world it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GlobalPos {
    pub world: WorldId,
    pub pos: BlockPos,
}

impl GlobalPos {
    pub fn new(world: WorldId, pos: BlockPos) -> Self {
        Self { world, pos }
    }
}

impl fmt::Display for GlobalPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.pos, self.world)
    }
}

/// What kind of cause stands behind a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActorKind {
    /// A human player with a persistent engine-assigned identity.
    Player,
    /// A non-player entity (mob, item entity, projectile).
    Entity,
    /// An environmental cause: liquid, fire, weather.
    Environment,
}

/// Resolved cause of a change, as stored in the log.
///
/// `identity` is a UUID string for players and a stable numeric type tag
/// rendered as a string for everything else. It is never derived from a
/// volatile engine reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub kind: ActorKind,
    pub identity: String,
    pub display_name: String,
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name)
    }
}

/// The tracked mutation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    Break,
    Place,
    Spread,
    Burn,
    Form,
    ContainerChange,
    InspectMarker,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Break => "break",
            Self::Place => "place",
            Self::Spread => "spread",
            Self::Burn => "burn",
            Self::Form => "form",
            Self::ContainerChange => "container",
            Self::InspectMarker => "inspect",
        };
        f.write_str(s)
    }
}
