//! Node identity and placement on the simulation plane.

use crate::error::{Result, TopologyError};

/// Process-lifetime unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct NodeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A point on the plane.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    /// Origin of the plane.
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    /// Create a position, rejecting NaN and infinite coordinates.
    pub fn new(x: f64, y: f64) -> Result<Self> {
        if x.is_finite() && y.is_finite() {
            Ok(Self { x, y })
        } else {
            Err(TopologyError::InvalidPosition { x, y })
        }
    }

    /// Euclidean distance to another position.
    pub fn distance(&self, other: &Self) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }
}

/// A started node as seen by the wiring algorithm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub id: NodeId,
    pub position: Position,
}

impl Placement {
    pub const fn new(id: NodeId, x: f64, y: f64) -> Self {
        Self {
            id,
            position: Position { x, y },
        }
    }

    pub fn distance(&self, other: &Self) -> f64 {
        self.position.distance(&other.position)
    }
}

/// Unordered node pair, stored as `(min, max)`.
///
/// Both argument orders produce the same key, so each physical link has
/// exactly one entry wherever a `LinkKey` is used as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkKey {
    low: NodeId,
    high: NodeId,
}

impl LinkKey {
    pub fn new(a: NodeId, b: NodeId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub const fn low(&self) -> NodeId {
        self.low
    }

    pub const fn high(&self) -> NodeId {
        self.high
    }

    /// Whether `id` is one of the two ends.
    pub fn touches(&self, id: NodeId) -> bool {
        self.low == id || self.high == id
    }

    /// The opposite end from `id`, if `id` is an end.
    pub fn other(&self, id: NodeId) -> Option<NodeId> {
        if id == self.low {
            Some(self.high)
        } else if id == self.high {
            Some(self.low)
        } else {
            None
        }
    }
}

impl std::fmt::Display for LinkKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}
