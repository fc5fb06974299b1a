use std::fmt::Display;

use crate::*;

/// Spacing between boundary blocks. Archiving mode only changes on a boundary.
pub const BOUNDARY_INTERVAL: u64 = 100;

/// How far behind the last irreversible block a block must be before it is merged directly.
pub const LIB_SAFETY_MARGIN: u64 = 100;

/// A single block as produced by the node.
///
/// The selector never looks inside the payload.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub num: u64,
    pub id: String,
    pub time: Timestamp,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(num: u64, id: impl Into<String>, time: Timestamp, payload: Vec<u8>) -> Self {
        Block {
            num,
            id: id.into(),
            time,
            payload,
        }
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "#{} ({})", self.num, self.id)
    }
}

/// Where the selector currently stands with respect to boundaries.
///
/// This is the only part of the selector state the LIB poller observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoutingPhase {
    /// No boundary block has been routed yet.
    BeforeFirstBoundary,
    /// A boundary was passed and blocks are being merged.
    Merging,
    /// A boundary was passed in one-block mode. Merging will never resume.
    PinnedOneBlock,
}

impl RoutingPhase {
    pub(crate) fn after_boundary(merging: bool) -> Self {
        if merging {
            RoutingPhase::Merging
        } else {
            RoutingPhase::PinnedOneBlock
        }
    }
}
