use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Snapshots kept unconditionally behind the tip under `syncable`.
pub const SYNCABLE_KEEP_RECENT: u64 = 100;
/// Under `syncable`, every snapshot at a multiple of this height is kept forever.
pub const SYNCABLE_KEEP_EVERY: u64 = 10_000;

/// Which historical state snapshots the application keeps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruningStrategy {
    /// Last 100 snapshots plus every 10000th.
    #[default]
    Syncable,
    /// Keep everything.
    Nothing,
    /// Keep only the latest snapshot.
    Everything,
}

impl PruningStrategy {
    /// The snapshot height that becomes prunable once `committed` is written.
    pub fn prune_after_commit(&self, committed: u64) -> Option<u64> {
        match self {
            PruningStrategy::Nothing => None,
            PruningStrategy::Everything => committed.checked_sub(1).filter(|h| *h > 0),
            PruningStrategy::Syncable => committed
                .checked_sub(SYNCABLE_KEEP_RECENT)
                .filter(|h| *h > 0 && h % SYNCABLE_KEEP_EVERY != 0),
        }
    }

    /// Whether a snapshot at `height` is retained when the tip is `latest`.
    pub fn retains(&self, height: u64, latest: u64) -> bool {
        match self {
            PruningStrategy::Nothing => true,
            PruningStrategy::Everything => height == latest,
            PruningStrategy::Syncable => {
                latest.saturating_sub(height) < SYNCABLE_KEEP_RECENT
                    || height % SYNCABLE_KEEP_EVERY == 0
            }
        }
    }
}

impl fmt::Display for PruningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PruningStrategy::Syncable => "syncable",
            PruningStrategy::Nothing => "nothing",
            PruningStrategy::Everything => "everything",
        };
        f.write_str(name)
    }
}

impl FromStr for PruningStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "syncable" => Ok(PruningStrategy::Syncable),
            "nothing" => Ok(PruningStrategy::Nothing),
            "everything" => Ok(PruningStrategy::Everything),
            other => Err(AppError::InvalidPruning {
                name: other.to_string(),
            }),
        }
    }
}
