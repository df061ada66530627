//! Round history.
//!
//! Append-only, most-recent-first, capped window of completed rounds.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

use crate::game::state::{format_multiplier, RoundId};

/// Display band for a crash point badge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiplierTier {
    /// Below 2x
    Low,
    /// 2x up to 5x
    Medium,
    /// 5x and above
    High,
}

impl MultiplierTier {
    /// Band for `multiplier`.
    pub fn of(multiplier: f64) -> Self {
        if multiplier >= 5.0 {
            MultiplierTier::High
        } else if multiplier >= 2.0 {
            MultiplierTier::Medium
        } else {
            MultiplierTier::Low
        }
    }
}

/// One completed round.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RoundRecord {
    /// Display identifier of the round
    pub round_id: RoundId,
    /// Engine round counter
    pub round_number: u64,
    /// Where the round crashed
    pub crash_point: f64,
    /// Whether an administrator chose the crash point
    pub overridden: bool,
    /// Wall-clock time of the crash
    pub timestamp: DateTime<Utc>,
}

impl RoundRecord {
    /// Record stamped now.
    pub fn new(round_id: RoundId, round_number: u64, crash_point: f64, overridden: bool) -> Self {
        Self {
            round_id,
            round_number,
            crash_point,
            overridden,
            timestamp: Utc::now(),
        }
    }

    /// Badge band.
    pub fn tier(&self) -> MultiplierTier {
        MultiplierTier::of(self.crash_point)
    }

    /// Badge text, e.g. `2.75x`.
    pub fn badge(&self) -> String {
        format_multiplier(self.crash_point)
    }
}

/// Capped history, newest first.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundHistory {
    records: VecDeque<RoundRecord>,
    capacity: usize,
}

impl RoundHistory {
    /// Default window.
    pub const DEFAULT_CAPACITY: usize = 20;

    /// Empty history keeping at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Prepend a record, evicting the oldest past capacity.
    pub fn record(&mut self, record: RoundRecord) {
        self.records.push_front(record);
        self.records.truncate(self.capacity);
    }

    /// Newest first.
    pub fn iter(&self) -> impl Iterator<Item = &RoundRecord> {
        self.records.iter()
    }

    /// Most recent round.
    pub fn latest(&self) -> Option<&RoundRecord> {
        self.records.front()
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no round has completed yet.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Maximum records held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for RoundHistory {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
