//! Round State Definitions
//!
//! The per-round state the engine mutates on every tick, plus the identifiers
//! shared with the stores and the presentation layer.

use std::fmt;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::rng::DeterministicRng;

// =============================================================================
// PLAYER ID
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for deterministic BTreeMap ordering. Serializes as the
/// hyphenated UUID string the auth provider issues.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Default)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create a fresh random id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Create from a parsed UUID.
    pub fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(*uuid.as_bytes())
    }

    /// As a UUID.
    pub fn to_uuid(&self) -> uuid::Uuid {
        uuid::Uuid::from_bytes(self.0)
    }

    /// Create from UUID string.
    pub fn from_uuid_str(s: &str) -> Option<Self> {
        uuid::Uuid::parse_str(s)
            .ok()
            .map(Self::from_uuid)
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        self.to_uuid().to_string()
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

impl Serialize for PlayerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_uuid().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PlayerId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        uuid::Uuid::deserialize(deserializer).map(Self::from_uuid)
    }
}

// =============================================================================
// ROUND ID
// =============================================================================

/// Smallest display round number.
const ROUND_ID_MIN: u32 = 100_000;
/// Largest display round number.
const ROUND_ID_MAX: u32 = 999_999;

/// Opaque display identifier for a round, shown as `#123456`.
///
/// Regenerated every time the engine returns to Waiting. Not unique across
/// a long session; use [`RoundState::round_number`] for ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoundId(pub u32);

impl RoundId {
    /// Draw a new six-digit id.
    pub fn generate(rng: &mut DeterministicRng) -> Self {
        Self(rng.next_int_range(ROUND_ID_MIN, ROUND_ID_MAX))
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// ROUND PHASE
// =============================================================================

/// Lifecycle phase of the current round.
///
/// Cycles `Waiting -> Running -> Crashed -> Waiting` with no terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum RoundPhase {
    /// Bets are open, multiplier idle
    #[default]
    Waiting,
    /// Multiplier climbing, cash-outs open
    Running,
    /// Multiplier frozen at the crash point
    Crashed,
}

impl RoundPhase {
    /// Lowercase name for logs and error messages.
    pub fn as_str(self) -> &'static str {
        match self {
            RoundPhase::Waiting => "waiting",
            RoundPhase::Running => "running",
            RoundPhase::Crashed => "crashed",
        }
    }
}

impl fmt::Display for RoundPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ROUND STATE
// =============================================================================

/// State of the current round.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoundState {
    /// Current phase
    pub phase: RoundPhase,

    /// Display identifier
    pub round_id: RoundId,

    /// Monotonic round counter (1 for the first round of the engine)
    pub round_number: u64,

    /// Current multiplier, full precision. Always >= 1.0.
    pub multiplier: f64,

    /// Crash point of the running round. Hidden until Crashed.
    pub crash_point: f64,

    /// Whether the crash point came from an administrator override
    pub overridden: bool,

    /// Multiplier ticks elapsed in the running round
    pub ticks_running: u32,
}

impl RoundState {
    /// Fresh Waiting state.
    pub fn new(round_id: RoundId, round_number: u64) -> Self {
        Self {
            phase: RoundPhase::Waiting,
            round_id,
            round_number,
            multiplier: 1.0,
            crash_point: 1.0,
            overridden: false,
            ticks_running: 0,
        }
    }

    /// Whether bets are currently accepted.
    pub fn is_betting_open(&self) -> bool {
        self.phase == RoundPhase::Waiting
    }

    /// Whether cash-outs are currently accepted.
    pub fn is_running(&self) -> bool {
        self.phase == RoundPhase::Running
    }

    /// Crash point, only once it has been reached.
    pub fn revealed_crash_point(&self) -> Option<f64> {
        match self.phase {
            RoundPhase::Crashed => Some(self.crash_point),
            _ => None,
        }
    }

    /// Multiplier formatted with two fraction digits, e.g. `1.57x`.
    pub fn display_multiplier(&self) -> String {
        format_multiplier(self.multiplier)
    }
}

/// Format a multiplier for display (`2.00x`).
pub fn format_multiplier(value: f64) -> String {
    format!("{:.2}x", value)
}

// =============================================================================
// TESTS
// =============================================================================
