//! Tick configuration and curve arithmetic.
//!
//! The engine clock advances one tick per [`EngineConfig::tick_interval`].
//! Phase dwells are expressed in milliseconds and converted to whole ticks.

use std::time::Duration;

use serde::{Serialize, Deserialize};

use crate::game::events::EngineEvent;
use crate::game::state::RoundPhase;

/// Configuration for the round engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Tick period in milliseconds
    pub tick_interval_ms: u64,
    /// Time spent in Waiting before a round starts
    pub waiting_dwell_ms: u64,
    /// Time the crash is displayed before the next Waiting
    pub crashed_dwell_ms: u64,
    /// Base multiplier growth per tick
    pub growth_increment: f64,
    /// Growth acceleration proportional to the current multiplier
    pub growth_acceleration: f64,
    /// Floor applied to every crash point
    pub min_crash_point: f64,
    /// Width of the random crash point draw above 1.0
    pub crash_span: f64,
    /// Upper bound for administrator overrides (None = unbounded)
    pub override_ceiling: Option<f64>,
    /// Completed rounds kept in history
    pub history_capacity: usize,
    /// Smallest accepted deposit
    pub min_deposit: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50,      // ~20 Hz
            waiting_dwell_ms: 5_000,
            crashed_dwell_ms: 3_000,
            growth_increment: 0.01,
            growth_acceleration: 0.1,
            min_crash_point: 1.01,
            crash_span: 10.0,
            override_ceiling: None,
            history_capacity: 20,
            min_deposit: 10.0,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tick_interval_ms: env_parse("CRASH_TICK_MS").unwrap_or(defaults.tick_interval_ms),
            waiting_dwell_ms: env_parse("CRASH_WAITING_MS").unwrap_or(defaults.waiting_dwell_ms),
            crashed_dwell_ms: env_parse("CRASH_CRASHED_MS").unwrap_or(defaults.crashed_dwell_ms),
            override_ceiling: env_parse("CRASH_OVERRIDE_CEILING").or(defaults.override_ceiling),
            history_capacity: env_parse("CRASH_HISTORY_CAP").unwrap_or(defaults.history_capacity),
            min_deposit: env_parse("CRASH_MIN_DEPOSIT").unwrap_or(defaults.min_deposit),
            ..defaults
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.tick_interval_ms == 0 {
            return Err("tick interval must be > 0");
        }
        if !is_positive(self.growth_increment) {
            return Err("growth increment must be positive");
        }
        if !self.growth_acceleration.is_finite() || self.growth_acceleration < 0.0 {
            return Err("growth acceleration must be non-negative");
        }
        if !self.min_crash_point.is_finite() || self.min_crash_point <= 1.0 {
            return Err("minimum crash point must exceed 1.0");
        }
        if !is_positive(self.crash_span) {
            return Err("crash span must be positive");
        }
        if let Some(ceiling) = self.override_ceiling {
            if ceiling.is_nan() || ceiling < self.min_crash_point {
                return Err("override ceiling below minimum crash point");
            }
        }
        if !self.min_deposit.is_finite() || self.min_deposit < 0.0 {
            return Err("minimum deposit must be non-negative");
        }
        Ok(())
    }

    /// Tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Whole ticks covering `ms`, at least 1.
    pub fn ticks_for(&self, ms: u64) -> u64 {
        let tick = self.tick_interval_ms.max(1);
        ms.div_ceil(tick).max(1)
    }

    /// Ticks spent in Waiting.
    pub fn waiting_ticks(&self) -> u64 {
        self.ticks_for(self.waiting_dwell_ms)
    }

    /// Ticks spent in Crashed.
    pub fn crashed_ticks(&self) -> u64 {
        self.ticks_for(self.crashed_dwell_ms)
    }
}

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// One step of the growth curve: `m + increment * (1 + m * acceleration)`.
#[inline]
pub fn next_multiplier(current: f64, config: &EngineConfig) -> f64 {
    current + config.growth_increment * (1.0 + current * config.growth_acceleration)
}

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated since the previous tick
    pub events: Vec<EngineEvent>,
    /// Phase after the tick
    pub phase: RoundPhase,
    /// Multiplier after the tick
    pub multiplier: f64,
    /// Round started this tick
    pub started: bool,
    /// Round crashed this tick
    pub crashed: bool,
    /// Engine returned to Waiting this tick
    pub reset: bool,
}
