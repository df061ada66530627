//! Crash point selection.
//!
//! The engine asks a [`CrashPointSource`] for a raw value at every round start
//! that has no override, then clamps it to the configured floor.

use std::collections::VecDeque;

use crate::core::rng::DeterministicRng;

/// Source of raw crash points.
///
/// Swappable so tests can script exact rounds. The production distribution
/// has no house-edge shaping.
pub trait CrashPointSource: Send {
    /// Next raw crash point. May be below the floor; the engine clamps.
    fn next_crash_point(&mut self) -> f64;
}

/// `1 + U(0,1) * span`, seeded and replayable.
#[derive(Clone, Debug)]
pub struct UniformCrashSource {
    rng: DeterministicRng,
    span: f64,
}

impl UniformCrashSource {
    /// Default span, giving support [1.0, 11.0).
    pub const DEFAULT_SPAN: f64 = 10.0;

    /// Create with the default span.
    pub fn new(seed: u64) -> Self {
        Self::with_span(seed, Self::DEFAULT_SPAN)
    }

    /// Create with a custom span.
    pub fn with_span(seed: u64, span: f64) -> Self {
        Self::from_rng(DeterministicRng::new(seed), span)
    }

    /// Wrap an existing RNG.
    pub fn from_rng(rng: DeterministicRng, span: f64) -> Self {
        Self { rng, span }
    }
}

impl CrashPointSource for UniformCrashSource {
    fn next_crash_point(&mut self) -> f64 {
        self.rng.next_f64_range(1.0, 1.0 + self.span)
    }
}

/// Replays a fixed script of crash points, then repeats a fallback.
#[derive(Clone, Debug, Default)]
pub struct ScriptedCrashSource {
    script: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedCrashSource {
    /// Script the given points; `fallback` once exhausted.
    pub fn new(points: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            script: points.into_iter().collect(),
            fallback,
        }
    }

    /// Always crash at `point`.
    pub fn constant(point: f64) -> Self {
        Self::new(std::iter::empty(), point)
    }

    /// Points not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl CrashPointSource for ScriptedCrashSource {
    fn next_crash_point(&mut self) -> f64 {
        self.script.pop_front().unwrap_or(self.fallback)
    }
}

/// Clamp a raw crash point to `floor`. Non-finite input maps to `floor`.
pub fn clamp_crash_point(raw: f64, floor: f64) -> f64 {
    if raw.is_finite() {
        raw.max(floor)
    } else {
        floor
    }
}
