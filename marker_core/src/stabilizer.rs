//! Per-marker vertical smoothing.
//!
//! Each marker is either `Tracking` its ideal height or `Locked` at a settled
//! one. One refresh maps `(phase, target - displayed)` to a single
//! [`Transition`]:
//!
//! | phase    | deviation                  | transition |
//! |----------|----------------------------|------------|
//! | Locked   | `<= unlock_drift_m`        | Hold       |
//! | Locked   | `>  unlock_drift_m`        | Unlock, then re-evaluated as Tracking |
//! | Tracking | `<= hysteresis_m`          | Settle (count towards lock) |
//! | Tracking | `>  hysteresis_m`          | Smooth     |
//!
//! Smoothing is an exponential moving average with a fast factor upwards and
//! a slow one downwards, and descent is clamped per refresh so markers never
//! visibly sink through the ground.

use serde::Serialize;

use crate::config::SmoothingConfig;
use crate::registry::EntityRegistry;
use crate::target_z::TargetZResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementPhase {
    #[default]
    Tracking,
    Locked,
}

/// Smoothing state carried by every tracked marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VerticalState {
    /// Height last handed to the render surface.
    pub displayed_z: f64,
    /// Ideal height at the last committed change.
    pub raw_target_z: f64,
    pub phase: PlacementPhase,
    /// Consecutive refreshes spent inside the hysteresis band.
    pub stable_ticks: u32,
}

impl VerticalState {
    /// Fresh state shown directly at `target`, with no smoothing.
    pub fn placed_at(target: f64) -> Self {
        Self {
            displayed_z: target,
            raw_target_z: target,
            phase: PlacementPhase::Tracking,
            stable_ticks: 0,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.phase == PlacementPhase::Locked
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Changed,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transition {
    Hold,
    Unlock,
    Settle,
    Smooth,
}

/// Totals from one pass over the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub examined: usize,
    pub changed: usize,
    pub locked: usize,
    pub fallback_samples: usize,
}

impl RefreshSummary {
    pub fn changed_any(&self) -> bool {
        self.changed > 0
    }
}

pub struct StabilizationEngine<'a> {
    smoothing: &'a SmoothingConfig,
}

impl<'a> StabilizationEngine<'a> {
    pub fn new(smoothing: &'a SmoothingConfig) -> Self {
        Self { smoothing }
    }

    fn transition(&self, phase: PlacementPhase, deviation: f64) -> Transition {
        match phase {
            PlacementPhase::Locked if deviation > self.smoothing.unlock_drift_m => {
                Transition::Unlock
            }
            PlacementPhase::Locked => Transition::Hold,
            PlacementPhase::Tracking if deviation <= self.smoothing.hysteresis_m => {
                Transition::Settle
            }
            PlacementPhase::Tracking => Transition::Smooth,
        }
    }

    /// Advance one marker towards `target`.
    pub fn step(&self, state: &mut VerticalState, target: f64) -> RefreshOutcome {
        let diff = target - state.displayed_z;
        match self.transition(state.phase, diff.abs()) {
            Transition::Hold => RefreshOutcome::Unchanged,
            Transition::Unlock => {
                state.phase = PlacementPhase::Tracking;
                state.stable_ticks = 0;
                self.step(state, target)
            }
            Transition::Settle => {
                state.stable_ticks = state.stable_ticks.saturating_add(1);
                if state.stable_ticks >= self.smoothing.stable_lock_ticks {
                    state.phase = PlacementPhase::Locked;
                }
                RefreshOutcome::Unchanged
            }
            Transition::Smooth => {
                state.stable_ticks = 0;
                let current = state.displayed_z;
                let next = self.smoothed(current, target, diff);
                if (next - current).abs() > self.smoothing.commit_epsilon_m {
                    state.displayed_z = next;
                    state.raw_target_z = target;
                    RefreshOutcome::Changed
                } else {
                    RefreshOutcome::Unchanged
                }
            }
        }
    }

    fn smoothed(&self, current: f64, target: f64, diff: f64) -> f64 {
        let alpha = if diff > 0.0 {
            self.smoothing.ema_up
        } else {
            self.smoothing.ema_down
        };
        let next = (1.0 - alpha) * current + alpha * target;
        let floor = current - self.smoothing.max_drop_per_refresh_m;
        if next < floor {
            floor
        } else {
            next
        }
    }

    /// Step every tracked marker against freshly resolved targets.
    pub fn refresh_all(
        &self,
        registry: &mut EntityRegistry,
        resolver: &TargetZResolver<'_>,
    ) -> RefreshSummary {
        let mut summary = RefreshSummary::default();
        for marker in registry.iter_mut() {
            let target = resolver.resolve(marker.lng, marker.lat);
            if target.used_fallback() {
                summary.fallback_samples += 1;
            }
            if self.step(&mut marker.vertical, target.value) == RefreshOutcome::Changed {
                summary.changed += 1;
            }
            if marker.vertical.is_locked() {
                summary.locked += 1;
            }
            summary.examined += 1;
        }
        summary
    }
}
