//! scenarios.rs — Injectable fault scenarios for the observer fleet
//!
//! Each scenario reproduces a real-world failure mode the pipeline has
//! to survive: silent observers, network jitter spreading a batch,
//! a poisoned hint, degenerate fleet geometry, two spawns back to back.
//! Selectable at startup via `--scenario <preset>`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioType {
    /// Listed observers never report (hardware/session loss).
    ObserverDropout,
    /// Heavy per-observer delivery jitter; stresses the batch window.
    NetworkJitter,
    /// One observer reports a hint for a different, fabricated event.
    /// The all-agree region empties; pairwise mode still localizes.
    PoisonedObserver,
    /// Fleet placed on one line through the event; det(A) collapses.
    ColinearFleet,
    /// Two spawns a few seconds apart; exercises duplicate-contributor
    /// batch rotation in the gate.
    DoubleEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub active: Vec<ScenarioType>,
    pub dropout_ids: Vec<usize>,
    /// Gaussian sigma of per-observer delivery delay (milliseconds).
    pub jitter_sigma_ms: f64,
    pub poisoned_id: usize,
    /// Seconds between the two spawns of a DoubleEvent.
    pub double_event_gap_s: f64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            active: vec![],
            dropout_ids: vec![],
            jitter_sigma_ms: 40.0,
            poisoned_id: 0,
            double_event_gap_s: 6.0,
        }
    }
}

impl ScenarioConfig {
    pub fn has(&self, s: ScenarioType) -> bool {
        self.active.contains(&s)
    }

    pub fn is_dropped(&self, observer_idx: usize) -> bool {
        self.has(ScenarioType::ObserverDropout) && self.dropout_ids.contains(&observer_idx)
    }

    pub fn is_poisoned(&self, observer_idx: usize) -> bool {
        self.has(ScenarioType::PoisonedObserver) && observer_idx == self.poisoned_id
    }

    pub fn jitter_sigma_ms(&self) -> f64 {
        if self.has(ScenarioType::NetworkJitter) {
            self.jitter_sigma_ms * 10.0
        } else {
            self.jitter_sigma_ms
        }
    }
}

pub fn preset(name: &str) -> Option<ScenarioConfig> {
    match name {
        "default" => Some(ScenarioConfig::default()),
        "dropout" => Some(ScenarioConfig {
            active: vec![ScenarioType::ObserverDropout],
            dropout_ids: vec![1, 3],
            ..Default::default()
        }),
        "jitter" => Some(ScenarioConfig {
            active: vec![ScenarioType::NetworkJitter],
            ..Default::default()
        }),
        "poisoned" => Some(ScenarioConfig {
            active: vec![ScenarioType::PoisonedObserver],
            poisoned_id: 0,
            ..Default::default()
        }),
        "colinear" => Some(ScenarioConfig {
            active: vec![ScenarioType::ColinearFleet],
            ..Default::default()
        }),
        "double_event" => Some(ScenarioConfig {
            active: vec![ScenarioType::DoubleEvent],
            ..Default::default()
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_resolve() {
        for name in ["default", "dropout", "jitter", "poisoned", "colinear", "double_event"] {
            assert!(preset(name).is_some(), "missing preset {name}");
        }
        assert!(preset("bogus").is_none());
    }

    #[test]
    fn dropout_only_hits_listed_observers() {
        let sc = preset("dropout").unwrap();
        assert!(sc.is_dropped(1));
        assert!(!sc.is_dropped(0));
        let clean = ScenarioConfig::default();
        assert!(!clean.is_dropped(1));
    }
}
