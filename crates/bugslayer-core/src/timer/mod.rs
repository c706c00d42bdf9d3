//! Gameplay timers.
//!
//! Everything here is tick-driven: no component owns a thread or a runtime
//! timer. The engine passes the current monotonic time into `poll`.

pub mod deadline;
pub mod gate;
pub mod hazards;
pub mod scheduler;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

pub use deadline::PausableTimer;
pub use gate::{GatePass, GateScope, GateTimings, ResolutionGate};
pub use hazards::{HazardFire, HazardTicker, HazardTimings};
pub use scheduler::{
    EncounterHook, EncounterScheduler, EscapeOutcome, SchedulerFire, SpawnRules,
};

/// Why countdowns are suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseReason {
    /// The host shows a dialog of its own.
    Modal,
    /// An engine dialog (quiz, adoption) owns the player's attention. Only
    /// settling that dialog lifts it.
    Dialog,
    /// A resolution is being narrated before the replacement spawns.
    Narration,
}

/// Set of active pause reasons. Timers run only while it is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PauseSet {
    reasons: BTreeSet<PauseReason>,
}

impl PauseSet {
    /// Returns `true` when this call takes the set from empty to non-empty.
    pub fn add(&mut self, reason: PauseReason) -> bool {
        let was_empty = self.reasons.is_empty();
        self.reasons.insert(reason);
        was_empty
    }

    /// Returns `true` when this call empties the set.
    pub fn remove(&mut self, reason: PauseReason) -> bool {
        self.reasons.remove(&reason) && self.reasons.is_empty()
    }

    pub fn contains(&self, reason: PauseReason) -> bool {
        self.reasons.contains(&reason)
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timers_resume_only_when_every_reason_is_gone() {
        let mut set = PauseSet::default();
        assert!(set.add(PauseReason::Narration));
        assert!(!set.add(PauseReason::Modal));
        assert!(!set.remove(PauseReason::Narration));
        assert!(!set.remove(PauseReason::Narration));
        assert!(set.remove(PauseReason::Modal));
        assert!(set.is_empty());
    }

    #[test]
    fn host_and_dialog_reasons_are_independent() {
        let mut set = PauseSet::default();
        assert!(set.add(PauseReason::Dialog));
        assert!(!set.add(PauseReason::Modal));
        assert!(!set.remove(PauseReason::Modal));
        assert!(set.contains(PauseReason::Dialog));
        assert!(set.remove(PauseReason::Dialog));
    }
}
