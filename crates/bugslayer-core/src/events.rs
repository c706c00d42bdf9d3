use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::board::Cell;
use crate::content::AdversaryKind;
use crate::session::{EncounterId, HazardId, Resolution};
use crate::timer::PauseReason;

/// Every observable state change produces an Event.
/// Hosts drain them after each tick; rendering and persistence listen here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    EncounterSpawned {
        id: EncounterId,
        kind: AdversaryKind,
        position: Cell,
        level: u32,
        at: DateTime<Utc>,
    },
    /// Escape countdown entered its final stretch.
    EncounterWarned {
        id: EncounterId,
        kind: AdversaryKind,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    EncounterResolved {
        id: EncounterId,
        kind: AdversaryKind,
        resolution: Resolution,
        level: u32,
        at: DateTime<Utc>,
    },
    EncounterEscaped {
        id: EncounterId,
        kind: AdversaryKind,
        level: u32,
        at: DateTime<Utc>,
    },
    LevelCleared {
        level: u32,
        at: DateTime<Utc>,
    },
    /// Boss defeated.
    SessionWon {
        level: u32,
        at: DateTime<Utc>,
    },
    SessionLost {
        level: u32,
        at: DateTime<Utc>,
    },
    TimersPaused {
        reason: PauseReason,
        at: DateTime<Utc>,
    },
    TimersResumed {
        at: DateTime<Utc>,
    },
    /// The resolution gate was force-released.
    GateWatchdogTripped {
        held_ms: u64,
        at: DateTime<Utc>,
    },
    QuizOpened {
        encounter: EncounterId,
        question_key: String,
        at: DateTime<Utc>,
    },
    QuizSettled {
        encounter: EncounterId,
        correct: bool,
        at: DateTime<Utc>,
    },
    HazardTriggered {
        hazard: HazardId,
        position: Cell,
        at: DateTime<Utc>,
    },
    RecallReady {
        at: DateTime<Utc>,
    },
    CatAdopted {
        name: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::EncounterSpawned { .. } => "encounter-spawned",
            Event::EncounterWarned { .. } => "encounter-warned",
            Event::EncounterResolved { .. } => "encounter-resolved",
            Event::EncounterEscaped { .. } => "encounter-escaped",
            Event::LevelCleared { .. } => "level-cleared",
            Event::SessionWon { .. } => "session-won",
            Event::SessionLost { .. } => "session-lost",
            Event::TimersPaused { .. } => "timers-paused",
            Event::TimersResumed { .. } => "timers-resumed",
            Event::GateWatchdogTripped { .. } => "gate-watchdog-tripped",
            Event::QuizOpened { .. } => "quiz-opened",
            Event::QuizSettled { .. } => "quiz-settled",
            Event::HazardTriggered { .. } => "hazard-triggered",
            Event::RecallReady { .. } => "recall-ready",
            Event::CatAdopted { .. } => "cat-adopted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_tagged_by_type() {
        let event = Event::LevelCleared {
            level: 2,
            at: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "LevelCleared");
        assert_eq!(value["level"], 2);
        assert_eq!(event.name(), "level-cleared");
    }
}
