//! Pausable one-shot countdown.
//!
//! ## States
//!
//! ```text
//! Armed { due_at } --pause--> Suspended { remaining } --resume--> Armed { due_at = now + remaining }
//! ```
//!
//! Remaining time is always recomputed from the caller's clock at pause time,
//! never from counted ticks, so a late tick cannot shorten or stretch a timer.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state")]
enum Slot {
    Armed { due_at_ms: u64 },
    Suspended { remaining_ms: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PausableTimer {
    slot: Slot,
}

impl PausableTimer {
    /// Arm a timer that falls due `delay_ms` after `now_ms`.
    pub fn arm(now_ms: u64, delay_ms: u64) -> Self {
        Self {
            slot: Slot::Armed {
                due_at_ms: now_ms.saturating_add(delay_ms),
            },
        }
    }

    /// Capture the remaining duration. Calling it on a suspended timer is a no-op.
    pub fn pause(&mut self, now_ms: u64) {
        if let Slot::Armed { due_at_ms } = self.slot {
            self.slot = Slot::Suspended {
                remaining_ms: due_at_ms.saturating_sub(now_ms),
            };
        }
    }

    /// Reschedule from the captured remainder. A remainder of zero is due at
    /// `now_ms`, so it fires on the next poll instead of being dropped.
    pub fn resume(&mut self, now_ms: u64) {
        if let Slot::Suspended { remaining_ms } = self.slot {
            self.slot = Slot::Armed {
                due_at_ms: now_ms.saturating_add(remaining_ms),
            };
        }
    }

    pub fn is_paused(&self) -> bool {
        matches!(self.slot, Slot::Suspended { .. })
    }

    /// Due only while armed.
    pub fn is_due(&self, now_ms: u64) -> bool {
        match self.slot {
            Slot::Armed { due_at_ms } => now_ms >= due_at_ms,
            Slot::Suspended { .. } => false,
        }
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.slot {
            Slot::Armed { due_at_ms } => due_at_ms.saturating_sub(now_ms),
            Slot::Suspended { remaining_ms } => remaining_ms,
        }
    }

    pub fn due_at_ms(&self) -> Option<u64> {
        match self.slot {
            Slot::Armed { due_at_ms } => Some(due_at_ms),
            Slot::Suspended { .. } => None,
        }
    }
}
