//! Spawn-after-resolution orchestration.
//!
//! A resolved encounter is not replaced at once. The conductor holds the
//! replacement until the speech channel has been quiet for a while (or a
//! maximum wait passes), so a new adversary's announcement never talks over
//! the narration of the one just defeated.
//!
//! ```text
//! Idle --begin--> Holding { since, quiet_start } --(quiet long enough | max wait)--> Idle + release
//! ```

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::arbiter::SpeechArbiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConductorTimings {
    /// Continuous silence needed before the replacement spawns.
    pub quiet_ms: u64,
    /// Upper bound on the hold, silence or not.
    pub max_wait_ms: u64,
}

impl Default for ConductorTimings {
    fn default() -> Self {
        Self {
            quiet_ms: 300,
            max_wait_ms: 2_200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Hold {
    Idle,
    Holding {
        since_ms: u64,
        quiet_start_ms: Option<u64>,
    },
}

#[derive(Debug, Clone)]
pub struct SpawnConductor {
    timings: ConductorTimings,
    hold: Hold,
}

impl SpawnConductor {
    pub fn new(timings: ConductorTimings) -> Self {
        Self {
            timings,
            hold: Hold::Idle,
        }
    }

    pub fn is_holding(&self) -> bool {
        matches!(self.hold, Hold::Holding { .. })
    }

    /// Start holding the replacement spawn. Returns `false` when a hold is
    /// already active; the two resolutions then share one replacement.
    pub fn begin(&mut self, now_ms: u64) -> bool {
        if self.is_holding() {
            debug!("resolution coalesced into the active spawn hold");
            return false;
        }
        self.hold = Hold::Holding {
            since_ms: now_ms,
            quiet_start_ms: None,
        };
        true
    }

    /// Returns `true` once, when the hold ends and the replacement may spawn.
    pub fn poll(&mut self, now_ms: u64, arbiter: &SpeechArbiter) -> bool {
        let Hold::Holding {
            since_ms,
            quiet_start_ms,
        } = &mut self.hold
        else {
            return false;
        };

        let quiet = !arbiter.is_busy() && !arbiter.has_pending_status();
        let quiet_long_enough = if quiet {
            let start = *quiet_start_ms.get_or_insert(now_ms);
            now_ms.saturating_sub(start) >= self.timings.quiet_ms
        } else {
            *quiet_start_ms = None;
            false
        };
        let timed_out = now_ms.saturating_sub(*since_ms) >= self.timings.max_wait_ms;

        if quiet_long_enough || timed_out {
            debug!(
                held_ms = now_ms.saturating_sub(*since_ms),
                timed_out, "spawn hold released"
            );
            self.hold = Hold::Idle;
            return true;
        }
        false
    }

    /// Drop the hold without releasing a spawn.
    pub fn cancel(&mut self) {
        self.hold = Hold::Idle;
    }
}
