//! Resolution gate.
//!
//! A single-holder lock around "resolve the current encounter". Entering is
//! fail-fast: a second caller is turned away with no side effects. Each hold
//! is identified by a token, so a stale release (after a watchdog trip and a
//! new holder) cannot free someone else's hold.
//!
//! `session.resolving` mirrors the holder at all times.

use std::ops::{Deref, DerefMut};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateTimings {
    /// Force-release after this long.
    pub watchdog_ms: u64,
}

impl Default for GateTimings {
    fn default() -> Self {
        Self { watchdog_ms: 3_000 }
    }
}

/// Proof of holding the gate. Not clonable.
#[derive(Debug, PartialEq, Eq)]
pub struct GatePass {
    token: u64,
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    token: u64,
    since_ms: u64,
    limit_ms: u64,
}

#[derive(Debug, Clone)]
pub struct ResolutionGate {
    timings: GateTimings,
    holder: Option<Holder>,
    next_token: u64,
}

impl ResolutionGate {
    pub fn new(timings: GateTimings) -> Self {
        Self {
            timings,
            holder: None,
            next_token: 0,
        }
    }

    pub fn is_held(&self) -> bool {
        self.holder.is_some()
    }

    /// Fails fast when already held.
    pub fn try_enter(&mut self, state: &mut SessionState, now_ms: u64) -> Option<GatePass> {
        if self.holder.is_some() {
            debug!("resolution gate busy; request rejected");
            return None;
        }
        self.next_token += 1;
        self.holder = Some(Holder {
            token: self.next_token,
            since_ms: now_ms,
            limit_ms: self.timings.watchdog_ms,
        });
        state.resolving = true;
        Some(GatePass {
            token: self.next_token,
        })
    }

    /// Release a hold. Returns `false` for a pass that no longer owns the gate.
    pub fn release(&mut self, state: &mut SessionState, pass: GatePass) -> bool {
        match self.holder {
            Some(holder) if holder.token == pass.token => {
                self.holder = None;
                state.resolving = false;
                true
            }
            _ => {
                debug!(token = pass.token, "stale gate release ignored");
                false
            }
        }
    }

    /// Widen the watchdog window of a hold that has its own completion
    /// deadline, such as narration with a ceiling of `extra_ms`.
    pub fn extend(&mut self, pass: &GatePass, extra_ms: u64) -> bool {
        match self.holder.as_mut() {
            Some(holder) if holder.token == pass.token => {
                holder.limit_ms = self.timings.watchdog_ms.saturating_add(extra_ms);
                true
            }
            _ => false,
        }
    }

    /// Force-release a hold that outlived the watchdog. Returns how long it
    /// was held when tripped.
    pub fn poll_watchdog(&mut self, state: &mut SessionState, now_ms: u64) -> Option<u64> {
        let holder = self.holder?;
        let held_ms = now_ms.saturating_sub(holder.since_ms);
        if held_ms < holder.limit_ms {
            return None;
        }
        warn!(
            held_ms,
            limit_ms = holder.limit_ms,
            "resolution gate watchdog tripped; force-releasing"
        );
        self.holder = None;
        state.resolving = false;
        Some(held_ms)
    }

    /// Enter for the length of a scope. The gate is released when the scope
    /// drops, on every exit path, unless [`GateScope::keep`] hands the hold on.
    pub fn scoped<'a>(
        &'a mut self,
        state: &'a mut SessionState,
        now_ms: u64,
    ) -> Option<GateScope<'a>> {
        let pass = self.try_enter(state, now_ms)?;
        Some(GateScope {
            gate: self,
            state,
            pass: Some(pass),
        })
    }

    /// Run `f` under the gate. `None` when the gate is busy.
    pub fn run_gated<T>(
        &mut self,
        state: &mut SessionState,
        now_ms: u64,
        f: impl FnOnce(&mut SessionState) -> T,
    ) -> Option<T> {
        let mut scope = self.scoped(state, now_ms)?;
        Some(f(&mut scope))
    }
}

/// Scoped hold on the gate. Derefs to the session state it guards.
pub struct GateScope<'a> {
    gate: &'a mut ResolutionGate,
    state: &'a mut SessionState,
    pass: Option<GatePass>,
}

impl GateScope<'_> {
    /// Keep holding past this scope. The caller must release the pass.
    pub fn keep(mut self) -> GatePass {
        match self.pass.take() {
            Some(pass) => pass,
            // Only `keep` and `drop` take the pass, and both consume the scope.
            None => GatePass { token: 0 },
        }
    }
}

impl Deref for GateScope<'_> {
    type Target = SessionState;

    fn deref(&self) -> &SessionState {
        self.state
    }
}

impl DerefMut for GateScope<'_> {
    fn deref_mut(&mut self) -> &mut SessionState {
        self.state
    }
}

impl Drop for GateScope<'_> {
    fn drop(&mut self) {
        if let Some(pass) = self.pass.take() {
            self.gate.release(self.state, pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Cell;
    use crate::session::Player;

    fn state() -> SessionState {
        SessionState::new(1, Player::default(), Cell::new(0, 0))
    }

    #[test]
    fn second_caller_is_rejected_without_side_effects() {
        let mut gate = ResolutionGate::new(GateTimings::default());
        let mut s = state();
        let pass = gate.try_enter(&mut s, 0).unwrap();
        assert!(s.resolving);
        let coins = s.player.coins;
        assert!(gate
            .run_gated(&mut s, 1, |s| s.player.coins -= 1)
            .is_none());
        assert_eq!(s.player.coins, coins);
        assert!(gate.release(&mut s, pass));
        assert!(!s.resolving);
    }

    #[test]
    fn watchdog_force_releases_and_invalidates_old_pass() {
        let mut gate = ResolutionGate::new(GateTimings::default());
        let mut s = state();
        let stale = gate.try_enter(&mut s, 0).unwrap();
        assert_eq!(gate.poll_watchdog(&mut s, 2_999), None);
        assert_eq!(gate.poll_watchdog(&mut s, 3_000), Some(3_000));
        assert!(!s.resolving);

        let fresh = gate.try_enter(&mut s, 3_100).unwrap();
        assert!(!gate.release(&mut s, stale));
        assert!(gate.is_held());
        assert!(gate.release(&mut s, fresh));
    }

    #[test]
    fn extended_hold_outlasts_the_base_watchdog() {
        let mut gate = ResolutionGate::new(GateTimings::default());
        let mut s = state();
        let pass = gate.try_enter(&mut s, 100).unwrap();
        assert!(gate.extend(&pass, 12_000));
        assert_eq!(gate.poll_watchdog(&mut s, 3_100), None);
        assert_eq!(gate.poll_watchdog(&mut s, 15_099), None);
        assert_eq!(gate.poll_watchdog(&mut s, 15_100), Some(15_000));
        assert!(!gate.extend(&pass, 12_000));

        let next = gate.try_enter(&mut s, 16_000).unwrap();
        assert_eq!(gate.poll_watchdog(&mut s, 19_000), Some(3_000));
        assert!(!gate.release(&mut s, next));
    }

    #[test]
    fn scope_releases_on_early_return() {
        fn resolve(gate: &mut ResolutionGate, s: &mut SessionState) -> Option<()> {
            let scope = gate.scoped(s, 0)?;
            if scope.encounter.is_none() {
                return None;
            }
            Some(())
        }
        let mut gate = ResolutionGate::new(GateTimings::default());
        let mut s = state();
        assert!(resolve(&mut gate, &mut s).is_none());
        assert!(!gate.is_held());
        assert!(!s.resolving);
    }

    #[test]
    fn kept_scope_stays_held() {
        let mut gate = ResolutionGate::new(GateTimings::default());
        let mut s = state();
        let pass = {
            let mut scope = gate.scoped(&mut s, 0).unwrap();
            scope.player.coins += 5;
            scope.keep()
        };
        assert!(gate.is_held());
        assert!(s.resolving);
        assert!(gate.release(&mut s, pass));
    }
}
