//! Speech arbitration.
//!
//! All narration goes through one `SpeechArbiter`. It keeps a busy depth
//! (overlapping utterances in flight), settles each utterance on backend
//! completion or on a hard ceiling, and runs a merge-announcer for passive
//! status text that must not flood the channel.
//!
//! ```text
//! speak_async ──> depth += 1 ──(backend done | ceiling | interrupted)──> depth -= 1
//! request_status ──> pending (latest wins) ──(cool-down, spawn grace, idle)──> announce_status
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, warn};

use super::narrator::Narrator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechTimings {
    /// Longest an utterance may hold the channel before it is treated as done.
    pub ceiling_ms: u64,
    /// Minimum gap between two status flushes.
    pub cooldown_ms: u64,
    /// Status flushes wait this long after a spawn.
    pub spawn_grace_ms: u64,
    pub check_interval_ms: u64,
    /// New narration cuts off the current one.
    pub interrupt: bool,
}

impl Default for SpeechTimings {
    fn default() -> Self {
        Self {
            ceiling_ms: 12_000,
            cooldown_ms: 1_200,
            spawn_grace_ms: 400,
            check_interval_ms: 200,
            interrupt: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NarrationEnd {
    Completed,
    /// Cut off by a later utterance.
    Cancelled,
    /// The backend never reported completion.
    TimedOut,
}

/// Completion handle for one utterance. Resolves exactly once.
#[derive(Debug)]
pub struct NarrationTicket {
    rx: Option<oneshot::Receiver<NarrationEnd>>,
    outcome: Option<NarrationEnd>,
}

impl NarrationTicket {
    /// A ticket that is already settled.
    pub fn settled(outcome: NarrationEnd) -> Self {
        Self {
            rx: None,
            outcome: Some(outcome),
        }
    }

    /// Non-blocking check. Once settled, keeps returning the same outcome.
    pub fn try_outcome(&mut self) -> Option<NarrationEnd> {
        if self.outcome.is_some() {
            return self.outcome;
        }
        let rx = self.rx.as_mut()?;
        let outcome = match rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            // Arbiter gone: nothing is speaking any more.
            Err(TryRecvError::Closed) => NarrationEnd::Cancelled,
        };
        self.rx = None;
        self.outcome = Some(outcome);
        self.outcome
    }

    pub async fn wait(mut self) -> NarrationEnd {
        if let Some(outcome) = self.outcome {
            return outcome;
        }
        match self.rx.take() {
            Some(rx) => rx.await.unwrap_or(NarrationEnd::Cancelled),
            None => NarrationEnd::Cancelled,
        }
    }
}

struct InFlight {
    id: u64,
    backend: oneshot::Receiver<()>,
    notify: Option<oneshot::Sender<NarrationEnd>>,
    ceiling_at_ms: u64,
}

pub struct SpeechArbiter {
    narrator: Box<dyn Narrator>,
    timings: SpeechTimings,
    depth: u32,
    in_flight: Vec<InFlight>,
    next_id: u64,
    idle_since_ms: u64,
    pending_status: Option<String>,
    next_check_at_ms: Option<u64>,
    last_flush_at_ms: Option<u64>,
    last_spawn_at_ms: Option<u64>,
}

impl SpeechArbiter {
    pub fn new(narrator: Box<dyn Narrator>, timings: SpeechTimings) -> Self {
        Self {
            narrator,
            timings,
            depth: 0,
            in_flight: Vec::new(),
            next_id: 0,
            idle_since_ms: 0,
            pending_status: None,
            next_check_at_ms: None,
            last_flush_at_ms: None,
            last_spawn_at_ms: None,
        }
    }

    pub fn timings(&self) -> &SpeechTimings {
        &self.timings
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_busy(&self) -> bool {
        self.depth > 0
    }

    /// How long the channel has been idle, `None` while busy.
    pub fn idle_for(&self, now_ms: u64) -> Option<u64> {
        (!self.is_busy()).then(|| now_ms.saturating_sub(self.idle_since_ms))
    }

    pub fn has_pending_status(&self) -> bool {
        self.pending_status.is_some()
    }

    // ── Narration ────────────────────────────────────────────────────

    /// Speak with the configured interrupt policy.
    pub fn speak_async(&mut self, text: &str, now_ms: u64) -> NarrationTicket {
        let interrupt = self.timings.interrupt;
        self.speak_with(text, now_ms, interrupt)
    }

    /// Speak and let the utterance queue behind whatever is in flight.
    pub fn speak_queued(&mut self, text: &str, now_ms: u64) -> NarrationTicket {
        self.speak_with(text, now_ms, false)
    }

    /// Fire-and-forget. The utterance still counts towards the busy depth.
    pub fn speak(&mut self, text: &str, now_ms: u64) {
        let _ = self.speak_async(text, now_ms);
    }

    pub fn speak_with(&mut self, text: &str, now_ms: u64, interrupt: bool) -> NarrationTicket {
        if text.trim().is_empty() {
            return NarrationTicket::settled(NarrationEnd::Completed);
        }
        if interrupt && !self.in_flight.is_empty() {
            self.narrator.cancel_current();
            let cut: Vec<InFlight> = self.in_flight.drain(..).collect();
            for entry in cut {
                self.settle(entry, NarrationEnd::Cancelled, now_ms);
            }
        }

        let backend = self.narrator.speak(text);
        let (tx, rx) = oneshot::channel();
        self.next_id += 1;
        self.in_flight.push(InFlight {
            id: self.next_id,
            backend,
            notify: Some(tx),
            ceiling_at_ms: now_ms.saturating_add(self.timings.ceiling_ms),
        });
        self.depth += 1;
        NarrationTicket {
            rx: Some(rx),
            outcome: None,
        }
    }

    /// Cut off everything in flight and drop any pending status text.
    pub fn cancel_all(&mut self, now_ms: u64) {
        if !self.in_flight.is_empty() {
            self.narrator.cancel_current();
        }
        let cut: Vec<InFlight> = self.in_flight.drain(..).collect();
        for entry in cut {
            self.settle(entry, NarrationEnd::Cancelled, now_ms);
        }
        self.pending_status = None;
        self.next_check_at_ms = None;
    }

    /// Settle finished or overdue utterances, then try the status flush.
    pub fn poll(&mut self, now_ms: u64) {
        let mut i = 0;
        while i < self.in_flight.len() {
            let entry = &mut self.in_flight[i];
            let outcome = match entry.backend.try_recv() {
                Ok(()) | Err(TryRecvError::Closed) => Some(NarrationEnd::Completed),
                Err(TryRecvError::Empty) if now_ms >= entry.ceiling_at_ms => {
                    warn!(
                        utterance = entry.id,
                        ceiling_ms = self.timings.ceiling_ms,
                        "narration backend never finished; releasing channel"
                    );
                    Some(NarrationEnd::TimedOut)
                }
                Err(TryRecvError::Empty) => None,
            };
            match outcome {
                Some(outcome) => {
                    let entry = self.in_flight.remove(i);
                    self.settle(entry, outcome, now_ms);
                }
                None => i += 1,
            }
        }
        self.flush_status(now_ms);
    }

    fn settle(&mut self, mut entry: InFlight, outcome: NarrationEnd, now_ms: u64) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            self.idle_since_ms = now_ms;
        }
        if let Some(tx) = entry.notify.take() {
            let _ = tx.send(outcome);
        }
        debug!(utterance = entry.id, ?outcome, depth = self.depth, "narration settled");
    }

    // ── Merge announcer ──────────────────────────────────────────────

    /// Queue status text. Later calls overwrite earlier ones until a flush.
    pub fn request_status(&mut self, text: impl Into<String>, now_ms: u64) {
        self.pending_status = Some(text.into());
        if self.next_check_at_ms.is_none() {
            self.next_check_at_ms = Some(now_ms.saturating_add(self.timings.check_interval_ms));
        }
    }

    pub fn note_spawn_event(&mut self, now_ms: u64) {
        self.last_spawn_at_ms = Some(now_ms);
    }

    fn flush_status(&mut self, now_ms: u64) {
        let Some(check_at) = self.next_check_at_ms else {
            return;
        };
        if now_ms < check_at {
            return;
        }
        let cooled = self
            .last_flush_at_ms
            .map_or(true, |t| now_ms.saturating_sub(t) >= self.timings.cooldown_ms);
        let past_grace = self
            .last_spawn_at_ms
            .map_or(true, |t| now_ms.saturating_sub(t) >= self.timings.spawn_grace_ms);

        if !(cooled && past_grace && !self.is_busy()) {
            self.next_check_at_ms = Some(now_ms.saturating_add(self.timings.check_interval_ms));
            return;
        }
        self.next_check_at_ms = None;
        if let Some(text) = self.pending_status.take() {
            self.narrator.announce_status(&text);
            self.last_flush_at_ms = Some(now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::RecordingNarrator;

    fn arbiter(narrator: &RecordingNarrator) -> SpeechArbiter {
        SpeechArbiter::new(Box::new(narrator.clone()), SpeechTimings::default())
    }

    #[test]
    fn depth_returns_to_zero_on_completion() {
        let narrator = RecordingNarrator::manual();
        let mut arb = arbiter(&narrator);
        let mut ticket = arb.speak_queued("one", 0);
        let _second = arb.speak_queued("two", 0);
        assert_eq!(arb.depth(), 2);

        narrator.complete_next();
        arb.poll(10);
        assert_eq!(arb.depth(), 1);
        assert_eq!(ticket.try_outcome(), Some(NarrationEnd::Completed));

        narrator.complete_next();
        arb.poll(20);
        assert!(!arb.is_busy());
        assert_eq!(arb.idle_for(120), Some(100));
    }

    #[test]
    fn ceiling_releases_a_silent_backend() {
        let narrator = RecordingNarrator::manual();
        let mut arb = arbiter(&narrator);
        let mut ticket = arb.speak_async("stuck", 0);
        arb.poll(11_999);
        assert!(arb.is_busy());
        arb.poll(12_000);
        assert!(!arb.is_busy());
        assert_eq!(ticket.try_outcome(), Some(NarrationEnd::TimedOut));
    }

    #[test]
    fn interrupt_cancels_in_flight_narration() {
        let narrator = RecordingNarrator::manual();
        let mut arb = arbiter(&narrator);
        let mut first = arb.speak_async("first", 0);
        let _second = arb.speak_async("second", 5);
        assert_eq!(first.try_outcome(), Some(NarrationEnd::Cancelled));
        assert_eq!(arb.depth(), 1);
        assert_eq!(narrator.cancels(), 1);
    }

    #[test]
    fn ticket_resolves_once() {
        let narrator = RecordingNarrator::new();
        let mut arb = arbiter(&narrator);
        let mut ticket = arb.speak_async("hi", 0);
        assert_eq!(ticket.try_outcome(), None);
        arb.poll(1);
        assert_eq!(ticket.try_outcome(), Some(NarrationEnd::Completed));
        assert_eq!(ticket.try_outcome(), Some(NarrationEnd::Completed));
    }

    #[test]
    fn rapid_status_changes_flush_once_with_latest_text() {
        let narrator = RecordingNarrator::new();
        let mut arb = arbiter(&narrator);
        for (i, t) in [0u64, 20, 40, 60, 80].iter().enumerate() {
            arb.request_status(format!("status {i}"), *t);
        }
        arb.poll(199);
        assert!(narrator.statuses().is_empty());
        arb.poll(200);
        assert_eq!(narrator.statuses(), vec!["status 4".to_string()]);
        arb.poll(2_000);
        assert_eq!(narrator.statuses().len(), 1);
    }

    #[test]
    fn status_waits_for_cooldown_grace_and_silence() {
        let narrator = RecordingNarrator::manual();
        let mut arb = arbiter(&narrator);
        arb.request_status("a", 0);
        arb.poll(200);
        assert_eq!(narrator.statuses().len(), 1);

        // Cool-down: next flush no earlier than 1400.
        arb.request_status("b", 300);
        arb.poll(500);
        arb.poll(1_300);
        assert_eq!(narrator.statuses().len(), 1);

        // Spawn grace.
        arb.note_spawn_event(1_350);
        arb.poll(1_500);
        assert_eq!(narrator.statuses().len(), 1);

        // Busy channel.
        let _t = arb.speak_async("talking", 1_600);
        arb.poll(1_900);
        assert_eq!(narrator.statuses().len(), 1);

        narrator.complete_all();
        arb.poll(2_100);
        assert_eq!(narrator.statuses(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn ticket_can_be_awaited() {
        let narrator = RecordingNarrator::new();
        let mut arb = arbiter(&narrator);
        let ticket = arb.speak_async("hi", 0);
        arb.poll(1);
        assert_eq!(ticket.wait().await, NarrationEnd::Completed);
    }
}
