//! Narration backend boundary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use tracing::info;

/// A speech backend.
///
/// `speak` hands back a completion receiver. The backend sends on it when the
/// utterance ends; dropping the sender counts as completion, so a backend
/// that fails quietly never stalls the game.
pub trait Narrator {
    fn speak(&mut self, text: &str) -> oneshot::Receiver<()>;

    /// Stop whatever is being spoken right now.
    fn cancel_current(&mut self);

    /// Polite status channel (a screen-reader live region in a browser host).
    fn announce_status(&mut self, text: &str);
}

fn completed() -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    let _ = tx.send(());
    rx
}

/// Writes every utterance to the log and completes immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNarrator;

impl Narrator for LogNarrator {
    fn speak(&mut self, text: &str) -> oneshot::Receiver<()> {
        info!(target: "bugslayer::narration", "{text}");
        completed()
    }

    fn cancel_current(&mut self) {}

    fn announce_status(&mut self, text: &str) {
        info!(target: "bugslayer::narration", status = true, "{text}");
    }
}

#[derive(Debug, Default)]
struct Recording {
    spoken: Vec<String>,
    statuses: Vec<String>,
    cancels: usize,
    manual: bool,
    pending: VecDeque<oneshot::Sender<()>>,
}

/// Records everything it is asked to say. Cloned handles share the record,
/// so a test can keep one while the engine owns another.
///
/// By default every utterance completes at once; [`RecordingNarrator::manual`]
/// holds completions until [`RecordingNarrator::complete_next`] is called.
#[derive(Debug, Default, Clone)]
pub struct RecordingNarrator {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingNarrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn manual() -> Self {
        let narrator = Self::default();
        narrator.with(|r| r.manual = true);
        narrator
    }

    fn with<T>(&self, f: impl FnOnce(&mut Recording) -> T) -> T {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn spoken(&self) -> Vec<String> {
        self.with(|r| r.spoken.clone())
    }

    pub fn statuses(&self) -> Vec<String> {
        self.with(|r| r.statuses.clone())
    }

    pub fn cancels(&self) -> usize {
        self.with(|r| r.cancels)
    }

    /// Utterances containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.with(|r| r.spoken.iter().filter(|s| s.contains(needle)).count())
    }

    pub fn clear(&self) {
        self.with(|r| {
            r.spoken.clear();
            r.statuses.clear();
        });
    }

    /// Finish the oldest held utterance.
    pub fn complete_next(&self) {
        self.with(|r| {
            if let Some(tx) = r.pending.pop_front() {
                let _ = tx.send(());
            }
        });
    }

    pub fn complete_all(&self) {
        self.with(|r| {
            for tx in r.pending.drain(..) {
                let _ = tx.send(());
            }
        });
    }

    /// Number of utterances still waiting for completion.
    pub fn held(&self) -> usize {
        self.with(|r| r.pending.len())
    }
}

impl Narrator for RecordingNarrator {
    fn speak(&mut self, text: &str) -> oneshot::Receiver<()> {
        self.with(|r| {
            r.spoken.push(text.to_string());
            if r.manual {
                let (tx, rx) = oneshot::channel();
                r.pending.push_back(tx);
                rx
            } else {
                completed()
            }
        })
    }

    fn cancel_current(&mut self) {
        self.with(|r| {
            r.cancels += 1;
            r.pending.clear();
        });
    }

    fn announce_status(&mut self, text: &str) {
        self.with(|r| r.statuses.push(text.to_string()));
    }
}
