//! Quiz boundary.
//!
//! Quiz adversaries are resolved by answering a question. The engine owns the
//! bookkeeping: which questions were already used, how many were asked per
//! level, when to open the dialog. A [`QuizProvider`] owns the question bank
//! and the dialog itself.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{info, warn};

use crate::content::Damage;
use crate::error::{ConfigError, QuizError};
use crate::session::{EncounterId, SessionState};
use crate::timer::PausableTimer;

pub const DEFAULT_POINTS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub id: Option<String>,
    pub prompt: String,
    pub choices: Vec<String>,
    /// Index into `choices`.
    pub answer: usize,
    #[serde(default)]
    pub points: Option<u32>,
    #[serde(default)]
    pub penalty_on_wrong: Option<Damage>,
}

impl Question {
    /// Stable usage-log key: `<prefix>:<id>`, or the first 40 characters of
    /// the prompt when there is no id.
    pub fn key(&self, prefix: &str) -> String {
        let base = match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.prompt.chars().take(40).collect(),
        };
        format!("{prefix}:{base}")
    }

    /// Question followed by numbered choices, ready to be spoken.
    pub fn spoken(&self) -> String {
        let choices = self
            .choices
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}: {c}", i + 1))
            .collect::<Vec<_>>()
            .join(". ");
        format!("{} {choices}.", self.prompt)
    }

    pub fn grade(&self, choice: usize, fallback_penalty: Damage) -> QuizOutcome {
        if choice == self.answer {
            QuizOutcome::correct(self.points.unwrap_or(DEFAULT_POINTS))
        } else {
            QuizOutcome::incorrect(self.penalty_on_wrong.unwrap_or(fallback_penalty))
        }
    }
}

/// Result of one question, applied exactly once by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutcome {
    pub correct: bool,
    pub points: u32,
    pub penalty: Damage,
}

impl QuizOutcome {
    pub fn correct(points: u32) -> Self {
        Self {
            correct: true,
            points,
            penalty: Damage::default(),
        }
    }

    pub fn incorrect(penalty: Damage) -> Self {
        Self {
            correct: false,
            points: 0,
            penalty,
        }
    }
}

/// Source of questions and the dialog that asks them.
///
/// Dropping the outcome sender without sending means the dialog was
/// dismissed unanswered.
pub trait QuizProvider {
    fn pool(&self) -> &[Question];

    fn ask(&mut self, question: &Question) -> oneshot::Receiver<QuizOutcome>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuizConfig {
    /// JSON question bank. The built-in bank is used when unset.
    pub bank_path: Option<PathBuf>,
    pub key_prefix: String,
    /// Delay between a quiz adversary appearing and its question.
    pub prompt_delay_ms: u64,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            bank_path: None,
            key_prefix: "k4".into(),
            prompt_delay_ms: 200,
        }
    }
}

pub fn load_bank(path: &Path) -> Result<Vec<Question>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ConfigError::LoadFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub fn builtin_bank() -> Vec<Question> {
    let q = |id: &str, prompt: &str, choices: &[&str], answer: usize| Question {
        id: Some(id.into()),
        prompt: prompt.into(),
        choices: choices.iter().map(|c| c.to_string()).collect(),
        answer,
        points: None,
        penalty_on_wrong: None,
    };
    vec![
        q(
            "legs",
            "How many legs does a cockroach have?",
            &["Four", "Six", "Eight"],
            1,
        ),
        q(
            "crumbs",
            "Which habit keeps cockroaches away from the kitchen?",
            &["Leaving crumbs out", "Sealing food containers", "Keeping the lights off"],
            1,
        ),
        q(
            "water",
            "What do cockroaches need more urgently than food?",
            &["Water", "Sunlight", "Music"],
            0,
        ),
        q(
            "night",
            "When are cockroaches most active?",
            &["At noon", "At night", "Only in winter"],
            1,
        ),
        q(
            "bins",
            "What should a rubbish bin in the kitchen have?",
            &["A tight lid", "No bag", "Holes in the side"],
            0,
        ),
    ]
}

/// Pick a question whose key is not in `used`. When every question has been
/// used, the keys under `prefix` are cleared once and the pick is retried.
pub fn select_unique<'a, R: Rng + ?Sized>(
    pool: &'a [Question],
    used: &mut BTreeSet<String>,
    prefix: &str,
    rng: &mut R,
) -> Result<&'a Question, QuizError> {
    if pool.is_empty() {
        return Err(QuizError::EmptyPool);
    }
    let fresh: Vec<&Question> = pool
        .iter()
        .filter(|q| !used.contains(&q.key(prefix)))
        .collect();
    if let Some(q) = fresh.choose(rng) {
        return Ok(*q);
    }

    warn!(prefix, pool = pool.len(), "question pool exhausted; clearing used log");
    let scope = format!("{prefix}:");
    used.retain(|k| !k.starts_with(&scope));
    pool.choose(rng).ok_or(QuizError::EmptyPool)
}

/// Result of polling an open dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPoll {
    Answered {
        encounter: EncounterId,
        outcome: QuizOutcome,
    },
    Dismissed {
        encounter: EncounterId,
    },
}

struct OpenQuiz {
    encounter: EncounterId,
    rx: oneshot::Receiver<QuizOutcome>,
}

/// Engine-side quiz bookkeeping.
pub struct QuizDesk {
    provider: Option<Box<dyn QuizProvider>>,
    config: QuizConfig,
    prompt: Option<(EncounterId, PausableTimer)>,
    open: Option<OpenQuiz>,
}

impl QuizDesk {
    pub fn new(provider: Option<Box<dyn QuizProvider>>, config: QuizConfig) -> Self {
        Self {
            provider,
            config,
            prompt: None,
            open: None,
        }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_for(&self) -> Option<EncounterId> {
        self.open.as_ref().map(|o| o.encounter)
    }

    /// Per-level budget; `None` means unbounded.
    pub fn may_ask(&self, state: &SessionState, level: u32, cap: Option<u32>) -> bool {
        cap.map_or(true, |cap| state.questions_asked_in(level) < cap)
    }

    pub fn mark_asked(state: &mut SessionState, level: u32) {
        *state.questions_asked.entry(level).or_insert(0) += 1;
    }

    pub fn schedule_prompt(&mut self, encounter: EncounterId, now_ms: u64) {
        self.prompt = Some((
            encounter,
            PausableTimer::arm(now_ms, self.config.prompt_delay_ms),
        ));
    }

    pub fn cancel_prompt(&mut self) {
        self.prompt = None;
    }

    /// Take the scheduled prompt once it is due.
    pub fn prompt_due(&mut self, now_ms: u64) -> Option<EncounterId> {
        let (id, timer) = self.prompt?;
        if !timer.is_due(now_ms) {
            return None;
        }
        self.prompt = None;
        Some(id)
    }

    /// Select a fresh question, log it as used and hand it to the provider.
    /// Returns the question so the caller can narrate it.
    pub fn open<R: Rng + ?Sized>(
        &mut self,
        state: &mut SessionState,
        encounter: EncounterId,
        level: u32,
        rng: &mut R,
    ) -> Result<Question, QuizError> {
        let Some(provider) = self.provider.as_mut() else {
            return Err(QuizError::EmptyPool);
        };
        let question =
            select_unique(provider.pool(), &mut state.used_questions, &self.config.key_prefix, rng)?
                .clone();
        let key = question.key(&self.config.key_prefix);
        state.used_questions.insert(key.clone());
        Self::mark_asked(state, level);

        let rx = provider.ask(&question);
        self.open = Some(OpenQuiz { encounter, rx });
        info!(key = %key, encounter = encounter.0, "quiz opened");
        Ok(question)
    }

    pub fn poll(&mut self) -> Option<QuizPoll> {
        let open = self.open.as_mut()?;
        let encounter = open.encounter;
        let result = match open.rx.try_recv() {
            Ok(outcome) => QuizPoll::Answered { encounter, outcome },
            Err(TryRecvError::Closed) => QuizPoll::Dismissed { encounter },
            Err(TryRecvError::Empty) => return None,
        };
        self.open = None;
        Some(result)
    }

    /// Close the dialog without reading its result.
    pub fn close(&mut self) -> Option<EncounterId> {
        self.open.take().map(|o| o.encounter)
    }

    pub fn key_prefix(&self) -> &str {
        &self.config.key_prefix
    }
}

#[derive(Default)]
struct Asked {
    question: Option<Question>,
    tx: Option<oneshot::Sender<QuizOutcome>>,
    asked: usize,
}

/// Provider whose dialog is answered from outside, e.g. by a typed command
/// or a test. Cloned handles share the open question.
#[derive(Clone)]
pub struct ManualQuiz {
    pool: Arc<Vec<Question>>,
    fallback_penalty: Damage,
    asked: Arc<Mutex<Asked>>,
}

impl ManualQuiz {
    pub fn new(pool: Vec<Question>, fallback_penalty: Damage) -> Self {
        Self {
            pool: Arc::new(pool),
            fallback_penalty,
            asked: Arc::new(Mutex::new(Asked::default())),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut Asked) -> T) -> T {
        let mut guard = match self.asked.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// The question currently waiting for an answer.
    pub fn current(&self) -> Option<Question> {
        self.with(|a| a.tx.as_ref().and(a.question.clone()))
    }

    pub fn asked_count(&self) -> usize {
        self.with(|a| a.asked)
    }

    /// Answer with a zero-based choice. Returns the graded outcome, or `None`
    /// when no question is open.
    pub fn answer(&self, choice: usize) -> Option<QuizOutcome> {
        let penalty = self.fallback_penalty;
        self.with(|a| {
            let tx = a.tx.take()?;
            let outcome = a.question.as_ref()?.grade(choice, penalty);
            let _ = tx.send(outcome);
            Some(outcome)
        })
    }

    /// Answer the open question correctly.
    pub fn answer_correctly(&self) -> Option<QuizOutcome> {
        let choice = self.with(|a| a.question.as_ref().map(|q| q.answer))?;
        self.answer(choice)
    }

    /// Answer the open question wrongly.
    pub fn answer_wrongly(&self) -> Option<QuizOutcome> {
        let choice = self.with(|a| {
            a.question
                .as_ref()
                .map(|q| if q.answer == 0 { 1 } else { 0 })
        })?;
        self.answer(choice)
    }

    /// Close the dialog without answering.
    pub fn dismiss(&self) {
        self.with(|a| a.tx = None);
    }
}

impl QuizProvider for ManualQuiz {
    fn pool(&self) -> &[Question] {
        &self.pool
    }

    fn ask(&mut self, question: &Question) -> oneshot::Receiver<QuizOutcome> {
        let (tx, rx) = oneshot::channel();
        self.with(|a| {
            a.question = Some(question.clone());
            a.tx = Some(tx);
            a.asked += 1;
        });
        rx
    }
}
