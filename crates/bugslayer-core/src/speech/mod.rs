//! Narration: backend boundary, arbitration and spawn orchestration.

pub mod arbiter;
pub mod conductor;
pub mod narrator;

pub use arbiter::{NarrationEnd, NarrationTicket, SpeechArbiter, SpeechTimings};
pub use conductor::{ConductorTimings, SpawnConductor};
pub use narrator::{LogNarrator, Narrator, RecordingNarrator};
