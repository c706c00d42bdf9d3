//! Sound cues.
//!
//! Cues are fire-and-forget. Nothing plays until the player has interacted
//! at least once (autoplay policy), and a cue missing from the library is
//! skipped without complaint.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::content::{AdversaryKind, Weapon};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cue {
    Hit,
    Miss,
    Bite,
    Warn,
    Slip,
    Deny,
    VoteOk,
    RecallSuccess,
    Select(Weapon),
    Intro(AdversaryKind),
    Move,
}

impl Cue {
    pub fn key(self) -> String {
        match self {
            Cue::Hit => "hit".into(),
            Cue::Miss => "miss".into(),
            Cue::Bite => "bite".into(),
            Cue::Warn => "warn".into(),
            Cue::Slip => "slip".into(),
            Cue::Deny => "deny".into(),
            Cue::VoteOk => "vote_ok".into(),
            Cue::RecallSuccess => "recall_success".into(),
            Cue::Select(weapon) => format!("select_{}", weapon.key()),
            Cue::Intro(kind) => format!("intro_{}", kind.key()),
            Cue::Move => "move".into(),
        }
    }
}

/// Cue key -> asset path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub library: BTreeMap<String, String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let mut library: BTreeMap<String, String> = [
            ("hit", "hit_ok"),
            ("miss", "miss"),
            ("bite", "bite"),
            ("warn", "warn_beep"),
            ("slip", "slip"),
            ("deny", "warn_beep"),
            ("vote_ok", "vote_ok"),
            ("recall_success", "recall"),
            ("select_fire", "firegun"),
            ("select_spray", "spray"),
            ("select_slipper", "slipper"),
            ("select_bait", "bait"),
            ("select_cat", "cat"),
            ("select_vote", "vote_select"),
            ("select_recall", "recall"),
            ("move", "step"),
        ]
        .into_iter()
        .map(|(k, f)| (k.to_string(), format!("assets/sounds/{f}.mp3")))
        .collect();
        for kind in AdversaryKind::ALL {
            library.insert(
                Cue::Intro(kind).key(),
                format!("assets/sounds/{}_intro.mp3", kind.key()),
            );
        }
        Self { library }
    }
}

/// Plays an asset. Failures stay inside the player.
pub trait CuePlayer {
    fn play(&mut self, key: &str, asset: &str);
}

/// Logs cues at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCuePlayer;

impl CuePlayer for LogCuePlayer {
    fn play(&mut self, key: &str, asset: &str) {
        debug!(target: "bugslayer::audio", key, asset, "cue");
    }
}

/// Records played keys; cloned handles share the record.
#[derive(Debug, Default, Clone)]
pub struct RecordingCuePlayer {
    played: Arc<Mutex<Vec<String>>>,
}

impl RecordingCuePlayer {
    pub fn played(&self) -> Vec<String> {
        match self.played.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl CuePlayer for RecordingCuePlayer {
    fn play(&mut self, key: &str, _asset: &str) {
        let mut guard = match self.played.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.push(key.to_string());
    }
}

pub struct CueBoard {
    player: Box<dyn CuePlayer>,
    library: BTreeMap<String, String>,
}

impl CueBoard {
    pub fn new(player: Box<dyn CuePlayer>, config: &AudioConfig) -> Self {
        Self {
            player,
            library: config.library.clone(),
        }
    }

    /// Returns whether the cue was handed to the player.
    pub fn play(&mut self, cue: Cue, user_interacted: bool) -> bool {
        let key = cue.key();
        if !user_interacted {
            debug!(key = %key, "cue skipped: no user interaction yet");
            return false;
        }
        let Some(asset) = self.library.get(&key) else {
            debug!(key = %key, "cue skipped: not in library");
            return false;
        };
        self.player.play(&key, asset);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cues_wait_for_interaction() {
        let rec = RecordingCuePlayer::default();
        let mut board = CueBoard::new(Box::new(rec.clone()), &AudioConfig::default());
        assert!(!board.play(Cue::Hit, false));
        assert!(board.play(Cue::Hit, true));
        assert_eq!(rec.played(), vec!["hit".to_string()]);
    }

    #[test]
    fn unknown_cues_are_ignored() {
        let rec = RecordingCuePlayer::default();
        let config = AudioConfig {
            library: BTreeMap::new(),
        };
        let mut board = CueBoard::new(Box::new(rec.clone()), &config);
        assert!(!board.play(Cue::Select(Weapon::Cat), true));
        assert!(rec.played().is_empty());
    }

    #[test]
    fn composite_keys() {
        assert_eq!(Cue::Select(Weapon::Vote).key(), "select_vote");
        assert_eq!(Cue::Intro(AdversaryKind::K4).key(), "intro_k4");
        assert!(AudioConfig::default().library.contains_key("intro_k5"));
    }
}
