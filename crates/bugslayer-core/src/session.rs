//! Session state: the player ledger, the active encounter and hazards.
//!
//! `SessionState` is plain data. Every component receives it by reference;
//! nothing reaches it through a global.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::Cell;
use crate::content::{
    AdversaryKind, Damage, Pack, Reward, Weapon, BOSS_BASE_HP, MAX_AMMO,
};

pub const DEFAULT_PLAYER_NAME: &str = "nameless hero";
pub const STARTING_HP: u32 = 10;
pub const STARTING_COINS: u32 = 10;

/// Concessions per kind needed before the boss can be recalled.
pub const RECALL_THRESHOLD: [(AdversaryKind, u32); 3] = [
    (AdversaryKind::K1, 20),
    (AdversaryKind::K2, 10),
    (AdversaryKind::K3, 5),
];

/// Persisted player ledger.
///
/// Serialized as the flat object
/// `{name, hp, coins, weaponUsage, votes, voteBought}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    pub hp: u32,
    pub coins: u32,
    /// Ammo for ammo weapons, usage count for the others.
    pub weapon_usage: BTreeMap<Weapon, u32>,
    pub votes: u32,
    pub vote_bought: BTreeMap<AdversaryKind, u32>,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            name: DEFAULT_PLAYER_NAME.to_string(),
            hp: STARTING_HP,
            coins: STARTING_COINS,
            weapon_usage: BTreeMap::new(),
            votes: 0,
            vote_bought: BTreeMap::new(),
        }
    }
}

impl Player {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Lenient load: each field falls back to its default on its own, so a
    /// damaged record never discards the fields that are still readable.
    pub fn from_json_lenient(value: &Value) -> Self {
        let mut player = Self::default();
        let Some(obj) = value.as_object() else {
            return player;
        };

        if let Some(name) = obj.get("name").and_then(Value::as_str) {
            if !name.trim().is_empty() {
                player.name = name.to_string();
            }
        }
        if let Some(hp) = obj.get("hp").and_then(as_u32) {
            player.hp = hp;
        }
        if let Some(coins) = obj.get("coins").and_then(as_u32) {
            player.coins = coins;
        }
        if let Some(votes) = obj.get("votes").and_then(as_u32) {
            player.votes = votes;
        }
        if let Some(usage) = obj.get("weaponUsage").and_then(Value::as_object) {
            for (key, n) in usage {
                if let (Some(weapon), Some(n)) = (Weapon::parse(key), as_u32(n)) {
                    let n = if weapon.consumes_ammo() { n.min(MAX_AMMO) } else { n };
                    player.weapon_usage.insert(weapon, n);
                }
            }
        }
        if let Some(bought) = obj.get("voteBought").and_then(Value::as_object) {
            for (key, n) in bought {
                if let (Some(kind), Some(n)) = (AdversaryKind::parse(key), as_u32(n)) {
                    player.vote_bought.insert(kind, n);
                }
            }
        }
        player
    }

    pub fn ammo(&self, weapon: Weapon) -> u32 {
        self.weapon_usage.get(&weapon).copied().unwrap_or(0)
    }

    pub fn bought(&self, kind: AdversaryKind) -> u32 {
        self.vote_bought.get(&kind).copied().unwrap_or(0)
    }
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| n.min(u64::from(u32::MAX)) as u32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EncounterId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncounterPhase {
    Spawned,
    Warned,
}

/// How an encounter left the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The player struck it down or answered its question.
    Resolved,
    /// Its countdown ran out.
    Escaped,
    /// Bought off or otherwise despawned.
    Withdrawn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EncounterId,
    pub kind: AdversaryKind,
    pub position: Cell,
    pub created_at_ms: u64,
    pub ttl_due_at_ms: Option<u64>,
    pub warn_due_at_ms: Option<u64>,
    pub attack_count: u32,
    pub phase: EncounterPhase,
    pub removed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HazardId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrapState {
    Idle,
    Armed,
    /// Triggered and waiting to respawn.
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Hazard {
    Trap {
        id: HazardId,
        position: Cell,
        state: TrapState,
        hp_loss: u32,
        arm_ms: u64,
        respawn_ms: u64,
    },
    Patrol {
        id: HazardId,
        position: Cell,
        /// +1 or -1 along the row.
        direction: i32,
    },
}

impl Hazard {
    pub fn id(&self) -> HazardId {
        match self {
            Hazard::Trap { id, .. } | Hazard::Patrol { id, .. } => *id,
        }
    }

    pub fn position(&self) -> Cell {
        match self {
            Hazard::Trap { position, .. } | Hazard::Patrol { position, .. } => *position,
        }
    }

    /// A trap that is down does not occupy its cell.
    pub fn is_live(&self) -> bool {
        match self {
            Hazard::Trap { state, .. } => *state != TrapState::Down,
            Hazard::Patrol { .. } => true,
        }
    }

    pub fn is_patrol(&self) -> bool {
        matches!(self, Hazard::Patrol { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BossState {
    pub hp: u32,
    pub cat_owned: bool,
    pub cat_name: Option<String>,
    /// Recall availability has been announced this session.
    pub recall_announced: bool,
}

impl Default for BossState {
    fn default() -> Self {
        Self {
            hp: BOSS_BASE_HP,
            cat_owned: false,
            cat_name: None,
            recall_announced: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionOutcome {
    #[default]
    Playing,
    /// All level targets met.
    Cleared,
    /// Boss defeated.
    Won,
    Lost,
}

impl SessionOutcome {
    pub fn is_over(self) -> bool {
        self != SessionOutcome::Playing
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub level: u32,
    pub player: Player,
    pub player_pos: Cell,
    pub encounter: Option<Encounter>,
    pub hazards: Vec<Hazard>,
    pub weapon: Weapon,
    /// Mirrors the resolution gate holder.
    pub resolving: bool,
    pub paused: bool,
    pub user_interacted: bool,
    pub used_questions: BTreeSet<String>,
    pub questions_asked: BTreeMap<u32, u32>,
    pub kills: BTreeMap<AdversaryKind, u32>,
    pub boss: BossState,
    pub outcome: SessionOutcome,
    /// Bumps per obstacle index since that obstacle last cost resources.
    pub bumps: BTreeMap<usize, u32>,
    /// Ledger changed since the last write.
    #[serde(skip)]
    pub ledger_dirty: bool,
}

impl SessionState {
    pub fn new(level: u32, player: Player, start: Cell) -> Self {
        Self {
            level,
            player,
            player_pos: start,
            encounter: None,
            hazards: Vec::new(),
            weapon: Weapon::Fire,
            resolving: false,
            paused: false,
            user_interacted: false,
            used_questions: BTreeSet::new(),
            questions_asked: BTreeMap::new(),
            kills: BTreeMap::new(),
            boss: BossState::default(),
            outcome: SessionOutcome::Playing,
            bumps: BTreeMap::new(),
            ledger_dirty: false,
        }
    }

    pub fn is_over(&self) -> bool {
        self.outcome.is_over()
    }

    /// Take one unit of ammo. Returns `false`, changing nothing, when empty.
    pub fn consume_ammo(&mut self, weapon: Weapon) -> bool {
        match self.player.weapon_usage.get_mut(&weapon) {
            Some(slot) if *slot > 0 => {
                *slot -= 1;
                self.ledger_dirty = true;
                true
            }
            _ => false,
        }
    }

    pub fn refund_ammo(&mut self, weapon: Weapon, amount: u32) {
        if amount == 0 {
            return;
        }
        let slot = self.player.weapon_usage.entry(weapon).or_insert(0);
        *slot = slot.saturating_add(amount).min(MAX_AMMO);
        self.ledger_dirty = true;
    }

    /// Count a use of a weapon that has no ammo.
    pub fn note_weapon_use(&mut self, weapon: Weapon) {
        let slot = self.player.weapon_usage.entry(weapon).or_insert(0);
        *slot = slot.saturating_add(1);
        self.ledger_dirty = true;
    }

    pub fn apply_pack(&mut self, pack: &Pack, base_ammo: &BTreeMap<Weapon, u32>) {
        self.player.hp = self.player.hp.saturating_add(pack.hp);
        self.player.coins = self.player.coins.saturating_add(pack.coins);
        for weapon in Weapon::AMMO {
            let add = base_ammo.get(&weapon).copied().unwrap_or(0)
                + pack.ammo.get(&weapon).copied().unwrap_or(0);
            self.refund_ammo(weapon, add);
        }
        self.ledger_dirty = true;
    }

    /// Debit a damage profile. Returns `true` when the player is out of health.
    pub fn apply_penalty(&mut self, damage: Damage) -> bool {
        self.player.hp = self.player.hp.saturating_sub(damage.hp);
        self.player.coins = self.player.coins.saturating_sub(damage.coins);
        self.ledger_dirty = true;
        self.player.hp == 0
    }

    /// Credit a strike reward. The weapon that landed the hit gets back one
    /// unit less than listed.
    pub fn apply_reward(&mut self, reward: &Reward, weapon: Weapon) {
        self.player.hp = self.player.hp.saturating_add(reward.hp);
        self.player.coins = self.player.coins.saturating_add(reward.coins);
        let ammo = reward.ammo.get(&weapon).copied().unwrap_or(0);
        self.refund_ammo(weapon, ammo.saturating_sub(1));
        self.ledger_dirty = true;
    }

    /// Spend coins. Returns `false`, changing nothing, when short.
    pub fn spend(&mut self, coins: u32) -> bool {
        if self.player.coins < coins {
            return false;
        }
        self.player.coins -= coins;
        self.ledger_dirty = true;
        true
    }

    pub fn add_coins(&mut self, coins: u32) {
        self.player.coins = self.player.coins.saturating_add(coins);
        self.ledger_dirty = true;
    }

    /// Record a bought-off adversary. Both counters only ever grow here.
    pub fn record_concession(&mut self, kind: AdversaryKind, tickets: u32) {
        self.player.votes = self.player.votes.saturating_add(tickets);
        let bought = self.player.vote_bought.entry(kind).or_insert(0);
        *bought = bought.saturating_add(1);
        self.ledger_dirty = true;
    }

    /// Explicit operator reset of the vote ledger.
    pub fn reset_votes(&mut self) {
        self.player.votes = 0;
        self.player.vote_bought.clear();
        self.ledger_dirty = true;
    }

    pub fn note_kill(&mut self, kind: AdversaryKind) {
        *self.kills.entry(kind).or_insert(0) += 1;
    }

    pub fn kills_of(&self, kind: AdversaryKind) -> u32 {
        self.kills.get(&kind).copied().unwrap_or(0)
    }

    /// All per-kind targets met. A level without targets never clears.
    pub fn targets_met(&self, targets: &BTreeMap<AdversaryKind, u32>) -> bool {
        !targets.is_empty() && targets.iter().all(|(k, n)| self.kills_of(*k) >= *n)
    }

    /// Kinds still short of their target, with the shortfall.
    pub fn remaining_targets(
        &self,
        targets: &BTreeMap<AdversaryKind, u32>,
    ) -> Vec<(AdversaryKind, u32)> {
        targets
            .iter()
            .filter_map(|(k, n)| {
                let left = n.saturating_sub(self.kills_of(*k));
                (left > 0).then_some((*k, left))
            })
            .collect()
    }

    pub fn recall_ready(&self) -> bool {
        RECALL_THRESHOLD
            .iter()
            .all(|(kind, need)| self.player.bought(*kind) >= *need)
    }

    /// Spoken shortfall for the recall threshold.
    pub fn recall_shortfall(&self) -> String {
        RECALL_THRESHOLD
            .iter()
            .filter_map(|(kind, need)| {
                let have = self.player.bought(*kind);
                (have < *need).then(|| format!("{kind} needs {} more", need - have))
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn questions_asked_in(&self, level: u32) -> u32 {
        self.questions_asked.get(&level).copied().unwrap_or(0)
    }

    /// Cells that spawns must avoid: the player and every live hazard.
    pub fn occupied_cells(&self) -> Vec<Cell> {
        std::iter::once(self.player_pos)
            .chain(self.hazards.iter().filter(|h| h.is_live()).map(Hazard::position))
            .collect()
    }

    pub fn patrol_at(&self, cell: Cell) -> bool {
        self.hazards
            .iter()
            .any(|h| h.is_patrol() && h.position() == cell)
    }
}
