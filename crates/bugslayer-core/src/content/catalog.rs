//! Adversary and weapon catalog.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Upper bound for every ammo counter.
pub const MAX_AMMO: u32 = 99;

/// Boss hit points at the start of a session.
pub const BOSS_BASE_HP: u32 = 200;

/// Damage dealt to the boss by one cat strike.
pub const CAT_HIT: u32 = 30;

/// Coins needed to adopt a cat.
pub const CAT_ADOPT_COST: u32 = 200;

/// Adversary archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AdversaryKind {
    K1,
    K2,
    K3,
    K4,
    K5,
}

impl AdversaryKind {
    pub const ALL: [AdversaryKind; 5] = [Self::K1, Self::K2, Self::K3, Self::K4, Self::K5];

    pub fn key(self) -> &'static str {
        match self {
            Self::K1 => "k1",
            Self::K2 => "k2",
            Self::K3 => "k3",
            Self::K4 => "k4",
            Self::K5 => "k5",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "k1" => Some(Self::K1),
            "k2" => Some(Self::K2),
            "k3" => Some(Self::K3),
            "k4" => Some(Self::K4),
            "k5" => Some(Self::K5),
            _ => None,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for AdversaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl TryFrom<String> for AdversaryKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown adversary kind '{value}'"))
    }
}

impl From<AdversaryKind> for String {
    fn from(kind: AdversaryKind) -> Self {
        kind.key().to_string()
    }
}

/// Player weapons, in weapon-bar order (slots 1..=7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Weapon {
    Fire,
    Spray,
    Slipper,
    Bait,
    Cat,
    Vote,
    Recall,
}

impl Weapon {
    pub const ALL: [Weapon; 7] = [
        Self::Fire,
        Self::Spray,
        Self::Slipper,
        Self::Bait,
        Self::Cat,
        Self::Vote,
        Self::Recall,
    ];

    /// Weapons backed by the ammo ledger.
    pub const AMMO: [Weapon; 4] = [Self::Fire, Self::Spray, Self::Slipper, Self::Bait];

    pub fn key(self) -> &'static str {
        match self {
            Self::Fire => "fire",
            Self::Spray => "spray",
            Self::Slipper => "slipper",
            Self::Bait => "bait",
            Self::Cat => "cat",
            Self::Vote => "vote",
            Self::Recall => "recall",
        }
    }

    /// Spoken name.
    pub fn label(self) -> &'static str {
        match self {
            Self::Fire => "lighter flame",
            Self::Spray => "bug spray",
            Self::Slipper => "slipper",
            Self::Bait => "poison bait",
            Self::Cat => "cat",
            Self::Vote => "recall petition",
            Self::Recall => "recall vote",
        }
    }

    pub fn consumes_ammo(self) -> bool {
        Self::AMMO.contains(&self)
    }

    /// Weapon-bar slot, 1-based.
    pub fn from_slot(slot: u8) -> Option<Self> {
        Self::ALL.get(usize::from(slot).checked_sub(1)?).copied()
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|w| w.key() == s)
    }
}

impl fmt::Display for Weapon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl TryFrom<String> for Weapon {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown weapon '{value}'"))
    }
}

impl From<Weapon> for String {
    fn from(weapon: Weapon) -> Self {
        weapon.key().to_string()
    }
}

/// Resources an adversary takes on a counter-attack or an escape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Damage {
    pub hp: u32,
    pub coins: u32,
}

/// Resources granted when an adversary is struck down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reward {
    pub hp: u32,
    pub coins: u32,
    /// Ammo granted for the weapon that landed the hit. One unit less than
    /// listed is returned, so the shot itself is never fully refunded.
    pub ammo: BTreeMap<Weapon, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdversaryDef {
    pub kind: AdversaryKind,
    pub name: String,
    pub weaknesses: Vec<Weapon>,
    pub damage: Damage,
    pub reward: Reward,
    /// Concession price in coins. `None` means the level's ticket price applies.
    pub vote_cost: Option<u32>,
    pub vote_tickets: u32,
    pub min_ttl_ms: Option<u64>,
    /// Resolved by answering a quiz question.
    pub quiz: bool,
    pub boss: bool,
    /// Counter-attacks after which the player loses outright.
    pub loss_after_attacks: Option<u32>,
}

impl AdversaryDef {
    pub fn is_weak_to(&self, weapon: Weapon) -> bool {
        self.weaknesses.contains(&weapon)
    }

    /// Only the three weakest kinds can be bought off.
    pub fn can_concede(&self) -> bool {
        matches!(
            self.kind,
            AdversaryKind::K1 | AdversaryKind::K2 | AdversaryKind::K3
        )
    }
}

#[derive(Debug, Clone)]
pub struct Catalog {
    defs: Vec<AdversaryDef>,
}

impl Catalog {
    pub fn builtin() -> Self {
        let ammo = |pairs: &[(Weapon, u32)]| pairs.iter().copied().collect::<BTreeMap<_, _>>();
        let defs = vec![
            AdversaryDef {
                kind: AdversaryKind::K1,
                name: "small cockroach".into(),
                weaknesses: vec![Weapon::Slipper, Weapon::Spray],
                damage: Damage { hp: 1, coins: 0 },
                reward: Reward {
                    hp: 0,
                    coins: 1,
                    ammo: ammo(&[(Weapon::Slipper, 2), (Weapon::Spray, 2)]),
                },
                vote_cost: Some(1),
                vote_tickets: 1,
                min_ttl_ms: None,
                quiz: false,
                boss: false,
                loss_after_attacks: None,
            },
            AdversaryDef {
                kind: AdversaryKind::K2,
                name: "flying cockroach".into(),
                weaknesses: vec![Weapon::Spray, Weapon::Fire],
                damage: Damage { hp: 1, coins: 1 },
                reward: Reward {
                    hp: 0,
                    coins: 2,
                    ammo: ammo(&[(Weapon::Spray, 2), (Weapon::Fire, 2)]),
                },
                vote_cost: Some(2),
                vote_tickets: 1,
                min_ttl_ms: None,
                quiz: false,
                boss: false,
                loss_after_attacks: None,
            },
            AdversaryDef {
                kind: AdversaryKind::K3,
                name: "big brown cockroach".into(),
                weaknesses: vec![Weapon::Bait, Weapon::Fire],
                damage: Damage { hp: 2, coins: 1 },
                reward: Reward {
                    hp: 1,
                    coins: 3,
                    ammo: ammo(&[(Weapon::Bait, 2), (Weapon::Fire, 3)]),
                },
                vote_cost: Some(3),
                vote_tickets: 1,
                min_ttl_ms: None,
                quiz: false,
                boss: false,
                loss_after_attacks: None,
            },
            AdversaryDef {
                kind: AdversaryKind::K4,
                name: "quiz cockroach".into(),
                weaknesses: vec![Weapon::Bait],
                damage: Damage { hp: 2, coins: 0 },
                reward: Reward {
                    hp: 0,
                    coins: 5,
                    ammo: ammo(&[(Weapon::Bait, 2)]),
                },
                vote_cost: None,
                vote_tickets: 0,
                min_ttl_ms: Some(60_000),
                quiz: true,
                boss: false,
                loss_after_attacks: None,
            },
            AdversaryDef {
                kind: AdversaryKind::K5,
                name: "cockroach king".into(),
                weaknesses: Vec::new(),
                damage: Damage { hp: 3, coins: 2 },
                reward: Reward::default(),
                vote_cost: None,
                vote_tickets: 0,
                min_ttl_ms: None,
                quiz: false,
                boss: true,
                loss_after_attacks: Some(5),
            },
        ];
        Self { defs }
    }

    pub fn get(&self, kind: AdversaryKind) -> &AdversaryDef {
        &self.defs[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &AdversaryDef> {
        self.defs.iter()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}
