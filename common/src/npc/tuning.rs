use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Balanced,
    Hunter,
    Survivor,
    Forager,
}

/// Category weights sampled during target selection (spec §4.3, step 2).
#[derive(Debug, Clone, Copy)]
pub struct Bias {
    pub food: f64,
    pub hunt: f64,
    pub survival: f64,
}

impl Profile {
    pub fn bias(self) -> Bias {
        match self {
            Profile::Balanced => Bias {
                food: 1.0,
                hunt: 1.0,
                survival: 1.0,
            },
            Profile::Hunter => Bias {
                food: 0.6,
                hunt: 1.6,
                survival: 0.5,
            },
            Profile::Survivor => Bias {
                food: 0.7,
                hunt: 0.3,
                survival: 1.7,
            },
            Profile::Forager => Bias {
                food: 1.6,
                hunt: 0.4,
                survival: 0.8,
            },
        }
    }
}

/// Three difficulty-seeded sliders, each `1..=5` (spec §3 NPCState).
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    pub speed: u8,
    pub skill: u8,
    pub boldness: u8,
}

impl Difficulty {
    pub fn default_tuning(self) -> Tuning {
        match self {
            Difficulty::Easy => Tuning {
                speed: 2,
                skill: 2,
                boldness: 2,
            },
            Difficulty::Medium => Tuning {
                speed: 3,
                skill: 3,
                boldness: 3,
            },
            Difficulty::Hard => Tuning {
                speed: 4,
                skill: 4,
                boldness: 4,
            },
        }
    }
}

/// Derived per-tick decision parameters (spec §4.3). All sliders are
/// clamped to `1..=5` before use so hand-authored `npcConfigs` can't
/// produce out-of-range behavior.
#[derive(Debug, Clone, Copy)]
pub struct DerivedSettings {
    pub reaction_ms: u32,
    pub success_rate: f64,
    pub look_ahead: u32,
    pub aggression: f64,
    pub caution: f64,
    pub randomness: f64,
}

impl DerivedSettings {
    pub fn derive(tuning: Tuning) -> Self {
        let speed = tuning.speed.clamp(1, 5) as f64;
        let skill = tuning.skill.clamp(1, 5) as f64;
        let boldness = tuning.boldness.clamp(1, 5) as f64;

        let reaction_ms = (600.0 - speed * 70.0 - skill * 30.0).clamp(150.0, 600.0) as u32;
        let success_rate = (0.4 + skill * 0.12).clamp(0.4, 0.99);
        let look_ahead = ((2.0 + skill * 1.2).round() as u32).clamp(2, 8);
        let aggression = (boldness / 5.0).clamp(0.0, 1.0);
        let caution = (1.0 - aggression).clamp(0.1, 1.0);
        let randomness = (1.0 - success_rate).clamp(0.05, 0.4);

        Self {
            reaction_ms,
            success_rate,
            look_ahead,
            aggression,
            caution,
            randomness,
        }
    }
}
