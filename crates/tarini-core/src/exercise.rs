use serde::{Deserialize, Serialize};

/// Breathing pattern metadata for an exercise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BreathPattern {
    /// Breath-paced: fixed inhale and exhale phase lengths in seconds.
    Paced { inhale_secs: u32, exhale_secs: u32 },
    /// Not breath-paced; breathe at a natural rhythm.
    Free,
}

impl BreathPattern {
    /// Short pacing hint shown next to the exercise.
    pub fn hint(&self) -> String {
        match self {
            BreathPattern::Paced {
                inhale_secs,
                exhale_secs,
            } => format!("{inhale_secs}s in / {exhale_secs}s out"),
            BreathPattern::Free => "natural rhythm".to_string(),
        }
    }
}

/// Static exercise descriptor. Defined at process start, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exercise {
    pub id: String,
    pub title: String,
    pub description: String,
    pub emoji: String,
    pub pattern: BreathPattern,
}

/// The set of exercises a session can be started for.
#[derive(Debug, Clone)]
pub struct ExerciseCatalog {
    exercises: Vec<Exercise>,
}

impl ExerciseCatalog {
    pub fn new(exercises: Vec<Exercise>) -> Self {
        Self { exercises }
    }

    /// The built-in catalog.
    pub fn builtin() -> Self {
        Self {
            exercises: vec![
                Exercise {
                    id: "flower".into(),
                    title: "Smell the Flower".into(),
                    description:
                        "Take a deep breath in through your nose, as if smelling a beautiful flower"
                            .into(),
                    emoji: "\u{1F338}".into(),
                    pattern: BreathPattern::Paced {
                        inhale_secs: 4,
                        exhale_secs: 6,
                    },
                },
                Exercise {
                    id: "candle".into(),
                    title: "Blow the Candle".into(),
                    description:
                        "Breathe out slowly through your mouth, as if gently blowing out a candle"
                            .into(),
                    emoji: "\u{1F56F}\u{FE0F}".into(),
                    pattern: BreathPattern::Paced {
                        inhale_secs: 4,
                        exhale_secs: 6,
                    },
                },
                Exercise {
                    id: "bee".into(),
                    title: "Watch the Bee".into(),
                    description:
                        "Follow the bee circling around. Breathe slowly and calmly as you watch"
                            .into(),
                    emoji: "\u{1F41D}".into(),
                    pattern: BreathPattern::Free,
                },
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&Exercise> {
        self.exercises.iter().find(|e| e.id == id)
    }

    pub fn all(&self) -> &[Exercise] {
        &self.exercises
    }
}

impl Default for ExerciseCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}
