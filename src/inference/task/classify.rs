use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
pub struct ClassifyRequest {
    #[serde(default)]
    pub text: String,
}

/// Politeness classes in the order of the classifier's output logits.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Politeness {
    Impolite,
    Neutral,
    Polite,
}

impl Politeness {
    /// Index order must match the label order the checkpoint was trained with.
    pub const ALL: [Politeness; 3] = [Politeness::Impolite, Politeness::Neutral, Politeness::Polite];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Politeness::Impolite => "impolite",
            Politeness::Neutral => "neutral",
            Politeness::Polite => "polite",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ClassifyResponse {
    pub label: Politeness,
    pub confidence: f32,
}

pub trait ClassifyHandler {
    fn run_classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse>;
}
