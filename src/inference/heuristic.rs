use anyhow::Result;

use crate::inference::task::classify::{
    ClassifyHandler, ClassifyRequest, ClassifyResponse, Politeness,
};

const COURTESY: [&str; 3] = ["please", "could you", "would you"];
const GRATITUDE: [&str; 1] = ["thank"];
const DEMANDS: [&str; 4] = ["now!", "right now", "hurry", "tell me"];

/// Keyword scorer used when no classifier checkpoint is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn score(text: &str) -> i32 {
        let lower = text.to_lowercase();
        let mentions = |words: &[&str]| words.iter().any(|word| lower.contains(word));

        let mut score = 0;
        if mentions(&COURTESY) {
            score += 2;
        }
        if mentions(&GRATITUDE) {
            score += 2;
        }
        if mentions(&DEMANDS) {
            score -= 2;
        }
        if text.ends_with('!') {
            score -= 1;
        }
        if text.chars().count() < 4 {
            score -= 1;
        }
        score
    }
}

impl ClassifyHandler for HeuristicClassifier {
    fn run_classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse> {
        let score = Self::score(&request.text);
        let label = match score {
            s if s >= 2 => Politeness::Polite,
            s if s <= -1 => Politeness::Impolite,
            _ => Politeness::Neutral,
        };
        let confidence = (score.abs() as f32 / 3.0).clamp(0.3, 0.95);
        Ok(ClassifyResponse { label, confidence })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(text: &str) -> ClassifyResponse {
        HeuristicClassifier
            .run_classify(ClassifyRequest { text: text.into() })
            .unwrap()
    }

    #[test]
    fn courteous_requests_are_polite() {
        let response = classify("Could you please help me? Thank you.");
        assert_eq!(response.label, Politeness::Polite);
        assert_eq!(response.confidence, 0.95);
    }

    #[test]
    fn demands_are_impolite() {
        let response = classify("Tell me the answer right now!");
        assert_eq!(response.label, Politeness::Impolite);
        assert_eq!(HeuristicClassifier::score("Tell me the answer right now!"), -3);
        assert_eq!(response.confidence, 0.95);
    }

    #[test]
    fn plain_statements_are_neutral() {
        let response = classify("The tower clock struck nine.");
        assert_eq!(response.label, Politeness::Neutral);
        assert_eq!(response.confidence, 0.3);
    }

    #[test]
    fn short_and_empty_texts_lean_impolite() {
        assert_eq!(HeuristicClassifier::score(""), -1);
        assert_eq!(classify("").label, Politeness::Impolite);
        assert_eq!(classify("ok").label, Politeness::Impolite);
    }

    #[test]
    fn exclaimed_gratitude_scores_one() {
        assert_eq!(HeuristicClassifier::score("thank you so much!"), 1);
    }
}
