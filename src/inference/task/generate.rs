use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Opening delimiter of a Mistral-Instruct instruction turn.
pub const INST_OPEN: &str = "[INST]";
/// Closing delimiter of a Mistral-Instruct instruction turn.
pub const INST_CLOSE: &str = "[/INST]";

/// Nucleus sampling mass used for every generation request.
pub const TOP_P: f64 = 0.95;
pub const DEFAULT_TEMPERATURE: f64 = 0.6;
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_max_new_tokens() -> usize {
    DEFAULT_MAX_NEW_TOKENS
}

impl GenerateRequest {
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature <= 0. {
            bail!(
                "temperature must be a strictly positive number, got {}",
                self.temperature
            );
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct GenerateResponse {
    pub content: String,
}

pub trait GenerateHandler {
    fn run_generate(&mut self, request: GenerateRequest) -> Result<GenerateResponse>;
}

/// Renders a conversation in the Mistral-Instruct format the model was tuned on.
///
/// Spacing and delimiters are part of the model contract: deviations do not fail,
/// they silently degrade the output.
pub fn render_prompt(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| match message.role {
            Role::System => format!("<s>{INST_OPEN} {} {INST_CLOSE}</s>", message.content),
            Role::User => format!("<s>{INST_OPEN} {} {INST_CLOSE}", message.content),
            Role::Assistant => message.content.clone(),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keeps only the text after the last closing delimiter, trimmed.
///
/// Falls back to the whole trimmed text when the delimiter is absent.
pub fn extract_reply(decoded: &str) -> &str {
    match decoded.rsplit_once(INST_CLOSE) {
        Some((_, reply)) => reply.trim(),
        None => decoded.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(role: Role, content: &str) -> Message {
        Message {
            role,
            content: content.into(),
        }
    }

    #[test]
    fn renders_each_role_with_its_template() {
        let prompt = render_prompt(&[
            message(Role::System, "Be brief."),
            message(Role::User, "Hi"),
            message(Role::Assistant, "Hello!"),
            message(Role::User, "Bye"),
        ]);
        assert_eq!(
            prompt,
            "<s>[INST] Be brief. [/INST]</s>\n<s>[INST] Hi [/INST]\nHello!\n<s>[INST] Bye [/INST]"
        );
    }

    #[test]
    fn system_then_user_keeps_delimiter_order() {
        let prompt = render_prompt(&[
            message(Role::System, "rules"),
            message(Role::User, "question"),
        ]);
        let first_open = prompt.find(INST_OPEN).unwrap();
        let first_close = prompt.find(INST_CLOSE).unwrap();
        let last_open = prompt.rfind(INST_OPEN).unwrap();
        let last_close = prompt.rfind(INST_CLOSE).unwrap();
        assert!(first_open < first_close);
        assert!(first_close < last_open);
        assert!(last_open < last_close);
        assert!(prompt.find("rules").unwrap() < prompt.find("question").unwrap());
    }

    #[test]
    fn empty_conversation_renders_empty_prompt() {
        assert_eq!(render_prompt(&[]), "");
    }

    #[test]
    fn extracts_text_after_the_final_delimiter() {
        let decoded = "[INST] rules [/INST]\n[INST] question [/INST]  The answer.  ";
        assert_eq!(extract_reply(decoded), "The answer.");
    }

    #[test]
    fn reply_is_empty_when_nothing_follows_the_delimiter() {
        assert_eq!(extract_reply("[INST] question [/INST]"), "");
    }

    #[test]
    fn falls_back_to_the_whole_text_without_delimiter() {
        assert_eq!(extract_reply("  just text \n"), "just text");
    }

    #[test]
    fn request_defaults() {
        let request: GenerateRequest = serde_json::from_str("{}").unwrap();
        assert!(request.messages.is_empty());
        assert_eq!(request.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(request.max_new_tokens, DEFAULT_MAX_NEW_TOKENS);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_temperature() {
        let request: GenerateRequest = serde_json::from_str(r#"{"temperature": 0}"#).unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn unknown_roles_fail_to_decode() {
        let result = serde_json::from_str::<GenerateRequest>(
            r#"{"messages": [{"role": "narrator", "content": "x"}]}"#,
        );
        assert!(result.is_err());
    }
}
