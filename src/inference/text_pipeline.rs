use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Error, Result};
use candle_core::quantized::gguf_file;
use candle_core::{DType, Device, Tensor};
use candle_transformers::generation::LogitsProcessor;
use candle_transformers::models::quantized_llama::ModelWeights;
use candle_transformers::utils::apply_repeat_penalty;
use tokenizers::Tokenizer;
use tracing::info;

use crate::inference::task::generate::{INST_CLOSE, INST_OPEN};

/// Per-request sampling parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub seed: u64,
    pub temperature: f64,
    pub top_p: f64,
    pub max_new_tokens: usize,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

/// A causal language model that continues a prompt.
pub trait TextGeneration {
    /// Returns the decoded prompt followed by the sampled continuation, with
    /// control tokens stripped and instruction delimiters kept.
    fn generate(&mut self, prompt: &str, params: &SamplingParams) -> Result<String>;
}

// Taken from
// https://github.com/huggingface/candle/blob/main/candle-examples/examples/mistral/main.rs
// https://github.com/huggingface/candle/blob/main/candle-examples/examples/quantized/main.rs
pub struct TextGeneratorPipeline {
    model: ModelWeights,
    device: Device,
    tokenizer: Tokenizer,
    eos_token: u32,
    /// Special tokens dropped when decoding, which excludes the instruction delimiters
    control_tokens: HashSet<u32>,
}

impl TextGeneratorPipeline {
    #[tracing::instrument(level = "info", skip(device))]
    pub fn with_quantized_gguf(
        tokenizer_file: &Path,
        gguf_file: &Path,
        device: Device,
    ) -> Result<TextGeneratorPipeline> {
        let start = std::time::Instant::now();
        let mut file = std::fs::File::open(gguf_file)?;
        let model_reader = gguf_file::Content::read(&mut file).map_err(|e| e.with_path(gguf_file))?;
        let model = ModelWeights::from_gguf(model_reader, &mut file, &device)?;
        let tokenizer = Tokenizer::from_file(tokenizer_file).map_err(Error::msg)?;

        let eos_token = match tokenizer.get_vocab(true).get("</s>") {
            Some(token) => *token,
            None => bail!("Cannot find </s> token"),
        };
        let control_tokens = control_tokens(&tokenizer);

        info!("Loaded the generator in {:?}", start.elapsed());
        Ok(TextGeneratorPipeline {
            model,
            device,
            tokenizer,
            eos_token,
            control_tokens,
        })
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        decode_without(&self.tokenizer, &self.control_tokens, tokens)
    }
}

/// Special tokens of `tokenizer` other than the instruction delimiters.
fn control_tokens(tokenizer: &Tokenizer) -> HashSet<u32> {
    tokenizer
        .get_added_tokens_decoder()
        .iter()
        .filter(|(_, token)| {
            token.special && token.content != INST_OPEN && token.content != INST_CLOSE
        })
        .map(|(id, _)| *id)
        .collect()
}

fn decode_without(tokenizer: &Tokenizer, dropped: &HashSet<u32>, tokens: &[u32]) -> Result<String> {
    let kept: Vec<u32> = tokens
        .iter()
        .copied()
        .filter(|token| !dropped.contains(token))
        .collect();
    tokenizer.decode(&kept, false).map_err(Error::msg)
}

impl TextGeneration for TextGeneratorPipeline {
    #[tracing::instrument(level = "info", skip(self, prompt))]
    fn generate(&mut self, prompt: &str, params: &SamplingParams) -> Result<String> {
        // The rendered prompt carries its own <s> markers
        let mut tokens = self
            .tokenizer
            .encode(prompt, false)
            .map_err(Error::msg)?
            .get_ids()
            .to_vec();
        if tokens.is_empty() {
            bail!("Prompt is empty");
        }
        let prompt_tokens = tokens.len();

        let mut logits_processor =
            LogitsProcessor::new(params.seed, Some(params.temperature), Some(params.top_p));
        let start_gen = std::time::Instant::now();
        for index in 0..params.max_new_tokens {
            // The first pass sees the whole prompt at position 0, which also resets the kv cache
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let start_pos = tokens.len().saturating_sub(context_size);
            let input = Tensor::new(&tokens[start_pos..], &self.device)?.unsqueeze(0)?;
            let logits = self.model.forward(&input, start_pos)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if (params.repeat_penalty - 1.).abs() < f32::EPSILON {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(params.repeat_last_n);
                apply_repeat_penalty(&logits, params.repeat_penalty, &tokens[start_at..])?
            };

            let next_token = logits_processor.sample(&logits)?;
            if next_token == self.eos_token {
                break;
            }
            tokens.push(next_token);
        }

        let generated = tokens.len() - prompt_tokens;
        let elapsed = start_gen.elapsed();
        info!(
            "{generated} tokens generated after a {prompt_tokens} token prompt ({:.2} token/s)",
            generated as f64 / elapsed.as_secs_f64()
        );
        self.decode(&tokens)
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::inference::task::generate::extract_reply;

    const TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "<s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 1, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 2, "content": "[INST]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
            {"id": 3, "content": "[/INST]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "WhitespaceSplit"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"<s>": 0, "</s>": 1, "[INST]": 2, "[/INST]": 3, "<unk>": 4, "hi": 5, "hello": 6},
            "unk_token": "<unk>"
        }
    }"#;

    #[test]
    fn only_non_delimiter_special_tokens_are_control_tokens() {
        let tokenizer = Tokenizer::from_str(TOKENIZER).unwrap();
        let control = control_tokens(&tokenizer);
        assert_eq!(control, HashSet::from([0, 1]));
    }

    #[test]
    fn decoding_keeps_delimiters_for_reply_extraction() {
        let tokenizer = Tokenizer::from_str(TOKENIZER).unwrap();
        let control = control_tokens(&tokenizer);

        // <s> [INST] hi [/INST] hello </s>
        let decoded = decode_without(&tokenizer, &control, &[0, 2, 5, 3, 6, 1]).unwrap();
        assert!(!decoded.contains("<s>"));
        assert!(!decoded.contains("</s>"));
        assert!(decoded.contains(INST_OPEN));
        assert!(decoded.contains(INST_CLOSE));
        assert_eq!(extract_reply(&decoded), "hello");
    }
}
