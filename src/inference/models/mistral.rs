use anyhow::Result;
use candle_core::Device;
use rand::random;
use tracing::debug;

use crate::inference::model_config::GeneralModelConfig;
use crate::inference::models::model::ModelSource;
use crate::inference::task::generate::{
    extract_reply, render_prompt, GenerateHandler, GenerateRequest, GenerateResponse, TOP_P,
};
use crate::inference::text_pipeline::{SamplingParams, TextGeneration, TextGeneratorPipeline};

/// Where the Mistral-Instruct tokenizer and quantized weights are loaded from.
#[derive(Debug, Clone)]
pub struct MistralFiles<'a> {
    pub tokenizer_repo: &'a str,
    pub gguf_repo: &'a str,
    pub gguf_filename: &'a str,
    pub revision: &'a str,
}

/// Chat generation with a Mistral-Instruct model.
pub struct MistralInstructModel<G = TextGeneratorPipeline> {
    generator: G,
    general_model_config: GeneralModelConfig,
}

impl MistralInstructModel {
    #[tracing::instrument(level = "info", skip(device))]
    pub fn new(
        files: &MistralFiles,
        device: Device,
        general_model_config: GeneralModelConfig,
    ) -> Result<Self> {
        let tokenizer_file = ModelSource::open(files.tokenizer_repo, files.revision)?
            .get("tokenizer.json")?;
        let gguf_file =
            ModelSource::open(files.gguf_repo, files.revision)?.get(files.gguf_filename)?;

        let generator =
            TextGeneratorPipeline::with_quantized_gguf(&tokenizer_file, &gguf_file, device)?;
        Ok(Self::with_generator(generator, general_model_config))
    }
}

impl<G> MistralInstructModel<G> {
    pub fn with_generator(generator: G, general_model_config: GeneralModelConfig) -> Self {
        Self {
            generator,
            general_model_config,
        }
    }
}

impl<G: TextGeneration> GenerateHandler for MistralInstructModel<G> {
    #[tracing::instrument(
        level = "info",
        skip(self, request),
        fields(messages = request.messages.len(), max_new_tokens = request.max_new_tokens)
    )]
    fn run_generate(&mut self, request: GenerateRequest) -> Result<GenerateResponse> {
        request.validate()?;
        let prompt = render_prompt(&request.messages);
        debug!("Rendered prompt: {prompt}");

        let params = SamplingParams {
            seed: self.general_model_config.seed.unwrap_or_else(random),
            temperature: request.temperature,
            top_p: TOP_P,
            max_new_tokens: request.max_new_tokens,
            repeat_penalty: self.general_model_config.repeat_penalty,
            repeat_last_n: self.general_model_config.repeat_last_n,
        };
        let decoded = self.generator.generate(&prompt, &params)?;

        Ok(GenerateResponse {
            content: extract_reply(&decoded).to_string(),
        })
    }
}
