use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use clap_serde_derive::ClapSerde;

use crate::inference::device::DeviceKind;
use crate::inference::model_config::GeneralModelConfig;
use crate::inference::models::mistral::MistralFiles;
use crate::inference::models::politeness::ClassifierBackend;

pub const DEFAULT_CONFIG_FILE: &str = "ModelWorker.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "MODEL_WORKER_CONFIG_FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

impl Args {
    /// Merges the configuration file with flags and environment, flags winning.
    ///
    /// A missing default configuration file is not an error, a missing explicit one is.
    pub fn into_config(mut self) -> Result<Config> {
        if self.config_file == DEFAULT_CONFIG_FILE && !Path::new(&self.config_file).exists() {
            return Ok(Config::from(&mut self.opt_config));
        }
        let file_config = Config::from_toml(&self.config_file).with_context(|| {
            format!("Failed to read configuration file {}", self.config_file)
        })?;
        Ok(Config::from(file_config).merge(&mut self.opt_config))
    }
}

#[derive(ClapSerde, Debug, Clone)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env = "MODEL_WORKER_ADDRESS")]
    pub address: String,

    /// The port the listener binds to
    #[default(25566)]
    #[arg(short, long, env = "MODEL_WORKER_PORT")]
    pub port: u16,

    /// Compute device for model inference
    #[default(DeviceKind::Auto)]
    #[arg(long, env = "MODEL_WORKER_DEVICE", value_enum)]
    pub device: DeviceKind,

    /// Ordinal of the GPU to use
    #[default(0)]
    #[arg(long, env = "MODEL_WORKER_DEVICE_ORDINAL")]
    pub device_ordinal: usize,

    /// Politeness classifier implementation
    #[default(ClassifierBackend::Model)]
    #[arg(long, env = "MODEL_WORKER_CLASSIFIER_BACKEND", value_enum)]
    pub classifier_backend: ClassifierBackend,

    /// Local directory or hub repository of the politeness classifier
    #[default("politeness_detector".to_string())]
    #[arg(long, env = "MODEL_WORKER_CLASSIFIER_MODEL")]
    pub classifier_model: String,

    /// Local directory or hub repository holding the generator tokenizer
    #[default("mistralai/Mistral-7B-Instruct-v0.3".to_string())]
    #[arg(long, env = "MODEL_WORKER_GENERATOR_REPO")]
    pub generator_repo: String,

    /// Local directory or hub repository holding the quantized generator weights
    #[default("MaziyarPanahi/Mistral-7B-Instruct-v0.3-GGUF".to_string())]
    #[arg(long, env = "MODEL_WORKER_GENERATOR_GGUF_REPO")]
    pub generator_gguf_repo: String,

    /// File name of the quantized generator weights
    #[default("Mistral-7B-Instruct-v0.3.Q4_K_M.gguf".to_string())]
    #[arg(long, env = "MODEL_WORKER_GENERATOR_GGUF_FILE")]
    pub generator_gguf_file: String,

    /// Hub revision used for every hub repository
    #[default("main".to_string())]
    #[arg(long, env = "MODEL_WORKER_REVISION")]
    pub revision: String,

    /// Fixed sampling seed, random per request when unset
    #[arg(long, env = "MODEL_WORKER_SEED")]
    pub seed: Option<u64>,

    /// Repetition penalty, 1.0 disables it
    #[default(1.0)]
    #[arg(long, env = "MODEL_WORKER_REPEAT_PENALTY")]
    pub repeat_penalty: f32,

    /// Number of trailing tokens the repetition penalty looks at
    #[default(64)]
    #[arg(long, env = "MODEL_WORKER_REPEAT_LAST_N")]
    pub repeat_last_n: usize,

    /// OTLP gRPC endpoint for traces and metrics
    #[arg(long, env = "MODEL_WORKER_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Keep console logging while exporting to OTLP
    #[default(false)]
    #[arg(long, env = "MODEL_WORKER_CONSOLE")]
    pub console: bool,
}

impl Config {
    pub fn from_toml(path: &str) -> Result<<Config as ClapSerde>::Opt> {
        let str = std::fs::read_to_string(path)?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }

    pub fn general_model_config(&self) -> GeneralModelConfig {
        GeneralModelConfig {
            seed: self.seed,
            repeat_penalty: self.repeat_penalty,
            repeat_last_n: self.repeat_last_n,
        }
    }

    pub fn mistral_files(&self) -> MistralFiles<'_> {
        MistralFiles {
            tokenizer_repo: &self.generator_repo,
            gguf_repo: &self.generator_gguf_repo,
            gguf_filename: &self.generator_gguf_file,
            revision: &self.revision,
        }
    }
}
