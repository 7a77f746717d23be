use anyhow::{bail, Context, Error, Result};
use candle_core::{DType, Device, Tensor, D};
use candle_nn::ops::softmax;
use candle_nn::VarBuilder;
use candle_transformers::models::debertav2::{
    Config as DebertaV2Config, DebertaV2SeqClassificationModel, Id2Label,
};
use tokenizers::{Tokenizer, TruncationParams};
use tracing::info;

use crate::inference::models::model::ModelSource;
use crate::inference::task::classify::{
    ClassifyHandler, ClassifyRequest, ClassifyResponse, Politeness,
};

/// Longest token sequence fed to the classifier; longer inputs are truncated.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

/// An encoder producing one logit per class for a piece of text.
pub trait SequenceClassifier {
    /// Returns the 1-D logits tensor for `text`.
    fn logits(&self, text: &str) -> Result<Tensor>;
}

/// Turns raw class logits into a politeness label and its probability.
pub struct ClassifierPipeline<M> {
    model: M,
}

impl<M: SequenceClassifier> ClassifierPipeline<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    pub fn probabilities(&self, text: &str) -> Result<Vec<f32>> {
        let logits = self.model.logits(text)?;
        let probabilities = softmax(&logits, D::Minus1)?
            .to_device(&Device::Cpu)?
            .to_vec1::<f32>()?;
        if probabilities.len() != Politeness::ALL.len() {
            bail!(
                "Classifier produced {} classes, expected {}",
                probabilities.len(),
                Politeness::ALL.len()
            );
        }
        Ok(probabilities)
    }
}

impl<M: SequenceClassifier> ClassifyHandler for ClassifierPipeline<M> {
    #[tracing::instrument(level = "info", skip(self, request), fields(bytes = request.text.len()))]
    fn run_classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse> {
        let probabilities = self.probabilities(&request.text)?;
        let (index, confidence) = probabilities
            .into_iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .context("Classifier produced no classes")?;
        let label = Politeness::from_index(index)
            .with_context(|| format!("No label for class index {index}"))?;
        Ok(ClassifyResponse { label, confidence })
    }
}

/// DeBERTa-v2 sequence classifier loaded from `config.json`, `tokenizer.json` and
/// `model.safetensors`.
pub struct DebertaClassifier {
    model: DebertaV2SeqClassificationModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl DebertaClassifier {
    #[tracing::instrument(level = "info", skip(source))]
    pub fn load(source: &ModelSource, device: Device) -> Result<Self> {
        let start = std::time::Instant::now();
        let config_file = source.get("config.json")?;
        let tokenizer_file = source.get("tokenizer.json")?;
        let weights_file = source.get("model.safetensors")?;

        let config: DebertaV2Config = serde_json::from_str(&std::fs::read_to_string(config_file)?)
            .context("Failed to parse classifier config")?;

        let mut tokenizer = Tokenizer::from_file(tokenizer_file).map_err(Error::msg)?;
        tokenizer
            .with_padding(None)
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_LENGTH,
                ..Default::default()
            }))
            .map_err(Error::msg)?;

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_file], DType::F32, &device)? };
        let labels = fallback_labels(config.id2label.as_ref());
        let model = DebertaV2SeqClassificationModel::load(vb.set_prefix("deberta"), &config, labels)?;

        info!("Loaded the classifier in {:?}", start.elapsed());
        Ok(Self {
            model,
            tokenizer,
            device,
        })
    }
}

/// Label map for checkpoints whose config carries no `id2label`. Candle rejects a
/// map that differs from a configured one, so none is passed in that case.
fn fallback_labels(configured: Option<&Id2Label>) -> Option<Id2Label> {
    match configured {
        Some(_) => None,
        None => Some(
            Politeness::ALL
                .iter()
                .enumerate()
                .map(|(index, label)| (index as u32, label.as_str().to_string()))
                .collect(),
        ),
    }
}

impl SequenceClassifier for DebertaClassifier {
    fn logits(&self, text: &str) -> Result<Tensor> {
        let encoding = self.tokenizer.encode(text, true).map_err(Error::msg)?;
        let input_ids = Tensor::new(encoding.get_ids(), &self.device)?.unsqueeze(0)?;
        let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)?.unsqueeze(0)?;
        let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)?.unsqueeze(0)?;

        let logits = self
            .model
            .forward(&input_ids, Some(token_type_ids), Some(attention_mask))?;
        Ok(logits.squeeze(0)?.to_dtype(DType::F32)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedLogits(Vec<f32>);

    impl SequenceClassifier for FixedLogits {
        fn logits(&self, _text: &str) -> Result<Tensor> {
            Ok(Tensor::new(self.0.as_slice(), &Device::Cpu)?)
        }
    }

    fn classify(logits: &[f32]) -> Result<ClassifyResponse> {
        ClassifierPipeline::new(FixedLogits(logits.to_vec())).run_classify(ClassifyRequest {
            text: "thank you so much!".into(),
        })
    }

    #[test]
    fn picks_the_most_likely_class() {
        let response = classify(&[-1.0, 0.5, 3.0]).unwrap();
        assert_eq!(response.label, Politeness::Polite);
        assert!(response.confidence > 0.5 && response.confidence <= 1.0);

        let response = classify(&[4.0, 0.0, 0.0]).unwrap();
        assert_eq!(response.label, Politeness::Impolite);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let pipeline = ClassifierPipeline::new(FixedLogits(vec![0.3, -2.0, 1.7]));
        let probabilities = pipeline.probabilities("").unwrap();
        let sum: f32 = probabilities.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probabilities.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn uniform_logits_give_a_third() {
        let response = classify(&[0.0, 0.0, 0.0]).unwrap();
        assert!((response.confidence - 1.0 / 3.0).abs() < 1e-5);
    }

    #[test]
    fn wrong_class_count_is_an_error() {
        let err = classify(&[0.1, 0.9]).unwrap_err();
        assert_eq!(err.to_string(), "Classifier produced 2 classes, expected 3");
    }

    #[test]
    fn labels_are_only_supplied_when_the_config_has_none() {
        let labels = fallback_labels(None).unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[&0], "impolite");
        assert_eq!(labels[&2], "polite");

        let configured: Id2Label = [(0, "rude".to_string())].into_iter().collect();
        assert!(fallback_labels(Some(&configured)).is_none());
    }

    #[test]
    fn loader_reports_missing_checkpoint_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.json"), "{}").unwrap();
        let source = ModelSource::open(dir.path().to_str().unwrap(), "main").unwrap();

        let err = DebertaClassifier::load(&source, Device::Cpu).err().unwrap();
        assert!(err.to_string().starts_with("Missing tokenizer.json"));
    }

    #[test]
    #[ignore = "requires a politeness checkpoint in POLITENESS_MODEL_DIR"]
    fn reference_checkpoint_finds_gratitude_polite() {
        let dir = std::env::var("POLITENESS_MODEL_DIR").unwrap();
        let source = ModelSource::open(&dir, "main").unwrap();
        let model = DebertaClassifier::load(&source, Device::Cpu).unwrap();
        let pipeline = ClassifierPipeline::new(model);

        let response = pipeline
            .run_classify(ClassifyRequest {
                text: "thank you so much!".into(),
            })
            .unwrap();
        assert_eq!(response.label, Politeness::Polite);
        assert!(response.confidence >= 0.5);

        let empty = pipeline.run_classify(ClassifyRequest::default()).unwrap();
        assert!((0.0..=1.0).contains(&empty.confidence));
    }
}
