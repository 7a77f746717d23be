use anyhow::Result;
use candle_core::Device;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::inference::classifier_pipeline::{ClassifierPipeline, DebertaClassifier};
use crate::inference::heuristic::HeuristicClassifier;
use crate::inference::models::model::ModelSource;
use crate::inference::task::classify::{ClassifyHandler, ClassifyRequest, ClassifyResponse};

#[derive(ValueEnum, Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierBackend {
    /// Fine-tuned DeBERTa-v2 checkpoint
    #[default]
    Model,
    /// Keyword heuristic, needs no weights
    Heuristic,
}

/// The politeness classifier selected at startup.
pub enum PolitenessModel {
    Deberta(ClassifierPipeline<DebertaClassifier>),
    Heuristic(HeuristicClassifier),
}

impl PolitenessModel {
    /// Loads the checkpoint at `model_id`; the device is only resolved for the model backend.
    #[tracing::instrument(level = "info", skip(device))]
    pub fn new(
        backend: ClassifierBackend,
        model_id: &str,
        revision: &str,
        device: impl FnOnce() -> Result<Device>,
    ) -> Result<Self> {
        match backend {
            ClassifierBackend::Model => {
                let source = ModelSource::open(model_id, revision)?;
                let classifier = DebertaClassifier::load(&source, device()?)?;
                Ok(PolitenessModel::Deberta(ClassifierPipeline::new(classifier)))
            }
            ClassifierBackend::Heuristic => {
                info!("Using the keyword heuristic classifier");
                Ok(PolitenessModel::Heuristic(HeuristicClassifier))
            }
        }
    }
}

impl ClassifyHandler for PolitenessModel {
    fn run_classify(&self, request: ClassifyRequest) -> Result<ClassifyResponse> {
        match self {
            PolitenessModel::Deberta(pipeline) => pipeline.run_classify(request),
            PolitenessModel::Heuristic(heuristic) => heuristic.run_classify(request),
        }
    }
}
