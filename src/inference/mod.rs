pub mod classifier_pipeline;
pub mod device;
pub mod heuristic;
pub mod model_config;
pub mod models;
pub mod task;
pub mod text_pipeline;
