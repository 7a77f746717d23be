use serde::Deserialize;

/// Sampling knobs that are fixed per worker rather than per request.
#[derive(Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct GeneralModelConfig {
    /// Fixed sampling seed; a fresh random seed is drawn per request when unset
    pub seed: Option<u64>,
    pub repeat_penalty: f32,
    pub repeat_last_n: usize,
}

impl Default for GeneralModelConfig {
    fn default() -> Self {
        Self {
            seed: None,
            repeat_penalty: 1.0,
            repeat_last_n: 64,
        }
    }
}
