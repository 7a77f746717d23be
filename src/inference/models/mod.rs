pub mod mistral;
pub mod model;
pub mod politeness;
