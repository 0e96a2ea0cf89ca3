mod analyzer;
mod emotion;
mod sampler;

pub use analyzer::{AnalyzerConfig, FrequencyAnalyzer};
pub use emotion::{EmotionSnapshot, SpectrumFeatures};
pub use sampler::TelemetrySampler;
