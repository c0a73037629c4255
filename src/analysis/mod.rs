//! Analyzer boundary: submission client and the structured result it returns.

pub mod client;
pub mod result;

pub use client::{AnalyzerClient, AUDIO_FIELD_NAME};
pub use result::{AnalysisResult, MetricPoint};
