//! Core burn severity processing modules

pub mod windows;
pub mod composite;
pub mod indices;
pub mod assemble;
pub mod metrics;
pub mod pipeline;

// Re-export main types
pub use windows::{derive_windows, DurationTier, FireWindows, PostFireWindow};
pub use composite::{CompositeBuilder, CompositeImage, CompositeParams, FireComposites};
pub use indices::{BandDeriver, DeriverParams, DerivedLayers, ThresholdClassifier, ThresholdRule};
pub use assemble::{assemble, MultiBandImage};
pub use metrics::{confusion_and_metrics, ClassMetrics, ConfusionMatrix, MetricsTable};
pub use pipeline::{BurnSeverityPipeline, PipelineOutput, PreparedImages};
