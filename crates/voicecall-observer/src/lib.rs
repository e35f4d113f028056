pub mod patterns;
pub mod types;

pub use patterns::{analyze, categories, Patterns};
pub use types::{
    AnalysisRecord, EngagementLevel, ModelRecommendation, Severity, Signal, SignalCategory,
    Valence,
};
