use serde::{Deserialize, Serialize};

use voicecall_core::types::MemoryCategory;

/// What kind of memory this is (§4.10). A superset of the tool-facing
/// `MemoryCategory`: `Story` only ever comes from post-call extraction, never
/// from `save_important_detail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Fact,
    Preference,
    Relationship,
    Event,
    Concern,
    Story,
}

impl MemoryType {
    /// Per-type cap applied by `build_context` (§4.10).
    pub fn context_cap(&self) -> usize {
        match self {
            MemoryType::Fact => 3,
            MemoryType::Preference => 3,
            MemoryType::Relationship => 2,
            MemoryType::Event => 3,
            MemoryType::Concern => 2,
            MemoryType::Story => 2,
        }
    }

    pub fn all() -> [MemoryType; 6] {
        [
            MemoryType::Fact,
            MemoryType::Preference,
            MemoryType::Relationship,
            MemoryType::Event,
            MemoryType::Concern,
            MemoryType::Story,
        ]
    }
}

impl From<MemoryCategory> for MemoryType {
    fn from(category: MemoryCategory) -> Self {
        match category {
            MemoryCategory::Fact => MemoryType::Fact,
            MemoryCategory::Preference => MemoryType::Preference,
            MemoryCategory::Event => MemoryType::Event,
            MemoryCategory::Concern => MemoryType::Concern,
            MemoryCategory::Relationship => MemoryType::Relationship,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemoryType::Fact => "fact",
            MemoryType::Preference => "preference",
            MemoryType::Relationship => "relationship",
            MemoryType::Event => "event",
            MemoryType::Concern => "concern",
            MemoryType::Story => "story",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MemoryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryType::Fact),
            "preference" => Ok(MemoryType::Preference),
            "relationship" => Ok(MemoryType::Relationship),
            "event" => Ok(MemoryType::Event),
            "concern" => Ok(MemoryType::Concern),
            "story" => Ok(MemoryType::Story),
            other => Err(format!("unknown memory type '{other}'")),
        }
    }
}

/// How a memory entered the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemorySource {
    /// The senior said it and the voice LLM called `save_important_detail`.
    ToolCall,
    /// Extracted from the transcript by the post-call processor.
    Extracted,
    /// Entered by a caregiver or operator out of band.
    AdminSet,
}

impl std::fmt::Display for MemorySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MemorySource::ToolCall => "tool_call",
            MemorySource::Extracted => "extracted",
            MemorySource::AdminSet => "admin_set",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MemorySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tool_call" => Ok(MemorySource::ToolCall),
            "extracted" => Ok(MemorySource::Extracted),
            "admin_set" => Ok(MemorySource::AdminSet),
            other => Err(format!("unknown memory source '{other}'")),
        }
    }
}

pub const MAX_IMPORTANCE: i32 = 100;
pub const MIN_IMPORTANCE: i32 = 0;
pub const DEDUP_COSINE_THRESHOLD: f32 = 0.92;
pub const DECAY_HALF_LIFE_DAYS: f64 = 180.0;

/// One stored memory about a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub tenant_id: String,
    pub memory_type: MemoryType,
    pub content: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub importance: i32,
    pub source: MemorySource,
    pub last_accessed_at: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl Memory {
    /// Importance scaled by temporal decay, for ranking only — storage is
    /// never mutated by this (§4.10).
    pub fn decayed_importance(&self, now: chrono::DateTime<chrono::Utc>) -> f64 {
        let age_days = (now - self.last_accessed_at).num_seconds() as f64 / 86_400.0;
        self.importance as f64 * (-age_days.max(0.0) / DECAY_HALF_LIFE_DAYS).exp()
    }
}

/// A ranked search hit.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    pub memory: Memory,
    pub cosine: f32,
}

/// One item as extracted from a transcript by the extraction LLM, before
/// validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedItem {
    pub memory_type: String,
    pub content: String,
    #[serde(default)]
    pub importance: Option<i32>,
}
