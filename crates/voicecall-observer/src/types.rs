use serde::{Deserialize, Serialize};

use voicecall_flow::GoodbyeStrength;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum SignalCategory {
    Health,
    Safety,
    Emotion,
    Social,
    Family,
    Activity,
    Time,
    Environment,
    ReminderAcknowledgment,
}

pub const ALL_CATEGORIES: [SignalCategory; 9] = [
    SignalCategory::Health,
    SignalCategory::Safety,
    SignalCategory::Emotion,
    SignalCategory::Social,
    SignalCategory::Family,
    SignalCategory::Activity,
    SignalCategory::Time,
    SignalCategory::Environment,
    SignalCategory::ReminderAcknowledgment,
];

/// How severe/intense a single matched signal is. Meaning is category-
/// specific: for health/safety it's clinical severity, for emotion it's
/// intensity, for everything else it's unused (`Low`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Emotional valence of a matched signal; only meaningful for `Emotion`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Valence {
    Negative,
    Neutral,
    Positive,
}

/// One matched signal: a category plus the severity/valence/intensity
/// dimension §4.2 requires alongside it, and the sub-signal name used for
/// scenario-level identification (e.g. `health:fall`, `time:reminiscing`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub category: SignalCategory,
    pub name: &'static str,
    pub matched: String,
    pub severity: Severity,
    pub valence: Valence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    Normal,
    High,
}

/// Max-tokens recommendation for the upcoming LLM call, with the reason it
/// was chosen (surfaced in logs, never shown to the caregiver/senior).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecommendation {
    pub max_tokens: u32,
    pub reason: String,
}

impl ModelRecommendation {
    pub const MIN_TOKENS: u32 = 60;
    pub const MAX_TOKENS: u32 = 250;

    pub fn new(max_tokens: u32, reason: impl Into<String>) -> Self {
        Self {
            max_tokens: max_tokens.clamp(Self::MIN_TOKENS, Self::MAX_TOKENS),
            reason: reason.into(),
        }
    }
}

/// Output of one synchronous Layer-1 analysis pass over a user utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub signals: Vec<Signal>,
    pub is_question: bool,
    pub engagement: EngagementLevel,
    pub goodbye_strength: GoodbyeStrength,
    pub needs_web_search: bool,
    pub guidance: String,
    pub recommendation: ModelRecommendation,
}

impl AnalysisRecord {
    pub fn has_signal(&self, category: SignalCategory) -> bool {
        self.signals.iter().any(|s| s.category == category)
    }

    pub fn has_named_signal(&self, category: SignalCategory, name: &str) -> bool {
        self.signals
            .iter()
            .any(|s| s.category == category && s.name == name)
    }
}
