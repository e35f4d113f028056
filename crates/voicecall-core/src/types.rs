use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque tenant (senior) identifier — UUIDv7, time-sortable for log correlation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Telephony-provider call SID — opaque, assigned by the telephony provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSid(pub String);

impl CallSid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for CallSid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CallSid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for CallSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Conversation record identifier — one per call attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A tenant of the check-in system: the senior being called.
///
/// Immutable `id`; everything else is updated by the (external) admin surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    /// E.164 canonical phone number.
    pub phone: String,
    /// IANA timezone, e.g. `"America/New_York"`.
    pub timezone: String,
    pub interests: Vec<String>,
    pub family_info: Option<String>,
    pub medical_notes: Option<String>,
    /// Minutes since local midnight.
    pub quiet_hours_start: Option<u16>,
    pub quiet_hours_end: Option<u16>,
    pub active: bool,
}

/// Many-to-many association between an external caregiver user and a tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaregiverLink {
    pub user_id: String,
    pub tenant_id: TenantId,
    pub role: String,
}

/// Lifecycle status of a conversation record. Transitions are monotonic:
/// `in_progress` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    InProgress,
    Completed,
    Failed,
    NoAnswer,
    Busy,
}

impl ConversationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ConversationStatus::InProgress)
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConversationStatus::InProgress => "in_progress",
            ConversationStatus::Completed => "completed",
            ConversationStatus::Failed => "failed",
            ConversationStatus::NoAnswer => "no_answer",
            ConversationStatus::Busy => "busy",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "no_answer" => Ok(Self::NoAnswer),
            "busy" => Ok(Self::Busy),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

/// Role of a single transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl fmt::Display for TurnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnRole::User => write!(f, "user"),
            TurnRole::Assistant => write!(f, "assistant"),
        }
    }
}

/// One line of an in-call transcript. The transcript is append-only while a
/// call is live; timestamps are monotonically non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// What kind of reminder this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderType {
    Medication,
    Appointment,
    Custom,
}

impl fmt::Display for ReminderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReminderType::Medication => write!(f, "medication"),
            ReminderType::Appointment => write!(f, "appointment"),
            ReminderType::Custom => write!(f, "custom"),
        }
    }
}

impl std::str::FromStr for ReminderType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "medication" => Ok(Self::Medication),
            "appointment" => Ok(Self::Appointment),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown reminder type: {other}")),
        }
    }
}

/// Exactly one of `scheduled_time`/`recurrence` is set — enforced at
/// construction by `Reminder::one_shot`/`Reminder::recurring`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub tenant_id: TenantId,
    pub reminder_type: ReminderType,
    pub title: String,
    pub description: Option<String>,
    pub scheduled_time: Option<chrono::DateTime<chrono::Utc>>,
    pub recurrence: Option<String>,
    pub active: bool,
    pub last_delivered_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Reminder {
    pub fn is_one_shot(&self) -> bool {
        self.scheduled_time.is_some()
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence.is_some()
    }
}

/// Lifecycle of a single delivery attempt.
///
/// `pending -> delivered -> (acknowledged|confirmed|retry_pending -> delivered ... |max_attempts)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    RetryPending,
    Acknowledged,
    Confirmed,
    MaxAttempts,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeliveryStatus::Acknowledged | DeliveryStatus::Confirmed | DeliveryStatus::MaxAttempts
        )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::RetryPending => "retry_pending",
            DeliveryStatus::Acknowledged => "acknowledged",
            DeliveryStatus::Confirmed => "confirmed",
            DeliveryStatus::MaxAttempts => "max_attempts",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "delivered" => Ok(Self::Delivered),
            "retry_pending" => Ok(Self::RetryPending),
            "acknowledged" => Ok(Self::Acknowledged),
            "confirmed" => Ok(Self::Confirmed),
            "max_attempts" => Ok(Self::MaxAttempts),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

/// One attempt to deliver a reminder on a call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: String,
    pub reminder_id: String,
    pub scheduled_for: chrono::DateTime<chrono::Utc>,
    pub delivered_at: Option<chrono::DateTime<chrono::Utc>>,
    pub acknowledged_at: Option<chrono::DateTime<chrono::Utc>>,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub call_sid: Option<CallSid>,
    pub user_response: Option<String>,
}

/// Severity used for health/safety/emotional concerns raised in post-call analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// Category of a concern surfaced by post-call analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcernType {
    Health,
    Cognitive,
    Emotional,
    Safety,
}

impl fmt::Display for ConcernType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcernType::Health => write!(f, "health"),
            ConcernType::Cognitive => write!(f, "cognitive"),
            ConcernType::Emotional => write!(f, "emotional"),
            ConcernType::Safety => write!(f, "safety"),
        }
    }
}

/// A single flagged concern in a call-analysis record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concern {
    pub concern_type: ConcernType,
    pub severity: Severity,
    pub description: String,
    pub recommendation: Option<String>,
}

/// Structured post-call analysis output (§3 Call-analysis record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallAnalysis {
    pub conversation_id: ConversationId,
    pub tenant_id: TenantId,
    pub summary: String,
    pub topics: Vec<String>,
    /// 1-10 inclusive.
    pub engagement_score: u8,
    pub concerns: Vec<Concern>,
    pub positive_observations: Vec<String>,
    pub follow_up_suggestions: Vec<String>,
    pub call_quality: String,
}

impl CallAnalysis {
    /// Fallback used when the analysis LLM returns output that fails schema
    /// validation (§7 Call-analysis schema violation policy).
    pub fn unavailable(conversation_id: ConversationId, tenant_id: TenantId) -> Self {
        Self {
            conversation_id,
            tenant_id,
            summary: "Analysis unavailable".to_string(),
            topics: Vec::new(),
            engagement_score: 5,
            concerns: Vec::new(),
            positive_observations: Vec::new(),
            follow_up_suggestions: Vec::new(),
            call_quality: "unknown".to_string(),
        }
    }
}

/// Full conversation record — one per call attempt (§3 Conversation record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub tenant_id: TenantId,
    pub call_sid: CallSid,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_seconds: Option<u32>,
    pub status: ConversationStatus,
    pub transcript: Vec<TranscriptTurn>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
}

/// Why a call is being placed. Carried end-to-end from the scheduler (or an
/// inbound webhook) through to the session orchestrator's startup step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CallType {
    /// Scheduled daily check-in, no specific reminder attached.
    CheckIn,
    /// Outbound call to deliver a specific reminder.
    Reminder { reminder_id: String },
    /// Inbound call placed by the senior.
    Inbound,
}

/// Category of a memory saved via `save_important_detail` or extracted
/// post-call (§4.6, §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Event,
    Concern,
    Relationship,
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryCategory::Fact => "fact",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Event => "event",
            MemoryCategory::Concern => "concern",
            MemoryCategory::Relationship => "relationship",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(MemoryCategory::Fact),
            "preference" => Ok(MemoryCategory::Preference),
            "event" => Ok(MemoryCategory::Event),
            "concern" => Ok(MemoryCategory::Concern),
            "relationship" => Ok(MemoryCategory::Relationship),
            other => Err(format!("unknown memory category '{other}'")),
        }
    }
}
