use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{ConversationError, Result};
use crate::types::{
    CallAnalysis, CallSid, Concern, Conversation, ConversationId, ConversationStatus, TenantId, TranscriptTurn,
};

/// Persists one row per call attempt (§3 Conversation record) plus its
/// post-call analysis. Wraps a single connection in a mutex, same pattern as
/// every other store in this workspace.
pub struct ConversationManager {
    db: Mutex<Connection>,
}

impl ConversationManager {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    /// Create the conversation record at call startup (§4.9 step 1).
    #[instrument(skip(self), fields(%tenant_id, %call_sid))]
    pub fn start(&self, tenant_id: TenantId, call_sid: CallSid) -> Result<Conversation> {
        let id = ConversationId(Uuid::now_v7().to_string());
        let started_at = Utc::now();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversations (id, tenant_id, call_sid, started_at, status, transcript)
             VALUES (?1, ?2, ?3, ?4, 'in_progress', '[]')",
            rusqlite::params![id.0, tenant_id.0, call_sid.0, started_at.to_rfc3339()],
        )?;
        Ok(Conversation {
            id,
            tenant_id,
            call_sid,
            started_at,
            ended_at: None,
            duration_seconds: None,
            status: ConversationStatus::InProgress,
            transcript: Vec::new(),
            summary: None,
            sentiment: None,
        })
    }

    /// Append one transcript line. The transcript is small enough per call
    /// (elderly check-ins run a handful of minutes) that read-modify-write
    /// is simpler than a side table, at the cost of O(n) writes per turn.
    pub fn append_turn(&self, conversation_id: &ConversationId, turn: TranscriptTurn) -> Result<()> {
        let db = self.db.lock().unwrap();
        let existing: String = db
            .query_row("SELECT transcript FROM conversations WHERE id = ?1", [&conversation_id.0], |row| row.get(0))
            .optional()?
            .ok_or_else(|| ConversationError::NotFound { id: conversation_id.0.clone() })?;
        let mut transcript: Vec<TranscriptTurn> = serde_json::from_str(&existing).unwrap_or_default();
        transcript.push(turn);
        db.execute(
            "UPDATE conversations SET transcript = ?1 WHERE id = ?2",
            rusqlite::params![serde_json::to_string(&transcript)?, conversation_id.0],
        )?;
        Ok(())
    }

    /// Mark the call finished and persist its summary/sentiment (§4.13 step 1).
    #[instrument(skip(self, summary, sentiment), fields(%conversation_id))]
    pub fn complete(
        &self,
        conversation_id: &ConversationId,
        status: ConversationStatus,
        summary: Option<String>,
        sentiment: Option<String>,
    ) -> Result<()> {
        let ended_at = Utc::now();
        let db = self.db.lock().unwrap();
        let started_at: String = db
            .query_row("SELECT started_at FROM conversations WHERE id = ?1", [&conversation_id.0], |row| row.get(0))
            .optional()?
            .ok_or_else(|| ConversationError::NotFound { id: conversation_id.0.clone() })?;
        let duration = DateTime::parse_from_rfc3339(&started_at)
            .map(|s| (ended_at - s.with_timezone(&Utc)).num_seconds().max(0) as u32)
            .unwrap_or(0);

        db.execute(
            "UPDATE conversations
             SET status = ?1, ended_at = ?2, duration_seconds = ?3, summary = ?4, sentiment = ?5
             WHERE id = ?6",
            rusqlite::params![status.to_string_snake(), ended_at.to_rfc3339(), duration, summary, sentiment, conversation_id.0],
        )?;
        Ok(())
    }

    pub fn get(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT id, tenant_id, call_sid, started_at, ended_at, duration_seconds,
                    status, transcript, summary, sentiment
             FROM conversations WHERE id = ?1",
            [&conversation_id.0],
            row_to_conversation,
        )
        .optional()
        .map_err(ConversationError::from)
    }

    /// Upsert the post-call analysis (§4.13 step 2). Called once per
    /// conversation; a retry after a transient failure just overwrites.
    pub fn save_analysis(&self, analysis: &CallAnalysis) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO call_analyses
                (conversation_id, tenant_id, summary, topics, engagement_score,
                 concerns, positive_observations, follow_up_suggestions, call_quality)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)
             ON CONFLICT(conversation_id) DO UPDATE SET
                summary = excluded.summary,
                topics = excluded.topics,
                engagement_score = excluded.engagement_score,
                concerns = excluded.concerns,
                positive_observations = excluded.positive_observations,
                follow_up_suggestions = excluded.follow_up_suggestions,
                call_quality = excluded.call_quality",
            rusqlite::params![
                analysis.conversation_id.0,
                analysis.tenant_id.0,
                analysis.summary,
                serde_json::to_string(&analysis.topics)?,
                analysis.engagement_score,
                serde_json::to_string(&analysis.concerns)?,
                serde_json::to_string(&analysis.positive_observations)?,
                serde_json::to_string(&analysis.follow_up_suggestions)?,
                analysis.call_quality,
            ],
        )?;
        Ok(())
    }

    pub fn get_analysis(&self, conversation_id: &ConversationId) -> Result<Option<CallAnalysis>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT conversation_id, tenant_id, summary, topics, engagement_score,
                    concerns, positive_observations, follow_up_suggestions, call_quality
             FROM call_analyses WHERE conversation_id = ?1",
            [&conversation_id.0],
            row_to_analysis,
        )
        .optional()
        .map_err(ConversationError::from)
    }
}

trait StatusExt {
    fn to_string_snake(&self) -> &'static str;
}

impl StatusExt for ConversationStatus {
    fn to_string_snake(&self) -> &'static str {
        match self {
            ConversationStatus::InProgress => "in_progress",
            ConversationStatus::Completed => "completed",
            ConversationStatus::Failed => "failed",
            ConversationStatus::NoAnswer => "no_answer",
            ConversationStatus::Busy => "busy",
        }
    }
}

fn parse_status(s: &str) -> ConversationStatus {
    match s {
        "completed" => ConversationStatus::Completed,
        "failed" => ConversationStatus::Failed,
        "no_answer" => ConversationStatus::NoAnswer,
        "busy" => ConversationStatus::Busy,
        _ => ConversationStatus::InProgress,
    }
}

fn row_to_conversation(row: &rusqlite::Row) -> rusqlite::Result<Conversation> {
    let started_at: String = row.get(3)?;
    let ended_at: Option<String> = row.get(4)?;
    let status: String = row.get(6)?;
    let transcript: String = row.get(7)?;
    Ok(Conversation {
        id: ConversationId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        call_sid: CallSid(row.get(2)?),
        started_at: DateTime::parse_from_rfc3339(&started_at).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
        ended_at: ended_at.and_then(|t| DateTime::parse_from_rfc3339(&t).ok()).map(|t| t.with_timezone(&Utc)),
        duration_seconds: row.get::<_, Option<i64>>(5)?.map(|d| d as u32),
        status: parse_status(&status),
        transcript: serde_json::from_str(&transcript).unwrap_or_default(),
        summary: row.get(8)?,
        sentiment: row.get(9)?,
    })
}

fn row_to_analysis(row: &rusqlite::Row) -> rusqlite::Result<CallAnalysis> {
    let topics: String = row.get(3)?;
    let concerns: String = row.get(5)?;
    let positive_observations: String = row.get(6)?;
    let follow_up_suggestions: String = row.get(7)?;
    Ok(CallAnalysis {
        conversation_id: ConversationId(row.get(0)?),
        tenant_id: TenantId(row.get(1)?),
        summary: row.get(2)?,
        topics: serde_json::from_str(&topics).unwrap_or_default(),
        engagement_score: row.get(4)?,
        concerns: serde_json::from_str::<Vec<Concern>>(&concerns).unwrap_or_default(),
        positive_observations: serde_json::from_str(&positive_observations).unwrap_or_default(),
        follow_up_suggestions: serde_json::from_str(&follow_up_suggestions).unwrap_or_default(),
        call_quality: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{TurnRole};

    fn manager() -> ConversationManager {
        ConversationManager::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn starting_and_fetching_a_conversation_round_trips() {
        let mgr = manager();
        let conv = mgr.start(TenantId("tenant-1".to_string()), CallSid("CA1".to_string())).unwrap();
        let fetched = mgr.get(&conv.id).unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::InProgress);
        assert!(fetched.transcript.is_empty());
    }

    #[test]
    fn appending_turns_preserves_order() {
        let mgr = manager();
        let conv = mgr.start(TenantId("tenant-1".to_string()), CallSid("CA1".to_string())).unwrap();
        mgr.append_turn(&conv.id, TranscriptTurn { role: TurnRole::Assistant, content: "hi".into(), timestamp: Utc::now() }).unwrap();
        mgr.append_turn(&conv.id, TranscriptTurn { role: TurnRole::User, content: "hello".into(), timestamp: Utc::now() }).unwrap();

        let fetched = mgr.get(&conv.id).unwrap().unwrap();
        assert_eq!(fetched.transcript.len(), 2);
        assert_eq!(fetched.transcript[1].content, "hello");
    }

    #[test]
    fn completing_sets_duration_and_status() {
        let mgr = manager();
        let conv = mgr.start(TenantId("tenant-1".to_string()), CallSid("CA1".to_string())).unwrap();
        mgr.complete(&conv.id, ConversationStatus::Completed, Some("summary".into()), Some("warm".into())).unwrap();

        let fetched = mgr.get(&conv.id).unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Completed);
        assert_eq!(fetched.summary.as_deref(), Some("summary"));
        assert!(fetched.duration_seconds.is_some());
    }

    #[test]
    fn saving_analysis_twice_overwrites_rather_than_duplicates() {
        let mgr = manager();
        let conv = mgr.start(TenantId("tenant-1".to_string()), CallSid("CA1".to_string())).unwrap();
        let mut analysis = CallAnalysis::unavailable(conv.id.clone(), TenantId("tenant-1".to_string()));
        mgr.save_analysis(&analysis).unwrap();
        analysis.summary = "Had a nice chat about baking".to_string();
        mgr.save_analysis(&analysis).unwrap();

        let fetched = mgr.get_analysis(&conv.id).unwrap().unwrap();
        assert_eq!(fetched.summary, "Had a nice chat about baking");
    }
}
