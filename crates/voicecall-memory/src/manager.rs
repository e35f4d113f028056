use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use tracing::{instrument, warn};
use uuid::Uuid;

use voicecall_core::types::TranscriptTurn;
use voicecall_llm::{cosine_similarity, ChatRequest, EmbeddingProvider, LlmProvider};

use crate::error::MemoryError;
use crate::types::{
    ExtractedItem, Memory, MemorySource, MemoryType, ScoredMemory, DEDUP_COSINE_THRESHOLD,
    MAX_IMPORTANCE, MIN_IMPORTANCE,
};

const DEFAULT_SEARCH_LIMIT: usize = 3;
const DEFAULT_MIN_COSINE: f32 = 0.65;

const EXTRACTION_SYSTEM_PROMPT: &str = "You extract durable memories from a transcript of a \
    check-in call with an elderly person. Reply with a JSON array of objects, each with \
    \"memory_type\" (one of fact, preference, relationship, event, concern, story), \
    \"content\" (a short standalone sentence), and optionally \"importance\" (0-100). \
    Only include things worth remembering for future calls. Reply with the JSON array alone.";

/// Tenant memory store backed by SQLite, with embedding-based semantic
/// search (§4.10). Brute-force cosine similarity over all of a tenant's
/// memories — tenants have at most a few hundred memories, so a vector index
/// isn't warranted.
pub struct MemoryManager {
    db: Mutex<Connection>,
    embedder: Arc<dyn EmbeddingProvider>,
    extraction_llm: Arc<dyn LlmProvider>,
    extraction_model: String,
}

impl MemoryManager {
    pub fn new(
        conn: Connection,
        embedder: Arc<dyn EmbeddingProvider>,
        extraction_llm: Arc<dyn LlmProvider>,
        extraction_model: impl Into<String>,
    ) -> Self {
        Self {
            db: Mutex::new(conn),
            embedder,
            extraction_llm,
            extraction_model: extraction_model.into(),
        }
    }

    /// Embed `content`, then store it unless an existing memory of the same
    /// tenant/type is within `DEDUP_COSINE_THRESHOLD` cosine similarity — in
    /// that case bump its importance instead and return its ID (§4.10).
    #[instrument(skip(self, content))]
    pub async fn store(
        &self,
        tenant_id: &str,
        memory_type: MemoryType,
        content: &str,
        source: MemorySource,
        importance: i32,
    ) -> Result<String, MemoryError> {
        let embedding = self
            .embedder
            .embed(content)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let existing = self.load_tenant_type(tenant_id, memory_type)?;
        let mut best: Option<(f32, &Memory)> = None;
        for m in &existing {
            let cosine = cosine_similarity(&embedding, &m.embedding);
            if best.map(|(b, _)| cosine > b).unwrap_or(true) {
                best = Some((cosine, m));
            }
        }

        if let Some((cosine, m)) = best {
            if cosine >= DEDUP_COSINE_THRESHOLD {
                let bumped = (m.importance + 5).clamp(MIN_IMPORTANCE, MAX_IMPORTANCE);
                self.touch(&m.id, bumped)?;
                return Ok(m.id.clone());
            }
        }

        let id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now();
        let embedding_json = serde_json::to_string(&embedding)?;
        let importance = importance.clamp(MIN_IMPORTANCE, MAX_IMPORTANCE);

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO memories
             (id, tenant_id, memory_type, content, embedding, importance, source,
              last_accessed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)",
            rusqlite::params![
                id,
                tenant_id,
                memory_type.to_string(),
                content,
                embedding_json,
                importance,
                source.to_string(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(id)
    }

    /// Rank tenant memories by cosine similarity to `query`, with importance
    /// (temporally decayed) and recency as tie-breakers (§4.10).
    #[instrument(skip(self, query))]
    pub async fn search(
        &self,
        tenant_id: &str,
        query: &str,
        limit: Option<usize>,
        min_cosine: Option<f32>,
    ) -> Result<Vec<ScoredMemory>, MemoryError> {
        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let min_cosine = min_cosine.unwrap_or(DEFAULT_MIN_COSINE);

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::Embedding(e.to_string()))?;

        let memories = self.load_tenant(tenant_id)?;
        let now = chrono::Utc::now();

        let mut scored: Vec<ScoredMemory> = memories
            .into_iter()
            .map(|m| {
                let cosine = cosine_similarity(&query_embedding, &m.embedding);
                ScoredMemory { memory: m, cosine }
            })
            .filter(|s| s.cosine >= min_cosine)
            .collect();

        scored.sort_by(|a, b| {
            b.cosine
                .partial_cmp(&a.cosine)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.memory
                        .decayed_importance(now)
                        .partial_cmp(&a.memory.decayed_importance(now))
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.memory.last_accessed_at.cmp(&a.memory.last_accessed_at))
        });
        scored.truncate(limit);

        Ok(scored)
    }

    /// Render a single human-readable block of the tenant's top memories,
    /// capped per type, for the system prompt's memory slot (§4.10).
    #[instrument(skip(self))]
    pub fn build_context(&self, tenant_id: &str) -> Result<String, MemoryError> {
        let memories = self.load_tenant(tenant_id)?;
        let now = chrono::Utc::now();

        let mut blocks = Vec::new();
        for memory_type in MemoryType::all() {
            let mut of_type: Vec<&Memory> = memories
                .iter()
                .filter(|m| m.memory_type == memory_type)
                .collect();
            of_type.sort_by(|a, b| {
                b.decayed_importance(now)
                    .partial_cmp(&a.decayed_importance(now))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            of_type.truncate(memory_type.context_cap());

            if of_type.is_empty() {
                continue;
            }
            let heading = capitalize(&memory_type.to_string());
            let lines: Vec<String> = of_type.iter().map(|m| format!("- {}", m.content)).collect();
            blocks.push(format!("{heading}s:\n{}", lines.join("\n")));
        }

        Ok(blocks.join("\n\n"))
    }

    /// Count, for each of `interests`, how many of the tenant's memories from
    /// the last 7 days mention it — feeds the greeting rotator's weighted
    /// interest pick (Decision D2).
    #[instrument(skip(self, interests))]
    pub fn recent_interest_counts(&self, tenant_id: &str, interests: &[String]) -> Vec<u32> {
        let memories = self.load_tenant(tenant_id).unwrap_or_default();
        let cutoff = chrono::Utc::now() - chrono::Duration::days(7);
        let recent: Vec<&Memory> = memories.iter().filter(|m| m.created_at >= cutoff).collect();
        interests
            .iter()
            .map(|interest| {
                let needle = interest.to_lowercase();
                recent.iter().filter(|m| m.content.to_lowercase().contains(&needle)).count() as u32
            })
            .collect()
    }

    /// Submit a transcript to the extraction LLM and store validated items.
    /// Degrades gracefully: parse or provider failures return `Ok(0)` rather
    /// than propagating, and per-item failures just skip that item — this
    /// runs once from the post-call processor and is never retried (§4.10).
    #[instrument(skip(self, transcript))]
    pub async fn extract_from_conversation(
        &self,
        tenant_id: &str,
        transcript: &[TranscriptTurn],
        source: MemorySource,
    ) -> usize {
        let items = match self.run_extraction(transcript).await {
            Ok(items) => items,
            Err(err) => {
                warn!(error = %err, "memory extraction failed, skipping");
                return 0;
            }
        };

        let mut stored = 0;
        for item in items {
            let memory_type = match item.memory_type.parse::<MemoryType>() {
                Ok(t) => t,
                Err(err) => {
                    warn!(error = %err, "skipping extracted item with invalid memory_type");
                    continue;
                }
            };
            if item.content.trim().is_empty() {
                continue;
            }
            let importance = item.importance.unwrap_or(50);
            match self
                .store(tenant_id, memory_type, &item.content, source, importance)
                .await
            {
                Ok(_) => stored += 1,
                Err(err) => warn!(error = %err, "failed to store extracted memory"),
            }
        }
        stored
    }

    async fn run_extraction(
        &self,
        transcript: &[TranscriptTurn],
    ) -> Result<Vec<ExtractedItem>, MemoryError> {
        let rendered: String = transcript
            .iter()
            .map(|t| format!("{}: {}", t.role, t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let mut req = ChatRequest::new(self.extraction_model.clone(), EXTRACTION_SYSTEM_PROMPT, 1024);
        req.messages = vec![voicecall_llm::Message {
            role: voicecall_llm::Role::User,
            content: rendered,
        }];

        let resp = self
            .extraction_llm
            .send(&req)
            .await
            .map_err(|e| MemoryError::Extraction(e.to_string()))?;

        let items: Vec<ExtractedItem> = serde_json::from_str(resp.content.trim())?;
        Ok(items)
    }

    fn touch(&self, id: &str, importance: i32) -> Result<(), MemoryError> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE memories SET importance = ?1, last_accessed_at = ?2, updated_at = ?2 WHERE id = ?3",
            rusqlite::params![importance, chrono::Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    fn load_tenant(&self, tenant_id: &str) -> Result<Vec<Memory>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tenant_id, memory_type, content, embedding, importance, source,
                    last_accessed_at, created_at, updated_at
             FROM memories WHERE tenant_id = ?1",
        )?;
        let rows = stmt.query_map(rusqlite::params![tenant_id], row_to_memory)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn load_tenant_type(&self, tenant_id: &str, memory_type: MemoryType) -> Result<Vec<Memory>, MemoryError> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tenant_id, memory_type, content, embedding, importance, source,
                    last_accessed_at, created_at, updated_at
             FROM memories WHERE tenant_id = ?1 AND memory_type = ?2",
        )?;
        let rows = stmt.query_map(
            rusqlite::params![tenant_id, memory_type.to_string()],
            row_to_memory,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let type_str: String = row.get(2)?;
    let embedding_str: String = row.get(4)?;
    let source_str: String = row.get(6)?;
    let last_accessed_str: String = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(Memory {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        memory_type: type_str.parse().unwrap_or(MemoryType::Fact),
        content: row.get(3)?,
        embedding: serde_json::from_str(&embedding_str).unwrap_or_default(),
        importance: row.get(5)?,
        source: source_str.parse().unwrap_or(MemorySource::Extracted),
        last_accessed_at: parse_rfc3339(&last_accessed_str),
        created_at: parse_rfc3339(&created_str),
        updated_at: parse_rfc3339(&updated_str),
    })
}

fn parse_rfc3339(s: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|_| chrono::Utc::now())
}

fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().to_string() + c.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use voicecall_llm::{ChatResponse, ProviderError};

    use super::*;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
            let mut v = vec![0f32; 8];
            for (i, b) in text.bytes().enumerate() {
                v[i % 8] += b as f32;
            }
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            if norm > 0.0 {
                for x in v.iter_mut() {
                    *x /= norm;
                }
            }
            Ok(v)
        }
    }

    struct FakeLlm {
        response: String,
    }

    #[async_trait]
    impl LlmProvider for FakeLlm {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, _req: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                content: self.response.clone(),
                model: "fake".to_string(),
                tokens_in: 10,
                tokens_out: 10,
                stop_reason: "end_turn".to_string(),
                tool_calls: Vec::new(),
            })
        }
    }

    fn manager(llm_response: &str) -> MemoryManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_db(&conn).unwrap();
        MemoryManager::new(
            conn,
            Arc::new(FakeEmbedder),
            Arc::new(FakeLlm {
                response: llm_response.to_string(),
            }),
            "fake-model",
        )
    }

    #[tokio::test]
    async fn storing_identical_content_dedupes_and_bumps_importance() {
        let mgr = manager("[]");
        let id1 = mgr
            .store("tenant-1", MemoryType::Fact, "likes gardening", MemorySource::ToolCall, 50)
            .await
            .unwrap();
        let id2 = mgr
            .store("tenant-1", MemoryType::Fact, "likes gardening", MemorySource::ToolCall, 50)
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let memories = mgr.load_tenant("tenant-1").unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].importance, 55);
    }

    #[tokio::test]
    async fn distinct_content_is_stored_separately() {
        let mgr = manager("[]");
        mgr.store("tenant-1", MemoryType::Fact, "likes gardening", MemorySource::ToolCall, 50)
            .await
            .unwrap();
        mgr.store("tenant-1", MemoryType::Fact, "has a small dog named Max", MemorySource::ToolCall, 50)
            .await
            .unwrap();

        let memories = mgr.load_tenant("tenant-1").unwrap();
        assert_eq!(memories.len(), 2);
    }

    #[tokio::test]
    async fn search_respects_min_cosine_and_limit() {
        let mgr = manager("[]");
        mgr.store("tenant-1", MemoryType::Fact, "likes gardening", MemorySource::ToolCall, 50)
            .await
            .unwrap();

        let results = mgr.search("tenant-1", "likes gardening", Some(3), Some(0.99)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].cosine > 0.99);

        let no_results = mgr
            .search("tenant-1", "completely unrelated text about finance", Some(3), Some(0.999))
            .await
            .unwrap();
        assert!(no_results.is_empty());
    }

    #[tokio::test]
    async fn build_context_caps_per_type() {
        let mgr = manager("[]");
        for i in 0..5 {
            mgr.store(
                "tenant-1",
                MemoryType::Fact,
                &format!("fact number {i} about the tenant"),
                MemorySource::ToolCall,
                50,
            )
            .await
            .unwrap();
        }
        let ctx = mgr.build_context("tenant-1").unwrap();
        let fact_lines = ctx.lines().filter(|l| l.starts_with("- ")).count();
        assert_eq!(fact_lines, MemoryType::Fact.context_cap());
    }

    #[tokio::test]
    async fn extraction_stores_valid_items_and_skips_invalid_type() {
        let mgr = manager(
            r#"[{"memory_type":"fact","content":"enjoys crossword puzzles","importance":60},
                {"memory_type":"bogus","content":"should be skipped"}]"#,
        );
        let turns = vec![TranscriptTurn {
            role: voicecall_core::types::TurnRole::User,
            content: "I do crosswords every morning".to_string(),
            timestamp: chrono::Utc::now(),
        }];
        let stored = mgr.extract_from_conversation("tenant-1", &turns, MemorySource::Extracted).await;
        assert_eq!(stored, 1);
    }

    #[tokio::test]
    async fn recent_interest_counts_matches_content_case_insensitively() {
        let mgr = manager("[]");
        mgr.store("tenant-1", MemoryType::Fact, "Loves gardening on weekends", MemorySource::ToolCall, 50)
            .await
            .unwrap();
        mgr.store("tenant-1", MemoryType::Fact, "mentioned gardening again today", MemorySource::ToolCall, 50)
            .await
            .unwrap();
        mgr.store("tenant-1", MemoryType::Fact, "has a small dog named Max", MemorySource::ToolCall, 50)
            .await
            .unwrap();

        let interests = vec!["gardening".to_string(), "fishing".to_string()];
        let counts = mgr.recent_interest_counts("tenant-1", &interests);
        assert_eq!(counts, vec![2, 0]);
    }

    #[tokio::test]
    async fn extraction_degrades_gracefully_on_malformed_json() {
        let mgr = manager("not json at all");
        let stored = mgr.extract_from_conversation("tenant-1", &[], MemorySource::Extracted).await;
        assert_eq!(stored, 0);
    }
}
