use dashmap::DashMap;

const STALENESS_THRESHOLD_HOURS: i64 = 24;

/// Everything a call's startup step needs, pre-baked for one tenant (§4.11).
#[derive(Debug, Clone)]
pub struct ContextCacheEntry {
    pub memory_context: String,
    pub daily_context: String,
    pub greeting_template: String,
    pub prior_call_summaries: Vec<String>,
    pub news_headlines: Vec<String>,
    pub prefetched_at: chrono::DateTime<chrono::Utc>,
}

impl ContextCacheEntry {
    pub fn is_stale(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        (now - self.prefetched_at).num_hours() >= STALENESS_THRESHOLD_HOURS
    }
}

/// Per-tenant in-memory cache. Populated at local 05:00, invalidated when a
/// call for that tenant completes, lazily repopulated on demand past the
/// staleness threshold (§4.11).
#[derive(Default)]
pub struct ContextCache {
    entries: DashMap<String, ContextCacheEntry>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh entry for `tenant_id`, or `None` if absent or stale — callers
    /// should repopulate and call `put` in that case.
    pub fn get(&self, tenant_id: &str) -> Option<ContextCacheEntry> {
        let entry = self.entries.get(tenant_id)?;
        if entry.is_stale(chrono::Utc::now()) {
            None
        } else {
            Some(entry.clone())
        }
    }

    pub fn put(&self, tenant_id: &str, entry: ContextCacheEntry) {
        self.entries.insert(tenant_id.to_string(), entry);
    }

    pub fn invalidate(&self, tenant_id: &str) {
        self.entries.remove(tenant_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(prefetched_at: chrono::DateTime<chrono::Utc>) -> ContextCacheEntry {
        ContextCacheEntry {
            memory_context: String::new(),
            daily_context: String::new(),
            greeting_template: "hi".to_string(),
            prior_call_summaries: Vec::new(),
            news_headlines: Vec::new(),
            prefetched_at,
        }
    }

    #[test]
    fn fresh_entry_is_returned() {
        let cache = ContextCache::new();
        cache.put("tenant-1", sample_entry(chrono::Utc::now()));
        assert!(cache.get("tenant-1").is_some());
    }

    #[test]
    fn stale_entry_returns_none() {
        let cache = ContextCache::new();
        cache.put("tenant-1", sample_entry(chrono::Utc::now() - chrono::Duration::hours(25)));
        assert!(cache.get("tenant-1").is_none());
    }

    #[test]
    fn invalidate_removes_entry() {
        let cache = ContextCache::new();
        cache.put("tenant-1", sample_entry(chrono::Utc::now()));
        cache.invalidate("tenant-1");
        assert!(cache.get("tenant-1").is_none());
    }
}
