use std::time::{Duration, Instant};

use dashmap::DashMap;

const TTL: Duration = Duration::from_secs(60 * 60);

/// 1-hour cache of news lookups, keyed by normalized topic (§4.6). Shared
/// across calls for the same tenant/day so repeated asks about "the news"
/// don't re-hit the provider every turn.
#[derive(Default)]
pub struct NewsCache {
    entries: DashMap<String, (Instant, Vec<String>)>,
}

impl NewsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(topic: &str) -> String {
        topic.trim().to_lowercase()
    }

    pub fn get(&self, topic: &str) -> Option<Vec<String>> {
        let key = Self::normalize(topic);
        let entry = self.entries.get(&key)?;
        let (fetched_at, items) = entry.value();
        if fetched_at.elapsed() < TTL {
            Some(items.clone())
        } else {
            None
        }
    }

    pub fn put(&self, topic: &str, items: Vec<String>) {
        let key = Self::normalize(topic);
        self.entries.insert(key, (Instant::now(), items));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_retrieves_by_normalized_topic() {
        let cache = NewsCache::new();
        cache.put("  Local Weather ", vec!["sunny".to_string()]);
        assert_eq!(cache.get("local weather"), Some(vec!["sunny".to_string()]));
    }

    #[test]
    fn miss_on_unknown_topic() {
        let cache = NewsCache::new();
        assert_eq!(cache.get("anything"), None);
    }
}
