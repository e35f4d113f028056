use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;

use voicecall_core::types::{TranscriptTurn, TurnRole};

const TOPICS_CAP: usize = 10;
const QUESTIONS_CAP: usize = 8;
const ADVICE_CAP: usize = 8;
const DEDUPE_PREFIX_LEN: usize = 50;

fn advice_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\byou should\b|\btry to\b|\bremember to\b|\bmake sure\b").unwrap()
    })
}

/// Observes user/assistant turns as they happen and keeps bounded, deduped
/// collections so the session orchestrator can remind the LLM what's already
/// been covered this call (§4.4).
#[derive(Debug, Default)]
pub struct ConversationTracker {
    topics_discussed: VecDeque<String>,
    questions_asked: VecDeque<String>,
    advice_given: VecDeque<String>,
    transcript: Vec<TranscriptTurn>,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transcript(&self) -> &[TranscriptTurn] {
        &self.transcript
    }

    /// Record a user utterance. Also treated as a candidate topic.
    pub fn observe_user(&mut self, text: &str) {
        self.transcript.push(TranscriptTurn {
            role: TurnRole::User,
            content: text.to_string(),
            timestamp: chrono::Utc::now(),
        });
        self.push_topic(text);
    }

    /// Record a complete assistant utterance (one full turn of text, after
    /// the guidance stripper has already run over it).
    pub fn observe_assistant(&mut self, text: &str) {
        self.transcript.push(TranscriptTurn {
            role: TurnRole::Assistant,
            content: text.to_string(),
            timestamp: chrono::Utc::now(),
        });

        for sentence in split_sentences(text) {
            let trimmed = sentence.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.ends_with('?') {
                push_capped(&mut self.questions_asked, trimmed.to_string(), QUESTIONS_CAP);
            }
            if advice_pattern().is_match(trimmed) {
                push_capped(&mut self.advice_given, trimmed.to_string(), ADVICE_CAP);
            }
        }
    }

    fn push_topic(&mut self, text: &str) {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return;
        }
        let key: String = trimmed
            .to_lowercase()
            .chars()
            .take(DEDUPE_PREFIX_LEN)
            .collect();
        let already_present = self
            .topics_discussed
            .iter()
            .any(|t| t.to_lowercase().chars().take(DEDUPE_PREFIX_LEN).collect::<String>() == key);
        if already_present {
            return;
        }
        push_capped(&mut self.topics_discussed, trimmed.to_string(), TOPICS_CAP);
    }

    /// Render the "so far this call" summary used in the system prompt's
    /// task-scoped context slot.
    pub fn format_summary(&self) -> String {
        format!(
            "CONVERSATION SO FAR THIS CALL (avoid repeating): topics={}; questions={}; advice={}",
            join_or_none(&self.topics_discussed),
            join_or_none(&self.questions_asked),
            join_or_none(&self.advice_given),
        )
    }
}

fn push_capped(deque: &mut VecDeque<String>, item: String, cap: usize) {
    if deque.len() >= cap {
        deque.pop_front();
    }
    deque.push_back(item);
}

fn join_or_none(deque: &VecDeque<String>) -> String {
    if deque.is_empty() {
        "none".to_string()
    } else {
        deque.iter().cloned().collect::<Vec<_>>().join(" | ")
    }
}

/// Split into sentences, keeping the terminating punctuation so callers can
/// tell a question (`?`) from a statement.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '.' || c == '!' || c == '?' {
            sentences.push(&text[start..=i]);
            start = i + c.len_utf8();
        }
    }
    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_are_deduped_by_prefix() {
        let mut t = ConversationTracker::new();
        t.observe_user("My garden has been doing really well this spring");
        t.observe_user("My garden has been doing really well this spring, actually");
        assert_eq!(t.topics_discussed.len(), 1);
    }

    #[test]
    fn topics_cap_at_ten() {
        let mut t = ConversationTracker::new();
        for i in 0..15 {
            t.observe_user(&format!("topic number {i}"));
        }
        assert_eq!(t.topics_discussed.len(), TOPICS_CAP);
        assert!(t.topics_discussed.back().unwrap().contains("14"));
    }

    #[test]
    fn questions_are_captured_from_assistant_turns() {
        let mut t = ConversationTracker::new();
        t.observe_assistant("That's wonderful. Did you take your morning walk?");
        assert_eq!(t.questions_asked.len(), 1);
        assert!(t.questions_asked[0].contains("morning walk"));
    }

    #[test]
    fn advice_phrases_are_captured() {
        let mut t = ConversationTracker::new();
        t.observe_assistant("You should drink more water today. That helps a lot.");
        assert_eq!(t.advice_given.len(), 1);
    }

    #[test]
    fn summary_formats_with_expected_prefix() {
        let t = ConversationTracker::new();
        let summary = t.format_summary();
        assert!(summary.starts_with("CONVERSATION SO FAR THIS CALL (avoid repeating):"));
        assert!(summary.contains("topics=none"));
    }
}
