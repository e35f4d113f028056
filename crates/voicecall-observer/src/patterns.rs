use std::sync::OnceLock;

use regex::Regex;

use voicecall_flow::GoodbyeStrength;

use crate::types::{
    AnalysisRecord, EngagementLevel, ModelRecommendation, Severity, Signal, SignalCategory,
    Valence, ALL_CATEGORIES,
};

struct SignalPattern {
    category: SignalCategory,
    name: &'static str,
    severity: Severity,
    valence: Valence,
    regex: Regex,
}

/// Compiled regex set for the nine signal categories (each with one or more
/// named sub-patterns carrying a severity/valence/intensity, per §4.2) plus
/// goodbye/question/web-search detection. Built once and reused across the
/// call — compiling a `Regex` per utterance would dominate the analysis
/// budget.
pub struct Patterns {
    signals: Vec<SignalPattern>,
    question: Regex,
    goodbye_strong: Regex,
    goodbye_weak: Regex,
    web_search: Regex,
}

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static observer pattern must compile")
}

fn sp(
    category: SignalCategory,
    name: &'static str,
    severity: Severity,
    valence: Valence,
    pattern: &str,
) -> SignalPattern {
    SignalPattern {
        category,
        name,
        severity,
        valence,
        regex: rx(pattern),
    }
}

impl Patterns {
    pub fn new() -> Self {
        let signals = vec![
            // Health — falls and injuries are a health signal here (not
            // safety); a fall on its own reads as "check on them", not a
            // live emergency, per the health_safety scenario.
            sp(
                SignalCategory::Health,
                "fall",
                Severity::High,
                Valence::Neutral,
                r"(?i)\b(fell|fall|falling|broke[nd]?\s+(a\s+)?(hip|leg|arm)|can'?t get up)\b",
            ),
            sp(
                SignalCategory::Health,
                "breathing",
                Severity::High,
                Valence::Neutral,
                r"(?i)\b(can'?t breathe|short(ness)?\s+of\s+breath|chest pain)\b",
            ),
            sp(
                SignalCategory::Health,
                "general",
                Severity::Medium,
                Valence::Neutral,
                r"(?i)\b(pain|hurt(s|ing)?|dizzy|medication|pills?|doctor|hospital|sick|ache|nausea|appetite|sleep(ing)?\s+bad(ly)?)\b",
            ),
            // Safety — immediate danger or a threat from outside the body.
            sp(
                SignalCategory::Safety,
                "emergency",
                Severity::High,
                Valence::Neutral,
                r"(?i)\b(emergency|stranger|lock(ed)?\s+out|alone and scared|can'?t reach (anyone|help))\b",
            ),
            // Emotion — valence and intensity both tracked; only negative
            // emotion feeds the token-recommendation table.
            sp(
                SignalCategory::Emotion,
                "negative_high",
                Severity::High,
                Valence::Negative,
                r"(?i)\b(devastated|terrified|hopeless|panick(ed|ing)|very (sad|scared)|so (lonely|scared))\b",
            ),
            sp(
                SignalCategory::Emotion,
                "negative_medium",
                Severity::Medium,
                Valence::Negative,
                r"(?i)\b(sad|lonely|worried|anxious|depressed|upset|frustrated|scared|miss(ing)?)\b",
            ),
            sp(
                SignalCategory::Emotion,
                "positive",
                Severity::Low,
                Valence::Positive,
                r"(?i)\b(happy|grateful|content)\b",
            ),
            sp(
                SignalCategory::Social,
                "general",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(friend|visit(ed|ing)?|neighbor|talked to|stopped by|call(ed)?\s+me|church|club)\b",
            ),
            sp(
                SignalCategory::Family,
                "general",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(daughter|son|grandchild|grandson|granddaughter|husband|wife|family|nephew|niece|brother|sister|mother|father|mom|dad)\b",
            ),
            sp(
                SignalCategory::Activity,
                "general",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(garden(ing)?|walk(ed|ing)?|tv|television|read(ing)?|cook(ed|ing)?|knit(ting)?|puzzle|crossword|bak(e|ed|ing))\b",
            ),
            // Time — plain date/time references are separate from
            // reminiscing, which is its own named sub-signal under the same
            // category (§4.2's "time:reminiscing").
            sp(
                SignalCategory::Time,
                "reminiscing",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(remember when|back when|used to|when i was (young|little|a child|a kid|a girl|a boy)|my (mother|father|mom|dad) (taught|used to)|years? ago|childhood|reminds me of|nostalgi\w*)\b",
            ),
            sp(
                SignalCategory::Time,
                "reference",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(today|yesterday|tomorrow|this morning|tonight|last night|this week|this weekend)\b",
            ),
            sp(
                SignalCategory::Environment,
                "general",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(cold|hot|rain(ing)?|snow(ing)?|storm|power (out|outage)|heat(ing)?|weather)\b",
            ),
            sp(
                SignalCategory::ReminderAcknowledgment,
                "general",
                Severity::Low,
                Valence::Neutral,
                r"(?i)\b(took (my|it|them)|already (did|took)|i did (that|it)|yes i took|done that|i'?ve taken)\b",
            ),
        ];

        Self {
            signals,
            question: rx(r"(?i)(\?\s*$)|^(who|what|when|where|why|how|do|does|did|can|could|will|would|is|are)\b"),
            goodbye_strong: rx(r"(?i)\b(goodbye|good\s*bye|bye\s*bye|talk to you later|have a good (day|night)|take care|i need to hang up|i'?m going to go now|i have to go now)\b"),
            goodbye_weak: rx(r"(?i)\b(bye|see ya|gotta run|i should go|ok bye|alright then)\b"),
            web_search: rx(r"(?i)\b(what'?s the news|weather today|weather tomorrow|what happened (with|to)|latest on)\b"),
        }
    }

    fn categorize(&self, utterance: &str) -> Vec<Signal> {
        self.signals
            .iter()
            .filter_map(|sp| {
                sp.regex.find(utterance).map(|m| Signal {
                    category: sp.category,
                    name: sp.name,
                    matched: m.as_str().to_string(),
                    severity: sp.severity,
                    valence: sp.valence,
                })
            })
            .collect()
    }

    fn goodbye_strength(&self, utterance: &str) -> GoodbyeStrength {
        if self.goodbye_strong.is_match(utterance) {
            GoodbyeStrength::Strong
        } else if self.goodbye_weak.is_match(utterance) {
            GoodbyeStrength::Weak
        } else {
            GoodbyeStrength::None
        }
    }

    fn is_question(&self, utterance: &str) -> bool {
        self.question.is_match(utterance.trim())
    }

    fn needs_web_search(&self, utterance: &str) -> bool {
        self.web_search.is_match(utterance)
    }
}

impl Default for Patterns {
    fn default() -> Self {
        Self::new()
    }
}

fn shared() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(Patterns::new)
}

fn word_count(s: &str) -> usize {
    s.split_whitespace().count()
}

/// §4.2 boundary behavior + testable property #12: two of the last three
/// user utterances under 20 characters forces `low`, independent of word
/// count or signal count. `recent` holds the utterances before this one,
/// most-recent last.
fn engagement_level(utterance: &str, recent: &[String], signal_count: usize) -> EngagementLevel {
    let last_three: Vec<&str> = std::iter::once(utterance)
        .chain(recent.iter().rev().take(2).map(|s| s.as_str()))
        .collect();
    let short_count = last_three.iter().filter(|u| u.chars().count() < 20).count();
    if short_count >= 2 {
        return EngagementLevel::Low;
    }

    let words = word_count(utterance);
    if words == 0 {
        return EngagementLevel::Low;
    }
    if signal_count >= 2 || words >= 20 {
        EngagementLevel::High
    } else if words <= 5 {
        EngagementLevel::Medium
    } else {
        EngagementLevel::Normal
    }
}

/// Priority chain from §4.2: `safety > health > emotion > family > activity
/// > memory > question > engagement`. At most one templated line per tier.
fn build_guidance(
    signals: &[Signal],
    is_question: bool,
    engagement: EngagementLevel,
    goodbye_strength: GoodbyeStrength,
) -> String {
    let mut parts = Vec::new();

    if signals.iter().any(|s| s.category == SignalCategory::Safety) {
        parts.push("possible safety concern raised, prioritize follow-up".to_string());
    }
    if signals.iter().any(|s| s.category == SignalCategory::Health) {
        parts.push("health-related detail mentioned".to_string());
    }
    if signals
        .iter()
        .any(|s| s.category == SignalCategory::Emotion && s.valence == Valence::Negative)
    {
        parts.push("senior expressed a difficult emotion, respond with warmth".to_string());
    }
    if signals.iter().any(|s| s.category == SignalCategory::Family) {
        parts.push("family came up, a good thread to follow".to_string());
    }
    if signals.iter().any(|s| s.category == SignalCategory::Activity) {
        parts.push("an activity was mentioned, show interest".to_string());
    }
    if signals.iter().any(|s| s.name == "reminiscing") {
        parts.push("senior is reminiscing, invite them to share more".to_string());
    }
    if signals
        .iter()
        .any(|s| s.category == SignalCategory::ReminderAcknowledgment)
    {
        parts.push("reminder appears acknowledged".to_string());
    }
    if is_question {
        parts.push("senior asked a direct question, answer it before moving on".to_string());
    }
    match engagement {
        EngagementLevel::Low => parts.push("engagement is low, keep it brief and warm".to_string()),
        EngagementLevel::High => parts.push("engagement is high, let them continue".to_string()),
        _ => {}
    }
    match goodbye_strength {
        GoodbyeStrength::Strong => parts.push("this reads as a clear goodbye".to_string()),
        GoodbyeStrength::Weak => parts.push("this may be a soft goodbye, confirm before closing".to_string()),
        GoodbyeStrength::None => {}
    }

    if parts.is_empty() {
        "no notable signals, continue naturally".to_string()
    } else {
        parts.join("; ")
    }
}

/// Model-recommendation priority table from §4.2 — first match wins.
fn recommend_tokens(
    is_question: bool,
    engagement: EngagementLevel,
    signals: &[Signal],
) -> ModelRecommendation {
    let has = |category: SignalCategory, severity: Severity| {
        signals
            .iter()
            .any(|s| s.category == category && s.severity == severity)
    };
    let has_category = |category: SignalCategory| signals.iter().any(|s| s.category == category);
    let has_negative_emotion = |severity: Severity| {
        signals
            .iter()
            .any(|s| s.category == SignalCategory::Emotion && s.valence == Valence::Negative && s.severity == severity)
    };

    if has(SignalCategory::Safety, Severity::High) {
        ModelRecommendation::new(200, "safety_concern")
    } else if has(SignalCategory::Health, Severity::High) {
        ModelRecommendation::new(180, "health_safety")
    } else if has(SignalCategory::Health, Severity::Medium) {
        ModelRecommendation::new(150, "health_mention")
    } else if has_negative_emotion(Severity::High) {
        ModelRecommendation::new(180, "emotional_support")
    } else if has_negative_emotion(Severity::Medium) {
        ModelRecommendation::new(150, "emotional_support")
    } else if engagement == EngagementLevel::Low {
        ModelRecommendation::new(130, "low_engagement")
    } else if signals.iter().any(|s| s.name == "reminiscing") {
        ModelRecommendation::new(120, "memory_sharing")
    } else if engagement == EngagementLevel::High {
        ModelRecommendation::new(100, "high_engagement")
    } else if is_question && !has_category(SignalCategory::Health) && !has_category(SignalCategory::Emotion) {
        ModelRecommendation::new(80, "simple_question")
    } else if signals.len() == 1 && has_category(SignalCategory::Family) {
        ModelRecommendation::new(100, "family_warmth")
    } else {
        ModelRecommendation::new(150, "default")
    }
}

/// Run the full Layer-1 analysis over one user utterance, given the last few
/// utterances for engagement context. Empty input returns a neutral
/// analysis with no guidance, per §4.2's edge-case rule.
pub fn analyze(utterance: &str, recent: &[String]) -> AnalysisRecord {
    if utterance.trim().is_empty() {
        return AnalysisRecord {
            signals: Vec::new(),
            is_question: false,
            engagement: EngagementLevel::Normal,
            goodbye_strength: GoodbyeStrength::None,
            needs_web_search: false,
            guidance: String::new(),
            recommendation: ModelRecommendation::new(150, "default"),
        };
    }

    let patterns = shared();
    let signals = patterns.categorize(utterance);
    let is_question = patterns.is_question(utterance);
    let engagement = engagement_level(utterance, recent, signals.len());
    let goodbye_strength = patterns.goodbye_strength(utterance);
    let needs_web_search = patterns.needs_web_search(utterance);
    let guidance = build_guidance(&signals, is_question, engagement, goodbye_strength);
    let recommendation = recommend_tokens(is_question, engagement, &signals);

    AnalysisRecord {
        signals,
        is_question,
        engagement,
        goodbye_strength,
        needs_web_search,
        guidance,
        recommendation,
    }
}

/// All categories the observer is capable of detecting, for documentation
/// and test exhaustiveness checks.
pub fn categories() -> &'static [SignalCategory] {
    &ALL_CATEGORIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_health_signal() {
        let a = analyze("My hip has been hurting all day", &[]);
        assert!(a.has_signal(SignalCategory::Health));
    }

    #[test]
    fn fall_is_a_health_signal_not_safety() {
        // S3 (§8): a fall reads as health_safety, not a live emergency.
        let a = analyze("I fell yesterday in the kitchen.", &[]);
        assert!(a.has_named_signal(SignalCategory::Health, "fall"));
        assert!(!a.has_signal(SignalCategory::Safety));
        assert_eq!(a.recommendation.max_tokens, 180);
        assert_eq!(a.recommendation.reason, "health_safety");
    }

    #[test]
    fn detects_safety_signal() {
        let a = analyze("There's a stranger at my door, it's an emergency", &[]);
        assert!(a.has_signal(SignalCategory::Safety));
        assert_eq!(a.recommendation.max_tokens, 200);
        assert_eq!(a.recommendation.reason, "safety_concern");
    }

    #[test]
    fn question_detection() {
        assert!(analyze("What time is it?", &[]).is_question);
        assert!(analyze("Do you know my daughter's number", &[]).is_question);
        assert!(!analyze("I took my pills this morning", &[]).is_question);
    }

    #[test]
    fn strong_goodbye_detected() {
        let a = analyze("Alright, goodbye now, talk to you later", &[]);
        assert_eq!(a.goodbye_strength, GoodbyeStrength::Strong);
    }

    #[test]
    fn weak_goodbye_detected() {
        let a = analyze("ok bye", &[]);
        assert_eq!(a.goodbye_strength, GoodbyeStrength::Weak);
    }

    #[test]
    fn low_engagement_on_short_terse_reply() {
        let recent = vec!["yes".to_string(), "ok".to_string()];
        let a = analyze("fine", &recent);
        assert_eq!(a.engagement, EngagementLevel::Low);
    }

    #[test]
    fn two_of_three_short_utterances_force_low_engagement() {
        // Testable property #12 (§8): char-length rule, independent of
        // word-count/signal heuristics. Only 2 of the last 3 need to be
        // short — the middle one here is long.
        let recent = vec![
            "yes".to_string(),
            "I'm doing alright today, thank you for asking".to_string(),
        ];
        let a = analyze("ok", &recent);
        assert_eq!(a.engagement, EngagementLevel::Low);
    }

    #[test]
    fn high_engagement_on_long_multi_signal_reply() {
        let a = analyze(
            "My daughter visited yesterday and we went for a walk in the garden, it was lovely and I felt so happy",
            &[],
        );
        assert_eq!(a.engagement, EngagementLevel::High);
    }

    #[test]
    fn reminiscing_signal_recommends_memory_sharing_tokens() {
        // S1 (§8): reminiscing takes priority over the engagement tiers.
        let a = analyze(
            "Pretty good, I was just thinking about when my mother taught me to bake pies.",
            &[],
        );
        assert!(a.has_named_signal(SignalCategory::Time, "reminiscing"));
        assert!(a.has_signal(SignalCategory::Family));
        assert_eq!(a.recommendation.max_tokens, 120);
        assert_eq!(a.recommendation.reason, "memory_sharing");
    }

    #[test]
    fn family_only_mention_recommends_family_warmth_tokens() {
        let a = analyze("My daughter", &[]);
        assert_eq!(a.recommendation.reason, "family_warmth");
        assert_eq!(a.recommendation.max_tokens, 100);
    }

    #[test]
    fn simple_question_without_health_or_emotion_recommends_short_tokens() {
        let a = analyze("What time is it?", &[]);
        assert_eq!(a.recommendation.reason, "simple_question");
        assert_eq!(a.recommendation.max_tokens, 80);
    }

    #[test]
    fn needs_web_search_flag() {
        assert!(analyze("What's the news today?", &[]).needs_web_search);
        assert!(!analyze("I watered the garden", &[]).needs_web_search);
    }

    #[test]
    fn reminder_acknowledgment_detected() {
        let a = analyze("Yes I took my pills already", &[]);
        assert!(a.has_signal(SignalCategory::ReminderAcknowledgment));
    }

    #[test]
    fn empty_input_returns_neutral_analysis_with_no_guidance() {
        let a = analyze("   ", &[]);
        assert!(a.signals.is_empty());
        assert_eq!(a.engagement, EngagementLevel::Normal);
        assert!(a.guidance.is_empty());
    }

    #[test]
    fn all_recommendation_tokens_stay_in_bounds() {
        for reason in [
            "safety_concern",
            "health_safety",
            "health_mention",
            "emotional_support",
            "low_engagement",
            "memory_sharing",
            "high_engagement",
            "simple_question",
            "family_warmth",
            "default",
        ] {
            let rec = ModelRecommendation::new(
                match reason {
                    "safety_concern" => 200,
                    "health_safety" | "emotional_support" => 180,
                    "health_mention" | "default" => 150,
                    "low_engagement" => 130,
                    "memory_sharing" => 120,
                    "high_engagement" | "family_warmth" => 100,
                    "simple_question" => 80,
                    _ => unreachable!(),
                },
                reason,
            );
            assert!(rec.max_tokens >= ModelRecommendation::MIN_TOKENS);
            assert!(rec.max_tokens <= ModelRecommendation::MAX_TOKENS);
        }
    }
}
