use serde::{Deserialize, Serialize};

use voicecall_flow::DirectorRecommendation;

pub const MAX_GUIDANCE_CHARS: usize = 500;

/// Director's contribution for the next turn (§4.3). Token-budget advice is
/// advisory only — Layer-1's recommendation remains authoritative for safety.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorGuidance {
    pub guidance: String,
    pub recommendation: DirectorRecommendation,
    pub token_advice: Option<u32>,
    pub force_wind_down: bool,
    pub force_end: bool,
}

impl DirectorGuidance {
    pub fn idle() -> Self {
        Self {
            guidance: String::new(),
            recommendation: DirectorRecommendation::Stay,
            token_advice: None,
            force_wind_down: false,
            force_end: false,
        }
    }
}

/// Raw JSON shape the director LLM is asked to produce, before sanitization.
#[derive(Debug, Deserialize)]
pub(crate) struct RawDirectorOutput {
    pub guidance: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    #[serde(default)]
    pub token_advice: Option<u32>,
    #[serde(default)]
    pub force_wind_down: bool,
    #[serde(default)]
    pub force_end: bool,
}

pub(crate) fn parse_recommendation(raw: Option<&str>) -> DirectorRecommendation {
    match raw {
        Some("advance") => DirectorRecommendation::Advance,
        Some("wind_down") => DirectorRecommendation::WindDown,
        Some("close") => DirectorRecommendation::Close,
        _ => DirectorRecommendation::Stay,
    }
}

/// Strip control characters and `<guidance>` tags, and cap length — the
/// Director's text is interpolated into the system prompt unescaped.
pub(crate) fn sanitize_guidance(raw: &str) -> String {
    let no_tags = raw.replace("<guidance>", "").replace("</guidance>", "");
    let cleaned: String = no_tags.chars().filter(|c| !c.is_control() || *c == ' ').collect();
    let trimmed = cleaned.trim();
    if trimmed.chars().count() > MAX_GUIDANCE_CHARS {
        trimmed.chars().take(MAX_GUIDANCE_CHARS).collect()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_tags_and_control_chars() {
        let dirty = "<guidance>be warm\u{0007} and brief</guidance>";
        let clean = sanitize_guidance(dirty);
        assert!(!clean.contains("<guidance>"));
        assert!(!clean.contains('\u{0007}'));
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "a".repeat(1000);
        assert_eq!(sanitize_guidance(&long).chars().count(), MAX_GUIDANCE_CHARS);
    }

    #[test]
    fn parse_recommendation_defaults_to_stay() {
        assert_eq!(parse_recommendation(Some("bogus")), DirectorRecommendation::Stay);
        assert_eq!(parse_recommendation(None), DirectorRecommendation::Stay);
        assert_eq!(parse_recommendation(Some("advance")), DirectorRecommendation::Advance);
    }
}
