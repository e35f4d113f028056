use std::sync::OnceLock;

use regex::Regex;

fn bracket_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\s*\[[A-Z0-9_ ]+\]\s*").unwrap())
}

/// Removes `<guidance>...</guidance>` spans and stray top-level
/// `[BRACKETED]` markers from streaming text before it reaches TTS (§4.5).
///
/// Guidance tags can straddle chunk boundaries, so this holds a small tail
/// of unflushed text between calls rather than scanning each chunk alone.
#[derive(Debug, Default)]
pub struct GuidanceStripper {
    pending: String,
    inside_guidance: bool,
}

impl GuidanceStripper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of streamed text. Returns the portion now safe to
    /// forward to TTS (may be empty if the chunk was entirely guidance, or
    /// if it looks like it might still be the start of a `<guidance>` tag).
    pub fn push(&mut self, chunk: &str) -> String {
        self.pending.push_str(chunk);
        self.drain_ready()
    }

    /// Call once the stream has ended to flush whatever's left in the tail
    /// buffer (an unterminated `<guidance>` tag is just dropped).
    pub fn flush(&mut self) -> String {
        let remaining = std::mem::take(&mut self.pending);
        if self.inside_guidance {
            return String::new();
        }
        strip_brackets(&remaining)
    }

    fn drain_ready(&mut self) -> String {
        let mut output = String::new();

        loop {
            if self.inside_guidance {
                match self.pending.find("</guidance>") {
                    Some(end) => {
                        self.pending.drain(..end + "</guidance>".len());
                        self.inside_guidance = false;
                    }
                    None => break,
                }
            } else {
                match self.pending.find("<guidance>") {
                    Some(start) => {
                        output.push_str(&self.pending[..start]);
                        self.pending.drain(..start + "<guidance>".len());
                        self.inside_guidance = true;
                    }
                    None => {
                        // Only withhold a tail that could still grow into
                        // "<guidance>" once more text arrives — never hold
                        // back text that plainly isn't starting a tag.
                        let hold = partial_tag_suffix_len(&self.pending, "<guidance>");
                        let split_at = self.pending.len() - hold;
                        let split_at = floor_char_boundary(&self.pending, split_at);
                        output.push_str(&self.pending[..split_at]);
                        self.pending.drain(..split_at);
                        break;
                    }
                }
            }
        }

        strip_brackets(&output)
    }
}

/// Longest suffix of `text` that's also a strict prefix of `tag` — i.e. the
/// part of `text`'s tail that could still grow into `tag` with more input.
fn partial_tag_suffix_len(text: &str, tag: &str) -> usize {
    let max = tag.len().saturating_sub(1).min(text.len());
    (1..=max)
        .rev()
        .find(|&len| text.ends_with(&tag[..len]))
        .unwrap_or(0)
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn strip_brackets(text: &str) -> String {
    let stripped = bracket_pattern().replace(text, "");
    stripped.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_plain_text() {
        let mut s = GuidanceStripper::new();
        assert_eq!(s.push("Hello there, how are you today?"), "Hello there, how are you today?");
    }

    #[test]
    fn strips_guidance_within_one_chunk() {
        let mut s = GuidanceStripper::new();
        let out = s.push("Hi there <guidance>sound warm</guidance> how's your day?");
        assert_eq!(out, "Hi there  how's your day?".trim());
    }

    #[test]
    fn strips_guidance_split_across_chunks() {
        let mut s = GuidanceStripper::new();
        let mut out = String::new();
        out.push_str(&s.push("Hi there <guid"));
        out.push_str(&s.push("ance>sound warm and keep"));
        out.push_str(&s.push(" it short</guidance> how's your day?"));
        assert!(!out.contains("guidance"));
        assert!(out.contains("how's your day?"));
    }

    #[test]
    fn strips_top_level_bracket_marker() {
        let mut s = GuidanceStripper::new();
        assert_eq!(s.push("[INTERNAL] Let's talk about your garden"), "Let's talk about your garden");
    }

    #[test]
    fn empty_after_stripping_produces_empty_string() {
        let mut s = GuidanceStripper::new();
        let out = s.push("<guidance>just a note to self</guidance>");
        assert!(out.is_empty());
    }

    #[test]
    fn flush_drops_unterminated_guidance() {
        let mut s = GuidanceStripper::new();
        s.push("before <guidance>never closes");
        assert_eq!(s.flush(), "");
    }

    #[test]
    fn short_chunk_streams_immediately_without_a_trailing_tag() {
        // A short utterance must not wait on `flush()` to appear — only a
        // genuine partial "<guidance>" prefix should be withheld.
        let mut s = GuidanceStripper::new();
        assert_eq!(s.push("Okay"), "Okay");
        assert_eq!(s.push(", I'll do that."), ", I'll do that.");
    }

    #[test]
    fn partial_tag_prefix_is_withheld_then_released_once_disambiguated() {
        let mut s = GuidanceStripper::new();
        assert_eq!(s.push("sounds good <guid"), "sounds good");
        assert_eq!(s.push("e to living room"), "<guide to living room");
    }
}
