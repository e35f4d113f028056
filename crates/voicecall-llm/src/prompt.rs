/// The twelve system-prompt slots (§4.9 step 2), grouped into three cache
/// tiers. Grouping follows how often each slot actually changes within a
/// call, so repeated turns reuse the provider's prompt cache instead of
/// re-billing the whole prompt every turn:
///
/// - `static_tier`: base persona — identical across every call.
/// - `tenant_tier`: tenant identity/notes, pre-fetched memory + daily context,
///   reminder-delivery instruction — fixed for the lifetime of one call.
/// - `volatile_tier`: current phase instructions, Layer-1 guidance, last
///   Director guidance, undelivered reminders, tracker summary, recent call
///   summary, news topics — changes every turn.
#[derive(Debug, Clone, Default)]
pub struct SystemPrompt {
    pub static_tier: String,
    pub tenant_tier: String,
    pub volatile_tier: String,
}

impl SystemPrompt {
    pub fn to_plain_text(&self) -> String {
        let mut out = self.static_tier.clone();
        if !self.tenant_tier.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.tenant_tier);
        }
        if !self.volatile_tier.is_empty() {
            out.push_str("\n\n");
            out.push_str(&self.volatile_tier);
        }
        out
    }

    /// Convert to Anthropic API format with cache breakpoints on the first
    /// two tiers; the volatile tier is placed last, uncached, so it never
    /// breaks the cached prefix.
    pub fn to_anthropic_blocks(&self) -> Vec<serde_json::Value> {
        let mut blocks = Vec::with_capacity(3);

        blocks.push(serde_json::json!({
            "type": "text",
            "text": self.static_tier,
            "cache_control": { "type": "ephemeral" }
        }));

        if !self.tenant_tier.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.tenant_tier,
                "cache_control": { "type": "ephemeral" }
            }));
        }

        if !self.volatile_tier.is_empty() {
            blocks.push(serde_json::json!({
                "type": "text",
                "text": self.volatile_tier,
            }));
        }

        blocks
    }
}
