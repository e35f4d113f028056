use voicecall_flow::Phase;
use voicecall_llm::prompt::SystemPrompt;

const BASE_PERSONA: &str = "You are a warm, patient phone companion checking in on an elderly \
    person. Speak in short, natural sentences as if on a phone call — no markdown, no lists, no \
    headers. Never mention you are an AI, a model, or software. Keep a caring but unhurried tone.";

fn phase_task_instructions(phase: Phase) -> &'static str {
    match phase {
        Phase::Opening => "You're opening the call. Greet them warmly and ease into conversation. \
            Once the chit-chat has settled, call transition_to_main.",
        Phase::Main => "You're in the main part of the call. Check in on how they're doing, follow \
            up on anything notable, and deliver any reminder naturally when it fits. When the \
            conversation has run its course, call transition_to_winding_down.",
        Phase::WindingDown => "Start steering toward a natural goodbye. Wrap up any open threads. \
            When ready, call transition_to_closing.",
        Phase::Closing => "Say a warm goodbye and let the call end naturally.",
        Phase::Ended => "",
    }
}

/// Everything needed to render the twelve system-prompt slots (§4.9 step 2)
/// into the three cache tiers `voicecall_llm::SystemPrompt` groups them into.
pub struct PromptInputs<'a> {
    pub tenant_identity: &'a str,
    pub memory_context: &'a str,
    pub daily_context: &'a str,
    pub reminder_instruction: Option<&'a str>,
    pub phase: Phase,
    pub layer1_guidance: &'a str,
    pub director_guidance: &'a str,
    pub undelivered_reminders: &'a [String],
    pub tracker_summary: &'a str,
    pub recent_call_summary: Option<&'a str>,
    pub news_topics: &'a [String],
}

pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> SystemPrompt {
    let mut tenant_tier = String::new();
    tenant_tier.push_str(inputs.tenant_identity);
    if !inputs.memory_context.is_empty() {
        tenant_tier.push_str("\n\nWhat you remember about them:\n");
        tenant_tier.push_str(inputs.memory_context);
    }
    if !inputs.daily_context.is_empty() {
        tenant_tier.push_str("\n\nEarlier today:\n");
        tenant_tier.push_str(inputs.daily_context);
    }
    if let Some(instruction) = inputs.reminder_instruction {
        tenant_tier.push_str("\n\nReminder to deliver this call: ");
        tenant_tier.push_str(instruction);
    }

    let mut volatile_tier = String::new();
    volatile_tier.push_str(phase_task_instructions(inputs.phase));
    if !inputs.layer1_guidance.is_empty() {
        volatile_tier.push_str("\n\n[internal guidance] ");
        volatile_tier.push_str(inputs.layer1_guidance);
    }
    if !inputs.director_guidance.is_empty() {
        volatile_tier.push_str("\n\n[internal guidance] ");
        volatile_tier.push_str(inputs.director_guidance);
    }
    if !inputs.undelivered_reminders.is_empty() {
        volatile_tier.push_str("\n\nStill to deliver this call: ");
        volatile_tier.push_str(&inputs.undelivered_reminders.join("; "));
    }
    if !inputs.tracker_summary.is_empty() {
        volatile_tier.push('\n');
        volatile_tier.push('\n');
        volatile_tier.push_str(inputs.tracker_summary);
    }
    if let Some(summary) = inputs.recent_call_summary {
        volatile_tier.push_str("\n\nSummary of the last call with them: ");
        volatile_tier.push_str(summary);
    }
    if !inputs.news_topics.is_empty() {
        volatile_tier.push_str("\n\nTopical small talk you could draw on if relevant: ");
        volatile_tier.push_str(&inputs.news_topics.join("; "));
    }

    SystemPrompt {
        static_tier: BASE_PERSONA.to_string(),
        tenant_tier,
        volatile_tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_inputs() -> PromptInputs<'static> {
        PromptInputs {
            tenant_identity: "Dorothy, 82, enjoys gardening.",
            memory_context: "",
            daily_context: "",
            reminder_instruction: None,
            phase: Phase::Main,
            layer1_guidance: "",
            director_guidance: "",
            undelivered_reminders: &[],
            tracker_summary: "",
            recent_call_summary: None,
            news_topics: &[],
        }
    }

    #[test]
    fn static_tier_is_always_the_base_persona() {
        let prompt = build_system_prompt(&base_inputs());
        assert!(prompt.static_tier.contains("warm, patient phone companion"));
    }

    #[test]
    fn reminder_instruction_lands_in_tenant_tier_not_volatile() {
        let mut inputs = base_inputs();
        inputs.reminder_instruction = Some("remind her to take her blood pressure pill");
        let prompt = build_system_prompt(&inputs);
        assert!(prompt.tenant_tier.contains("blood pressure pill"));
        assert!(!prompt.volatile_tier.contains("blood pressure pill"));
    }

    #[test]
    fn phase_task_instructions_change_per_phase() {
        let mut inputs = base_inputs();
        inputs.phase = Phase::Closing;
        let prompt = build_system_prompt(&inputs);
        assert!(prompt.volatile_tier.contains("goodbye"));
    }
}
