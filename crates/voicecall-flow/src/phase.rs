use serde::{Deserialize, Serialize};

/// Call-phase state machine (§4.7). Initial phase is `Opening`; `Ended` is
/// terminal and tears down the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Opening,
    Main,
    WindingDown,
    Closing,
    Ended,
}

/// How the system prompt's memory/daily context slot is rebuilt when a phase
/// is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    /// Keep accumulating — append new turns to the existing context.
    Append,
    /// Summarize prior turns into <=200 words and drop the rest.
    ResetWithSummary,
}

/// A tool gate check failed: the named tool isn't enabled in the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolNotAllowed {
    pub tool: String,
    pub phase: Phase,
}

impl Phase {
    pub const fn initial() -> Self {
        Phase::Opening
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Ended)
    }

    pub fn context_strategy(&self) -> ContextStrategy {
        match self {
            Phase::Main => ContextStrategy::ResetWithSummary,
            _ => ContextStrategy::Append,
        }
    }

    /// Tools enabled in this phase, beyond the transition tools.
    pub fn enabled_tools(&self) -> &'static [&'static str] {
        match self {
            Phase::Opening => &["search_memories", "save_important_detail", "transition_to_main"],
            Phase::Main => &[
                "search_memories",
                "get_news",
                "save_important_detail",
                "mark_reminder_acknowledged",
                "transition_to_winding_down",
            ],
            Phase::WindingDown => &["mark_reminder_acknowledged", "transition_to_closing"],
            Phase::Closing => &["mark_reminder_acknowledged"],
            Phase::Ended => &[],
        }
    }

    pub fn allows_tool(&self, tool: &str) -> bool {
        self.enabled_tools().contains(&tool)
    }

    /// The set of phases a `transition_to_*`/director/timeout signal may
    /// legally move this phase into.
    pub fn allowed_transitions(&self) -> &'static [Phase] {
        match self {
            Phase::Opening => &[Phase::Main],
            Phase::Main => &[Phase::WindingDown, Phase::Closing],
            Phase::WindingDown => &[Phase::Closing],
            Phase::Closing => &[Phase::Ended],
            Phase::Ended => &[],
        }
    }

    pub fn can_transition_to(&self, target: Phase) -> bool {
        self.allowed_transitions().contains(&target)
    }

    /// Apply a transition, returning the new phase. Returns `self` unchanged
    /// (a no-op) if the transition isn't allowed — callers should treat an
    /// unchanged phase as "transition rejected" and log it.
    pub fn transition(&self, target: Phase) -> Phase {
        if self.can_transition_to(target) {
            target
        } else {
            *self
        }
    }
}

/// Recommended phase transition from the Director (§4.3), mapped onto the
/// concrete `Phase` the orchestrator should move to from its current phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectorRecommendation {
    Stay,
    Advance,
    WindDown,
    Close,
}

impl DirectorRecommendation {
    /// Resolve this recommendation against the current phase. `Stay` and any
    /// recommendation the current phase doesn't support return `None`.
    pub fn resolve(&self, current: Phase) -> Option<Phase> {
        let target = match self {
            DirectorRecommendation::Stay => return None,
            DirectorRecommendation::Advance => match current {
                Phase::Opening => Phase::Main,
                Phase::Main => Phase::WindingDown,
                Phase::WindingDown => Phase::Closing,
                _ => return None,
            },
            DirectorRecommendation::WindDown => Phase::WindingDown,
            DirectorRecommendation::Close => Phase::Closing,
        };
        if current.can_transition_to(target) {
            Some(target)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_phase_is_opening() {
        assert_eq!(Phase::initial(), Phase::Opening);
    }

    #[test]
    fn opening_only_advances_to_main() {
        assert!(Phase::Opening.can_transition_to(Phase::Main));
        assert!(!Phase::Opening.can_transition_to(Phase::Closing));
    }

    #[test]
    fn main_resets_context_with_summary() {
        assert_eq!(Phase::Main.context_strategy(), ContextStrategy::ResetWithSummary);
        assert_eq!(Phase::Opening.context_strategy(), ContextStrategy::Append);
    }

    #[test]
    fn closing_only_allows_ack_tool() {
        assert!(Phase::Closing.allows_tool("mark_reminder_acknowledged"));
        assert!(!Phase::Closing.allows_tool("get_news"));
    }

    #[test]
    fn transition_rejects_illegal_target() {
        assert_eq!(Phase::Opening.transition(Phase::Ended), Phase::Opening);
        assert_eq!(Phase::Opening.transition(Phase::Main), Phase::Main);
    }

    #[test]
    fn director_advance_resolves_relative_to_current_phase() {
        assert_eq!(
            DirectorRecommendation::Advance.resolve(Phase::Opening),
            Some(Phase::Main)
        );
        assert_eq!(
            DirectorRecommendation::Advance.resolve(Phase::Closing),
            None
        );
    }

    #[test]
    fn director_stay_never_resolves() {
        assert_eq!(DirectorRecommendation::Stay.resolve(Phase::Main), None);
    }
}
