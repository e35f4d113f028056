use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Goodbye strength as classified by the Pattern Observer (Layer 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoodbyeStrength {
    None,
    Weak,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndingState {
    Idle,
    Armed,
    Ending,
    Ended,
}

pub const GRACE_PERIOD: Duration = Duration::from_millis(3_500);
pub const HARD_CAP_WIND_DOWN: Duration = Duration::from_secs(9 * 60);
pub const HARD_CAP_END: Duration = Duration::from_secs(12 * 60);

/// Goal: end the call naturally once both sides have signaled goodbye,
/// without cutting off a false goodbye (§4.8).
#[derive(Debug)]
pub struct CallEndingController {
    state: EndingState,
    /// Set when one side gives a *strong* goodbye and we're waiting to see
    /// if the other side reciprocates.
    awaiting_reciprocation_from: Option<Side>,
    armed_at: Option<Instant>,
}

impl Default for CallEndingController {
    fn default() -> Self {
        Self::new()
    }
}

impl CallEndingController {
    pub fn new() -> Self {
        Self {
            state: EndingState::Idle,
            awaiting_reciprocation_from: None,
            armed_at: None,
        }
    }

    pub fn state(&self) -> EndingState {
        self.state
    }

    /// Feed a goodbye signal from either side. Arms the grace timer once a
    /// strong goodbye from one side is reciprocated by any goodbye from the
    /// other.
    pub fn on_goodbye(&mut self, side: Side, strength: GoodbyeStrength, now: Instant) {
        if self.state == EndingState::Ending || self.state == EndingState::Ended {
            return;
        }
        if strength == GoodbyeStrength::None {
            return;
        }

        match self.awaiting_reciprocation_from {
            None => {
                if strength == GoodbyeStrength::Strong {
                    self.awaiting_reciprocation_from = Some(other(side));
                }
            }
            Some(expected) if expected == side => {
                self.arm(now);
            }
            Some(_) => {
                // Same side repeated a goodbye before the other reciprocated —
                // keep waiting on the original side.
            }
        }
    }

    fn arm(&mut self, now: Instant) {
        self.state = EndingState::Armed;
        self.armed_at = Some(now);
        self.awaiting_reciprocation_from = None;
    }

    /// User speech while `ARMED` cancels the grace timer — it was a false
    /// goodbye, or the senior kept talking.
    pub fn on_user_speech(&mut self) {
        if self.state == EndingState::Armed {
            self.state = EndingState::Idle;
            self.armed_at = None;
        }
    }

    /// Poll the grace timer; transitions to `Ending` once it expires.
    pub fn tick(&mut self, now: Instant) {
        if self.state == EndingState::Armed {
            if let Some(armed_at) = self.armed_at {
                if now.duration_since(armed_at) >= GRACE_PERIOD {
                    self.state = EndingState::Ending;
                }
            }
        }
    }

    /// Director's `force_end` — immediate transition regardless of state.
    pub fn force_end(&mut self) {
        if self.state != EndingState::Ended {
            self.state = EndingState::Ending;
        }
    }

    /// 12-minute hard cap (§4.3) — call with elapsed call duration.
    pub fn check_hard_cap(&mut self, call_elapsed: Duration) {
        if call_elapsed >= HARD_CAP_END && self.state != EndingState::Ended {
            self.state = EndingState::Ending;
        }
    }

    /// The transport/post-call processor has taken over; the call is done.
    pub fn mark_ended(&mut self) {
        self.state = EndingState::Ended;
    }
}

fn other(side: Side) -> Side {
    match side {
        Side::User => Side::Assistant,
        Side::Assistant => Side::User,
    }
}
