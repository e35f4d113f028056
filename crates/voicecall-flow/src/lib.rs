pub mod ending;
pub mod phase;

pub use ending::{CallEndingController, EndingState, GoodbyeStrength, Side};
pub use phase::{ContextStrategy, DirectorRecommendation, Phase};
