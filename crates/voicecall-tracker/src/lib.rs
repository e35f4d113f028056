pub mod stripper;
pub mod tracker;

pub use stripper::GuidanceStripper;
pub use tracker::ConversationTracker;
