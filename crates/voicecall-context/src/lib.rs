pub mod cache;
pub mod daily;
pub mod error;
pub mod greeting;
pub mod prefetch;

pub use cache::{ContextCache, ContextCacheEntry};
pub use daily::{CallContextUpdate, DailyContextStore, TodaysContext};
pub use error::ContextError;
pub use greeting::{pick_weighted_interest, render_greeting, GreetingRotator};
pub use prefetch::should_prefetch_now;
