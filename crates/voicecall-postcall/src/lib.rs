pub mod analysis;
pub mod processor;

pub use processor::{PostCallInput, PostCallProcessor};
