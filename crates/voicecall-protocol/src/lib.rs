pub mod answer;
pub mod error;
pub mod frames;
pub mod signature;
pub mod stt;
pub mod tts;

pub use error::ProtocolError;
pub use frames::{CallStatus, StreamEventFrame};
pub use stt::{HttpSttProvider, SttEvent, SttProvider};
pub use tts::{HttpTtsProvider, TtsProvider, VoiceConfig};
