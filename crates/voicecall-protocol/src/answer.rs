use serde::Serialize;

use crate::frames::StreamCustomParameters;

/// Instruction document returned by `POST /voice/answer`, pointing the
/// telephony provider at our media-stream WebSocket and echoing the
/// parameters it should hand back on the `start` event.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectInstruction {
    pub stream_url: String,
    pub custom_parameters: StreamCustomParameters,
}

impl ConnectInstruction {
    pub fn new(stream_url: impl Into<String>, custom_parameters: StreamCustomParameters) -> Self {
        Self {
            stream_url: stream_url.into(),
            custom_parameters,
        }
    }
}
