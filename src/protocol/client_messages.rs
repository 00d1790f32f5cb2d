use serde::{Deserialize, Serialize};

use super::models::{Content, FunctionResponse, LiveConfig, MediaChunk};

/// A client→service frame. Serializes as a JSON object whose single key
/// names the message kind (`setup`, `clientContent`, `realtimeInput`,
/// `toolResponse`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration. Sent exactly once, as part of entering the
    /// connected state.
    Setup(Box<LiveConfig>),

    /// Turn-structured content, typically a typed user message.
    #[serde(rename_all = "camelCase")]
    ClientContent {
        turns: Vec<Content>,
        #[serde(skip_serializing_if = "Option::is_none")]
        turn_complete: Option<bool>,
    },

    /// Streaming media: microphone audio chunks and camera/screen frames.
    /// Chunks are transmitted in the order given, as one logical message.
    #[serde(rename_all = "camelCase")]
    RealtimeInput { media_chunks: Vec<MediaChunk> },

    /// Results for function calls previously requested by the model.
    #[serde(rename_all = "camelCase")]
    ToolResponse {
        function_responses: Vec<FunctionResponse>,
    },
}

impl ClientMessage {
    /// Wrap a typed user message as a complete turn.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self::ClientContent {
            turns: vec![Content::user_text(text)],
            turn_complete: Some(true),
        }
    }

    /// Wrap media chunks for the realtime input channel.
    #[must_use]
    pub const fn realtime_input(media_chunks: Vec<MediaChunk>) -> Self {
        Self::RealtimeInput { media_chunks }
    }
}
