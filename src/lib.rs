#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Realtime client for the Gemini Multimodal Live API.
//!
//! [`LiveSession`] is the high-level surface: it owns the connection, drives
//! the turn/tool-use state machine, and delivers typed events. [`LiveClient`]
//! is the low-level protocol client for callers that want raw frames. The
//! [`audio`] module provides the microphone capture and speaker playback
//! pipelines that pair with a session.

pub mod audio;
pub mod error;
pub mod protocol;
pub mod session;
pub mod transport;

pub use audio::{AudioCapture, AudioPlayback, PlaybackScheduler};
pub use error::{Error, Result, ServiceError};
pub use protocol::client_messages::ClientMessage;
pub use protocol::models::{
    Blob, Content, FunctionCall, FunctionResponse, GenerationConfig, LiveConfig, MediaChunk, Part,
    PrebuiltVoiceConfig, ResponseModality, SpeechConfig, SystemInstruction, VoiceConfig,
};
pub use protocol::server_messages::{
    ServerContent, ServerMessage, ToolCall, ToolCallCancellation,
};
pub use session::{
    ConnectionState, EventKind, EventRegistry, LiveEvent, LiveEventStream, LiveSession,
    LiveSessionBuilder, LiveSessionHandle,
};

use futures::stream::BoxStream;
use futures::{SinkExt, StreamExt};
use serde_json::from_str;
use tokio_tungstenite::tungstenite::protocol::Message;
use transport::ws::WsStream;

const TRACE_LOG_MAX_BYTES: usize = 1024;
const MAX_REALTIME_CHUNK_BYTES: usize = 15 * 1024 * 1024;
const TRACE_TRUNCATE_SUFFIX: &str = "... (truncated)";

/// Low-level protocol client: one WebSocket connection, typed frames in and
/// out.
///
/// Thread safety: `LiveClient` is `Send` but not `Sync` because the
/// underlying WebSocket stream is not `Sync`.
#[must_use]
pub struct LiveClient {
    stream: WsStream,
    close_code: Option<u16>,
}

impl LiveClient {
    /// Connect to the Live API.
    ///
    /// # Errors
    /// Returns [`Error::InvalidCredential`] if the credential fails format
    /// validation and [`Error::Connection`] if the handshake fails.
    pub async fn connect(credential: &str) -> Result<Self> {
        let stream = transport::ws::connect(credential).await?;
        Ok(Self {
            stream,
            close_code: None,
        })
    }

    /// Send a client message.
    ///
    /// # Errors
    /// Returns an error if validation or serialization fails or if the
    /// WebSocket send fails.
    pub async fn send(&mut self, message: ClientMessage) -> Result<()> {
        validate_client_message(&message)?;
        let json = serde_json::to_string(&message)?;
        tracing::trace!("Sending message: {}", safe_truncate(&json, TRACE_LOG_MAX_BYTES));
        self.stream.send(Message::Text(json.into())).await?;
        Ok(())
    }

    /// Receive the next server message. Returns `Ok(None)` once the remote
    /// end closes the connection; [`Self::close_code`] then reports the
    /// close code.
    ///
    /// # Errors
    /// Returns an error if the WebSocket fails.
    pub async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        while let Some(msg) = self.stream.next().await {
            match msg? {
                Message::Text(text) => {
                    tracing::trace!(
                        "Received message: {}",
                        safe_truncate(&text, TRACE_LOG_MAX_BYTES)
                    );
                    return Ok(Some(parse_inbound(&text)));
                }
                Message::Binary(bytes) => {
                    // The service may deliver frames as binary JSON.
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            tracing::trace!(
                                "Received message: {}",
                                safe_truncate(text, TRACE_LOG_MAX_BYTES)
                            );
                            return Ok(Some(parse_inbound(text)));
                        }
                        Err(err) => {
                            tracing::warn!("discarding non-UTF-8 binary frame: {err}");
                        }
                    }
                }
                Message::Close(frame) => {
                    self.close_code = frame.map(|f| f.code.into());
                    tracing::info!(
                        "WebSocket connection closed by server (code {:?})",
                        self.close_code
                    );
                    return Ok(None);
                }
                Message::Ping(payload) => {
                    tracing::debug!("Received Ping, sending Pong");
                    self.stream.send(Message::Pong(payload)).await?;
                }
                _ => (),
            }
        }
        Ok(None)
    }

    /// Close code received from the remote end, if any.
    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        self.close_code
    }

    /// Close the connection.
    ///
    /// # Errors
    /// Returns an error if the close handshake fails.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close().await?;
        Ok(())
    }

    /// Split the client into a sender and a receiver for concurrent usage.
    pub fn split(self) -> (LiveSender, LiveReceiver) {
        let (write, read) = self.stream.split();
        (LiveSender { write }, LiveReceiver { read })
    }

    /// Re-unify a split client.
    ///
    /// # Errors
    /// Returns an error if the split halves don't match.
    #[allow(clippy::result_large_err)]
    pub fn unsplit(sender: LiveSender, receiver: LiveReceiver) -> Result<Self> {
        let stream = receiver.read.reunite(sender.write)?;
        Ok(Self {
            stream,
            close_code: None,
        })
    }
}

/// Decode one inbound frame. A frame that is not even valid JSON becomes
/// `ServerMessage::Unknown` rather than an error: one bad payload never
/// terminates the session.
fn parse_inbound(text: &str) -> ServerMessage {
    from_str::<ServerMessage>(text).unwrap_or_else(|err| {
        tracing::warn!("undecodable inbound frame: {err}");
        ServerMessage::Unknown(serde_json::Value::String(text.to_string()))
    })
}

fn safe_truncate(s: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if s.len() <= max_bytes {
        return std::borrow::Cow::Borrowed(s);
    }

    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    std::borrow::Cow::Owned(format!(
        "{} {} {} bytes",
        &s[..end],
        TRACE_TRUNCATE_SUFFIX,
        s.len() - end
    ))
}

/// The sending half of a split `LiveClient`.
pub struct LiveSender {
    write: futures::stream::SplitSink<WsStream, Message>,
}

impl LiveSender {
    /// Send a client message.
    ///
    /// # Errors
    /// Returns an error if validation, serialization or sending fails.
    pub async fn send(&mut self, message: ClientMessage) -> Result<()> {
        validate_client_message(&message)?;
        let json = serde_json::to_string(&message)?;
        tracing::trace!(
            "Sending message (split): {}",
            safe_truncate(&json, TRACE_LOG_MAX_BYTES)
        );
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

#[allow(clippy::result_large_err)]
fn validate_client_message(message: &ClientMessage) -> Result<()> {
    if let ClientMessage::RealtimeInput { media_chunks } = message {
        for chunk in media_chunks {
            let size = estimate_base64_decoded_len(&chunk.data)?;
            if size > MAX_REALTIME_CHUNK_BYTES {
                return Err(Error::InvalidClientMessage(format!(
                    "realtimeInput chunk exceeds 15MB ({size} bytes)",
                )));
            }
        }
    }
    Ok(())
}

#[allow(clippy::result_large_err)]
fn estimate_base64_decoded_len(s: &str) -> Result<usize> {
    let bytes = s.as_bytes();
    if bytes.len() % 4 != 0 {
        return Err(Error::InvalidClientMessage(
            "realtimeInput chunk has invalid base64 length".to_string(),
        ));
    }

    let mut padding = 0;
    let mut seen_padding = false;
    for &b in bytes {
        if b == b'=' {
            seen_padding = true;
            padding += 1;
            continue;
        }
        if seen_padding {
            return Err(Error::InvalidClientMessage(
                "realtimeInput chunk has invalid base64 padding".to_string(),
            ));
        }
        let is_valid = matches!(b,
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'+' | b'/'
        );
        if !is_valid {
            return Err(Error::InvalidClientMessage(
                "realtimeInput chunk has invalid base64 character".to_string(),
            ));
        }
    }

    if padding > 2 {
        return Err(Error::InvalidClientMessage(
            "realtimeInput chunk has invalid base64 padding length".to_string(),
        ));
    }

    Ok(bytes.len() / 4 * 3 - padding)
}

/// The receiving half of a split `LiveClient`.
pub struct LiveReceiver {
    read: futures::stream::SplitStream<WsStream>,
}

impl LiveReceiver {
    /// Exposes an asynchronous stream of `Result<ServerMessage>` that
    /// preserves errors.
    #[must_use]
    pub fn try_into_stream(self) -> BoxStream<'static, Result<ServerMessage>> {
        self.read
            .map(|res| res.map_err(Error::from))
            .filter_map(|res| async move {
                match res {
                    Ok(Message::Text(text)) => {
                        tracing::trace!(
                            "Received message (stream): {}",
                            safe_truncate(&text, TRACE_LOG_MAX_BYTES)
                        );
                        Some(Ok(parse_inbound(&text)))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            })
            .boxed()
    }
}
