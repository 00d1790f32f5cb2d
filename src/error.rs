use crate::transport::ws::WsStream;
use futures::stream::ReuniteError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_tungstenite::tungstenite::protocol::Message;

/// Error payload carried by an inbound `error` message from the service.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ServiceError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Transport open or handshake failure. Fatal to the attempted connect;
    /// never retried automatically.
    #[error("connection error: {0}")]
    Connection(#[from] tokio_tungstenite::tungstenite::Error),

    /// The supplied credential fails format validation before any network
    /// traffic is attempted.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// A send was attempted while the session is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// Microphone permission or device failure. The capture pipeline stays
    /// in a clean, restartable state after this.
    #[error("audio capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// The playback device could not be opened or switched.
    #[error("audio playback unavailable: {0}")]
    PlaybackUnavailable(String),

    /// Malformed inbound protocol payload. Logged and absorbed; never
    /// terminates the session.
    #[error("malformed inbound payload: {0}")]
    ProtocolDecode(String),

    /// Malformed inbound PCM payload. The chunk is dropped; playback and its
    /// scheduling clock continue.
    #[error("malformed inbound audio: {0}")]
    PlaybackDecode(String),

    #[error("failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("service error: {0:?}")]
    Service(ServiceError),

    #[error("the connection was closed unexpectedly")]
    ConnectionClosed,

    #[error("failed to reunite split client: {0}")]
    Reunite(#[from] ReuniteError<WsStream, Message>),

    #[error("invalid client message: {0}")]
    InvalidClientMessage(String),
}

pub type Result<T> = std::result::Result<T, Error>;
