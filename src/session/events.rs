use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::ServiceError;
use crate::protocol::models::ArbitraryJson;
use crate::protocol::server_messages::{ServerContent, ToolCall, ToolCallCancellation};

/// Tag identifying an event feed. Listeners register against a kind; every
/// [`LiveEvent`] maps to exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    SetupComplete,
    Content,
    Audio,
    ToolCall,
    ToolCallCancellation,
    Interrupted,
    TurnComplete,
    Error,
    Log,
    Message,
    Close,
}

/// A typed event delivered to session listeners, in transport order.
#[derive(Debug, Clone)]
pub enum LiveEvent {
    /// The transport opened and the setup message was sent.
    Open,
    /// The service acknowledged setup; ready for turn-taking.
    SetupComplete,
    /// Model turn content with audio parts already stripped out.
    Content(ServerContent),
    /// One decoded PCM16 chunk of model speech.
    Audio(Vec<u8>),
    ToolCall(ToolCall),
    ToolCallCancellation(ToolCallCancellation),
    /// The model turn was preempted; flush playback now.
    Interrupted,
    TurnComplete,
    Error(ServiceError),
    /// Diagnostic feed: absorbed decode failures, unrecognized payloads.
    Log { kind: String, message: String },
    /// Raw unrecognized inbound payload.
    Message(ArbitraryJson),
    /// The session reached its terminal state. Nothing is emitted after this.
    Close { code: Option<u16> },
}

impl LiveEvent {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Open => EventKind::Open,
            Self::SetupComplete => EventKind::SetupComplete,
            Self::Content(_) => EventKind::Content,
            Self::Audio(_) => EventKind::Audio,
            Self::ToolCall(_) => EventKind::ToolCall,
            Self::ToolCallCancellation(_) => EventKind::ToolCallCancellation,
            Self::Interrupted => EventKind::Interrupted,
            Self::TurnComplete => EventKind::TurnComplete,
            Self::Error(_) => EventKind::Error,
            Self::Log { .. } => EventKind::Log,
            Self::Message(_) => EventKind::Message,
            Self::Close { .. } => EventKind::Close,
        }
    }
}

/// Borrowing stream over the session's event channel.
pub struct LiveEventStream<'a> {
    rx: &'a mut mpsc::Receiver<LiveEvent>,
}

impl<'a> LiveEventStream<'a> {
    #[must_use]
    pub const fn new(rx: &'a mut mpsc::Receiver<LiveEvent>) -> Self {
        Self { rx }
    }
}

impl Stream for LiveEventStream<'_> {
    type Item = LiveEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll_recv(cx)
    }
}
