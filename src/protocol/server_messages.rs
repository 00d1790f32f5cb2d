use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::models::{ArbitraryJson, Content, FunctionCall};
use crate::error::ServiceError;

/// A service→client frame.
///
/// Like outbound frames, each inbound frame is a JSON object with a single
/// top-level key. Payloads that fail to parse are preserved as
/// [`ServerMessage::Unknown`] so one malformed message never terminates the
/// session.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// The service acknowledged the `setup` message; turn-taking may begin.
    SetupComplete,
    /// A slice of the current model turn, possibly with turn lifecycle flags.
    ServerContent(ServerContent),
    /// The model requests one or more function invocations.
    ToolCall(ToolCall),
    /// The model withdrew previously-issued function calls.
    ToolCallCancellation(ToolCallCancellation),
    /// Service-reported error. The session stays open; severity is the
    /// caller's call.
    Error(ServiceError),
    /// Anything this client does not recognize. Log-worthy, non-fatal.
    Unknown(ArbitraryJson),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<Content>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallCancellation {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
struct SetupComplete {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
enum ServerMessageRepr {
    SetupComplete(SetupComplete),
    ServerContent(ServerContent),
    ToolCall(ToolCall),
    ToolCallCancellation(ToolCallCancellation),
    Error(ServiceError),
}

impl From<ServerMessageRepr> for ServerMessage {
    fn from(repr: ServerMessageRepr) -> Self {
        match repr {
            ServerMessageRepr::SetupComplete(_) => Self::SetupComplete,
            ServerMessageRepr::ServerContent(content) => Self::ServerContent(content),
            ServerMessageRepr::ToolCall(call) => Self::ToolCall(call),
            ServerMessageRepr::ToolCallCancellation(cancel) => Self::ToolCallCancellation(cancel),
            ServerMessageRepr::Error(error) => Self::Error(error),
        }
    }
}

impl Serialize for ServerMessage {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Unknown(value) => value.serialize(serializer),
            Self::SetupComplete => {
                ServerMessageRepr::SetupComplete(SetupComplete::default()).serialize(serializer)
            }
            Self::ServerContent(content) => {
                ServerMessageRepr::ServerContent(content.clone()).serialize(serializer)
            }
            Self::ToolCall(call) => ServerMessageRepr::ToolCall(call.clone()).serialize(serializer),
            Self::ToolCallCancellation(cancel) => {
                ServerMessageRepr::ToolCallCancellation(cancel.clone()).serialize(serializer)
            }
            Self::Error(error) => ServerMessageRepr::Error(error.clone()).serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ServerMessage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = ArbitraryJson::deserialize(deserializer)?;
        match ServerMessageRepr::deserialize(value.clone()) {
            Ok(repr) => Ok(repr.into()),
            Err(err) => {
                tracing::debug!("Failed to parse ServerMessage: {err}");
                Ok(Self::Unknown(value))
            }
        }
    }
}

impl ServerMessage {
    /// Short tag for log lines and the `log` event.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::SetupComplete => "server.setupComplete",
            Self::ServerContent(_) => "server.content",
            Self::ToolCall(_) => "server.toolCall",
            Self::ToolCallCancellation(_) => "server.toolCallCancellation",
            Self::Error(_) => "server.error",
            Self::Unknown(_) => "server.unknown",
        }
    }
}
