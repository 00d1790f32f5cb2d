use async_trait::async_trait;

use crate::Result;
use crate::protocol::client_messages::ClientMessage;
use crate::protocol::server_messages::ServerMessage;

/// Seam between the session state machine and the wire.
///
/// Production uses the WebSocket-backed [`crate::LiveClient`]; tests inject
/// an in-memory mock.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, message: ClientMessage) -> Result<()>;

    /// Next inbound message. `Ok(None)` means the remote end closed the
    /// connection; [`Transport::close_code`] then reports the close code if
    /// one was received.
    async fn next_message(&mut self) -> Result<Option<ServerMessage>>;

    async fn close(&mut self) -> Result<()>;

    fn close_code(&self) -> Option<u16>;
}
