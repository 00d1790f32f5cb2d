use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result, ServiceError};
use crate::protocol::client_messages::ClientMessage;
use crate::protocol::models::{Content, FunctionResponse, LiveConfig, MediaChunk};
use crate::protocol::server_messages::{ServerContent, ServerMessage};

use super::events::{EventKind, LiveEvent, LiveEventStream};
use super::registry::EventRegistry;
use super::transport::Transport;

/// Connection lifecycle of one session.
///
/// `Connecting` exits to `Connected` only after the transport opened and the
/// setup message was sent. Error and explicit close both terminate to
/// `Disconnected`; there is no automatic reconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// State written exclusively by the session's connect/reader path and read
/// anywhere. Word-sized atomics; no locking.
pub(crate) struct SharedState {
    connection: AtomicU8,
    using_tool: Arc<AtomicBool>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            connection: AtomicU8::new(ConnectionState::Connecting as u8),
            using_tool: Arc::new(AtomicBool::new(false)),
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.connection.store(state as u8, Ordering::Release);
    }

    fn using_tool(&self) -> bool {
        self.using_tool.load(Ordering::Acquire)
    }

    fn set_using_tool(&self, value: bool) {
        self.using_tool.store(value, Ordering::Release);
    }
}

enum Command {
    Send {
        message: ClientMessage,
        respond: oneshot::Sender<Result<()>>,
    },
    Disconnect {
        respond: oneshot::Sender<()>,
    },
}

/// One logical connection to the Live API.
///
/// The session owns the transport, drives the turn/tool-use state machine on
/// a background task, and fans inbound messages out as [`LiveEvent`]s: to
/// the listener registry (synchronous, registration order) and to
/// [`LiveSession::next_event`] for async consumers.
pub struct LiveSession {
    sender: mpsc::Sender<Command>,
    event_rx: mpsc::Receiver<LiveEvent>,
    registry: Arc<EventRegistry>,
    shared: Arc<SharedState>,
    config: LiveConfig,
}

/// Cloneable, `Send + Sync` proxy to a [`LiveSession`], for producer threads
/// such as the capture pipeline.
#[derive(Clone)]
pub struct LiveSessionHandle {
    sender: mpsc::Sender<Command>,
    shared: Arc<SharedState>,
}

/// Configures listeners before the connection is opened, so that `Open` and
/// every later event are observable.
#[derive(Default)]
pub struct LiveSessionBuilder {
    registry: EventRegistry,
}

impl LiveSessionBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for `kind`. See [`EventRegistry::on`].
    #[must_use]
    pub fn on<F>(self, kind: EventKind, listener: F) -> Self
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.registry.on(kind, listener);
        self
    }

    /// Open the transport, send `setup`, and return the connected session.
    ///
    /// # Errors
    /// [`Error::InvalidCredential`] if the credential fails format
    /// validation; [`Error::Connection`] on transport-level failure. Both
    /// surface here, synchronously, not through the event feed.
    pub async fn connect(self, config: LiveConfig, credential: &str) -> Result<LiveSession> {
        let client = crate::LiveClient::connect(credential).await?;
        LiveSession::start(Box::new(WsTransport { client }), config, self.registry).await
    }
}

impl LiveSession {
    #[must_use]
    pub fn builder() -> LiveSessionBuilder {
        LiveSessionBuilder::new()
    }

    /// Connect with no pre-registered listeners.
    ///
    /// # Errors
    /// See [`LiveSessionBuilder::connect`].
    pub async fn connect(config: LiveConfig, credential: &str) -> Result<Self> {
        Self::builder().connect(config, credential).await
    }

    async fn start(
        mut transport: Box<dyn Transport>,
        config: LiveConfig,
        registry: EventRegistry,
    ) -> Result<Self> {
        let registry = Arc::new(registry);
        let shared = Arc::new(SharedState::new());

        // Sending setup is part of entering Connected; outbound traffic may
        // begin before the service acknowledges it.
        transport
            .send(ClientMessage::Setup(Box::new(config.clone())))
            .await?;
        shared.set_state(ConnectionState::Connected);

        let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(64);
        let (event_tx, event_rx) = mpsc::channel::<LiveEvent>(128);

        emit(&registry, &event_tx, LiveEvent::Open);

        let task_registry = Arc::clone(&registry);
        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = cmd_rx.recv() => match cmd {
                        Some(Command::Send { message, respond }) => {
                            let result = transport.send(message).await;
                            let _ = respond.send(result);
                        }
                        Some(Command::Disconnect { respond }) => {
                            let _ = transport.close().await;
                            task_shared.set_state(ConnectionState::Disconnected);
                            let code = transport.close_code().or(Some(1000));
                            emit(&task_registry, &event_tx, LiveEvent::Close { code });
                            let _ = respond.send(());
                            break;
                        }
                        None => {
                            let _ = transport.close().await;
                            task_shared.set_state(ConnectionState::Disconnected);
                            break;
                        }
                    },
                    inbound = transport.next_message() => match inbound {
                        Ok(Some(message)) => {
                            dispatch(message, &task_registry, &event_tx, &task_shared);
                        }
                        Ok(None) => {
                            task_shared.set_state(ConnectionState::Disconnected);
                            let code = transport.close_code();
                            emit(&task_registry, &event_tx, LiveEvent::Close { code });
                            break;
                        }
                        Err(err) => {
                            tracing::warn!("transport error: {err}");
                            task_shared.set_state(ConnectionState::Disconnected);
                            emit(&task_registry, &event_tx, LiveEvent::Error(ServiceError {
                                code: None,
                                message: err.to_string(),
                                status: None,
                            }));
                            emit(&task_registry, &event_tx, LiveEvent::Close {
                                code: transport.close_code(),
                            });
                            break;
                        }
                    }
                }
            }
        });

        Ok(Self {
            sender: cmd_tx,
            event_rx,
            registry,
            shared,
            config,
        })
    }

    /// Register a listener for `kind`. Valid at any point in the session's
    /// life; listeners fire in registration order.
    pub fn on<F>(&self, kind: EventKind, listener: F)
    where
        F: Fn(&LiveEvent) + Send + Sync + 'static,
    {
        self.registry.on(kind, listener);
    }

    #[must_use]
    pub fn handle(&self) -> LiveSessionHandle {
        LiveSessionHandle {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// The configuration negotiated at connect time.
    #[must_use]
    pub const fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Whether the model is currently executing a tool call.
    #[must_use]
    pub fn is_using_tool(&self) -> bool {
        self.shared.using_tool()
    }

    /// Read-only handle to the tool-use flag, for the capture pipeline's
    /// interrupt tagging.
    #[must_use]
    pub fn tool_use_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shared.using_tool)
    }

    /// Send a typed user message as one complete turn.
    ///
    /// # Errors
    /// [`Error::NotConnected`] unless the session is connected; nothing is
    /// queued locally.
    pub async fn send(&self, text: &str) -> Result<()> {
        self.send_message(ClientMessage::user_text(text)).await
    }

    /// Send media chunks over the realtime input channel, order preserved,
    /// as one logical message.
    ///
    /// # Errors
    /// [`Error::NotConnected`] unless the session is connected.
    pub async fn send_realtime_input(&self, chunks: Vec<MediaChunk>) -> Result<()> {
        self.send_message(ClientMessage::realtime_input(chunks)).await
    }

    /// Send results for function calls requested by the model.
    ///
    /// # Errors
    /// [`Error::NotConnected`] unless the session is connected.
    pub async fn send_tool_response(&self, responses: Vec<FunctionResponse>) -> Result<()> {
        self.send_message(ClientMessage::ToolResponse {
            function_responses: responses,
        })
        .await
    }

    /// Send a raw protocol message.
    ///
    /// # Errors
    /// [`Error::NotConnected`] unless the session is connected.
    pub async fn send_raw(&self, message: ClientMessage) -> Result<()> {
        self.send_message(message).await
    }

    async fn send_message(&self, message: ClientMessage) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Send {
                message,
                respond: tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close the transport and terminate the session. Idempotent: calling on
    /// an already-disconnected session is a no-op. Emits `Close` once;
    /// nothing after.
    pub async fn disconnect(&mut self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(Command::Disconnect { respond: tx })
            .await
            .is_err()
        {
            return;
        }
        let _ = rx.await;
    }

    /// Await the next event from the mirrored event channel. `None` once the
    /// session is closed and the backlog is drained.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.event_rx.recv().await
    }

    /// Stream events. The channel is bounded; if it is never drained while
    /// listeners do all the work, overflowing events are dropped from the
    /// stream (the registry still sees every event).
    #[must_use]
    pub fn events(&mut self) -> LiveEventStream<'_> {
        LiveEventStream::new(&mut self.event_rx)
    }
}

impl LiveSessionHandle {
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    #[must_use]
    pub fn is_using_tool(&self) -> bool {
        self.shared.using_tool()
    }

    /// Send media chunks over the realtime input channel.
    ///
    /// # Errors
    /// [`Error::NotConnected`] unless the session is connected.
    pub async fn send_realtime_input(&self, chunks: Vec<MediaChunk>) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Command::Send {
                message: ClientMessage::realtime_input(chunks),
                respond: tx,
            })
            .await
            .map_err(|_| Error::NotConnected)?;
        rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Blocking variant of [`Self::send_realtime_input`], for producer
    /// threads outside the async runtime (the capture pipeline's forwarder).
    ///
    /// # Errors
    /// [`Error::NotConnected`] unless the session is connected.
    pub fn send_realtime_input_blocking(&self, chunks: Vec<MediaChunk>) -> Result<()> {
        if self.state() != ConnectionState::Connected {
            return Err(Error::NotConnected);
        }
        let (tx, rx) = oneshot::channel();
        self.sender
            .blocking_send(Command::Send {
                message: ClientMessage::realtime_input(chunks),
                respond: tx,
            })
            .map_err(|_| Error::NotConnected)?;
        rx.blocking_recv().map_err(|_| Error::ConnectionClosed)?
    }
}

fn emit(registry: &EventRegistry, event_tx: &mpsc::Sender<LiveEvent>, event: LiveEvent) {
    registry.emit(&event);
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(event)) => {
            tracing::debug!("event channel full, dropping {:?} from the stream", event.kind());
        }
        Err(TrySendError::Closed(_)) => {}
    }
}

fn dispatch(
    message: ServerMessage,
    registry: &EventRegistry,
    event_tx: &mpsc::Sender<LiveEvent>,
    shared: &SharedState,
) {
    match message {
        ServerMessage::SetupComplete => emit(registry, event_tx, LiveEvent::SetupComplete),
        ServerMessage::ServerContent(content) => {
            dispatch_server_content(content, registry, event_tx, shared);
        }
        ServerMessage::ToolCall(call) => {
            shared.set_using_tool(true);
            emit(registry, event_tx, LiveEvent::ToolCall(call));
        }
        ServerMessage::ToolCallCancellation(cancel) => {
            shared.set_using_tool(false);
            emit(registry, event_tx, LiveEvent::ToolCallCancellation(cancel));
        }
        ServerMessage::Error(error) => emit(registry, event_tx, LiveEvent::Error(error)),
        ServerMessage::Unknown(value) => {
            emit(
                registry,
                event_tx,
                LiveEvent::Log {
                    kind: "server.unknown".to_string(),
                    message: value.to_string(),
                },
            );
            emit(registry, event_tx, LiveEvent::Message(value));
        }
    }
}

fn dispatch_server_content(
    content: ServerContent,
    registry: &EventRegistry,
    event_tx: &mpsc::Sender<LiveEvent>,
    shared: &SharedState,
) {
    // An interrupted turn carries nothing worth delivering; stale audio must
    // not reach the playback queue.
    if content.interrupted {
        shared.set_using_tool(false);
        emit(registry, event_tx, LiveEvent::Interrupted);
        return;
    }

    if content.turn_complete {
        shared.set_using_tool(false);
        emit(registry, event_tx, LiveEvent::TurnComplete);
    }

    let Some(turn) = content.model_turn else {
        return;
    };

    if turn.parts.iter().any(|p| p.function_call.is_some()) {
        shared.set_using_tool(true);
    } else if turn.parts.iter().any(|p| p.function_response.is_some()) {
        shared.set_using_tool(false);
    }

    let mut remaining = Vec::with_capacity(turn.parts.len());
    for part in turn.parts {
        if part.is_audio() {
            let Some(blob) = part.inline_data else {
                continue;
            };
            match general_purpose::STANDARD.decode(blob.data.as_bytes()) {
                Ok(pcm) => emit(registry, event_tx, LiveEvent::Audio(pcm)),
                Err(err) => emit(
                    registry,
                    event_tx,
                    LiveEvent::Log {
                        kind: "server.audio.decode".to_string(),
                        message: err.to_string(),
                    },
                ),
            }
        } else {
            remaining.push(part);
        }
    }

    if !remaining.is_empty() {
        emit(
            registry,
            event_tx,
            LiveEvent::Content(ServerContent {
                model_turn: Some(Content {
                    role: turn.role,
                    parts: remaining,
                }),
                turn_complete: content.turn_complete,
                interrupted: false,
            }),
        );
    }
}

struct WsTransport {
    client: crate::LiveClient,
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.client.send(message).await
    }

    async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
        self.client.next_message().await
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }

    fn close_code(&self) -> Option<u16> {
        self.client.close_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::models::{Blob, FunctionCall, Part};
    use crate::protocol::server_messages::ToolCall;
    use std::sync::Mutex;

    struct MockTransport {
        incoming: mpsc::Receiver<Result<ServerMessage>>,
        outgoing: mpsc::Sender<ClientMessage>,
        close_code: Option<u16>,
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: ClientMessage) -> Result<()> {
            self.outgoing
                .send(message)
                .await
                .map_err(|_| Error::ConnectionClosed)
        }

        async fn next_message(&mut self) -> Result<Option<ServerMessage>> {
            match self.incoming.recv().await {
                Some(Ok(message)) => Ok(Some(message)),
                Some(Err(err)) => Err(err),
                None => Ok(None),
            }
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }

        fn close_code(&self) -> Option<u16> {
            self.close_code
        }
    }

    async fn mock_session(
        registry: EventRegistry,
        close_code: Option<u16>,
    ) -> (
        LiveSession,
        mpsc::Sender<Result<ServerMessage>>,
        mpsc::Receiver<ClientMessage>,
    ) {
        let (in_tx, in_rx) = mpsc::channel(16);
        let (out_tx, out_rx) = mpsc::channel(16);
        let transport = Box::new(MockTransport {
            incoming: in_rx,
            outgoing: out_tx,
            close_code,
        });
        let session = LiveSession::start(transport, LiveConfig::default(), registry)
            .await
            .expect("session starts");
        (session, in_tx, out_rx)
    }

    fn content_message(parts: Vec<Part>) -> ServerMessage {
        ServerMessage::ServerContent(ServerContent {
            model_turn: Some(Content { role: None, parts }),
            turn_complete: false,
            interrupted: false,
        })
    }

    fn function_call_part(name: &str) -> Part {
        Part {
            function_call: Some(FunctionCall {
                id: None,
                name: name.to_string(),
                args: serde_json::Value::Null,
            }),
            ..Part::default()
        }
    }

    fn function_response_part(name: &str) -> Part {
        Part {
            function_response: Some(crate::protocol::models::FunctionResponse {
                id: None,
                name: name.to_string(),
                response: serde_json::Value::Null,
            }),
            ..Part::default()
        }
    }

    #[tokio::test]
    async fn connect_sends_setup_then_emits_open_and_setupcomplete_in_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let registry = EventRegistry::new();
        for kind in [EventKind::Open, EventKind::SetupComplete] {
            let order = Arc::clone(&order);
            registry.on(kind, move |event| {
                order.lock().unwrap().push(event.kind());
            });
        }

        let (mut session, in_tx, mut out_rx) = mock_session(registry, None).await;
        assert_eq!(session.state(), ConnectionState::Connected);

        let first = out_rx.recv().await.unwrap();
        assert!(matches!(first, ClientMessage::Setup(_)));

        in_tx.send(Ok(ServerMessage::SetupComplete)).await.unwrap();
        let event = session.next_event().await.unwrap();
        assert!(matches!(event, LiveEvent::Open));
        let event = session.next_event().await.unwrap();
        assert!(matches!(event, LiveEvent::SetupComplete));

        assert_eq!(
            *order.lock().unwrap(),
            vec![EventKind::Open, EventKind::SetupComplete]
        );
    }

    #[tokio::test]
    async fn function_call_part_sets_tool_flag_and_response_clears_it() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;
        assert!(!session.is_using_tool());

        in_tx
            .send(Ok(content_message(vec![function_call_part("lookup")])))
            .await
            .unwrap();
        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Content(_) => break,
                _ => continue,
            }
        }
        assert!(session.is_using_tool());

        in_tx
            .send(Ok(content_message(vec![function_response_part("lookup")])))
            .await
            .unwrap();
        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Content(_) => break,
                _ => continue,
            }
        }
        assert!(!session.is_using_tool());
    }

    #[tokio::test]
    async fn turn_complete_clears_tool_flag() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        in_tx
            .send(Ok(ServerMessage::ToolCall(ToolCall {
                function_calls: vec![FunctionCall {
                    id: Some("fc_1".to_string()),
                    name: "lookup".to_string(),
                    args: serde_json::Value::Null,
                }],
            })))
            .await
            .unwrap();
        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::ToolCall(_) => break,
                _ => continue,
            }
        }
        assert!(session.is_using_tool());

        in_tx
            .send(Ok(ServerMessage::ServerContent(ServerContent {
                model_turn: None,
                turn_complete: true,
                interrupted: false,
            })))
            .await
            .unwrap();
        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::TurnComplete => break,
                _ => continue,
            }
        }
        assert!(!session.is_using_tool());
    }

    #[tokio::test]
    async fn interrupted_short_circuits_and_clears_tool_flag() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        in_tx
            .send(Ok(content_message(vec![function_call_part("lookup")])))
            .await
            .unwrap();

        in_tx
            .send(Ok(ServerMessage::ServerContent(ServerContent {
                model_turn: Some(Content {
                    role: None,
                    parts: vec![Part::text("stale")],
                }),
                turn_complete: true,
                interrupted: true,
            })))
            .await
            .unwrap();

        // The interrupted message yields exactly one event: no turncomplete,
        // no content for the aborted turn.
        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Interrupted => break,
                LiveEvent::Content(_) => continue, // first message
                LiveEvent::TurnComplete => panic!("turncomplete emitted for interrupted turn"),
                _ => continue,
            }
        }
        assert!(!session.is_using_tool());

        in_tx.send(Ok(ServerMessage::SetupComplete)).await.unwrap();
        let event = session.next_event().await.unwrap();
        assert!(
            matches!(event, LiveEvent::SetupComplete),
            "content from the aborted turn leaked: {event:?}"
        );
    }

    #[tokio::test]
    async fn audio_parts_are_decoded_and_stripped_from_content() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        let pcm = vec![1u8, 2, 3, 4];
        let audio_part = Part {
            inline_data: Some(Blob {
                mime_type: "audio/pcm;rate=24000".to_string(),
                data: general_purpose::STANDARD.encode(&pcm),
            }),
            ..Part::default()
        };
        in_tx
            .send(Ok(content_message(vec![audio_part, Part::text("hi")])))
            .await
            .unwrap();

        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Audio(bytes) => {
                    assert_eq!(bytes, pcm);
                    break;
                }
                _ => continue,
            }
        }
        match session.next_event().await.unwrap() {
            LiveEvent::Content(content) => {
                let parts = content.model_turn.unwrap().parts;
                assert_eq!(parts.len(), 1);
                assert_eq!(parts[0].text.as_deref(), Some("hi"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_audio_part_is_logged_and_absorbed() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        let bad_part = Part {
            inline_data: Some(Blob {
                mime_type: "audio/pcm;rate=24000".to_string(),
                data: "!!! not base64 !!!".to_string(),
            }),
            ..Part::default()
        };
        in_tx
            .send(Ok(content_message(vec![bad_part])))
            .await
            .unwrap();
        in_tx.send(Ok(ServerMessage::SetupComplete)).await.unwrap();

        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Log { kind, .. } => {
                    assert_eq!(kind, "server.audio.decode");
                    break;
                }
                LiveEvent::Open => continue,
                other => panic!("unexpected event: {other:?}"),
            }
        }
        // Session survived the bad chunk.
        let event = session.next_event().await.unwrap();
        assert!(matches!(event, LiveEvent::SetupComplete));
    }

    #[tokio::test]
    async fn unknown_payload_surfaces_as_log_and_message() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        let raw = serde_json::json!({ "goAway": { "timeLeft": "5s" } });
        in_tx
            .send(Ok(ServerMessage::Unknown(raw.clone())))
            .await
            .unwrap();

        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Log { kind, .. } => {
                    assert_eq!(kind, "server.unknown");
                    break;
                }
                _ => continue,
            }
        }
        match session.next_event().await.unwrap() {
            LiveEvent::Message(value) => assert_eq!(value, raw),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_then_send_fails_with_no_transport_traffic() {
        let (mut session, _in_tx, mut out_rx) = mock_session(EventRegistry::new(), None).await;

        // Drain the setup frame.
        let setup = out_rx.recv().await.unwrap();
        assert!(matches!(setup, ClientMessage::Setup(_)));

        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Disconnected);

        let err = session
            .send_realtime_input(vec![MediaChunk::audio(&[0, 0])])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        let err = session.send("hello").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));

        // No frame reached the transport after the close.
        assert!(out_rx.try_recv().is_err());

        // Idempotent.
        session.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_emits_close_once() {
        let (mut session, _in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        session.disconnect().await;

        loop {
            match session.next_event().await {
                Some(LiveEvent::Close { code }) => {
                    assert_eq!(code, Some(1000));
                    break;
                }
                Some(_) => continue,
                None => panic!("close never emitted"),
            }
        }
        assert!(session.next_event().await.is_none());
    }

    #[tokio::test]
    async fn remote_close_emits_close_with_code() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), Some(1011)).await;

        drop(in_tx);

        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Close { code } => {
                    assert_eq!(code, Some(1011));
                    break;
                }
                _ => continue,
            }
        }
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn transport_error_emits_error_then_close() {
        let (mut session, in_tx, _out_rx) = mock_session(EventRegistry::new(), None).await;

        in_tx
            .send(Err(Error::ConnectionClosed))
            .await
            .unwrap();

        loop {
            match session.next_event().await.unwrap() {
                LiveEvent::Error(_) => break,
                _ => continue,
            }
        }
        let event = session.next_event().await.unwrap();
        assert!(matches!(event, LiveEvent::Close { .. }));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn realtime_input_preserves_chunk_order() {
        let (session, _in_tx, mut out_rx) = mock_session(EventRegistry::new(), None).await;

        let _setup = out_rx.recv().await.unwrap();

        let chunks = vec![
            MediaChunk::audio(&[1, 1]),
            MediaChunk::audio(&[2, 2]).with_interrupt(),
            MediaChunk::jpeg(&[0xFF, 0xD8]),
        ];
        session.send_realtime_input(chunks.clone()).await.unwrap();

        match out_rx.recv().await.unwrap() {
            ClientMessage::RealtimeInput { media_chunks } => assert_eq!(media_chunks, chunks),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn tool_response_round_trip() {
        let (session, _in_tx, mut out_rx) = mock_session(EventRegistry::new(), None).await;
        let _setup = out_rx.recv().await.unwrap();

        session
            .send_tool_response(vec![crate::protocol::models::FunctionResponse {
                id: Some("fc_1".to_string()),
                name: "lookup".to_string(),
                response: serde_json::json!({ "answer": 42 }),
            }])
            .await
            .unwrap();

        match out_rx.recv().await.unwrap() {
            ClientMessage::ToolResponse { function_responses } => {
                assert_eq!(function_responses.len(), 1);
                assert_eq!(function_responses[0].name, "lookup");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn handle_blocking_send_from_thread() {
        let (session, _in_tx, mut out_rx) = mock_session(EventRegistry::new(), None).await;
        let _setup = out_rx.recv().await.unwrap();

        let handle = session.handle();
        let join = std::thread::spawn(move || {
            handle.send_realtime_input_blocking(vec![MediaChunk::audio(&[7, 7])])
        });

        match out_rx.recv().await.unwrap() {
            ClientMessage::RealtimeInput { media_chunks } => {
                assert_eq!(media_chunks.len(), 1);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        join.join().unwrap().unwrap();
    }
}
