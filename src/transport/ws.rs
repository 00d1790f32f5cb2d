use crate::error::{Error, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

#[derive(Debug)]
pub struct WsStream(WebSocketStream<MaybeTlsStream<TcpStream>>);

impl WsStream {
    pub(crate) const fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self(stream)
    }
}

impl futures::Stream for WsStream {
    type Item = std::result::Result<
        tokio_tungstenite::tungstenite::Message,
        tokio_tungstenite::tungstenite::Error,
    >;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        std::pin::Pin::new(&mut self.0).poll_next(cx)
    }
}

impl futures::Sink<tokio_tungstenite::tungstenite::Message> for WsStream {
    type Error = tokio_tungstenite::tungstenite::Error;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_ready(cx)
    }

    fn start_send(
        mut self: std::pin::Pin<&mut Self>,
        item: tokio_tungstenite::tungstenite::Message,
    ) -> std::result::Result<(), Self::Error> {
        std::pin::Pin::new(&mut self.0).start_send(item)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::result::Result<(), Self::Error>> {
        std::pin::Pin::new(&mut self.0).poll_close(cx)
    }
}

const WS_BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";

/// Check that a credential is plausibly an API key before any network
/// traffic is attempted.
///
/// # Errors
/// Returns [`Error::InvalidCredential`] if the credential is empty or
/// contains whitespace or non-printable characters.
#[allow(clippy::result_large_err)]
pub fn validate_credential(credential: &str) -> Result<()> {
    if credential.is_empty() {
        return Err(Error::InvalidCredential("credential is empty".to_string()));
    }
    if !credential.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(Error::InvalidCredential(
            "credential contains whitespace or non-printable characters".to_string(),
        ));
    }
    Ok(())
}

/// Establish a WebSocket connection to the Live API.
///
/// The credential is passed as a `key` query parameter; the service performs
/// the real authentication during the handshake.
///
/// # Errors
/// Returns an error if the credential is malformed or the handshake fails.
pub async fn connect(credential: &str) -> Result<WsStream> {
    validate_credential(credential)?;

    let mut url = Url::parse(WS_BASE_URL)?;
    url.query_pairs_mut().append_pair("key", credential);

    let (ws_stream, _) = connect_async(url.as_str()).await?;

    tracing::info!("Connected to the Live API");

    Ok(WsStream::new(ws_stream))
}
