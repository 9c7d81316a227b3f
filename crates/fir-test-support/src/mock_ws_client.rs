use fir_protocol::{DomEvent, Event};
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::protocol::Message;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Drives a real WebSocket connection against a `fir` socket endpoint,
/// standing in for the browser companion script in integration tests.
pub struct MockWsClient {
    write: futures_util::stream::SplitSink<WsStream, Message>,
    read: futures_util::stream::SplitStream<WsStream>,
}

impl MockWsClient {
    pub async fn connect(url: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    /// Connect with a `Cookie` header, the way an authenticated browser
    /// upgrade would.
    pub async fn connect_with_cookie(
        url: &str,
        cookie: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        use tokio_tungstenite::tungstenite::handshake::client::generate_key;
        let uri: tokio_tungstenite::tungstenite::http::Uri = url.parse()?;
        let host = uri.host().unwrap_or("localhost").to_owned();
        let host_header = match uri.port_u16() {
            Some(p) => format!("{host}:{p}"),
            None => host,
        };
        let request = Request::builder()
            .uri(url)
            .header("Host", host_header)
            .header("Cookie", cookie)
            .header("Upgrade", "websocket")
            .header("Connection", "Upgrade")
            .header("Sec-WebSocket-Version", "13")
            .header("Sec-WebSocket-Key", generate_key())
            .body(())?;
        let (ws_stream, _response) = tokio_tungstenite::connect_async(request).await?;
        let (write, read) = ws_stream.split();
        Ok(Self { write, read })
    }

    pub async fn send_event(&mut self, event: &Event) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(event)?;
        self.write.send(Message::Text(json.into())).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, text: &str) -> Result<(), Box<dyn std::error::Error>> {
        self.write
            .send(Message::Text(text.to_owned().into()))
            .await?;
        Ok(())
    }

    /// Receive the next frame as a JSON array of `DomEvent`, skipping
    /// control frames.
    pub async fn recv_dom_events(&mut self) -> Result<Vec<DomEvent>, Box<dyn std::error::Error>> {
        let text = self.recv_text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Receive the raw text of the next frame, without assuming it parses
    /// as a `DomEvent` array (used for `heartbeat_ack`, malformed-payload
    /// tests).
    pub async fn recv_text(&mut self) -> Result<String, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    return Err(format!("connection closed by server: {frame:?}").into());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended".into()),
            }
        }
    }

    /// Expect the connection to be closed by the server with the given
    /// close code, returning the close reason string.
    pub async fn expect_close(
        &mut self,
        code: u16,
    ) -> Result<String, Box<dyn std::error::Error>> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Close(Some(frame)))) => {
                    if u16::from(frame.code) != code {
                        return Err(format!(
                            "expected close code {code}, got {}",
                            u16::from(frame.code)
                        )
                        .into());
                    }
                    return Ok(frame.reason.to_string());
                }
                Some(Ok(Message::Close(None))) => {
                    return Err("connection closed without a close frame payload".into());
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err("connection stream ended before a close frame".into()),
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.write.send(Message::Close(None)).await?;
        Ok(())
    }
}
