//! WebSocket transport shared by the control and voice gateways.
//!
//! Each socket is split into a [`WsReader`], owned by exactly one read loop, and a
//! cloneable [`WsSender`] whose writes are serialized by a per-socket lock.

use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt,
    StreamExt,
};
use serde::Serialize;
use serde_json::Error as JsonError;
use std::{fmt, sync::Arc};
use tokio::{net::TcpStream, sync::Mutex};
use tokio_tungstenite::{
    tungstenite::{
        error::Error as TungsteniteError,
        protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig as Config},
        Message,
    },
    MaybeTlsStream,
    WebSocketStream,
};
use tracing::{debug, instrument, trace};
use url::Url;

type RawStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) struct WsStream(RawStream);

impl WsStream {
    #[instrument]
    pub(crate) async fn connect(url: Url) -> Result<Self> {
        let (stream, _) = tokio_tungstenite::connect_async_with_config(
            url.as_str(),
            Some(Config {
                max_message_size: None,
                max_frame_size: None,
                ..Default::default()
            }),
            true,
        )
        .await?;

        Ok(Self(stream))
    }

    pub(crate) fn split(self) -> (WsReader, WsSender) {
        let (sink, stream) = self.0.split();

        (WsReader(stream), WsSender(Arc::new(Mutex::new(sink))))
    }
}

/// Read half of a gateway socket.
pub(crate) struct WsReader(SplitStream<RawStream>);

impl WsReader {
    /// Reads the next text frame.
    ///
    /// `Ok(None)` is returned for control frames (ping/pong) which carry no payload.
    /// A closed or exhausted stream is always reported as [`Error::WsClosed`].
    pub(crate) async fn recv_text(&mut self) -> Result<Option<String>> {
        match self.0.next().await {
            Some(Ok(msg)) => convert_ws_message(msg),
            Some(Err(e)) => Err(e.into()),
            None => Err(Error::WsClosed(None)),
        }
    }
}

/// Write half of a gateway socket.
///
/// Clones share one underlying sink: every frame is written while holding its lock,
/// so concurrent senders (heartbeats, commands) never interleave.
#[derive(Clone)]
pub(crate) struct WsSender(Arc<Mutex<SplitSink<RawStream, Message>>>);

impl WsSender {
    pub(crate) async fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let text = serde_json::to_string(value)?;
        trace!("Sending {text}");

        let mut sink = self.0.lock().await;
        sink.send(Message::Text(text)).await?;

        Ok(())
    }

    /// Sends a normal close frame and shuts down the sink.
    pub(crate) async fn close(&self) -> Result<()> {
        let mut sink = self.0.lock().await;
        let out = sink
            .send(Message::Close(Some(CloseFrame {
                code: CloseCode::Normal,
                reason: "".into(),
            })))
            .await;

        match out {
            Ok(()) | Err(TungsteniteError::ConnectionClosed | TungsteniteError::AlreadyClosed) =>
                Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl fmt::Debug for WsSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("WsSender")
    }
}

/// Convenience type for WebSocket error handling.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors arising on a gateway WebSocket.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// A frame could not be serialized.
    Json(JsonError),

    /// Discord's gateways are configured without compression,
    /// so only text messages are expected.
    UnexpectedBinaryMessage(Vec<u8>),

    /// Underlying WebSocket failure.
    Ws(TungsteniteError),

    /// The remote end closed the socket, possibly with a reason.
    WsClosed(Option<CloseFrame<'static>>),
}

impl Error {
    /// Returns the close code sent by the remote end, if any.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::WsClosed(Some(frame)) => Some(u16::from(frame.code)),
            _ => None,
        }
    }
}

impl From<JsonError> for Error {
    fn from(e: JsonError) -> Error {
        Error::Json(e)
    }
}

impl From<TungsteniteError> for Error {
    fn from(e: TungsteniteError) -> Error {
        Error::Ws(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Json(e) => write!(f, "could not serialize frame: {e}"),
            Error::UnexpectedBinaryMessage(b) =>
                write!(f, "unexpected binary message ({} bytes)", b.len()),
            Error::Ws(e) => write!(f, "websocket issue ({e})"),
            Error::WsClosed(Some(frame)) =>
                write!(f, "socket closed ({}: {})", u16::from(frame.code), frame.reason),
            Error::WsClosed(None) => write!(f, "socket closed"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Ws(e) => Some(e),
            _ => None,
        }
    }
}

#[inline]
fn convert_ws_message(message: Message) -> Result<Option<String>> {
    Ok(match message {
        Message::Text(payload) => Some(payload),
        Message::Binary(bytes) => {
            return Err(Error::UnexpectedBinaryMessage(bytes));
        },
        Message::Close(frame) => {
            debug!("Received close frame: {:?}", frame);
            return Err(Error::WsClosed(frame));
        },
        // Ping/Pong message behaviour is internally handled by tungstenite.
        _ => None,
    })
}
