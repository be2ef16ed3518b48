//! Gateway, voice and discovery error handling.

use crate::{
    id::{GuildId, UserId},
    model::DecodeError,
    ws::Error as WsError,
};
use reqwest::Error as HttpError;
use std::{error::Error as StdError, fmt, io::Error as IoError};

/// Errors encountered while driving a gateway session or one of its voice connections.
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error communicating with a gateway over WebSocket.
    Ws(WsError),
    /// Miscellaneous I/O error, typically on the UDP socket.
    Io(IoError),
    /// The HTTP collaborator failed.
    Http(HttpError),
    /// The first frames of a session were not the ones the handshake requires.
    Handshake {
        /// Name of the frame the handshake was waiting for.
        expected: &'static str,
        /// Short description of what arrived instead.
        got: String,
    },
    /// A single frame could not be decoded.
    ///
    /// The socket it arrived on remains usable.
    Decode(DecodeError),
    /// The remote end broke the voice or discovery protocol.
    Protocol(ProtocolViolation),
    /// A join was requested for a user who is not in any voice channel of the guild.
    NotInVoice {
        /// Guild which was queried.
        guild: GuildId,
        /// User whose channel was queried.
        user: UserId,
    },
    /// No voice connection is registered for this guild.
    NoConnection(GuildId),
}

impl Error {
    /// Indicates whether the socket this error came from is no longer usable.
    ///
    /// Decode failures affect a single frame and are not fatal; callers should
    /// keep reading after one.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Ws(_) | Error::Io(_))
    }

    /// Returns the WebSocket close code which ended a session, if any.
    #[must_use]
    pub fn close_code(&self) -> Option<u16> {
        match self {
            Error::Ws(e) => e.close_code(),
            _ => None,
        }
    }
}

/// Ways in which a voice server or IP discovery peer misbehaved.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ProtocolViolation {
    /// An IP discovery response was too short to hold an address and port.
    ShortDiscovery,
    /// An IP discovery response had the wrong packet type.
    IllegalDiscoveryResponse,
    /// Could not parse the voice server's view of our IP.
    IllegalIp,
    /// A voice handshake was attempted before any endpoint was known.
    MissingEndpoint,
    /// IP discovery was attempted before the voice server reported `Ready`.
    NotReady,
    /// The endpoint received from the gateway was not a valid URL.
    EndpointUrl,
}

impl fmt::Display for ProtocolViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ProtocolViolation::*;
        match self {
            ShortDiscovery => write!(f, "IP discovery response was truncated"),
            IllegalDiscoveryResponse => write!(f, "IP discovery response was invalid"),
            IllegalIp => write!(f, "IP discovery response had bad IP value"),
            MissingEndpoint => write!(f, "no voice endpoint has been received"),
            NotReady => write!(f, "voice session has not reported ready"),
            EndpointUrl => write!(f, "endpoint URL received from gateway was invalid"),
        }
    }
}

impl From<WsError> for Error {
    fn from(e: WsError) -> Self {
        Error::Ws(e)
    }
}

impl From<IoError> for Error {
    fn from(e: IoError) -> Self {
        Error::Io(e)
    }
}

impl From<HttpError> for Error {
    fn from(e: HttpError) -> Self {
        Error::Http(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<ProtocolViolation> for Error {
    fn from(e: ProtocolViolation) -> Self {
        Error::Protocol(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;
        match self {
            Ws(e) => write!(f, "websocket issue ({e})"),
            Io(e) => e.fmt(f),
            Http(e) => write!(f, "http request failed ({e})"),
            Handshake { expected, got } =>
                write!(f, "handshake failed: expected {expected}, got {got}"),
            Decode(e) => e.fmt(f),
            Protocol(e) => e.fmt(f),
            NotInVoice { guild, user } =>
                write!(f, "user {user} is not in a voice channel of guild {guild}"),
            NoConnection(guild) => write!(f, "no voice connection for guild {guild}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Ws(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Http(e) => Some(e),
            Error::Decode(e) => Some(e),
            _ => None,
        }
    }
}

/// Convenience type for gateway and voice error handling.
pub type Result<T> = std::result::Result<T, Error>;
