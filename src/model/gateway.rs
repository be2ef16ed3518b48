//! Frames exchanged on the control gateway.

use super::{payload, serialize_envelope, DecodeError, Intents, RawEnvelope};
use crate::{
    constants::{event_names::*, LIBRARY_NAME},
    id::{ChannelId, GuildId, UserId},
};
use serde::{de::Error as DeError, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// Control gateway opcodes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum OpCode {
    /// An event was dispatched. Received.
    Dispatch = 0,
    /// Keep-alive frame. Sent (and occasionally requested by the server).
    Heartbeat = 1,
    /// Starts a new session. Sent.
    Identify = 2,
    /// Updates the client's presence. Sent.
    PresenceUpdate = 3,
    /// Joins, moves between, or leaves voice channels. Sent.
    VoiceStateUpdate = 4,
    /// Resumes a dropped session. Not implemented.
    Resume = 6,
    /// The server asks the client to reconnect. Received, not acted upon.
    Reconnect = 7,
    /// Requests offline members of a large guild. Sent.
    RequestGuildMembers = 8,
    /// The session has been invalidated. Received, not acted upon.
    InvalidSession = 9,
    /// First frame on a new socket, carrying the heartbeat interval. Received.
    Hello = 10,
    /// Acknowledges a heartbeat. Received.
    HeartbeatAck = 11,
    /// Local, non-standard sentinel signalling shutdown. Sent.
    Close = 1000,
}

impl OpCode {
    /// Maps a raw opcode onto a known variant.
    #[must_use]
    pub fn from_u16(op: u16) -> Option<Self> {
        Some(match op {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            1000 => Self::Close,
            _ => return None,
        })
    }
}

/// One decoded control gateway frame.
#[derive(Clone, Debug, PartialEq)]
pub struct GatewayFrame {
    /// Sequence number attached to dispatches.
    pub sequence: Option<u64>,
    /// The frame's typed contents.
    pub event: GatewayEvent,
}

impl GatewayFrame {
    /// Decodes a text frame, selecting the payload shape from its opcode and event name.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(DecodeError::envelope)?;

        Ok(Self {
            sequence: raw.s,
            event: GatewayEvent::from_raw(raw)?,
        })
    }
}

/// Typed contents of an inbound control gateway frame.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum GatewayEvent {
    /// A named event pushed by the server.
    Dispatch(Dispatch),
    /// The server requested an immediate heartbeat.
    Heartbeat,
    /// The server asked the client to reconnect.
    Reconnect,
    /// The session was invalidated; the flag indicates whether it may be resumed.
    InvalidSession(bool),
    /// Handshake greeting.
    Hello(Hello),
    /// Acknowledgement of a client heartbeat.
    HeartbeatAck,
    /// Any opcode not listed above.
    Unknown {
        /// Raw opcode.
        op: u16,
        /// Raw payload.
        data: Value,
    },
}

impl GatewayEvent {
    pub(crate) fn from_raw(raw: RawEnvelope) -> Result<Self, DecodeError> {
        Ok(match OpCode::from_u16(raw.op) {
            Some(OpCode::Dispatch) => {
                let name = raw.t.unwrap_or_default();
                Self::Dispatch(Dispatch::from_raw(name, raw.d)?)
            },
            Some(OpCode::Heartbeat) => Self::Heartbeat,
            Some(OpCode::Reconnect) => Self::Reconnect,
            Some(OpCode::InvalidSession) => Self::InvalidSession(raw.d.as_bool().unwrap_or(false)),
            Some(OpCode::Hello) => Self::Hello(payload("Hello", raw.d)?),
            Some(OpCode::HeartbeatAck) => Self::HeartbeatAck,
            _ => Self::Unknown {
                op: raw.op,
                data: raw.d,
            },
        })
    }
}

/// A dispatched event, keyed by its event name.
///
/// Only a handful of events are interpreted; all others are kept raw.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum Dispatch {
    /// `READY`: the session is established.
    Ready(Ready),
    /// `MESSAGE_CREATE`.
    MessageCreate(MessageCreate),
    /// `MESSAGE_UPDATE`.
    MessageUpdate(MessageUpdate),
    /// `GUILD_CREATE`.
    GuildCreate(GuildCreate),
    /// `VOICE_STATE_UPDATE`: half of the facts needed to open a voice session.
    VoiceStateUpdate(VoiceStateUpdate),
    /// `VOICE_SERVER_UPDATE`: the other half, and the voice handshake trigger.
    VoiceServerUpdate(VoiceServerUpdate),
    /// Any other event, passed through unparsed.
    Unknown {
        /// Event name.
        name: String,
        /// Raw payload.
        data: Value,
    },
}

impl Dispatch {
    pub(crate) fn from_raw(name: String, d: Value) -> Result<Self, DecodeError> {
        Ok(match name.as_str() {
            READY => Self::Ready(payload(READY, d)?),
            MESSAGE_CREATE => Self::MessageCreate(payload(MESSAGE_CREATE, d)?),
            MESSAGE_UPDATE => Self::MessageUpdate(payload(MESSAGE_UPDATE, d)?),
            GUILD_CREATE => Self::GuildCreate(payload(GUILD_CREATE, d)?),
            VOICE_STATE_UPDATE => Self::VoiceStateUpdate(payload(VOICE_STATE_UPDATE, d)?),
            VOICE_SERVER_UPDATE => Self::VoiceServerUpdate(payload(VOICE_SERVER_UPDATE, d)?),
            _ => Self::Unknown { name, data: d },
        })
    }

    /// The event name this dispatch was tagged with.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(_) => READY,
            Self::MessageCreate(_) => MESSAGE_CREATE,
            Self::MessageUpdate(_) => MESSAGE_UPDATE,
            Self::GuildCreate(_) => GUILD_CREATE,
            Self::VoiceStateUpdate(_) => VOICE_STATE_UPDATE,
            Self::VoiceServerUpdate(_) => VOICE_SERVER_UPDATE,
            Self::Unknown { name, .. } => name,
        }
    }
}

/// Payload of [`GatewayEvent::Hello`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Hello {
    /// Milliseconds between heartbeats expected by the server.
    pub heartbeat_interval: u64,
}

/// The bot's own account, as reported in `READY`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CurrentUser {
    /// The bot's user id.
    pub id: UserId,
    /// The bot's username.
    #[serde(rename = "username")]
    pub name: String,
}

/// Payload of `READY`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Ready {
    /// The bot's own identity.
    pub user: CurrentUser,
    /// Session id, which would be needed to resume.
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Author of a message.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MessageAuthor {
    /// Author's user id.
    pub id: UserId,
    /// Author's username.
    #[serde(rename = "username")]
    pub name: String,
}

/// Payload of `MESSAGE_CREATE`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MessageCreate {
    /// Text content of the message.
    ///
    /// Empty unless the message content intent was requested.
    #[serde(default)]
    pub content: String,
    /// Who sent the message.
    pub author: MessageAuthor,
    /// Channel the message was sent in.
    pub channel_id: ChannelId,
    /// Guild the message was sent in, if any.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
}

/// Payload of `MESSAGE_UPDATE`.
///
/// Updates are partial: only the id and channel are guaranteed.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MessageUpdate {
    /// Channel the message lives in.
    pub channel_id: ChannelId,
    /// Guild the message lives in, if any.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// New content, if it changed.
    #[serde(default)]
    pub content: Option<String>,
}

/// Payload of `GUILD_CREATE`, trimmed to the fields this library inspects.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuildCreate {
    /// Guild id.
    pub id: GuildId,
    /// Guild name.
    #[serde(default)]
    pub name: Option<String>,
    /// Number of members in the guild.
    #[serde(default)]
    pub member_count: Option<u64>,
}

/// Payload of `VOICE_STATE_UPDATE`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VoiceStateUpdate {
    /// Guild of the voice state. Absent for direct-message calls.
    #[serde(default)]
    pub guild_id: Option<GuildId>,
    /// Channel the user is now in. `None` when the user left voice.
    #[serde(default, deserialize_with = "empty_channel_as_none")]
    pub channel_id: Option<ChannelId>,
    /// Voice session id assigned to this user.
    #[serde(default)]
    pub session_id: String,
    /// The user whose state changed.
    pub user_id: UserId,
}

/// Payload of `VOICE_SERVER_UPDATE`.
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct VoiceServerUpdate {
    /// Host of the assigned voice server. `None` while Discord reallocates one.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Guild the voice server serves.
    pub guild_id: GuildId,
    /// Secret used to authenticate against the voice server.
    pub token: String,
}

impl fmt::Debug for VoiceServerUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceServerUpdate")
            .field("endpoint", &self.endpoint)
            .field("guild_id", &self.guild_id)
            .field("token", &"<secret>")
            .finish()
    }
}

fn empty_channel_as_none<'de, D>(deserializer: D) -> Result<Option<ChannelId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(v) => ChannelId::deserialize(v).map(Some).map_err(D::Error::custom),
    }
}

/// Commands sent over the control gateway.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum GatewayCommand {
    /// Keep-alive. The payload is the last seen sequence number, if reported.
    Heartbeat(Option<u64>),
    /// Session handshake.
    Identify(Identify),
    /// Join, move, or leave a voice channel.
    UpdateVoiceState(UpdateVoiceState),
    /// Local shutdown sentinel.
    Close,
}

impl GatewayCommand {
    /// Opcode this command is sent under.
    #[must_use]
    pub fn op(&self) -> OpCode {
        match self {
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::Identify(_) => OpCode::Identify,
            Self::UpdateVoiceState(_) => OpCode::VoiceStateUpdate,
            Self::Close => OpCode::Close,
        }
    }
}

impl Serialize for GatewayCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let op = self.op() as u16;
        match self {
            Self::Heartbeat(seq) => serialize_envelope(serializer, op, seq),
            Self::Identify(i) => serialize_envelope(serializer, op, i),
            Self::UpdateVoiceState(u) => serialize_envelope(serializer, op, u),
            Self::Close => serialize_envelope(serializer, op, &()),
        }
    }
}

impl From<Identify> for GatewayCommand {
    fn from(i: Identify) -> Self {
        Self::Identify(i)
    }
}

impl From<UpdateVoiceState> for GatewayCommand {
    fn from(u: UpdateVoiceState) -> Self {
        Self::UpdateVoiceState(u)
    }
}

/// Payload of [`GatewayCommand::Identify`].
#[derive(Clone, Eq, PartialEq, Serialize)]
pub struct Identify {
    /// Bot token.
    pub token: String,
    /// Requested gateway intents.
    pub intents: Intents,
    /// Client identity block.
    pub properties: IdentifyProperties,
}

impl fmt::Debug for Identify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identify")
            .field("token", &"<secret>")
            .field("intents", &self.intents)
            .field("properties", &self.properties)
            .finish()
    }
}

/// Client identity block sent in `Identify`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct IdentifyProperties {
    /// Operating system name.
    pub os: String,
    /// Library or browser name.
    pub browser: String,
    /// Library or device name.
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.into(),
            browser: LIBRARY_NAME.into(),
            device: LIBRARY_NAME.into(),
        }
    }
}

/// Payload of [`GatewayCommand::UpdateVoiceState`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct UpdateVoiceState {
    /// Guild whose voice state is changing.
    pub guild_id: GuildId,
    /// Channel to join, or `None` to leave.
    pub channel_id: Option<ChannelId>,
    /// Whether the bot is self-muted.
    pub self_mute: bool,
    /// Whether the bot is self-deafened.
    pub self_deaf: bool,
}
