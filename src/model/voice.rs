//! Frames exchanged on a voice gateway.

use super::{payload, serialize_envelope, DecodeError, RawEnvelope, SpeakingState};
use crate::id::{GuildId, UserId};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::{fmt, net::IpAddr};

/// Voice gateway opcodes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum OpCode {
    /// Begin a voice websocket connection. Sent.
    Identify = 0,
    /// Select the voice transport protocol. Sent.
    SelectProtocol = 1,
    /// Complete the websocket handshake. Received.
    Ready = 2,
    /// Keep the websocket connection alive. Sent.
    Heartbeat = 3,
    /// Describe the negotiated session. Received.
    SessionDescription = 4,
    /// Indicate which users are speaking. Sent and received.
    Speaking = 5,
    /// Acknowledge a client heartbeat. Received.
    HeartbeatAck = 6,
    /// Resume a connection. Not implemented.
    Resume = 7,
    /// Time to wait between heartbeats. Received.
    Hello = 8,
    /// Acknowledge a successful resume. Received.
    Resumed = 9,
    /// One or more clients joined the call. Received.
    ClientsConnect = 11,
    /// A client left the call. Received.
    ClientDisconnect = 13,
}

impl OpCode {
    /// Maps a raw opcode onto a known variant.
    #[must_use]
    pub fn from_u16(op: u16) -> Option<Self> {
        Some(match op {
            0 => Self::Identify,
            1 => Self::SelectProtocol,
            2 => Self::Ready,
            3 => Self::Heartbeat,
            4 => Self::SessionDescription,
            5 => Self::Speaking,
            6 => Self::HeartbeatAck,
            7 => Self::Resume,
            8 => Self::Hello,
            9 => Self::Resumed,
            11 => Self::ClientsConnect,
            13 => Self::ClientDisconnect,
            _ => return None,
        })
    }
}

/// Typed contents of an inbound voice gateway frame.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum VoiceEvent {
    /// The voice server accepted our identify.
    Ready(VoiceReady),
    /// Negotiated transport parameters.
    SessionDescription(SessionDescription),
    /// Another user's speaking state changed.
    Speaking(SpeakingNotice),
    /// Acknowledgement of a heartbeat, echoing its nonce.
    HeartbeatAck(Option<u64>),
    /// Handshake greeting carrying the heartbeat interval.
    Hello(VoiceHello),
    /// A resume succeeded.
    Resumed,
    /// Other clients joined the call.
    ClientsConnect(ClientsConnect),
    /// Another client left the call.
    ClientDisconnect(ClientDisconnect),
    /// Any opcode not listed above.
    Unknown {
        /// Raw opcode.
        op: u16,
        /// Raw payload.
        data: Value,
    },
}

impl VoiceEvent {
    /// Decodes a text frame, selecting the payload shape from its opcode.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        let raw: RawEnvelope = serde_json::from_str(text).map_err(DecodeError::envelope)?;
        Self::from_raw(raw)
    }

    pub(crate) fn from_raw(raw: RawEnvelope) -> Result<Self, DecodeError> {
        Ok(match OpCode::from_u16(raw.op) {
            Some(OpCode::Ready) => Self::Ready(payload("voice Ready", raw.d)?),
            Some(OpCode::SessionDescription) =>
                Self::SessionDescription(payload("voice SessionDescription", raw.d)?),
            Some(OpCode::Speaking) => Self::Speaking(payload("voice Speaking", raw.d)?),
            Some(OpCode::HeartbeatAck) => Self::HeartbeatAck(raw.d.as_u64()),
            Some(OpCode::Hello) => Self::Hello(payload("voice Hello", raw.d)?),
            Some(OpCode::Resumed) => Self::Resumed,
            Some(OpCode::ClientsConnect) =>
                Self::ClientsConnect(payload("voice ClientsConnect", raw.d)?),
            Some(OpCode::ClientDisconnect) =>
                Self::ClientDisconnect(payload("voice ClientDisconnect", raw.d)?),
            _ => Self::Unknown {
                op: raw.op,
                data: raw.d,
            },
        })
    }
}

/// Payload of [`VoiceEvent::Ready`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct VoiceReady {
    /// SSRC assigned to this client.
    pub ssrc: u32,
    /// Address of the voice server's UDP endpoint.
    pub ip: IpAddr,
    /// Port of the voice server's UDP endpoint.
    pub port: u16,
    /// Encryption modes the server supports.
    #[serde(default)]
    pub modes: Vec<String>,
}

/// Payload of [`VoiceEvent::Hello`].
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct VoiceHello {
    /// Milliseconds between heartbeats. Sent by Discord as a float.
    pub heartbeat_interval: f64,
}

impl VoiceHello {
    /// The heartbeat interval, rounded to whole milliseconds.
    #[must_use]
    pub fn interval_ms(&self) -> u64 {
        self.heartbeat_interval.max(0.0).round() as u64
    }
}

/// Payload of [`VoiceEvent::SessionDescription`].
#[derive(Clone, Deserialize, Eq, PartialEq, Serialize)]
pub struct SessionDescription {
    /// Encryption mode the server settled on.
    pub mode: String,
    /// Key for media encryption.
    #[serde(default)]
    pub secret_key: Vec<u8>,
}

impl fmt::Debug for SessionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescription")
            .field("mode", &self.mode)
            .field("secret_key", &"<secret>")
            .finish()
    }
}

/// Payload of [`VoiceEvent::Speaking`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SpeakingNotice {
    /// User who changed state, when known.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// SSRC of that user's stream.
    pub ssrc: u32,
    /// New speaking flags.
    pub speaking: SpeakingState,
}

/// Payload of [`VoiceEvent::ClientsConnect`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClientsConnect {
    /// Users who joined.
    #[serde(default)]
    pub user_ids: Vec<UserId>,
}

/// Payload of [`VoiceEvent::ClientDisconnect`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClientDisconnect {
    /// User who left.
    pub user_id: UserId,
}

/// Commands sent over a voice gateway.
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum VoiceCommand {
    /// Session handshake.
    Identify(VoiceIdentify),
    /// Announces the discovered UDP address.
    SelectProtocol(SelectProtocol),
    /// Keep-alive carrying an incrementing sequence number.
    Heartbeat(u64),
    /// Announces a change in our own speaking state.
    Speaking(Speaking),
}

impl VoiceCommand {
    /// Opcode this command is sent under.
    #[must_use]
    pub fn op(&self) -> OpCode {
        match self {
            Self::Identify(_) => OpCode::Identify,
            Self::SelectProtocol(_) => OpCode::SelectProtocol,
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::Speaking(_) => OpCode::Speaking,
        }
    }
}

impl Serialize for VoiceCommand {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let op = self.op() as u16;
        match self {
            Self::Identify(i) => serialize_envelope(serializer, op, i),
            Self::SelectProtocol(p) => serialize_envelope(serializer, op, p),
            Self::Heartbeat(seq) => serialize_envelope(serializer, op, seq),
            Self::Speaking(s) => serialize_envelope(serializer, op, s),
        }
    }
}

impl From<VoiceIdentify> for VoiceCommand {
    fn from(i: VoiceIdentify) -> Self {
        Self::Identify(i)
    }
}

impl From<SelectProtocol> for VoiceCommand {
    fn from(p: SelectProtocol) -> Self {
        Self::SelectProtocol(p)
    }
}

impl From<Speaking> for VoiceCommand {
    fn from(s: Speaking) -> Self {
        Self::Speaking(s)
    }
}

/// Payload of [`VoiceCommand::Identify`].
#[derive(Clone, Eq, PartialEq, Serialize)]
pub struct VoiceIdentify {
    /// Guild of the voice session.
    pub server_id: GuildId,
    /// Our own user id.
    pub user_id: UserId,
    /// Session id from the voice-state fact.
    pub session_id: String,
    /// Token from the voice-server fact.
    pub token: String,
}

impl fmt::Debug for VoiceIdentify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VoiceIdentify")
            .field("server_id", &self.server_id)
            .field("user_id", &self.user_id)
            .field("session_id", &self.session_id)
            .field("token", &"<secret>")
            .finish()
    }
}

/// Payload of [`VoiceCommand::SelectProtocol`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct SelectProtocol {
    /// Transport protocol, always `"udp"`.
    pub protocol: String,
    /// Discovered address and chosen mode.
    pub data: ProtocolData,
}

/// Address information announced in [`SelectProtocol`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ProtocolData {
    /// Our public address as seen by the voice server.
    pub address: IpAddr,
    /// Our public port as seen by the voice server.
    pub port: u16,
    /// Encryption mode.
    pub mode: String,
}

/// Payload of [`VoiceCommand::Speaking`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub struct Speaking {
    /// Speaking flags, empty to stop.
    pub speaking: SpeakingState,
    /// Always zero for bots.
    pub delay: u32,
    /// Our own SSRC.
    pub ssrc: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ready_carries_udp_target() {
        let ev = VoiceEvent::from_json(
            r#"{"op":2,"d":{"ssrc":1,"ip":"127.0.0.1","port":1234,"modes":["xsalsa20_poly1305"]}}"#,
        )
        .unwrap();

        match ev {
            VoiceEvent::Ready(r) => {
                assert_eq!(r.ssrc, 1);
                assert_eq!(r.ip, IpAddr::from([127, 0, 0, 1]));
                assert_eq!(r.port, 1234);
            },
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn hello_interval_is_rounded() {
        let ev = VoiceEvent::from_json(r#"{"op":8,"d":{"heartbeat_interval":41250.0}}"#).unwrap();

        match ev {
            VoiceEvent::Hello(h) => assert_eq!(h.interval_ms(), 41250),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn undocumented_opcodes_are_opaque() {
        let ev = VoiceEvent::from_json(r#"{"op":21,"d":{"transition_id":1}}"#).unwrap();
        assert_eq!(
            ev,
            VoiceEvent::Unknown {
                op: 21,
                data: json!({"transition_id": 1}),
            }
        );
    }

    #[test]
    fn speaking_and_heartbeat_serialize() {
        let speak = VoiceCommand::from(Speaking {
            speaking: SpeakingState::MICROPHONE,
            delay: 0,
            ssrc: 7,
        });
        assert_eq!(
            serde_json::to_value(&speak).unwrap(),
            json!({"op": 5, "d": {"speaking": 1, "delay": 0, "ssrc": 7}})
        );

        assert_eq!(
            serde_json::to_value(VoiceCommand::Heartbeat(3)).unwrap(),
            json!({"op": 3, "d": 3})
        );
    }

    #[test]
    fn select_protocol_layout() {
        let cmd = VoiceCommand::from(SelectProtocol {
            protocol: "udp".into(),
            data: ProtocolData {
                address: IpAddr::from([203, 0, 113, 5]),
                port: 50000,
                mode: "aead_aes256_gcm_rtpsize".into(),
            },
        });

        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({
                "op": 1,
                "d": {
                    "protocol": "udp",
                    "data": {"address": "203.0.113.5", "port": 50000, "mode": "aead_aes256_gcm_rtpsize"},
                },
            })
        );
    }
}
