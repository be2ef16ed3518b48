//! Constants affecting gateway, voice gateway and IP discovery handling.

/// Default URL of Discord's control gateway, pinned to API v10 with JSON encoding.
pub const GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Default base URL for Discord's HTTP API.
pub const API_BASE: &str = "https://discord.com/api/v10";

/// The voice gateway version used by the library.
pub const VOICE_GATEWAY_VERSION: u8 = 4;

/// Divisor used to shave a safety margin off the control gateway's heartbeat interval.
///
/// A delivered interval `i` beats every `i - i / 20` milliseconds.
pub const GATEWAY_HEARTBEAT_MARGIN: u64 = 20;

/// Divisor used to shave a safety margin off the voice gateway's heartbeat interval.
///
/// A delivered interval `i` beats every `i - i / 10` milliseconds.
pub const VOICE_HEARTBEAT_MARGIN: u64 = 10;

/// Total size of an IP discovery request or response.
pub const IP_DISCOVERY_LEN: usize = 74;

/// Size of the type, length and SSRC fields preceding an IP discovery address.
pub const IP_DISCOVERY_HEADER_LEN: usize = 8;

/// Packet type of an outbound IP discovery request.
pub const IP_DISCOVERY_REQUEST: u16 = 0x1;

/// Packet type of an inbound IP discovery response.
pub const IP_DISCOVERY_RESPONSE: u16 = 0x2;

/// Transport protocol announced in `SelectProtocol`.
pub const UDP_PROTOCOL: &str = "udp";

/// Encryption mode requested when selecting the UDP protocol.
///
/// Alternatives are not negotiated.
pub const DEFAULT_ENCRYPTION_MODE: &str = "aead_aes256_gcm_rtpsize";

/// Browser/device name sent in the identify properties by default.
pub const LIBRARY_NAME: &str = "voicegate";

/// Known dispatch event names.
///
/// Only a handful of these are interpreted; the rest are passed through unparsed.
pub mod event_names {
    #![allow(missing_docs)]

    pub const CHANNEL_CREATE: &str = "CHANNEL_CREATE";
    pub const CHANNEL_UPDATE: &str = "CHANNEL_UPDATE";
    pub const CHANNEL_DELETE: &str = "CHANNEL_DELETE";
    pub const GUILD_CREATE: &str = "GUILD_CREATE";
    pub const GUILD_UPDATE: &str = "GUILD_UPDATE";
    pub const GUILD_DELETE: &str = "GUILD_DELETE";
    pub const GUILD_MEMBER_ADD: &str = "GUILD_MEMBER_ADD";
    pub const GUILD_MEMBER_REMOVE: &str = "GUILD_MEMBER_REMOVE";
    pub const GUILD_MEMBER_UPDATE: &str = "GUILD_MEMBER_UPDATE";
    pub const INTERACTION_CREATE: &str = "INTERACTION_CREATE";
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
    pub const MESSAGE_REACTION_ADD: &str = "MESSAGE_REACTION_ADD";
    pub const MESSAGE_REACTION_REMOVE: &str = "MESSAGE_REACTION_REMOVE";
    pub const PRESENCE_UPDATE: &str = "PRESENCE_UPDATE";
    pub const READY: &str = "READY";
    pub const RESUMED: &str = "RESUMED";
    pub const TYPING_START: &str = "TYPING_START";
    pub const USER_UPDATE: &str = "USER_UPDATE";
    pub const VOICE_STATE_UPDATE: &str = "VOICE_STATE_UPDATE";
    pub const VOICE_SERVER_UPDATE: &str = "VOICE_SERVER_UPDATE";
    pub const WEBHOOKS_UPDATE: &str = "WEBHOOKS_UPDATE";
}
