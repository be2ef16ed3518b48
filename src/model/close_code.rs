/// Close codes sent by a voice gateway when it drops a client.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum CloseCode {
    /// Invalid voice opcode.
    UnknownOpcode = 4001,
    /// Invalid payload sent in identify.
    FailedToDecode = 4002,
    /// A payload was sent prior to identifying.
    NotAuthenticated = 4003,
    /// The token sent in identify was incorrect.
    AuthenticationFailed = 4004,
    /// More than one identify payload was sent.
    AlreadyAuthenticated = 4005,
    /// The session is no longer valid.
    SessionInvalid = 4006,
    /// A session timed out.
    SessionTimeout = 4009,
    /// The server for the last connection attempt could not be found.
    ServerNotFound = 4011,
    /// Discord did not recognise the voice protocol chosen.
    UnknownProtocol = 4012,
    /// Disconnected, either due to channel closure/removal or kicking.
    ///
    /// Should not reconnect.
    Disconnected = 4014,
    /// Connected voice server crashed.
    ///
    /// Should resume.
    VoiceServerCrash = 4015,
    /// Discord didn't recognise the encryption scheme.
    UnknownEncryptionMode = 4016,
    /// Malformed request.
    BadRequest = 4020,
    /// Disconnected due to rate limiting.
    ///
    /// Should not reconnect.
    RateLimited = 4021,
    /// All clients were disconnected because the call ended.
    ///
    /// Should not reconnect.
    CallTerminated = 4022,
}

impl CloseCode {
    /// Maps a raw close code onto a known variant.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        Some(match code {
            4001 => Self::UnknownOpcode,
            4002 => Self::FailedToDecode,
            4003 => Self::NotAuthenticated,
            4004 => Self::AuthenticationFailed,
            4005 => Self::AlreadyAuthenticated,
            4006 => Self::SessionInvalid,
            4009 => Self::SessionTimeout,
            4011 => Self::ServerNotFound,
            4012 => Self::UnknownProtocol,
            4014 => Self::Disconnected,
            4015 => Self::VoiceServerCrash,
            4016 => Self::UnknownEncryptionMode,
            4020 => Self::BadRequest,
            4021 => Self::RateLimited,
            4022 => Self::CallTerminated,
            _ => return None,
        })
    }

    /// Indicates whether a voice client should attempt to reconnect after this close.
    #[must_use]
    pub fn should_reconnect(self) -> bool {
        !matches!(
            self,
            Self::Disconnected | Self::RateLimited | Self::CallTerminated
        )
    }
}
