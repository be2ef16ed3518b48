use crate::{
    constants::{API_BASE, DEFAULT_ENCRYPTION_MODE, GATEWAY_URL},
    model::gateway::IdentifyProperties,
};

/// Configuration for gateway sessions and the voice connections they spawn.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct Config {
    /// URL of the control gateway, including version and encoding query parameters.
    ///
    /// Defaults to [`GATEWAY_URL`].
    ///
    /// [`GATEWAY_URL`]: crate::constants::GATEWAY_URL
    pub gateway_url: String,

    /// Base URL used by the default HTTP collaborator.
    ///
    /// Defaults to [`API_BASE`].
    ///
    /// [`API_BASE`]: crate::constants::API_BASE
    pub api_base: String,

    /// Client identity block sent alongside `Identify`.
    pub properties: IdentifyProperties,

    /// Whether joins request that the bot be self-muted.
    ///
    /// Defaults to `false`.
    pub self_mute: bool,

    /// Whether joins request that the bot be self-deafened.
    ///
    /// Defaults to `true`.
    pub self_deaf: bool,

    /// Encryption mode announced in `SelectProtocol`.
    ///
    /// This string is sent as-is: no alternatives are negotiated.
    ///
    /// Defaults to [`DEFAULT_ENCRYPTION_MODE`].
    ///
    /// [`DEFAULT_ENCRYPTION_MODE`]: crate::constants::DEFAULT_ENCRYPTION_MODE
    pub encryption_mode: String,

    /// Whether a voice connection runs UDP IP discovery as soon as its voice
    /// gateway reports `Ready`.
    ///
    /// If disabled, discovery must be driven via [`VoiceConnection::discover_ip`].
    ///
    /// Defaults to `true`.
    ///
    /// [`VoiceConnection::discover_ip`]: crate::VoiceConnection::discover_ip
    pub discover_ip: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_url: GATEWAY_URL.into(),
            api_base: API_BASE.into(),
            properties: IdentifyProperties::default(),
            self_mute: false,
            self_deaf: true,
            encryption_mode: DEFAULT_ENCRYPTION_MODE.into(),
            discover_ip: true,
        }
    }
}

impl Config {
    /// Sets this `Config`'s control gateway URL.
    #[must_use]
    pub fn gateway_url(mut self, gateway_url: impl Into<String>) -> Self {
        self.gateway_url = gateway_url.into();
        self
    }

    /// Sets this `Config`'s HTTP API base URL.
    #[must_use]
    pub fn api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Sets the identify properties reported to the gateway.
    #[must_use]
    pub fn properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Sets whether joins are self-muted.
    #[must_use]
    pub fn self_mute(mut self, self_mute: bool) -> Self {
        self.self_mute = self_mute;
        self
    }

    /// Sets whether joins are self-deafened.
    #[must_use]
    pub fn self_deaf(mut self, self_deaf: bool) -> Self {
        self.self_deaf = self_deaf;
        self
    }

    /// Sets the encryption mode announced during protocol selection.
    #[must_use]
    pub fn encryption_mode(mut self, encryption_mode: impl Into<String>) -> Self {
        self.encryption_mode = encryption_mode.into();
        self
    }

    /// Sets whether IP discovery runs automatically once a voice session is ready.
    #[must_use]
    pub fn discover_ip(mut self, discover_ip: bool) -> Self {
        self.discover_ip = discover_ip;
        self
    }
}
