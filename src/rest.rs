//! HTTP calls a gateway session depends on.

use crate::{
    config::Config,
    error::Result,
    id::{ChannelId, GuildId, UserId},
};
use async_trait::async_trait;
use derivative::Derivative;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// HTTP collaborator used to resolve voice channels and post text messages.
///
/// [`GatewaySession`] only consumes this trait. Tests and embedders may substitute
/// their own implementation via [`GatewaySession::connect_with_rest`].
///
/// [`GatewaySession`]: crate::GatewaySession
/// [`GatewaySession::connect_with_rest`]: crate::GatewaySession::connect_with_rest
#[async_trait]
pub trait Rest {
    /// Looks up the voice channel `user` currently occupies in `guild`.
    ///
    /// Returns `None` if the user is not in voice.
    async fn user_voice_channel(&self, guild: GuildId, user: UserId) -> Result<Option<ChannelId>>;

    /// Posts a plain text message to `channel`.
    async fn post_message(&self, channel: ChannelId, content: &str) -> Result<()>;
}

/// Default [`Rest`] implementation backed by [`reqwest`].
///
/// Every request carries `Authorization: Bot <token>`.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct HttpRest {
    client: Client,
    api_base: String,
    #[derivative(Debug = "ignore")]
    token: String,
}

impl HttpRest {
    /// Creates a client against `config.api_base`.
    #[must_use]
    pub fn new(token: impl Into<String>, config: &Config) -> Self {
        Self::with_client(Client::new(), token, config)
    }

    /// Creates a client against `config.api_base`, reusing an existing [`Client`].
    #[must_use]
    pub fn with_client(client: Client, token: impl Into<String>, config: &Config) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').into(),
            token: token.into(),
        }
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }
}

#[derive(Deserialize)]
struct VoiceState {
    #[serde(default)]
    channel_id: Option<ChannelId>,
}

#[derive(Serialize)]
struct CreateMessage<'a> {
    content: &'a str,
}

#[async_trait]
impl Rest for HttpRest {
    #[instrument(skip(self))]
    async fn user_voice_channel(&self, guild: GuildId, user: UserId) -> Result<Option<ChannelId>> {
        let url = format!("{}/guilds/{guild}/voice-states/{user}", self.api_base);
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth())
            .send()
            .await?;

        // Users outside voice have no voice state at all.
        if resp.status() == StatusCode::NOT_FOUND {
            debug!("No voice state found.");
            return Ok(None);
        }

        let state: VoiceState = resp.error_for_status()?.json().await?;

        Ok(state.channel_id)
    }

    #[instrument(skip(self, content))]
    async fn post_message(&self, channel: ChannelId, content: &str) -> Result<()> {
        let url = format!("{}/channels/{channel}/messages", self.api_base);
        self.client
            .post(url)
            .header(AUTHORIZATION, self.auth())
            .json(&CreateMessage { content })
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
