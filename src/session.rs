//! The control gateway connection.

use crate::{
    config::Config,
    constants::GATEWAY_HEARTBEAT_MARGIN,
    error::{Error, ProtocolViolation, Result},
    heartbeat::Heartbeat,
    id::{ChannelId, GuildId, UserId},
    model::{
        gateway::{CurrentUser, Identify, Ready, VoiceServerUpdate, VoiceStateUpdate},
        Dispatch,
        GatewayCommand,
        GatewayEvent,
        GatewayFrame,
        Intents,
    },
    registry::VoiceConnectionRegistry,
    rest::{HttpRest, Rest},
    shard::{Shard, VoiceUpdate},
    voice::VoiceConnection,
    ws::{WsReader, WsStream},
};
use derivative::Derivative;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

/// A bot's session on the control gateway.
///
/// The session does not read in the background: callers drive it by calling
/// [`next_event`] in a loop. Voice facts seen along the way are routed into the
/// session's [`VoiceConnectionRegistry`], which spawns its own tasks per voice socket.
///
/// [`next_event`]: GatewaySession::next_event
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GatewaySession {
    #[derivative(Debug = "ignore")]
    reader: WsReader,
    shard: Shard,
    user: CurrentUser,
    session_id: Option<String>,
    registry: Arc<VoiceConnectionRegistry>,
    heartbeat: Option<Heartbeat>,
    #[derivative(Debug = "ignore")]
    rest: Arc<dyn Rest + Send + Sync>,
    config: Arc<Config>,
    last_sequence: Option<u64>,
}

impl GatewaySession {
    /// Connects to the control gateway with the default configuration.
    pub async fn connect(token: &str, intents: Intents) -> Result<Self> {
        Self::connect_with_config(token, intents, Config::default()).await
    }

    /// Connects to the control gateway, using [`HttpRest`] for HTTP calls.
    pub async fn connect_with_config(token: &str, intents: Intents, config: Config) -> Result<Self> {
        let rest = Arc::new(HttpRest::new(token, &config));
        Self::connect_with_rest(token, intents, config, rest).await
    }

    /// Connects to the control gateway with a custom HTTP collaborator.
    ///
    /// Identifies, waits for `Hello` (which must be the first frame), starts the
    /// heartbeat, then waits for the `READY` dispatch naming the bot user.
    #[instrument(skip(token, config, rest))]
    pub async fn connect_with_rest(
        token: &str,
        intents: Intents,
        config: Config,
        rest: Arc<dyn Rest + Send + Sync>,
    ) -> Result<Self> {
        let url = Url::parse(&config.gateway_url).map_err(|_| ProtocolViolation::EndpointUrl)?;

        info!("Connecting to gateway {url}.");
        let (mut reader, sender) = WsStream::connect(url).await?.split();
        let shard = Shard::new(sender);

        shard
            .send(&GatewayCommand::from(Identify {
                token: token.into(),
                intents,
                properties: config.properties.clone(),
            }))
            .await?;

        let interval = match next_frame(&mut reader).await?.event {
            GatewayEvent::Hello(hello) => hello.heartbeat_interval,
            other => {
                return Err(Error::Handshake {
                    expected: "Hello",
                    got: describe(&other),
                })
            },
        };

        debug!("Gateway heartbeat interval {interval}ms.");
        let heartbeat = Heartbeat::start(
            shard.sender().clone(),
            interval,
            GATEWAY_HEARTBEAT_MARGIN,
            |_| GatewayCommand::Heartbeat(None),
            CancellationToken::new(),
        );

        let (ready, last_sequence) = match await_ready(&mut reader).await {
            Ok(ready) => ready,
            Err(e) => {
                heartbeat.stop();
                return Err(e);
            },
        };

        info!("Logged in as {} ({}).", ready.user.name, ready.user.id);

        let config = Arc::new(config);
        let updater: Arc<dyn VoiceUpdate + Send + Sync> = Arc::new(shard.clone());
        let registry = Arc::new(VoiceConnectionRegistry::new(
            ready.user.id,
            Arc::clone(&config),
            updater,
        ));

        Ok(Self {
            reader,
            shard,
            user: ready.user,
            session_id: ready.session_id,
            registry,
            heartbeat: Some(heartbeat),
            rest,
            config,
            last_sequence,
        })
    }

    /// The bot user this session is logged in as.
    #[must_use]
    pub fn current_user(&self) -> &CurrentUser {
        &self.user
    }

    /// Session id reported in `READY`, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Voice connections owned by this session.
    #[must_use]
    pub fn registry(&self) -> &Arc<VoiceConnectionRegistry> {
        &self.registry
    }

    /// Handle to the control gateway writer.
    #[must_use]
    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    /// Most recent sequence number seen on a dispatch.
    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Voice connection for a guild, if one has been created.
    #[must_use]
    pub fn voice<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<VoiceConnection>> {
        self.registry.get(guild_id)
    }

    /// Reads and handles one frame.
    ///
    /// Returns `Ok(Some(_))` for dispatches and `Ok(None)` for every other frame.
    /// Errors for which [`Error::is_fatal`] is `false` affect only the current frame,
    /// and the session may continue to be read.
    pub async fn next_event(&mut self) -> Result<Option<Dispatch>> {
        let Some(text) = self.reader.recv_text().await? else {
            return Ok(None);
        };

        let frame = GatewayFrame::from_json(&text)?;
        if frame.sequence.is_some() {
            self.last_sequence = frame.sequence;
        }

        match frame.event {
            GatewayEvent::Dispatch(dispatch) => {
                self.route(&dispatch).await;
                return Ok(Some(dispatch));
            },
            GatewayEvent::HeartbeatAck => trace!("Gateway heartbeat ACK."),
            GatewayEvent::Heartbeat => {
                debug!("Gateway requested an immediate heartbeat.");
                self.shard.send(&GatewayCommand::Heartbeat(None)).await?;
            },
            GatewayEvent::Reconnect => warn!("Gateway asked for a reconnect, which is unsupported."),
            GatewayEvent::InvalidSession(resumable) =>
                warn!(resumable, "Gateway invalidated the session."),
            GatewayEvent::Hello(_) => debug!("Ignoring repeated Hello."),
            GatewayEvent::Unknown { op, .. } => trace!("Ignoring gateway opcode {op}."),
        }

        Ok(None)
    }

    async fn route(&self, dispatch: &Dispatch) {
        match dispatch {
            Dispatch::VoiceStateUpdate(state) => self.apply_voice_state(state),
            Dispatch::VoiceServerUpdate(server) => self.apply_voice_server(server).await,
            other => trace!("Dispatch {}.", other.name()),
        }
    }

    fn apply_voice_state(&self, state: &VoiceStateUpdate) {
        if state.user_id != self.user.id {
            return;
        }

        match (state.guild_id, state.channel_id) {
            (Some(guild_id), Some(channel_id)) => {
                debug!("Voice state for guild {guild_id}: channel {channel_id}.");
                self.registry.get_or_create(guild_id).update_state(
                    state.session_id.clone(),
                    channel_id,
                    state.user_id,
                );
            },
            _ => trace!("Ignoring voice state without guild or channel."),
        }
    }

    async fn apply_voice_server(&self, server: &VoiceServerUpdate) {
        let conn = self.registry.get_or_create(server.guild_id);
        conn.update_server(server.endpoint.clone(), server.token.clone());

        if let Err(e) = conn.handshake().await {
            warn!("Voice handshake for guild {} failed: {e}", server.guild_id);
        }
    }

    /// Posts a text message through the HTTP collaborator.
    pub async fn send_message(&self, channel_id: ChannelId, content: &str) -> Result<()> {
        self.rest.post_message(channel_id, content).await
    }

    /// Asks to join the voice channel `user_id` currently occupies in `guild_id`.
    ///
    /// The voice connection itself comes up asynchronously, as the gateway answers
    /// with voice state and voice server facts.
    #[instrument(skip(self))]
    pub async fn join_voice(&self, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
        let channel_id = self
            .rest
            .user_voice_channel(guild_id, user_id)
            .await?
            .ok_or(Error::NotInVoice {
                guild: guild_id,
                user: user_id,
            })?;

        self.shard
            .update_voice_state(
                guild_id,
                Some(channel_id),
                self.config.self_deaf,
                self.config.self_mute,
            )
            .await?;

        Ok(channel_id)
    }

    /// Leaves voice in `guild_id`, dropping its connection.
    ///
    /// The connection is dropped even if the leave could not be written.
    #[instrument(skip(self))]
    pub async fn leave_voice(&self, guild_id: GuildId) -> Result<()> {
        if let Some(conn) = self.registry.remove(guild_id) {
            conn.close_link().await;
        }

        self.shard
            .update_voice_state(guild_id, None, self.config.self_deaf, self.config.self_mute)
            .await
    }

    /// Changes the speaking state of a guild's voice connection.
    ///
    /// Returns whether the notification was sent.
    pub async fn set_speaking(&self, guild_id: GuildId, speaking: bool) -> Result<bool> {
        let conn = self
            .registry
            .get(guild_id)
            .ok_or(Error::NoConnection(guild_id))?;

        Ok(conn.set_speaking(speaking).await)
    }

    /// Shuts down the session and every voice socket it owns.
    #[instrument(skip(self))]
    pub async fn close(&mut self) -> Result<()> {
        let sent = self.shard.send(&GatewayCommand::Close).await;

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
            heartbeat.join().await;
        }

        for conn in self.registry.connections() {
            conn.close_link().await;
        }

        let closed = self.shard.close().await;
        info!("Gateway session closed.");

        sent.and(closed)
    }
}

impl Drop for GatewaySession {
    fn drop(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }

        for conn in self.registry.connections() {
            conn.cancel_link();
        }
    }
}

async fn next_frame(reader: &mut WsReader) -> Result<GatewayFrame> {
    loop {
        if let Some(text) = reader.recv_text().await? {
            return Ok(GatewayFrame::from_json(&text)?);
        }
    }
}

async fn await_ready(reader: &mut WsReader) -> Result<(Ready, Option<u64>)> {
    loop {
        let frame = next_frame(reader).await?;

        match frame.event {
            GatewayEvent::Dispatch(Dispatch::Ready(ready)) => return Ok((ready, frame.sequence)),
            other => debug!("Waiting for READY, skipped {}.", describe(&other)),
        }
    }
}

fn describe(event: &GatewayEvent) -> String {
    match event {
        GatewayEvent::Dispatch(d) => format!("dispatch {}", d.name()),
        GatewayEvent::Heartbeat => "Heartbeat".into(),
        GatewayEvent::Reconnect => "Reconnect".into(),
        GatewayEvent::InvalidSession(_) => "InvalidSession".into(),
        GatewayEvent::Hello(_) => "Hello".into(),
        GatewayEvent::HeartbeatAck => "HeartbeatAck".into(),
        GatewayEvent::Unknown { op, .. } => format!("opcode {op}"),
    }
}
