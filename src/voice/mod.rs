//! Per-guild voice connections.
//!
//! A [`VoiceConnection`] is assembled from two facts delivered over the control gateway
//! (a voice state, carrying our session id, and a voice server, carrying the endpoint
//! and token), which may arrive in either order. The server fact triggers a handshake
//! with the voice gateway; the connection is [`Stage::Ready`] once that gateway
//! assigns an SSRC and a UDP target.

mod task;

use crate::{
    config::Config,
    constants::{UDP_PROTOCOL, VOICE_GATEWAY_VERSION},
    discovery::{self, DiscoveredAddress},
    error::{Error, ProtocolViolation, Result},
    id::{ChannelId, GuildId, UserId},
    model::{
        voice::{ProtocolData, SelectProtocol, Speaking, VoiceIdentify, VoiceReady},
        SpeakingState,
        VoiceCommand,
    },
    shard::VoiceUpdate,
    ws::{WsSender, WsStream},
};
use derivative::Derivative;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Lifecycle of a [`VoiceConnection`].
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[non_exhaustive]
pub enum Stage {
    /// Created on lookup; no facts received yet.
    Empty,
    /// The voice state fact has arrived; waiting on the voice server fact.
    AwaitingServerFact,
    /// A voice gateway handshake has been triggered.
    HandshakeInFlight,
    /// The voice gateway assigned an SSRC and UDP target.
    Ready,
    /// The voice socket was closed, locally or by the remote end.
    Closed,
}

/// Everything an external audio path needs to start sending media.
#[derive(Clone, Debug)]
pub struct VoiceTransport {
    /// Our SSRC.
    pub ssrc: u32,
    /// UDP socket connected to the voice server.
    pub socket: Arc<UdpSocket>,
    /// Our public address, as discovered.
    pub address: DiscoveredAddress,
    /// Encryption mode announced during protocol selection.
    pub mode: String,
}

/// A live voice socket: its writer and the token which stops its tasks.
#[derive(Debug)]
struct VoiceLink {
    sender: WsSender,
    cancel: CancellationToken,
}

impl VoiceLink {
    async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.sender.close().await {
            debug!("Voice socket did not close cleanly: {e}");
        }
    }
}

#[derive(Debug)]
struct Inner {
    stage: Stage,
    session_id: Option<String>,
    channel_id: Option<ChannelId>,
    user_id: UserId,
    endpoint: Option<String>,
    token: Option<String>,

    ssrc: Option<u32>,
    udp_target: Option<SocketAddr>,
    udp: Option<Arc<UdpSocket>>,
    discovered: Option<DiscoveredAddress>,
    session_mode: Option<String>,

    link: Option<VoiceLink>,
    generation: u64,
    watchers: Vec<Sender<Stage>>,
}

impl Inner {
    fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.watchers.retain(|tx| tx.send(stage).is_ok());
    }
}

/// Voice session state for a single guild.
///
/// All state lives behind one lock which is never held across an `await`, so a
/// connection can be shared freely between the control read path, its own voice
/// read loop, and callers.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VoiceConnection {
    guild_id: GuildId,
    config: Arc<Config>,
    #[derivative(Debug = "ignore")]
    updater: Arc<dyn VoiceUpdate + Send + Sync>,
    inner: Mutex<Inner>,
}

impl VoiceConnection {
    pub(crate) fn new(
        guild_id: GuildId,
        user_id: UserId,
        config: Arc<Config>,
        updater: Arc<dyn VoiceUpdate + Send + Sync>,
    ) -> Self {
        Self {
            guild_id,
            config,
            updater,
            inner: Mutex::new(Inner {
                stage: Stage::Empty,
                session_id: None,
                channel_id: None,
                user_id,
                endpoint: None,
                token: None,
                ssrc: None,
                udp_target: None,
                udp: None,
                discovered: None,
                session_mode: None,
                link: None,
                generation: 0,
                watchers: vec![],
            }),
        }
    }

    /// Guild this connection belongs to.
    #[must_use]
    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Current lifecycle stage.
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.inner.lock().stage
    }

    /// Session id from the most recent voice state fact.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }

    /// Channel from the most recent voice state fact.
    #[must_use]
    pub fn channel_id(&self) -> Option<ChannelId> {
        self.inner.lock().channel_id
    }

    /// Our own user id.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.inner.lock().user_id
    }

    /// Endpoint from the most recent voice server fact.
    #[must_use]
    pub fn endpoint(&self) -> Option<String> {
        self.inner.lock().endpoint.clone()
    }

    /// SSRC assigned by the voice gateway.
    #[must_use]
    pub fn ssrc(&self) -> Option<u32> {
        self.inner.lock().ssrc
    }

    /// Public address learned through IP discovery.
    #[must_use]
    pub fn discovered(&self) -> Option<DiscoveredAddress> {
        self.inner.lock().discovered
    }

    /// Encryption mode echoed back by the voice gateway's session description.
    #[must_use]
    pub fn session_mode(&self) -> Option<String> {
        self.inner.lock().session_mode.clone()
    }

    /// Whether a voice socket is currently open.
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.inner.lock().link.is_some()
    }

    /// Hands off the UDP side of this connection, once IP discovery has completed.
    #[must_use]
    pub fn transport(&self) -> Option<VoiceTransport> {
        let inner = self.inner.lock();

        Some(VoiceTransport {
            ssrc: inner.ssrc?,
            socket: inner.udp.clone()?,
            address: inner.discovered?,
            mode: self.config.encryption_mode.clone(),
        })
    }

    /// Returns a channel receiving every subsequent stage change.
    #[must_use]
    pub fn subscribe(&self) -> Receiver<Stage> {
        let (tx, rx) = flume::unbounded();
        self.inner.lock().watchers.push(tx);
        rx
    }

    /// Stores a voice state fact for our own user.
    pub fn update_state(&self, session_id: String, channel_id: ChannelId, user_id: UserId) {
        let mut inner = self.inner.lock();

        inner.session_id = Some(session_id);
        inner.channel_id = Some(channel_id);
        inner.user_id = user_id;

        if inner.stage == Stage::Empty {
            inner.set_stage(Stage::AwaitingServerFact);
        }
    }

    /// Stores a voice server fact. Callers should follow this with [`handshake`].
    ///
    /// A `None` endpoint is stored as-is: the next handshake will then fail.
    ///
    /// [`handshake`]: VoiceConnection::handshake
    pub fn update_server(&self, endpoint: Option<String>, token: String) {
        let mut inner = self.inner.lock();

        inner.endpoint = endpoint;
        inner.token = Some(token);
        inner.set_stage(Stage::HandshakeInFlight);
    }

    /// Opens the voice gateway, identifies, and spawns the read loop.
    ///
    /// Any previous voice socket held by this connection is closed first. If the
    /// handshake fails, the connection is left [`Stage::Closed`].
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn handshake(self: &Arc<Self>) -> Result<()> {
        let (prepared, generation, stale) = {
            let mut inner = self.inner.lock();

            inner.generation += 1;
            inner.set_stage(Stage::HandshakeInFlight);
            inner.ssrc = None;
            inner.udp_target = None;
            inner.udp = None;
            inner.discovered = None;

            let prepared = self.prepare_identify(&inner);
            (prepared, inner.generation, inner.link.take())
        };

        if let Some(stale) = stale {
            debug!("Closing previous voice socket.");
            stale.close().await;
        }

        let out = match prepared {
            Ok((url, identify)) => self.dial(url, identify, generation).await,
            Err(e) => Err(e),
        };

        if out.is_err() {
            self.on_link_closed(generation);
        }

        out
    }

    fn prepare_identify(&self, inner: &Inner) -> Result<(Url, VoiceIdentify)> {
        let endpoint = inner
            .endpoint
            .as_deref()
            .ok_or(ProtocolViolation::MissingEndpoint)?;
        let url = generate_url(endpoint)?;

        let session_id = inner.session_id.clone().unwrap_or_default();
        if session_id.is_empty() {
            // The server fact alone triggers a handshake; the state fact may still be in flight.
            warn!("Voice handshake started without a session id.");
        }

        let identify = VoiceIdentify {
            server_id: self.guild_id,
            user_id: inner.user_id,
            session_id,
            token: inner.token.clone().unwrap_or_default(),
        };

        Ok((url, identify))
    }

    async fn dial(self: &Arc<Self>, url: Url, identify: VoiceIdentify, generation: u64) -> Result<()> {
        info!("Connecting to voice gateway {url}.");
        let (reader, sender) = WsStream::connect(url).await?.split();
        sender
            .send_json(&VoiceCommand::Identify(identify))
            .await?;

        let cancel = CancellationToken::new();
        let superseded = {
            let mut inner = self.inner.lock();

            if inner.generation == generation {
                inner.link = Some(VoiceLink {
                    sender: sender.clone(),
                    cancel: cancel.clone(),
                });
                false
            } else {
                true
            }
        };

        if superseded {
            debug!("Voice handshake superseded by a newer attempt.");
            VoiceLink { sender, cancel }.close().await;
            return Ok(());
        }

        tokio::spawn(task::runner(
            Arc::clone(self),
            reader,
            sender,
            generation,
            cancel,
        ));

        Ok(())
    }

    /// Sends a speaking notification.
    ///
    /// Returns `false` if there is no voice socket or the write failed.
    pub async fn set_speaking(&self, speaking: bool) -> bool {
        let (sender, ssrc) = {
            let inner = self.inner.lock();
            match &inner.link {
                Some(link) => (link.sender.clone(), inner.ssrc.unwrap_or_default()),
                None => return false,
            }
        };

        let state = if speaking {
            SpeakingState::MICROPHONE
        } else {
            SpeakingState::empty()
        };

        let cmd = VoiceCommand::from(Speaking {
            speaking: state,
            delay: 0,
            ssrc,
        });

        match sender.send_json(&cmd).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to send speaking state: {e}");
                false
            },
        }
    }

    /// Leaves the voice channel and closes the voice socket.
    ///
    /// The leave is announced on the control gateway. Returns `false`, doing nothing,
    /// if there is no voice socket.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn teardown(&self) -> bool {
        let Some(link) = self.take_link() else {
            return false;
        };

        if let Err(e) = self
            .updater
            .update_voice_state(self.guild_id, None, self.config.self_deaf, self.config.self_mute)
            .await
        {
            warn!("Failed to announce voice leave: {e}");
        }

        link.close().await;

        true
    }

    /// Closes the voice socket without telling the control gateway.
    pub(crate) async fn close_link(&self) {
        if let Some(link) = self.take_link() {
            link.close().await;
        }
    }

    /// Stops the voice socket's tasks without waiting on a close handshake.
    pub(crate) fn cancel_link(&self) {
        if let Some(link) = self.take_link() {
            link.cancel.cancel();
        }
    }

    fn take_link(&self) -> Option<VoiceLink> {
        let mut inner = self.inner.lock();
        let link = inner.link.take();

        if link.is_some() {
            inner.set_stage(Stage::Closed);
        }

        link
    }

    /// Runs UDP IP discovery against the target reported by the voice gateway, then
    /// announces the result via `SelectProtocol`.
    #[instrument(skip(self), fields(guild = %self.guild_id))]
    pub async fn discover_ip(&self) -> Result<DiscoveredAddress> {
        let (target, ssrc, sender, generation) = {
            let inner = self.inner.lock();
            match (inner.udp_target, inner.ssrc, &inner.link) {
                (Some(target), Some(ssrc), Some(link)) =>
                    (target, ssrc, link.sender.clone(), inner.generation),
                _ => return Err(ProtocolViolation::NotReady.into()),
            }
        };

        let udp = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        udp.connect(target).await?;

        let address = discovery::discover(&udp, ssrc).await?;

        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                debug!("Discarding discovery result from a replaced voice socket.");
                return Err(ProtocolViolation::NotReady.into());
            }

            inner.udp = Some(Arc::new(udp));
            inner.discovered = Some(address);
        }

        sender
            .send_json(&VoiceCommand::from(SelectProtocol {
                protocol: UDP_PROTOCOL.into(),
                data: ProtocolData {
                    address: address.address,
                    port: address.port,
                    mode: self.config.encryption_mode.clone(),
                },
            }))
            .await?;

        info!("Selected UDP protocol at {address}.");

        Ok(address)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    fn on_ready(&self, generation: u64, ready: &VoiceReady) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }

        inner.ssrc = Some(ready.ssrc);
        inner.udp_target = Some(SocketAddr::new(ready.ip, ready.port));
        inner.set_stage(Stage::Ready);

        true
    }

    fn on_session_description(&self, generation: u64, mode: String) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            inner.session_mode = Some(mode);
        }
    }

    fn on_link_closed(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }

        inner.link = None;
        if inner.stage != Stage::Closed {
            inner.set_stage(Stage::Closed);
        }
    }
}

/// Builds the voice gateway URL for an endpoint delivered by the control gateway.
///
/// Discord appends a redundant `:80` to some endpoints, which is stripped. Endpoints
/// already carrying a scheme are used as-is.
fn generate_url(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.strip_suffix(":80").unwrap_or(endpoint);

    let url = if endpoint.contains("://") {
        Url::parse(endpoint)
    } else {
        Url::parse(&format!("wss://{endpoint}/?v={VOICE_GATEWAY_VERSION}"))
    };

    url.map_err(|_| Error::Protocol(ProtocolViolation::EndpointUrl))
}


#[cfg(test)]
mod tests {
    use super::{test_utils::Recorder, *};

    fn conn(recorder: &Arc<Recorder>) -> Arc<VoiceConnection> {
        Arc::new(VoiceConnection::new(
            GuildId(1),
            UserId(2),
            Arc::new(Config::default()),
            recorder.clone(),
        ))
    }

    #[test]
    fn urls_get_version_and_lose_port_80() {
        assert_eq!(
            generate_url("smart.loyal.discord.gg:80").unwrap().as_str(),
            "wss://smart.loyal.discord.gg/?v=4"
        );
        assert_eq!(
            generate_url("ws://127.0.0.1:9000/").unwrap().as_str(),
            "ws://127.0.0.1:9000/"
        );
        assert!(generate_url("bad host name").is_err());
    }

    #[test]
    fn facts_advance_the_stage() {
        let recorder = Arc::new(Recorder::default());
        let conn = conn(&recorder);
        let stages = conn.subscribe();

        assert_eq!(conn.stage(), Stage::Empty);

        conn.update_state("sess".into(), ChannelId(3), UserId(2));
        assert_eq!(conn.stage(), Stage::AwaitingServerFact);
        assert_eq!(conn.session_id().as_deref(), Some("sess"));

        conn.update_server(Some("voice.example".into()), "tok".into());
        assert_eq!(conn.stage(), Stage::HandshakeInFlight);

        let seen: Vec<_> = stages.try_iter().collect();
        assert_eq!(seen, vec![Stage::AwaitingServerFact, Stage::HandshakeInFlight]);
    }

    #[test]
    fn server_fact_first_then_state_keeps_handshake_stage() {
        let recorder = Arc::new(Recorder::default());
        let conn = conn(&recorder);

        conn.update_server(Some("voice.example".into()), "tok".into());
        conn.update_state("sess".into(), ChannelId(3), UserId(2));

        assert_eq!(conn.stage(), Stage::HandshakeInFlight);
        assert_eq!(conn.endpoint().as_deref(), Some("voice.example"));
    }

    #[tokio::test]
    async fn handshake_needs_an_endpoint() {
        let recorder = Arc::new(Recorder::default());
        let conn = conn(&recorder);
        conn.update_server(None, "tok".into());

        assert!(matches!(
            conn.handshake().await,
            Err(Error::Protocol(ProtocolViolation::MissingEndpoint))
        ));
        assert_eq!(conn.stage(), Stage::Closed);
        assert!(!conn.is_linked());
    }

    #[tokio::test]
    async fn failed_dial_closes_the_connection() {
        let recorder = Arc::new(Recorder::default());
        let conn = conn(&recorder);
        let stages = conn.subscribe();

        conn.update_state("sess".into(), ChannelId(3), UserId(2));
        conn.update_server(Some("ws://127.0.0.1:1/".into()), "tok".into());

        assert!(conn.handshake().await.is_err());
        assert_eq!(conn.stage(), Stage::Closed);
        assert!(!conn.is_linked());
        assert_eq!(stages.try_iter().last(), Some(Stage::Closed));
    }

    #[tokio::test]
    async fn unlinked_connections_do_nothing() {
        let recorder = Arc::new(Recorder::default());
        let conn = conn(&recorder);

        assert!(!conn.teardown().await);
        assert!(!conn.set_speaking(true).await);
        assert!(recorder.0.lock().is_empty());
        assert_eq!(conn.stage(), Stage::Empty);

        assert!(matches!(
            conn.discover_ip().await,
            Err(Error::Protocol(ProtocolViolation::NotReady))
        ));
    }
}
