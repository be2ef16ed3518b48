//! In-process stand-ins for Discord's control gateway, voice gateway and HTTP API.
#![allow(dead_code)]

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    WebSocketStream,
};
use voicegate::{
    id::{ChannelId, GuildId, UserId},
    model::Intents,
    Config,
    GatewaySession,
    Rest,
};

pub const BOT_ID: u64 = 100;
pub const TOKEN: &str = "bot-token";

pub type Server = WebSocketStream<TcpStream>;

/// A listening mock gateway.
pub struct MockGateway {
    listener: TcpListener,
    pub url: String,
}

impl MockGateway {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/", listener.local_addr().unwrap());

        Self { listener, url }
    }

    pub async fn accept(&self) -> Server {
        let (tcp, _) = self.listener.accept().await.unwrap();
        tokio_tungstenite::accept_async(tcp).await.unwrap()
    }
}

/// Reads the next JSON text frame, panicking on anything else.
pub async fn recv_json(server: &mut Server) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket ended")
            .unwrap();

        match msg {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {other:?}"),
        }
    }
}

/// Reads JSON frames until one with opcode `op` arrives, skipping the rest.
pub async fn recv_op(server: &mut Server, op: u64) -> Value {
    loop {
        let value = recv_json(server).await;
        if value["op"] == op {
            return value;
        }
    }
}

/// Waits for the client to close the socket.
pub async fn expect_close(server: &mut Server) {
    loop {
        match tokio::time::timeout(Duration::from_secs(5), server.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        }
    }
}

pub async fn send_json(server: &mut Server, value: Value) {
    server.send(Message::Text(value.to_string())).await.unwrap();
}

pub async fn send_raw(server: &mut Server, text: &str) {
    server.send(Message::Text(text.into())).await.unwrap();
}

pub async fn send_close(server: &mut Server, code: u16) {
    server
        .send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        })))
        .await
        .unwrap();
}

pub fn hello(interval: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": interval}})
}

pub fn dispatch(name: &str, seq: u64, d: Value) -> Value {
    json!({"op": 0, "s": seq, "t": name, "d": d})
}

pub fn ready() -> Value {
    dispatch(
        "READY",
        1,
        json!({
            "v": 10,
            "user": {"id": BOT_ID.to_string(), "username": "voicebot", "bot": true},
            "session_id": "control-session",
            "guilds": [],
        }),
    )
}

/// HTTP collaborator with canned answers.
#[derive(Debug, Default)]
pub struct FakeRest {
    pub channel: Option<ChannelId>,
    pub posted: Mutex<Vec<(ChannelId, String)>>,
}

#[async_trait]
impl Rest for FakeRest {
    async fn user_voice_channel(
        &self,
        _guild: GuildId,
        _user: UserId,
    ) -> voicegate::Result<Option<ChannelId>> {
        Ok(self.channel)
    }

    async fn post_message(&self, channel: ChannelId, content: &str) -> voicegate::Result<()> {
        self.posted.lock().push((channel, content.into()));
        Ok(())
    }
}

pub fn config(gateway: &MockGateway) -> Config {
    Config::default().gateway_url(gateway.url.clone())
}

/// Brings up a session against a fresh mock gateway which never asks for heartbeats.
pub async fn session_with(
    rest: Arc<FakeRest>,
    tweak: impl FnOnce(Config) -> Config,
) -> (GatewaySession, Server) {
    let gateway = MockGateway::bind().await;
    let config = tweak(config(&gateway));

    let (session, server) = tokio::join!(
        GatewaySession::connect_with_rest(TOKEN, Intents::GUILD_VOICE_STATES, config, rest),
        async {
            let mut server = gateway.accept().await;
            let identify = recv_json(&mut server).await;
            assert_eq!(identify["op"], 2);

            send_json(&mut server, hello(60_000)).await;
            send_json(&mut server, ready()).await;
            server
        },
    );

    (session.unwrap(), server)
}

pub async fn session() -> (GatewaySession, Server) {
    session_with(Arc::new(FakeRest::default()), |c| c).await
}
