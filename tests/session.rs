mod common;

use common::*;
use futures::StreamExt;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use voicegate::{
    id::{ChannelId, GuildId, UserId},
    model::{Dispatch, Intents},
    Error,
    GatewaySession,
};

#[tokio::test]
async fn connect_identifies_and_learns_bot_user() {
    let gateway = MockGateway::bind().await;

    let (session, identify) = tokio::join!(
        GatewaySession::connect_with_rest(
            TOKEN,
            Intents::GUILDS | Intents::GUILD_VOICE_STATES,
            config(&gateway),
            Arc::new(FakeRest::default()),
        ),
        async {
            let mut server = gateway.accept().await;
            let identify = recv_json(&mut server).await;
            send_json(&mut server, hello(41_250)).await;
            send_json(&mut server, ready()).await;
            identify
        },
    );

    let session = session.unwrap();
    assert_eq!(session.current_user().id, UserId(BOT_ID));
    assert_eq!(session.current_user().name, "voicebot");
    assert_eq!(session.session_id(), Some("control-session"));
    assert_eq!(session.last_sequence(), Some(1));

    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], TOKEN);
    assert_eq!(identify["d"]["intents"], (1 << 0) | (1 << 7));
    assert_eq!(identify["d"]["properties"]["browser"], "voicegate");
}

#[tokio::test]
async fn handshake_rejects_non_hello_first_frame() {
    let gateway = MockGateway::bind().await;

    let (session, _server) = tokio::join!(
        GatewaySession::connect_with_rest(
            TOKEN,
            Intents::GUILD_VOICE_STATES,
            config(&gateway),
            Arc::new(FakeRest::default()),
        ),
        async {
            let mut server = gateway.accept().await;
            recv_json(&mut server).await;
            send_json(&mut server, ready()).await;
            server
        },
    );

    match session {
        Err(Error::Handshake { expected, got }) => {
            assert_eq!(expected, "Hello");
            assert_eq!(got, "dispatch READY");
        },
        other => panic!("expected a handshake error, got {other:?}"),
    }
}

#[tokio::test]
async fn decode_errors_do_not_end_the_session() {
    let (mut session, mut server) = session().await;

    send_raw(
        &mut server,
        r#"{"op":0,"s":2,"t":"MESSAGE_CREATE","d":{"content":5}}"#,
    )
    .await;
    send_json(
        &mut server,
        dispatch(
            "MESSAGE_CREATE",
            3,
            json!({
                "content": "!join",
                "author": {"id": "7", "username": "someone"},
                "channel_id": "20",
                "guild_id": "1",
            }),
        ),
    )
    .await;

    let err = session.next_event().await.unwrap_err();
    assert!(matches!(err, Error::Decode(_)));
    assert!(!err.is_fatal());

    match session.next_event().await.unwrap() {
        Some(Dispatch::MessageCreate(msg)) => {
            assert_eq!(msg.content, "!join");
            assert_eq!(msg.author.id, UserId(7));
            assert_eq!(msg.channel_id, ChannelId(20));
        },
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(session.last_sequence(), Some(3));
}

#[tokio::test]
async fn non_dispatch_frames_yield_nothing() {
    let (mut session, mut server) = session().await;

    send_json(&mut server, json!({"op": 11, "d": null})).await;
    send_json(&mut server, json!({"op": 7, "d": null})).await;
    send_json(&mut server, json!({"op": 9, "d": false})).await;
    send_json(&mut server, dispatch("TYPING_START", 4, json!({"user_id": "7"}))).await;

    assert!(session.next_event().await.unwrap().is_none());
    assert!(session.next_event().await.unwrap().is_none());
    assert!(session.next_event().await.unwrap().is_none());

    match session.next_event().await.unwrap() {
        Some(Dispatch::Unknown { name, data }) => {
            assert_eq!(name, "TYPING_START");
            assert_eq!(data["user_id"], "7");
        },
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn heartbeat_requests_are_answered() {
    let (mut session, mut server) = session().await;

    send_json(&mut server, json!({"op": 1, "d": null})).await;
    assert!(session.next_event().await.unwrap().is_none());

    assert_eq!(recv_json(&mut server).await, json!({"op": 1, "d": null}));
}

#[tokio::test]
async fn foreign_and_channelless_voice_states_are_ignored() {
    let (mut session, mut server) = session().await;

    send_json(
        &mut server,
        dispatch(
            "VOICE_STATE_UPDATE",
            2,
            json!({"guild_id": "1", "channel_id": "2", "user_id": "7", "session_id": "theirs"}),
        ),
    )
    .await;
    send_json(
        &mut server,
        dispatch(
            "VOICE_STATE_UPDATE",
            3,
            json!({"guild_id": "1", "channel_id": null, "user_id": BOT_ID.to_string(), "session_id": "ours"}),
        ),
    )
    .await;

    for _ in 0..2 {
        assert!(matches!(
            session.next_event().await.unwrap(),
            Some(Dispatch::VoiceStateUpdate(_))
        ));
    }

    assert!(session.registry().is_empty());
}

#[tokio::test]
async fn foreign_voice_state_leaves_existing_connection_alone() {
    let (mut session, mut server) = session().await;

    send_json(
        &mut server,
        dispatch(
            "VOICE_STATE_UPDATE",
            2,
            json!({"guild_id": "1", "channel_id": "2", "user_id": BOT_ID.to_string(), "session_id": "ours"}),
        ),
    )
    .await;
    send_json(
        &mut server,
        dispatch(
            "VOICE_STATE_UPDATE",
            3,
            json!({"guild_id": "1", "channel_id": "9", "user_id": "7", "session_id": "theirs"}),
        ),
    )
    .await;

    session.next_event().await.unwrap();
    session.next_event().await.unwrap();

    let conn = session.voice(GuildId(1)).unwrap();
    assert_eq!(conn.session_id().as_deref(), Some("ours"));
    assert_eq!(conn.channel_id(), Some(ChannelId(2)));
    assert_eq!(conn.user_id(), UserId(BOT_ID));
    assert_eq!(session.registry().len(), 1);
}

#[tokio::test]
async fn own_voice_state_creates_a_connection() {
    let (mut session, mut server) = session().await;

    send_json(
        &mut server,
        dispatch(
            "VOICE_STATE_UPDATE",
            2,
            json!({"guild_id": "1", "channel_id": "2", "user_id": BOT_ID.to_string(), "session_id": "ours"}),
        ),
    )
    .await;
    session.next_event().await.unwrap();

    let conn = session.voice(GuildId(1)).unwrap();
    assert_eq!(conn.session_id().as_deref(), Some("ours"));
    assert_eq!(conn.channel_id(), Some(ChannelId(2)));
    assert_eq!(conn.stage(), voicegate::Stage::AwaitingServerFact);
}

#[tokio::test]
async fn join_writes_voice_state_for_users_channel() {
    let rest = Arc::new(FakeRest {
        channel: Some(ChannelId(2)),
        ..FakeRest::default()
    });
    let (session, mut server) = session_with(rest, |c| c).await;

    let channel = session.join_voice(GuildId(1), UserId(7)).await.unwrap();
    assert_eq!(channel, ChannelId(2));

    assert_eq!(
        recv_json(&mut server).await,
        json!({
            "op": 4,
            "d": {"guild_id": "1", "channel_id": "2", "self_mute": false, "self_deaf": true},
        })
    );
}

#[tokio::test]
async fn join_without_channel_writes_nothing() {
    let (mut session, mut server) = session().await;

    match session.join_voice(GuildId(1), UserId(7)).await {
        Err(Error::NotInVoice { guild, user }) => {
            assert_eq!(guild, GuildId(1));
            assert_eq!(user, UserId(7));
        },
        other => panic!("unexpected {other:?}"),
    }

    session.close().await.unwrap();

    // The close sentinel is the first thing the gateway sees.
    assert_eq!(recv_json(&mut server).await, json!({"op": 1000, "d": null}));
    expect_close(&mut server).await;
}

#[tokio::test]
async fn messages_go_through_rest() {
    let rest = Arc::new(FakeRest::default());
    let (session, _server) = session_with(Arc::clone(&rest), |c| c).await;

    session.send_message(ChannelId(20), "hello").await.unwrap();

    assert_eq!(*rest.posted.lock(), vec![(ChannelId(20), "hello".to_string())]);
}

#[tokio::test]
async fn speaking_without_connection_is_an_error() {
    let (session, _server) = session().await;

    assert!(matches!(
        session.set_speaking(GuildId(1), true).await,
        Err(Error::NoConnection(GuildId(1)))
    ));
}

#[tokio::test]
async fn remote_close_is_fatal() {
    let (mut session, mut server) = session().await;

    send_close(&mut server, 4004).await;

    let err = session.next_event().await.unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.close_code(), Some(4004));
}

#[tokio::test]
async fn leave_drops_connection_even_if_the_write_fails() {
    let (mut session, mut server) = session().await;

    send_json(
        &mut server,
        dispatch(
            "VOICE_STATE_UPDATE",
            2,
            json!({"guild_id": "1", "channel_id": "2", "user_id": BOT_ID.to_string(), "session_id": "ours"}),
        ),
    )
    .await;
    session.next_event().await.unwrap();
    assert!(session.voice(GuildId(1)).is_some());

    send_close(&mut server, 4000).await;
    assert!(session.next_event().await.unwrap_err().is_fatal());

    assert!(session.leave_voice(GuildId(1)).await.is_err());
    assert!(session.voice(GuildId(1)).is_none());
}

#[tokio::test]
async fn dropping_a_session_stops_its_heartbeat() {
    let gateway = MockGateway::bind().await;

    let (session, mut server) = tokio::join!(
        GatewaySession::connect_with_rest(
            TOKEN,
            Intents::GUILD_VOICE_STATES,
            config(&gateway),
            Arc::new(FakeRest::default()),
        ),
        async {
            let mut server = gateway.accept().await;
            recv_json(&mut server).await;
            send_json(&mut server, hello(40)).await;
            send_json(&mut server, ready()).await;
            server
        },
    );

    drop(session.unwrap());

    // With nothing left holding the writer, the socket goes away instead of beating on.
    let ended = timeout(Duration::from_secs(2), async {
        loop {
            match server.next().await {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;

    assert!(ended.is_ok(), "heartbeats outlived the session");
}
