//! Requires the "rustls" or "native" feature (the default enables "rustls").
//!
//! A bot which joins the voice channel of whoever asks it to.
//!
//! ```text
//! !join    join the caller's voice channel
//! !speak   toggle the speaking indicator
//! !leave   leave voice in this guild
//! !quit    shut the bot down
//! ```
//!
//! Run with `DISCORD_TOKEN=... cargo run --example voice_bot`. Log output is
//! controlled through `RUST_LOG`, e.g. `RUST_LOG=voicegate=debug`.
use std::{collections::HashSet, env};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use voicegate::{
    id::GuildId,
    model::{gateway::MessageCreate, Dispatch, Intents},
    Error,
    GatewaySession,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let token = env::var("DISCORD_TOKEN").expect("Expected a token in the environment");
    let intents = Intents::GUILDS
        | Intents::GUILD_MESSAGES
        | Intents::MESSAGE_CONTENT
        | Intents::GUILD_VOICE_STATES;

    let mut session = GatewaySession::connect(&token, intents)
        .await
        .expect("Error connecting to the gateway");

    info!("{} is connected!", session.current_user().name);

    let mut speaking = HashSet::new();

    loop {
        let msg = match session.next_event().await {
            Ok(Some(Dispatch::MessageCreate(msg))) => msg,
            Ok(_) => continue,
            Err(e) if e.is_fatal() => {
                error!("Gateway connection lost: {e}");
                break;
            },
            Err(e) => {
                warn!("Skipping frame: {e}");
                continue;
            },
        };

        if msg.author.id == session.current_user().id {
            continue;
        }

        let Some(guild_id) = msg.guild_id else {
            continue;
        };

        match msg.content.trim() {
            "!join" => join(&session, &msg, guild_id).await,
            "!leave" => {
                speaking.remove(&guild_id);
                check_msg(session.leave_voice(guild_id).await);
                check_msg(session.send_message(msg.channel_id, "Left voice channel").await);
            },
            "!speak" => {
                let now = !speaking.contains(&guild_id);
                match session.set_speaking(guild_id, now).await {
                    Ok(true) => {
                        if now {
                            speaking.insert(guild_id);
                        } else {
                            speaking.remove(&guild_id);
                        }
                    },
                    Ok(false) => warn!("Voice connection is not up yet."),
                    Err(e) => check_msg(session.send_message(msg.channel_id, &e.to_string()).await),
                }
            },
            "!quit" => break,
            _ => {},
        }
    }

    check_msg(session.close().await);
}

async fn join(session: &GatewaySession, msg: &MessageCreate, guild_id: GuildId) {
    match session.join_voice(guild_id, msg.author.id).await {
        Ok(channel_id) => info!("Joining channel {channel_id}."),
        Err(Error::NotInVoice { .. }) => {
            check_msg(session.send_message(msg.channel_id, "Not in a voice channel").await);
        },
        Err(e) => error!("Failed to join: {e}"),
    }
}

/// Checks that a message successfully sent; if not, then logs why to stdout.
fn check_msg<T>(result: voicegate::Result<T>) {
    if let Err(why) = result {
        println!("Error sending message: {why:?}");
    }
}
