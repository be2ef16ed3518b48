use super::VoiceConnection;
use crate::{
    constants::VOICE_HEARTBEAT_MARGIN,
    heartbeat::Heartbeat,
    model::{CloseCode, VoiceCommand, VoiceEvent},
    ws::{WsReader, WsSender},
};
use std::sync::Arc;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

/// Read loop for a single voice socket.
///
/// Exits when the socket closes, errors, or `cancel` fires. State changes are
/// applied only while `generation` is still the connection's current one.
#[instrument(skip_all, fields(guild = %conn.guild_id(), generation = generation))]
pub(crate) async fn runner(
    conn: Arc<VoiceConnection>,
    mut reader: WsReader,
    sender: WsSender,
    generation: u64,
    cancel: CancellationToken,
) {
    let mut heartbeat: Option<Heartbeat> = None;

    loop {
        let msg = select! {
            () = cancel.cancelled() => {
                debug!("Voice read loop cancelled.");
                break;
            },
            msg = reader.recv_text() => msg,
        };

        let text = match msg {
            Ok(Some(text)) => text,
            Ok(None) => continue,
            Err(e) => {
                match e.close_code().and_then(CloseCode::from_u16) {
                    Some(CloseCode::Disconnected) => debug!("Disconnected from voice channel."),
                    Some(CloseCode::CallTerminated) => info!("Voice call was terminated."),
                    _ => warn!("Voice socket failed: {e}"),
                }
                break;
            },
        };

        let event = match VoiceEvent::from_json(&text) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping voice frame: {e}");
                continue;
            },
        };

        match event {
            VoiceEvent::Hello(hello) => {
                if let Some(old) = heartbeat.take() {
                    old.stop();
                }

                let interval = hello.interval_ms();
                debug!("Voice heartbeat interval {interval}ms.");

                heartbeat = Some(Heartbeat::start(
                    sender.clone(),
                    interval,
                    VOICE_HEARTBEAT_MARGIN,
                    VoiceCommand::Heartbeat,
                    cancel.child_token(),
                ));
            },
            VoiceEvent::Ready(ready) => {
                info!(ssrc = ready.ssrc, "Voice ready, UDP target {}:{}.", ready.ip, ready.port);

                if conn.on_ready(generation, &ready) && conn.config.discover_ip {
                    let conn = Arc::clone(&conn);
                    tokio::spawn(async move {
                        if let Err(e) = conn.discover_ip().await {
                            warn!("IP discovery failed: {e}");
                        }
                    });
                }
            },
            VoiceEvent::SessionDescription(desc) => {
                debug!("Voice session uses mode {}.", desc.mode);
                conn.on_session_description(generation, desc.mode);
            },
            VoiceEvent::HeartbeatAck(nonce) => trace!("Voice heartbeat ACK {nonce:?}."),
            VoiceEvent::ClientDisconnect(dc) => info!("User {} left the call.", dc.user_id),
            VoiceEvent::ClientsConnect(cc) => debug!("Users joined the call: {:?}.", cc.user_ids),
            VoiceEvent::Speaking(s) => trace!("Speaking update: {s:?}."),
            VoiceEvent::Resumed => debug!("Voice session resumed."),
            VoiceEvent::Unknown { op, .. } => trace!("Ignoring voice opcode {op}."),
        }

        if !conn.is_current(generation) {
            debug!("Voice socket superseded.");
            break;
        }
    }

    cancel.cancel();
    if let Some(heartbeat) = heartbeat {
        heartbeat.join().await;
    }

    conn.on_link_closed(generation);
}
