//! Handles for sending commands over a control gateway connection.

use crate::{
    error::Result,
    id::{ChannelId, GuildId},
    model::{gateway::UpdateVoiceState, GatewayCommand},
    ws::WsSender,
};
use async_trait::async_trait;
use tracing::trace;

/// Trait for a handle able to send voice state updates to Discord.
///
/// Voice connections hold one of these so that teardown can announce a leave on the
/// control plane, without needing access to the session which owns it.
#[async_trait]
pub trait VoiceUpdate {
    /// Send a voice update message to the control gateway.
    ///
    /// A `channel_id` of `None` leaves the guild's voice channel.
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> Result<()>;
}

/// A reference to the control gateway's WebSocket writer.
///
/// Clones share one writer, so commands from any clone are never interleaved
/// with each other or with heartbeats.
#[derive(Clone, Debug)]
pub struct Shard {
    sender: WsSender,
}

impl Shard {
    pub(crate) fn new(sender: WsSender) -> Self {
        Self { sender }
    }

    /// Writes a single command.
    pub async fn send(&self, command: &GatewayCommand) -> Result<()> {
        trace!("Sending {:?}.", command.op());
        self.sender.send_json(command).await?;

        Ok(())
    }

    pub(crate) fn sender(&self) -> &WsSender {
        &self.sender
    }

    pub(crate) async fn close(&self) -> Result<()> {
        self.sender.close().await?;

        Ok(())
    }
}

#[async_trait]
impl VoiceUpdate for Shard {
    async fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_deaf: bool,
        self_mute: bool,
    ) -> Result<()> {
        self.send(&GatewayCommand::from(UpdateVoiceState {
            guild_id,
            channel_id,
            self_mute,
            self_deaf,
        }))
        .await
    }
}
