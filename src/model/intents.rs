use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Gateway intents, selecting which event groups the server will dispatch.
    ///
    /// Voice support requires [`GUILD_VOICE_STATES`].
    ///
    /// [`GUILD_VOICE_STATES`]: Intents::GUILD_VOICE_STATES
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
    pub struct Intents: u64 {
        /// Guild creation, updates, roles and channels.
        const GUILDS = 1 << 0;
        /// Member joins, updates and removals. Privileged.
        const GUILD_MEMBERS = 1 << 1;
        /// Bans and audit log entries.
        const GUILD_MODERATION = 1 << 2;
        /// Emoji, sticker and soundboard updates.
        const GUILD_EXPRESSIONS = 1 << 3;
        /// Integration updates.
        const GUILD_INTEGRATIONS = 1 << 4;
        /// Webhook updates.
        const GUILD_WEBHOOKS = 1 << 5;
        /// Invite creation and deletion.
        const GUILD_INVITES = 1 << 6;
        /// Voice state updates. Needed to open voice connections.
        const GUILD_VOICE_STATES = 1 << 7;
        /// Presence updates. Privileged.
        const GUILD_PRESENCES = 1 << 8;
        /// Messages in guild channels.
        const GUILD_MESSAGES = 1 << 9;
        /// Reactions in guild channels.
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        /// Typing notifications in guild channels.
        const GUILD_MESSAGE_TYPING = 1 << 11;
        /// Direct messages.
        const DIRECT_MESSAGES = 1 << 12;
        /// Reactions in direct messages.
        const DIRECT_MESSAGE_REACTIONS = 1 << 13;
        /// Typing notifications in direct messages.
        const DIRECT_MESSAGE_TYPING = 1 << 14;
        /// Message content in dispatched messages. Privileged.
        const MESSAGE_CONTENT = 1 << 15;
        /// Scheduled event updates.
        const GUILD_SCHEDULED_EVENTS = 1 << 16;
        /// Auto-moderation rule updates.
        const AUTO_MODERATION_CONFIGURATION = 1 << 20;
        /// Auto-moderation actions.
        const AUTO_MODERATION_EXECUTION = 1 << 21;
        /// Poll votes in guild channels.
        const GUILD_MESSAGE_POLLS = 1 << 24;
        /// Poll votes in direct messages.
        const DIRECT_MESSAGE_POLLS = 1 << 25;
    }
}

impl Serialize for Intents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for Intents {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u64::deserialize(deserializer).map(Self::from_bits_truncate)
    }
}
