//! Guild-keyed store of voice connections.

use crate::{
    config::Config,
    id::{GuildId, UserId},
    shard::VoiceUpdate,
    voice::VoiceConnection,
};
use dashmap::DashMap;
use derivative::Derivative;
use std::sync::Arc;
use tracing::debug;

/// Holds at most one [`VoiceConnection`] per guild.
///
/// Entries are created on first lookup and only disappear through [`remove`].
/// Lookups never hold a lock across an `await`.
///
/// [`remove`]: VoiceConnectionRegistry::remove
#[derive(Derivative)]
#[derivative(Debug)]
pub struct VoiceConnectionRegistry {
    connections: DashMap<GuildId, Arc<VoiceConnection>>,
    user_id: UserId,
    config: Arc<Config>,
    #[derivative(Debug = "ignore")]
    updater: Arc<dyn VoiceUpdate + Send + Sync>,
}

impl VoiceConnectionRegistry {
    /// Creates an empty registry.
    ///
    /// New connections are owned by `user_id`, and announce leaves through `updater`.
    pub fn new(
        user_id: UserId,
        config: impl Into<Arc<Config>>,
        updater: Arc<dyn VoiceUpdate + Send + Sync>,
    ) -> Self {
        Self {
            connections: DashMap::new(),
            user_id,
            config: config.into(),
            updater,
        }
    }

    /// Retrieves the connection for a guild, if one exists.
    #[must_use]
    pub fn get<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<VoiceConnection>> {
        self.connections
            .get(&guild_id.into())
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Retrieves the connection for a guild, creating an empty one if needed.
    ///
    /// Concurrent callers for the same guild always receive the same connection.
    #[allow(clippy::must_use_candidate)]
    pub fn get_or_create<G: Into<GuildId>>(&self, guild_id: G) -> Arc<VoiceConnection> {
        let guild_id = guild_id.into();

        self.get(guild_id).unwrap_or_else(|| {
            let entry = self.connections.entry(guild_id).or_insert_with(|| {
                debug!("Creating voice connection for guild {guild_id}.");
                Arc::new(VoiceConnection::new(
                    guild_id,
                    self.user_id,
                    Arc::clone(&self.config),
                    Arc::clone(&self.updater),
                ))
            });

            Arc::clone(entry.value())
        })
    }

    /// Removes a guild's connection, returning it.
    ///
    /// This does not close the connection's voice socket.
    pub fn remove<G: Into<GuildId>>(&self, guild_id: G) -> Option<Arc<VoiceConnection>> {
        self.connections
            .remove(&guild_id.into())
            .map(|(_, conn)| conn)
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Guilds with a registered connection.
    #[must_use]
    pub fn guilds(&self) -> Vec<GuildId> {
        self.connections.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn connections(&self) -> Vec<Arc<VoiceConnection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}
