#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Voicegate is an async client for Discord's gateway and voice gateway, written in Rust.
//!
//! The library offers:
//!  * A control gateway session ([`GatewaySession`]) which identifies, keeps itself alive
//!  with heartbeats, and hands dispatches back to the caller one at a time.
//!  * Per-guild voice connections ([`VoiceConnection`]), brought up automatically from
//!  the voice state and voice server facts the control gateway delivers, and stored in
//!  a [`VoiceConnectionRegistry`] owned by the session.
//!  * UDP IP discovery against the voice server, yielding a [`VoiceTransport`] for an
//!  external audio path.
//!
//! Audio encoding, encryption and transmission are out of scope.
//!
//! ## Intents
//! Voice connections require the `GUILD_VOICE_STATES` intent.
//!
//! ## Example
//! ```no_run
//! use voicegate::{model::{Dispatch, Intents}, GatewaySession};
//!
//! # async fn run() -> voicegate::error::Result<()> {
//! let token = std::env::var("DISCORD_TOKEN").unwrap_or_default();
//! let intents = Intents::GUILDS | Intents::GUILD_VOICE_STATES | Intents::GUILD_MESSAGES;
//! let mut session = GatewaySession::connect(&token, intents).await?;
//!
//! loop {
//!     match session.next_event().await {
//!         Ok(Some(Dispatch::MessageCreate(msg))) => println!("{}", msg.content),
//!         Ok(_) => {},
//!         Err(e) if e.is_fatal() => break Err(e),
//!         Err(e) => eprintln!("{e}"),
//!     }
//! }
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::too_many_lines,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    // TODO: would require significant rewriting of all existing docs
    clippy::missing_errors_doc,
)]

mod config;
pub mod constants;
pub mod discovery;
pub mod error;
mod heartbeat;
pub mod id;
pub mod model;
mod registry;
pub mod rest;
mod session;
mod shard;
pub mod voice;
pub mod ws;

pub use crate::{
    config::Config,
    discovery::DiscoveredAddress,
    error::{Error, Result},
    heartbeat::effective_interval,
    registry::VoiceConnectionRegistry,
    rest::{HttpRest, Rest},
    session::GatewaySession,
    shard::{Shard, VoiceUpdate},
    voice::{Stage, VoiceConnection, VoiceTransport},
};
