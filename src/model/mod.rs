//! Mappings of the frames exchanged on the control and voice gateways.
//!
//! Every frame shares the envelope `{op, d, s?, t?}`. Inbound frames are decoded in
//! two steps: first into a raw envelope, then `d` is decoded eagerly into the payload
//! type selected by the opcode (and, for control dispatches, the event name).
//! Unknown opcodes and event names decode into opaque variants which keep the raw
//! JSON value, so they never fail.

mod close_code;
pub mod gateway;
mod intents;
mod speaking_state;
pub mod voice;

pub use self::{
    close_code::CloseCode,
    gateway::{Dispatch, GatewayCommand, GatewayEvent, GatewayFrame},
    intents::Intents,
    speaking_state::SpeakingState,
    voice::{VoiceCommand, VoiceEvent},
};

use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};
use serde_json::{Error as JsonError, Value};
use std::fmt;

/// An inbound frame before its payload has been interpreted.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct RawEnvelope {
    pub op: u16,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

pub(crate) fn serialize_envelope<S, T>(serializer: S, op: u16, d: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut state = serializer.serialize_struct("Envelope", 2)?;
    state.serialize_field("op", &op)?;
    state.serialize_field("d", d)?;
    state.end()
}

/// A frame whose payload did not match the shape expected for its opcode or event.
#[derive(Debug)]
pub struct DecodeError {
    /// The event name or opcode whose payload failed to decode.
    ///
    /// `None` if the envelope itself was malformed.
    pub kind: Option<String>,
    /// The underlying parse failure.
    pub source: JsonError,
}

impl DecodeError {
    pub(crate) fn envelope(source: JsonError) -> Self {
        Self { kind: None, source }
    }

    pub(crate) fn payload(kind: impl Into<String>, source: JsonError) -> Self {
        Self {
            kind: Some(kind.into()),
            source,
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Some(kind) => write!(f, "malformed {kind} payload: {}", self.source),
            None => write!(f, "malformed envelope: {}", self.source),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

fn payload<T: serde::de::DeserializeOwned>(kind: &str, d: Value) -> Result<T, DecodeError> {
    serde_json::from_value(d).map_err(|e| DecodeError::payload(kind, e))
}
