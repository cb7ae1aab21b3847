// src/domain/envelope.rs

//! Envelope codec.
//!
//! An [`Envelope`] is the opaque byte form of a payload. Brokers store and
//! deliver envelopes without looking inside them. The encoding is JSON wrapped
//! in standard base64, so arbitrary nested structures (maps, lists, scalars)
//! survive the trip through any backend that can hold a line of ASCII.

use base64::prelude::*;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{QueueError, Result};

/// Encoded, transportable form of a payload.
///
/// # Example
///
/// ```
/// use mom_queue::Envelope;
/// use serde_json::json;
///
/// let value = json!({ "i": 1, "tags": ["a", "b"], "nested": { "ok": true } });
/// let envelope = Envelope::encode(&value).unwrap();
/// let back: serde_json::Value = envelope.decode().unwrap();
/// assert_eq!(back, value);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope(Bytes);

impl Envelope {
    // ---
    /// Serialize `value` into an envelope.
    pub fn encode<T>(value: &T) -> Result<Self>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_vec(value)?;
        Ok(Self(Bytes::from(BASE64_STANDARD.encode(json))))
    }

    /// Deserialize the envelope back into the original payload type.
    pub fn decode<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let json = BASE64_STANDARD
            .decode(self.0.as_ref())
            .map_err(|e| QueueError::Decode(format!("invalid base64 content: {e}")))?;

        serde_json::from_slice(&json)
            .map_err(|e| QueueError::Decode(format!("invalid payload: {e}")))
    }

    /// Wrap raw bytes read back from a broker.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the encoded form in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the envelope carries no bytes at all.
    ///
    /// Encoding never yields an empty envelope; an empty one only shows up
    /// when raw bytes are wrapped directly.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
