//! Content types a loader can produce from raw response bytes.

use crate::error::{ErrorKind, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use exn::ResultExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter, Result as FmtResult};

/// Decodes response bytes into cached content.
///
/// Content must also be serializable so it can be stored in a
/// [`CacheEntry`](crate::CacheEntry) on disk, and cloneable so every
/// coalesced caller receives its own copy.
pub trait Payload: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    fn decode(bytes: Vec<u8>) -> Result<Self>;
}

/// Opaque binary content such as images; stored on disk as base64.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Blob(Vec<u8>);
impl Blob {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}
impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
impl Debug for Blob {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "Blob({} bytes)", self.0.len())
    }
}
impl Serialize for Blob {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}
impl<'de> Deserialize<'de> for Blob {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map(Self).map_err(serde::de::Error::custom)
    }
}
impl Payload for Blob {
    fn decode(bytes: Vec<u8>) -> Result<Self> {
        Ok(Self(bytes))
    }
}

/// A JSON document decoded into `T`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);
impl<T> Payload for Json<T>
where
    T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn decode(bytes: Vec<u8>) -> Result<Self> {
        match serde_json::from_slice(&bytes) {
            Ok(value) => Ok(Self(value)),
            Err(err) => {
                let kind = ErrorKind::Decode(err.to_string());
                Err(err).or_raise(|| kind)
            },
        }
    }
}
