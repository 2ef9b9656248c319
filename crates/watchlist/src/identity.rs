//! Stable identities and their storeable encoding.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// An identity that survives a round trip through an opaque byte string.
///
/// `decode(&encode(x)) == Some(x)` for every value; bytes that do not decode
/// to a known identity yield `None`.
pub trait Identity: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    fn encode(&self) -> Vec<u8>;
    fn decode(bytes: &[u8]) -> Option<Self>;
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub u64);

/// What a watchlist item refers to.
///
/// Encoded as compact JSON of the externally tagged enum, e.g.
/// `{"movie":954}`.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchlistId {
    #[display("movie #{_0}")]
    Movie(MovieId),
}

impl Identity for WatchlistId {
    fn encode(&self) -> Vec<u8> {
        // Written by hand so encoding cannot fail; must match the serde form.
        match self {
            Self::Movie(MovieId(id)) => format!(r#"{{"movie":{id}}}"#).into_bytes(),
        }
    }

    fn decode(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice(bytes).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(954)]
    #[case(u64::MAX)]
    fn test_round_trip(#[case] id: u64) {
        let id = WatchlistId::Movie(MovieId(id));
        assert_eq!(WatchlistId::decode(&id.encode()), Some(id));
    }

    #[test]
    fn test_encoding_matches_serde() {
        let id = WatchlistId::Movie(MovieId(954));
        assert_eq!(id.encode(), br#"{"movie":954}"#);
        assert_eq!(id.encode(), serde_json::to_vec(&id).unwrap());
    }

    #[rstest]
    #[case(b"".as_slice())]
    #[case(b"\xff\xfe".as_slice())]
    #[case(br#"{"series":954}"#.as_slice())]
    #[case(br#"{"movie":-1}"#.as_slice())]
    #[case(br#"954"#.as_slice())]
    fn test_corrupt_bytes_decode_to_none(#[case] bytes: &[u8]) {
        assert_eq!(WatchlistId::decode(bytes), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(WatchlistId::Movie(MovieId(954)).to_string(), "movie #954");
    }
}
