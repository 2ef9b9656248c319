//! Requests and their fingerprints.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use marquee_storage::MAX_KEY_LENGTH;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::fmt::{Display, Formatter, Result as FmtResult};
use url::Url;

pub use reqwest::Method;

const KEY_EXTENSION: &str = ".json";
/// Everything except ASCII alphanumerics, `-`, `.` and `_` is escaped, which
/// also replaces path separators.
const KEY_ESCAPES: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

/// A network request.
///
/// The URL is sent exactly as given, minus its fragment. Equivalent requests
/// are recognised through their [`Fingerprint`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: Method,
    url: Url,
}
impl Request {
    pub fn new(method: Method, mut url: Url) -> Self {
        url.set_fragment(None);
        Self { method, url }
    }

    /// Parse a URL into a `GET` request.
    pub fn get(url: &str) -> Result<Self> {
        let parsed = Url::parse(url).or_raise(|| ErrorKind::InvalidRequest(url.to_string()))?;
        Ok(Self::new(Method::GET, parsed))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Method plus normalized URL: query pairs sorted, empty pairs and an
    /// empty query removed. Pairs are compared in their raw encoded form, so
    /// `?flag` and `?flag=` stay distinct.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut url = self.url.clone();
        let query = self.url.query().unwrap_or_default();
        let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            pairs.sort_unstable();
            url.set_query(Some(&pairs.join("&")));
        }
        Fingerprint(format!("{} {url}", self.method))
    }
}

/// Stable identity of a request: method plus normalized URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);
impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Storage-safe file name for this fingerprint.
    ///
    /// The fingerprint is percent-encoded; names that would exceed the
    /// storage key limit keep a readable prefix followed by a BLAKE3 hash of
    /// the full fingerprint.
    pub fn storage_key(&self) -> String {
        let encoded = utf8_percent_encode(&self.0, KEY_ESCAPES).to_string();
        if encoded.len() + KEY_EXTENSION.len() <= MAX_KEY_LENGTH {
            return format!("{encoded}{KEY_EXTENSION}");
        }
        let hash = blake3::hash(self.0.as_bytes()).to_hex();
        // The encoded form is pure ASCII, so any byte index is a char boundary.
        let prefix = &encoded[..MAX_KEY_LENGTH - hash.len() - KEY_EXTENSION.len() - 1];
        format!("{prefix}_{hash}{KEY_EXTENSION}")
    }
}
impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}
