//! Per-query metadata attached to every service request
//!
//! Each entry point call gets a fresh [`QueryMetadata`] with a random
//! 8-character query id, so all requests of one logical query can be
//! correlated on the service side.

use rand::distributions::{Distribution, Uniform};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

const API_FUNCTION_MAX: usize = 32;
const CLIENT_VERSION_MAX: usize = 24;
const QUERY_ID_LEN: usize = 8;
const USER_DATA_MAX: usize = 82;
const USER_DATA_TOO_LONG: &str = "TRUENO_FETCH_QUERY_METADATA too long";
const QUERY_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Client version string sent with every request.
#[must_use]
pub fn client_version() -> String {
    format!("tf/{}", env!("CARGO_PKG_VERSION"))
}

/// Random query id: 8 lowercase alphanumerics.
#[must_use]
pub fn new_query_id() -> String {
    let mut rng = rand::thread_rng();
    let index = Uniform::from(0..QUERY_ID_ALPHABET.len());
    (0..QUERY_ID_LEN)
        .map(|_| char::from(QUERY_ID_ALPHABET[index.sample(&mut rng)]))
        .collect()
}

/// Normalize caller-provided user data.
///
/// JSON is kept as parsed, anything else as a plain string. Values whose
/// JSON encoding is longer than 82 characters are replaced by a marker.
fn process_user_data(raw: Option<&str>) -> Option<Value> {
    let raw = raw.filter(|s| !s.is_empty())?;
    let value = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| {
        debug!("query metadata user data is not valid JSON, sending it as a string");
        Value::String(raw.to_string())
    });

    let encoded_len = serde_json::to_string(&value).map_or(usize::MAX, |s| s.chars().count());
    if encoded_len > USER_DATA_MAX {
        debug!(len = encoded_len, "query metadata user data too long, replacing it");
        return Some(Value::String(USER_DATA_TOO_LONG.to_string()));
    }
    Some(value)
}

/// Metadata describing one logical query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMetadata {
    #[serde(rename = "fn")]
    api_function: String,
    #[serde(rename = "v")]
    client_version: String,
    #[serde(rename = "qid")]
    query_id: String,
    #[serde(rename = "ud")]
    user_data: Option<Value>,
}

impl QueryMetadata {
    /// Build metadata, truncating each field to its maximum length.
    #[must_use]
    pub fn new(
        api_function: &str,
        client_version: &str,
        query_id: &str,
        user_data: Option<&str>,
    ) -> Self {
        Self {
            api_function: truncate(api_function, API_FUNCTION_MAX),
            client_version: truncate(client_version, CLIENT_VERSION_MAX),
            query_id: truncate(query_id, QUERY_ID_LEN),
            user_data: process_user_data(user_data),
        }
    }

    /// Fresh metadata for an entry point call.
    #[must_use]
    pub fn for_call(api_function: &str, user_data: Option<&str>) -> Self {
        Self::new(api_function, &client_version(), &new_query_id(), user_data)
    }

    /// Entry point name.
    #[must_use]
    pub fn api_function(&self) -> &str {
        &self.api_function
    }

    /// Query id shared by every request of the query.
    #[must_use]
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Processed user data.
    #[must_use]
    pub const fn user_data(&self) -> Option<&Value> {
        self.user_data.as_ref()
    }

    /// Compact JSON encoding (`fn`, `v`, `qid`, `ud`).
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Context passed with every service request of one query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequestContext {
    metadata: Option<QueryMetadata>,
}

impl RequestContext {
    /// Context carrying query metadata.
    #[must_use]
    pub const fn with_metadata(metadata: QueryMetadata) -> Self {
        Self {
            metadata: Some(metadata),
        }
    }

    /// Context without metadata (metadata disabled by configuration).
    #[must_use]
    pub const fn anonymous() -> Self {
        Self { metadata: None }
    }

    /// Query metadata, if attached.
    #[must_use]
    pub const fn metadata(&self) -> Option<&QueryMetadata> {
        self.metadata.as_ref()
    }

    /// Header value for the transport, if metadata is attached.
    #[must_use]
    pub fn header_value(&self) -> Option<String> {
        self.metadata.as_ref().map(QueryMetadata::to_json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_truncated() {
        let m = QueryMetadata::new(&"f".repeat(40), &"v".repeat(30), "abcdefghijk", None);
        assert_eq!(m.api_function().len(), 32);
        assert_eq!(m.client_version.len(), 24);
        assert_eq!(m.query_id(), "abcdefgh");
        assert!(m.user_data().is_none());
    }

    #[test]
    fn test_query_id_alphabet() {
        let id = new_query_id();
        assert_eq!(id.len(), 8);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }

    #[test]
    fn test_user_data_json_string_and_too_long() {
        let json = QueryMetadata::new("f", "v", "q", Some(r#"{"team":"nlp"}"#));
        assert_eq!(json.user_data(), Some(&serde_json::json!({"team": "nlp"})));

        let plain = QueryMetadata::new("f", "v", "q", Some("not json"));
        assert_eq!(plain.user_data(), Some(&Value::String("not json".to_string())));

        let long = QueryMetadata::new("f", "v", "q", Some(&"x".repeat(100)));
        assert_eq!(
            long.user_data(),
            Some(&Value::String(USER_DATA_TOO_LONG.to_string()))
        );
    }

    #[test]
    fn test_compact_json_keys() {
        let m = QueryMetadata::new("fetch_table", "tf/0.1.0", "abcd1234", None);
        assert_eq!(
            m.to_json(),
            r#"{"fn":"fetch_table","v":"tf/0.1.0","qid":"abcd1234","ud":null}"#
        );
        let ctx = RequestContext::with_metadata(m);
        assert!(ctx.header_value().unwrap().contains("abcd1234"));
        assert!(RequestContext::anonymous().header_value().is_none());
    }
}
