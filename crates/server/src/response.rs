//! The response envelope shared by local execution, the peer wire and
//! the HTTP boundary.

use crate::node::NodeInfo;
use meshkv_store::{Record, StoreError};
use serde::{Deserialize, Serialize};

/// HTTP-status-space codes used by the envelope.
pub const STATUS_OK: u16 = 200;
pub const STATUS_MISSING: u16 = 404;
pub const STATUS_CONFLICT: u16 = 409;
pub const STATUS_INTERNAL: u16 = 500;

/// Translate a processing error into a response status code.
pub fn status_of(err: Option<&StoreError>) -> u16 {
    match err {
        None => STATUS_OK,
        Some(StoreError::Missing(_)) => STATUS_MISSING,
        Some(StoreError::Conflict(_)) => STATUS_CONFLICT,
        Some(StoreError::Internal(_)) => STATUS_INTERNAL,
    }
}

/// The envelope a request resolves to, wherever it executed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Response {
    /// Status code in HTTP-status space.
    pub status: u16,

    /// Error text; empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,

    /// The node that actually executed the request.
    #[serde(default)]
    pub node: NodeInfo,

    /// The resulting record; zeroed for deletes and failures.
    #[serde(default)]
    pub record: Record,
}

impl Response {
    /// A successful execution on `node`.
    pub fn ok(record: Record, node: NodeInfo) -> Self {
        Response {
            status: STATUS_OK,
            error: String::new(),
            node,
            record,
        }
    }

    /// A failed store operation.
    pub fn failure(err: &StoreError) -> Self {
        Response {
            status: status_of(Some(err)),
            error: err.to_string(),
            ..Response::default()
        }
    }

    /// A failure outside the store taxonomy: an unreachable peer, a
    /// broken channel, an undecodable frame. Reported as internal.
    pub fn transport_failure(err: impl std::fmt::Display) -> Self {
        Response {
            status: STATUS_INTERNAL,
            error: err.to_string(),
            ..Response::default()
        }
    }

    /// Whether the envelope reports an error.
    pub fn is_err(&self) -> bool {
        !self.error.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use meshkv_store::{Record, Value};

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(None), 200);
        assert_eq!(
            status_of(Some(&StoreError::Missing("m".into()))),
            404
        );
        assert_eq!(
            status_of(Some(&StoreError::Conflict("c".into()))),
            409
        );
        assert_eq!(
            status_of(Some(&StoreError::Internal("i".into()))),
            500
        );
    }

    #[test]
    fn test_envelope_round_trip() {
        let resp = Response::ok(
            Record::with_expiry(Value::Int(42), 1000),
            NodeInfo::new("node-1", "127.0.0.1:2373"),
        );

        let encoded = serde_json::to_string(&resp).unwrap();
        let decoded: Response = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, resp);
        assert!(!decoded.is_err());
    }

    #[test]
    fn test_error_field_omitted_on_success() {
        let resp = Response::ok(Record::default(), NodeInfo::default());
        let encoded = serde_json::to_value(&resp).unwrap();
        assert!(encoded.get("Error").is_none());

        let resp = Response::failure(&StoreError::Missing("k does not exist".into()));
        let encoded = serde_json::to_value(&resp).unwrap();
        assert_eq!(encoded["Error"], "k does not exist");
        assert_eq!(encoded["Status"], 404);
    }
}
