//! Client-visible DTOs for the HTTP API.
//!
//! The HTTP face speaks lowercase JSON and human-readable durations
//! (`"10s"`, `"100ms"`); the envelope's millisecond counters stay
//! internal to the peer wire.

use meshkv_server::{NodeInfo, Response};
use meshkv_store::Value;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Record metadata as shown to HTTP clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDto {
    /// Serial number of the record.
    pub index: u64,

    /// Time to live as a duration string; `"0s"` means permanent.
    pub expire_time: String,

    /// Timestamps in milliseconds since the Unix epoch; zero means
    /// never.
    pub accessed_at: u64,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A cluster member as shown to HTTP clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDto {
    pub id: String,
    pub addr: String,
}

impl From<&NodeInfo> for NodeDto {
    fn from(info: &NodeInfo) -> Self {
        NodeDto {
            id: info.id.clone(),
            addr: info.addr.clone(),
        }
    }
}

/// Body of a successful API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseDto {
    /// The action that was performed.
    pub action: String,

    pub meta: MetaDto,

    /// The resulting data; absent for deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// The node that executed the request.
    pub node: NodeDto,
}

impl ResponseDto {
    /// Build the client view of an envelope. `data` is dropped for
    /// actions that produce none.
    pub fn new(action: &str, resp: &Response, with_data: bool) -> Self {
        ResponseDto {
            action: action.to_string(),
            meta: MetaDto {
                index: resp.record.meta.index,
                expire_time: format_expire_time(resp.record.meta.expire_time),
                accessed_at: resp.record.meta.accessed_at,
                created_at: resp.record.meta.created_at,
                updated_at: resp.record.meta.updated_at,
            },
            data: with_data.then(|| resp.record.data.clone()),
            node: NodeDto::from(&resp.node),
        }
    }
}

/// Body of a failed API response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDto {
    pub text: String,
}

/// Body of a `PUT /v1/keys/{key}` request.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreBody {
    #[serde(default)]
    pub data: Value,

    /// Time to live as a duration string. Absent or `"0s"` stores a
    /// permanent record.
    #[serde(default)]
    pub expire_time: Option<String>,
}

/// Query of a `GET /v1/keys/{key}/index` request.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexQuery {
    pub index: u64,
}

/// Query of a `GET /v1/keys/{key}/item` request.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemQuery {
    pub item: String,
}

/// Format a millisecond TTL for clients. Permanent records show as
/// `"0s"`.
pub fn format_expire_time(expire_time_ms: i64) -> String {
    let ms = expire_time_ms.max(0) as u64;
    humantime::format_duration(Duration::from_millis(ms)).to_string()
}

/// Parse a client TTL string into milliseconds.
pub fn parse_expire_time(s: &str) -> Result<i64, humantime::DurationError> {
    let d = humantime::parse_duration(s)?;
    Ok(d.as_millis() as i64)
}

/// Interpret an `item` query parameter: JSON first, bare string as the
/// fallback, so `item=3` is an integer and `item=a` a string.
pub fn parse_item(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
