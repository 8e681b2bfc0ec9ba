//! Typed requests against a shard.
//!
//! Every request declares an action tag (its wire name), a routing key
//! and a processing step. The enum is adjacently tagged, so the wire
//! envelope `{"Action": …, "Request": …}` selects the variant before
//! the body decodes; no out-of-band registry is needed.

use crate::error::StoreError;
use crate::record::{DictKey, Record, Value};
use crate::shard::Shard;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Action tag for [`Request::Keys`].
pub const ACTION_KEYS: &str = "keys";
/// Action tag for [`Request::Load`].
pub const ACTION_LOAD: &str = "load";
/// Action tag for [`Request::Store`].
pub const ACTION_STORE: &str = "store";
/// Action tag for [`Request::Delete`].
pub const ACTION_DELETE: &str = "delete";
/// Action tag for [`Request::ListIndex`].
pub const ACTION_LIST_INDEX: &str = "index";
/// Action tag for [`Request::DictItem`].
pub const ACTION_DICT_ITEM: &str = "item";

/// A request to the key-value store.
///
/// The `id` is an opaque trace tag assigned by the boundary that
/// created the request; it travels with the request for log
/// correlation and is never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "Action", content = "Request")]
pub enum Request {
    /// Enumerate the keys of the node that serves the request. Not
    /// routed: the routing key is empty.
    #[serde(rename = "keys")]
    Keys {
        #[serde(rename = "ID", default)]
        id: String,
    },

    /// Load the record stored under a key.
    #[serde(rename = "load", rename_all = "PascalCase")]
    Load {
        #[serde(rename = "ID", default)]
        id: String,
        key: String,
    },

    /// Store a value under a key, replacing whatever is there.
    #[serde(rename = "store", rename_all = "PascalCase")]
    Store {
        #[serde(rename = "ID", default)]
        id: String,
        key: String,
        #[serde(default)]
        data: Value,
        /// Expiration interval in milliseconds; ≤ 0 is permanent.
        #[serde(default)]
        expire_time: i64,
    },

    /// Delete the record stored under a key.
    #[serde(rename = "delete", rename_all = "PascalCase")]
    Delete {
        #[serde(rename = "ID", default)]
        id: String,
        key: String,
    },

    /// Fetch one element of a stored list by position.
    #[serde(rename = "index", rename_all = "PascalCase")]
    ListIndex {
        #[serde(rename = "ID", default)]
        id: String,
        key: String,
        index: u64,
    },

    /// Fetch one entry of a stored dictionary by its key.
    #[serde(rename = "item", rename_all = "PascalCase")]
    DictItem {
        #[serde(rename = "ID", default)]
        id: String,
        key: String,
        item: Value,
    },
}

impl Request {
    /// The stable wire tag of this request.
    pub fn action(&self) -> &'static str {
        match self {
            Request::Keys { .. } => ACTION_KEYS,
            Request::Load { .. } => ACTION_LOAD,
            Request::Store { .. } => ACTION_STORE,
            Request::Delete { .. } => ACTION_DELETE,
            Request::ListIndex { .. } => ACTION_LIST_INDEX,
            Request::DictItem { .. } => ACTION_DICT_ITEM,
        }
    }

    /// The routing key. Empty means the request is node-local and is
    /// never forwarded.
    pub fn hash(&self) -> &str {
        match self {
            Request::Keys { .. } => "",
            Request::Load { key, .. }
            | Request::Store { key, .. }
            | Request::Delete { key, .. }
            | Request::ListIndex { key, .. }
            | Request::DictItem { key, .. } => key,
        }
    }

    /// The trace tag of this request.
    pub fn id(&self) -> &str {
        match self {
            Request::Keys { id }
            | Request::Load { id, .. }
            | Request::Store { id, .. }
            | Request::Delete { id, .. }
            | Request::ListIndex { id, .. }
            | Request::DictItem { id, .. } => id,
        }
    }

    /// Execute the request against a shard.
    pub fn process(&self, shard: &Shard) -> Result<Record, StoreError> {
        match self {
            Request::Keys { .. } => {
                // A synthetic record; the data is the key sequence and
                // the metadata is zeroed.
                let keys = shard.keys().into_iter().map(Value::String).collect();
                Ok(Record {
                    data: Value::List(keys),
                    ..Record::default()
                })
            }

            Request::Load { key, .. } => shard
                .load(key)
                .ok_or_else(|| StoreError::Missing(format!("{} does not exist", key))),

            Request::Store {
                key,
                data,
                expire_time,
                ..
            } => Ok(shard.store(key, Record::with_expiry(data.clone(), *expire_time))),

            Request::Delete { key, .. } => {
                shard.delete(key);
                Ok(Record::default())
            }

            Request::ListIndex { key, index, .. } => {
                let mut rec = shard
                    .load(key)
                    .ok_or_else(|| StoreError::Missing(format!("{} does not exist", key)))?;

                let Value::List(items) = &rec.data else {
                    return Err(StoreError::Conflict(format!("{} is not a list", key)));
                };
                let Some(item) = items.get(*index as usize) else {
                    return Err(StoreError::Conflict(format!(
                        "position {} is out of range",
                        index
                    )));
                };

                // Keep the record's metadata, narrow the data to the
                // requested element.
                rec.data = item.clone();
                Ok(rec)
            }

            Request::DictItem { key, item, .. } => {
                let mut rec = shard
                    .load(key)
                    .ok_or_else(|| StoreError::Missing(format!("{} does not exist", key)))?;

                let Value::Dict(entries) = &rec.data else {
                    return Err(StoreError::Conflict(format!("{} is not a dictionary", key)));
                };

                let Some(lookup) = DictKey::from_value(item) else {
                    return Err(StoreError::Conflict(format!("item {} is invalid", item)));
                };
                // Mappings are homogeneously keyed; a lookup of another
                // scalar kind can never succeed and is a type error.
                let well_typed = entries.keys().next().is_none_or(|k| k.same_kind(&lookup));
                if !well_typed {
                    return Err(StoreError::Conflict(format!("item {} is invalid", item)));
                }

                let Some(value) = entries.get(&lookup) else {
                    return Err(StoreError::Internal(format!(
                        "unexpected value at key {}",
                        item
                    )));
                };

                rec.data = value.clone();
                Ok(rec)
            }
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Keys { id } => write!(f, "id: {}, type: keys", id),
            Request::Load { id, key } => write!(f, "id: {}, type: load, key: {}", id, key),
            Request::Store {
                id,
                key,
                data,
                expire_time,
            } => write!(
                f,
                "id: {}, type: store, key: {}, data: {}, expire_time: {}ms",
                id, key, data, expire_time
            ),
            Request::Delete { id, key } => write!(f, "id: {}, type: delete, key: {}", id, key),
            Request::ListIndex { id, key, index } => write!(
                f,
                "id: {}, type: list index, key: {}, index: {}",
                id, key, index
            ),
            Request::DictItem { id, key, item } => write!(
                f,
                "id: {}, type: dict item, key: {}, item: {}",
                id, key, item
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shard::ShardConfig;
    use std::collections::BTreeMap;

    fn store_req(key: &str, data: Value, expire_time: i64) -> Request {
        Request::Store {
            id: String::new(),
            key: key.to_string(),
            data,
            expire_time,
        }
    }

    fn list(items: Vec<i64>) -> Value {
        Value::List(items.into_iter().map(Value::Int).collect())
    }

    #[tokio::test]
    async fn test_keys_request() {
        let shard = Shard::new(ShardConfig::default());
        shard
            .serve(&store_req("a", Value::Int(1), 0))
            .unwrap();
        shard
            .serve(&store_req("b", Value::Int(2), 0))
            .unwrap();

        let rec = shard
            .serve(&Request::Keys { id: String::new() })
            .unwrap();
        let Value::List(keys) = rec.data else {
            panic!("keys must produce a list")
        };
        assert_eq!(keys.len(), 2);
        assert_eq!(rec.meta.index, 0);
    }

    #[tokio::test]
    async fn test_load_missing_key() {
        let shard = Shard::new(ShardConfig::default());
        let err = shard
            .serve(&Request::Load {
                id: String::new(),
                key: "ghost".to_string(),
            })
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Missing("ghost does not exist".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_returns_zero_record() {
        let shard = Shard::new(ShardConfig::default());
        shard.serve(&store_req("a", Value::Int(1), 0)).unwrap();

        let rec = shard
            .serve(&Request::Delete {
                id: String::new(),
                key: "a".to_string(),
            })
            .unwrap();
        assert_eq!(rec, Record::default());
        assert!(shard.load("a").is_none());
    }

    #[tokio::test]
    async fn test_list_index() {
        let shard = Shard::new(ShardConfig::default());
        shard.serve(&store_req("L", list(vec![1, 2, 3]), 0)).unwrap();

        let rec = shard
            .serve(&Request::ListIndex {
                id: String::new(),
                key: "L".to_string(),
                index: 2,
            })
            .unwrap();
        assert_eq!(rec.data, Value::Int(3));
        // The element is wrapped in the record's own metadata.
        assert_eq!(rec.meta.index, 1);

        let err = shard
            .serve(&Request::ListIndex {
                id: String::new(),
                key: "L".to_string(),
                index: 4,
            })
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict("position 4 is out of range".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_index_at_length_is_out_of_range() {
        let shard = Shard::new(ShardConfig::default());
        shard.serve(&store_req("L", list(vec![1, 2, 3]), 0)).unwrap();

        let err = shard
            .serve(&Request::ListIndex {
                id: String::new(),
                key: "L".to_string(),
                index: 3,
            })
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict("position 3 is out of range".to_string())
        );
    }

    #[tokio::test]
    async fn test_list_index_on_scalar() {
        let shard = Shard::new(ShardConfig::default());
        shard.serve(&store_req("L", Value::Int(3), 0)).unwrap();

        let err = shard
            .serve(&Request::ListIndex {
                id: String::new(),
                key: "L".to_string(),
                index: 0,
            })
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("L is not a list".to_string()));
    }

    #[tokio::test]
    async fn test_dict_item() {
        let shard = Shard::new(ShardConfig::default());
        let mut entries = BTreeMap::new();
        entries.insert(DictKey::Int(3), Value::Int(4));
        shard
            .serve(&store_req("M", Value::Dict(entries), 0))
            .unwrap();

        let rec = shard
            .serve(&Request::DictItem {
                id: String::new(),
                key: "M".to_string(),
                item: Value::Int(3),
            })
            .unwrap();
        assert_eq!(rec.data, Value::Int(4));

        // A string lookup against an integer-keyed mapping is a type
        // mismatch, not a miss.
        let err = shard
            .serve(&Request::DictItem {
                id: String::new(),
                key: "M".to_string(),
                item: Value::String("a".to_string()),
            })
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("item a is invalid".to_string()));

        // A well-typed lookup that is absent breaks the caller's
        // expectation of the mapping's contents.
        let err = shard
            .serve(&Request::DictItem {
                id: String::new(),
                key: "M".to_string(),
                item: Value::Int(5),
            })
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Internal("unexpected value at key 5".to_string())
        );
    }

    #[tokio::test]
    async fn test_dict_item_on_scalar() {
        let shard = Shard::new(ShardConfig::default());
        shard.serve(&store_req("M", Value::Int(1), 0)).unwrap();

        let err = shard
            .serve(&Request::DictItem {
                id: String::new(),
                key: "M".to_string(),
                item: Value::Int(3),
            })
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict("M is not a dictionary".to_string())
        );
    }

    #[tokio::test]
    async fn test_dict_item_ill_shaped_lookup() {
        let shard = Shard::new(ShardConfig::default());
        let mut entries = BTreeMap::new();
        entries.insert(DictKey::Int(3), Value::Int(4));
        shard
            .serve(&store_req("M", Value::Dict(entries), 0))
            .unwrap();

        let err = shard
            .serve(&Request::DictItem {
                id: String::new(),
                key: "M".to_string(),
                item: Value::List(vec![]),
            })
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict("item [] is invalid".to_string()));
    }

    #[test]
    fn test_request_routing_key() {
        let req = Request::Keys { id: String::new() };
        assert_eq!(req.hash(), "");
        assert_eq!(req.action(), ACTION_KEYS);

        let req = store_req("K", Value::Int(1), 0);
        assert_eq!(req.hash(), "K");
        assert_eq!(req.action(), ACTION_STORE);
    }

    #[test]
    fn test_request_envelope_json() {
        let req = Request::Store {
            id: "r-1".to_string(),
            key: "K".to_string(),
            data: Value::Int(42),
            expire_time: 0,
        };
        let encoded = serde_json::to_value(&req).unwrap();
        assert_eq!(encoded["Action"], "store");
        assert_eq!(encoded["Request"]["Key"], "K");
        assert_eq!(encoded["Request"]["ID"], "r-1");
        assert_eq!(encoded["Request"]["Data"], serde_json::json!(42));

        let decoded: Request = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_request_envelope_selects_variant_by_action() {
        let raw = r#"{"Action": "load", "Request": {"ID": "x", "Key": "foo"}}"#;
        let req: Request = serde_json::from_str(raw).unwrap();
        assert_eq!(
            req,
            Request::Load {
                id: "x".to_string(),
                key: "foo".to_string(),
            }
        );

        let raw = r#"{"Action": "explode", "Request": {}}"#;
        assert!(serde_json::from_str::<Request>(raw).is_err());
    }

    #[test]
    fn test_request_display() {
        let req = Request::ListIndex {
            id: "r-2".to_string(),
            key: "L".to_string(),
            index: 7,
        };
        assert_eq!(req.to_string(), "id: r-2, type: list index, key: L, index: 7");
    }
}
