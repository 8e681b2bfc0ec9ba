//! Record and value model.
//!
//! A [`Record`] is a typed value plus bookkeeping metadata: a version
//! counter, an expiration interval and the create/update/access
//! timestamps. Values are a closed tagged set ([`Value`]) so that list
//! and dictionary operations can pattern-match instead of reflecting.

use serde::de::{self, Deserializer, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A value stored under a key: a scalar, an ordered sequence or a
/// mapping. The JSON representation is untagged, so `42`, `"s"`,
/// `[1, 2]` and `{"a": 1}` all decode to the natural variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Dict(BTreeMap<DictKey, Value>),
}

impl Value {
    /// Whether the value is an ordered sequence.
    pub fn is_list(&self) -> bool {
        matches!(self, Value::List(_))
    }

    /// Whether the value is a mapping.
    pub fn is_dict(&self) -> bool {
        matches!(self, Value::Dict(_))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<DictKey, Value>> for Value {
    fn from(v: BTreeMap<DictKey, Value>) -> Self {
        Value::Dict(v)
    }
}

impl fmt::Display for Value {
    /// Human-readable form for logs and error texts. Strings print
    /// bare, so `item a is invalid` reads naturally.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::String(s) => write!(f, "{}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Dict(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// DictKey
// ---------------------------------------------------------------------------

/// The key of a mapping. Mappings are keyed by a scalar: a boolean, an
/// integer or a string. Lookups with any other shape are type errors.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DictKey {
    Bool(bool),
    Int(i64),
    String(String),
}

impl DictKey {
    /// Canonicalize a lookup value to a mapping key. `None` for shapes
    /// that can never key a mapping.
    pub fn from_value(v: &Value) -> Option<DictKey> {
        match v {
            Value::Bool(b) => Some(DictKey::Bool(*b)),
            Value::Int(n) => Some(DictKey::Int(*n)),
            Value::String(s) => Some(DictKey::String(s.clone())),
            _ => None,
        }
    }

    /// Whether two keys are the same scalar variant. Mappings are
    /// homogeneously keyed, so a variant mismatch is a type error
    /// rather than a miss.
    pub fn same_kind(&self, other: &DictKey) -> bool {
        matches!(
            (self, other),
            (DictKey::Bool(_), DictKey::Bool(_))
                | (DictKey::Int(_), DictKey::Int(_))
                | (DictKey::String(_), DictKey::String(_))
        )
    }
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictKey::Bool(b) => write!(f, "{}", b),
            DictKey::Int(n) => write!(f, "{}", n),
            DictKey::String(s) => write!(f, "{}", s),
        }
    }
}

// JSON object keys are strings. Keys serialize through their display
// form and deserialize with inference, so `{"3": 4}` round-trips to an
// integer-keyed mapping. A string key that itself looks like an
// integer or boolean does not survive the trip; JSON cannot express
// the difference.
impl Serialize for DictKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DictKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct KeyVisitor;

        impl Visitor<'_> for KeyVisitor {
            type Value = DictKey;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping key string")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<DictKey, E> {
                if let Ok(b) = s.parse::<bool>() {
                    return Ok(DictKey::Bool(b));
                }
                if let Ok(n) = s.parse::<i64>() {
                    return Ok(DictKey::Int(n));
                }
                Ok(DictKey::String(s.to_string()))
            }
        }

        deserializer.deserialize_str(KeyVisitor)
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// Record bookkeeping: version counter, expiration interval and
/// timestamps. Timestamps are milliseconds since the Unix epoch; zero
/// means "never" (`accessed_at` before the first load).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Meta {
    /// Serial number of the record, incremented on every store.
    pub index: u64,

    /// Time to live in milliseconds. Values less than or equal to
    /// zero mean the record is never evicted.
    pub expire_time: i64,

    /// When the record was last loaded.
    pub accessed_at: u64,

    /// When the record was first stored. Never changes across updates.
    pub created_at: u64,

    /// When the record was last stored.
    pub updated_at: u64,
}

/// A versioned value stored under a key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Record {
    pub meta: Meta,
    pub data: Value,
}

impl Record {
    /// A record carrying data and an expiration interval, as handed to
    /// a store operation. The remaining metadata is assigned by the
    /// hash store.
    pub fn with_expiry(data: Value, expire_time: i64) -> Self {
        Record {
            meta: Meta {
                expire_time,
                ..Meta::default()
            },
            data,
        }
    }

    /// Whether the record is never evicted.
    pub fn is_permanent(&self) -> bool {
        self.meta.expire_time <= 0
    }

    /// The moment the record expires. Meaningless for permanent
    /// records; callers check [`Record::is_permanent`] first.
    pub fn expires_at(&self) -> u64 {
        self.meta
            .created_at
            .saturating_add_signed(self.meta.expire_time)
    }

    /// Whether the record has outlived its expiration interval.
    pub fn is_expired(&self) -> bool {
        if self.is_permanent() {
            return false;
        }
        let lived = now_millis().saturating_sub(self.meta.created_at);
        lived as i64 > self.meta.expire_time
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
