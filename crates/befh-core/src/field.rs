use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Textual form of timestamp fields, always UTC with microseconds.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Field name to field mapping for one table row.
pub type Fields = BTreeMap<String, Field>;

/// Raw value carried by a [`Field`].
///
/// Plain JSON scalars map onto the matching variant. A timestamp must be
/// marked explicitly as `{"timestamp": "<RFC 3339>"}`; bare strings are
/// always text, whatever they look like.
///
/// Integers above `i64::MAX` land in `UInt`. A non-finite `Float` has no JSON
/// form and goes out as `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    #[serde(with = "tagged_timestamp")]
    Timestamp(DateTime<Utc>),
    Text(String),
}

mod tagged_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        timestamp: DateTime<Utc>,
    }

    pub fn serialize<S: Serializer>(
        value: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        Tagged { timestamp: *value }.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        Tagged::deserialize(deserializer).map(|tagged| tagged.timestamp)
    }
}

impl FieldValue {
    pub fn is_timestamp(&self) -> bool {
        matches!(self, FieldValue::Timestamp(_))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

/// One column value of a detected change, as handed to handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default)]
    pub value: FieldValue,
    /// Set for database-generated columns, which never leave the process.
    #[serde(default)]
    pub is_auto_increment: bool,
}

impl Field {
    pub fn new(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            is_auto_increment: false,
        }
    }

    pub fn auto_increment(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            is_auto_increment: true,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Timestamp(v) => write!(f, "{}", v.format(TIMESTAMP_FORMAT)),
            FieldValue::Text(v) => f.write_str(v),
        }
    }
}
