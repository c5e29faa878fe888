//! Table metadata map.
//!
//! A flat map of string keys to string, long or double values. Keys with
//! the `__` prefix are managed by the engine: `__version` holds the format
//! version as a string and `__initialized` the creation time in seconds
//! since the Unix epoch.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::column::is_reserved;
use crate::error::{Error, Result};
use crate::version::FormatVersion;

/// Reserved key holding the format version.
pub const VERSION_KEY: &str = "__version";
/// Reserved key holding the initialization timestamp.
pub const INITIALIZED_KEY: &str = "__initialized";

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MetaValue {
    /// String value.
    String(String),
    /// 64-bit integer.
    Long(i64),
    /// Double.
    Double(f64),
}

/// Metadata of one table, ordered by key.
pub type MetadataMap = BTreeMap<String, MetaValue>;

impl MetaValue {
    /// Name of the value's type.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
        }
    }

    /// Converts a JSON value, rejecting anything that is not a string or a
    /// number.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMetadataType`] naming the JSON type.
    pub fn from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        use serde_json::Value;

        let unsupported = |type_name: &str| Error::UnsupportedMetadataType {
            key: key.to_string(),
            type_name: type_name.to_string(),
        };
        match value {
            Value::String(s) => Ok(Self::String(s.clone())),
            Value::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Ok(Self::Long(v))
                } else if let Some(v) = n.as_f64() {
                    Ok(Self::Double(v))
                } else {
                    Err(unsupported("number"))
                }
            }
            Value::Null => Err(unsupported("null")),
            Value::Bool(_) => Err(unsupported("bool")),
            Value::Array(_) => Err(unsupported("array")),
            Value::Object(_) => Err(unsupported("object")),
        }
    }

    /// Converts to a JSON value.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::from(s.as_str()),
            Self::Long(v) => serde_json::Value::from(*v),
            Self::Double(v) => serde_json::Value::from(*v),
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        Self::Long(i64::from(v))
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

/// Builds a metadata map from a JSON object.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMetadataType`] if `value` is not an object
/// or one of its values is not a string or number.
pub fn metadata_from_json(value: &serde_json::Value) -> Result<MetadataMap> {
    let object = value
        .as_object()
        .ok_or_else(|| Error::UnsupportedMetadataType {
            key: String::new(),
            type_name: "non-object metadata document".to_string(),
        })?;
    object
        .iter()
        .map(|(k, v)| Ok((k.clone(), MetaValue::from_json(k, v)?)))
        .collect()
}

/// Converts a metadata map to a JSON object.
#[must_use]
pub fn metadata_to_json(map: &MetadataMap) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

/// Computes the map that results from a metadata write, leaving `current`
/// untouched.
///
/// Without `init`, the file must support typed metadata and no key may be
/// reserved. `replace` drops every non-reserved key first; with `init` it
/// drops the reserved keys too, which are then rewritten.
pub(crate) fn apply(
    current: &MetadataMap,
    updates: MetadataMap,
    replace: bool,
    init: bool,
    version: FormatVersion,
) -> Result<MetadataMap> {
    if !init {
        if !version.supports_typed_metadata() {
            return Err(Error::VersionUnsupported {
                operation: "Tables metadata",
                required: FormatVersion::V2.as_u32(),
                actual: version.as_u32(),
            });
        }
        if let Some(key) = updates.keys().find(|k| is_reserved(k)) {
            return Err(Error::ReservedMetadataKey(key.clone()));
        }
    }

    let mut next = current.clone();
    if replace {
        if init {
            next.clear();
        } else {
            next.retain(|k, _| is_reserved(k));
        }
    }
    if init {
        next.insert(
            VERSION_KEY.to_string(),
            MetaValue::String(version.as_u32().to_string()),
        );
        next.insert(INITIALIZED_KEY.to_string(), MetaValue::Double(now_seconds()));
    }
    next.extend(updates);
    Ok(next)
}

fn now_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}
