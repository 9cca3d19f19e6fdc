//! Query string to typed value transformation.
//!
//! Raw query parameters arrive as a `HashMap<String, String>`. A target type implementing
//! [`QueryParams`] declares, per field, the wire key and one of the transform kinds of
//! [`TransformKind`]. [`transform`] coerces every declared value, assembles a BSON document
//! and decodes it into the target type.
//!
//! Coercion is forgiving on purpose: unparsable numbers become zero, unparsable booleans
//! become "no value" and malformed arrays become empty, so optional filters never reject a
//! whole request. Only a declaration naming an unknown kind or a final decode failure are
//! reported as errors.
//!
//! # Example
//!
//! ```ignore
//! use docbase::transform::{transform, QueryParams};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize, QueryParams)]
//! #[serde(rename_all = "camelCase")]
//! pub struct ProductQuery {
//!     #[transform("string")]
//!     pub search: String,
//!     #[transform("array")]
//!     pub price_range: Vec<i64>,
//!     #[transform("bool")]
//!     pub in_stock: Option<bool>,
//! }
//!
//! let query: ProductQuery = transform(&raw_params)?;
//! ```

use std::{collections::HashMap, fmt, str::FromStr};

use bson::{Bson, Document, de::deserialize_from_document, oid::ObjectId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// Errors reported by [`transform`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A field declares a transform kind outside the supported set.
    #[error("invalid query transform `{kind}` declared for `{key}`")]
    UnknownKind { key: String, kind: String },
    /// The assembled values do not fit the target type.
    #[error("failed to decode query: {0}")]
    Decode(String),
}

/// The closed set of supported transform kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    String,
    Int,
    Float32,
    Float64,
    Bool,
    Array,
    ObjectId,
    ObjectIdArray,
}

impl TransformKind {
    pub const ALL: [TransformKind; 8] = [
        TransformKind::String,
        TransformKind::Int,
        TransformKind::Float32,
        TransformKind::Float64,
        TransformKind::Bool,
        TransformKind::Array,
        TransformKind::ObjectId,
        TransformKind::ObjectIdArray,
    ];

    /// The name used in declarations.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformKind::String => "string",
            TransformKind::Int => "int",
            TransformKind::Float32 => "float32",
            TransformKind::Float64 => "float64",
            TransformKind::Bool => "bool",
            TransformKind::Array => "array",
            TransformKind::ObjectId => "objectId",
            TransformKind::ObjectIdArray => "objectIdArray",
        }
    }

    /// Coerces a raw value. Never fails; see the module docs for the fallbacks.
    pub fn coerce(&self, raw: &str) -> Bson {
        match self {
            TransformKind::String => Bson::String(raw.to_string()),
            TransformKind::Int => Bson::Int64(raw.trim().parse::<i64>().unwrap_or(0)),
            TransformKind::Float32 => {
                Bson::Double(raw.trim().parse::<f32>().map(f64::from).unwrap_or(0.0))
            }
            TransformKind::Float64 => Bson::Double(raw.trim().parse::<f64>().unwrap_or(0.0)),
            TransformKind::Bool => parse_bool(raw).map(Bson::Boolean).unwrap_or(Bson::Null),
            TransformKind::Array => Bson::Array(parse_json_array(raw).unwrap_or_default()),
            TransformKind::ObjectId => Bson::ObjectId(
                ObjectId::parse_str(raw.trim()).unwrap_or_else(|_| ObjectId::from_bytes([0; 12])),
            ),
            TransformKind::ObjectIdArray => Bson::Array(parse_object_id_array(raw).unwrap_or_default()),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransformKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransformKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(())
    }
}

/// One declared field of a query target: its wire key and transform kind name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDeclaration {
    pub key: &'static str,
    pub kind: &'static str,
}

impl FieldDeclaration {
    pub const fn new(key: &'static str, kind: &'static str) -> Self {
        Self { key, kind }
    }

    /// Resolves the declared kind name.
    ///
    /// # Errors
    ///
    /// Returns [`TransformError::UnknownKind`] when the name is not one of the supported kinds.
    pub fn transform_kind(&self) -> Result<TransformKind, TransformError> {
        self.kind.parse().map_err(|_| TransformError::UnknownKind {
            key: self.key.to_string(),
            kind: self.kind.to_string(),
        })
    }
}

/// A type that can be produced from raw query parameters.
///
/// Usually derived with `#[derive(QueryParams)]`, which checks the declared kinds at
/// compile time. Manual implementations list one declaration per field; the wire keys
/// must match the serde field names of the type.
pub trait QueryParams: DeserializeOwned {
    fn declarations() -> &'static [FieldDeclaration];
}

/// Converts raw query parameters into `T`.
///
/// Keys missing from `raw` are coerced from the empty string.
///
/// # Errors
///
/// - [`TransformError::UnknownKind`] if a declaration names an unsupported kind
/// - [`TransformError::Decode`] if the coerced values do not fit `T`
pub fn transform<T: QueryParams>(raw: &HashMap<String, String>) -> Result<T, TransformError> {
    let document = assemble(T::declarations(), raw)?;

    deserialize_from_document::<T>(document).map_err(|err| {
        tracing::warn!(
            target_type = std::any::type_name::<T>(),
            error = %err,
            "Failed to decode transformed query"
        );
        TransformError::Decode(err.to_string())
    })
}

/// Coerces raw values for the given declarations into a document keyed by wire key.
///
/// A `bool` declaration without a recognizable value is left out of the document.
///
/// # Errors
///
/// Returns [`TransformError::UnknownKind`] for the first declaration with an unknown kind.
pub fn assemble(
    declarations: &[FieldDeclaration],
    raw: &HashMap<String, String>,
) -> Result<Document, TransformError> {
    let mut document = Document::new();

    for declaration in declarations {
        let kind = declaration.transform_kind()?;
        let value = raw.get(declaration.key).map(String::as_str).unwrap_or_default();

        match (kind, kind.coerce(value)) {
            // No boolean value: the key stays absent.
            (TransformKind::Bool, Bson::Null) => {}
            (_, coerced) => {
                document.insert(declaration.key, coerced);
            }
        }
    }

    Ok(document)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

fn parse_json_array(raw: &str) -> Option<Vec<Bson>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(values)) => Some(values.into_iter().map(json_to_bson).collect()),
        _ => {
            if !raw.is_empty() {
                tracing::debug!(value = %raw, "Query value is not a JSON array");
            }
            None
        }
    }
}

fn parse_object_id_array(raw: &str) -> Option<Vec<Bson>> {
    parse_json_array(raw)?
        .into_iter()
        .map(|value| match value {
            Bson::String(hex) => ObjectId::parse_str(&hex).ok().map(Bson::ObjectId),
            _ => None,
        })
        .collect()
}

fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Bson::Int64(i),
            None => Bson::Double(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => Bson::String(s),
        Value::Array(values) => Bson::Array(values.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(
            map.into_iter()
                .map(|(k, v)| (k, json_to_bson(v)))
                .collect(),
        ),
    }
}
