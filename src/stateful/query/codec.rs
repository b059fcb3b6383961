//! Query encode/decode over JSON values
//!
//! The encoder reads field values out of the serialized component. The
//! decoder parses each tagged key into a JSON value and writes it into the
//! live component through the field's accessor, leaving every other field
//! alone.
//!
//! Token grammar:
//!
//! ```text
//! scalar   -> escape(text)
//! struct   -> escape(v1) "_" escape(v2) ...   (values ordered by JSON key)
//! list     -> token "," token ...
//! ```
//!
//! `escape` also escapes `_`, so separators never collide with content.

use super::{query_method, QueryTag, QueryTags, Shape, StructShape};
use crate::error::QueryError;
use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// `encodeURIComponent` plus `_`
pub fn escape(s: &str) -> String {
    urlencoding::encode(s).replace('_', "%5F")
}

/// Inverse of query escaping (`+` reads as a space)
///
/// A `%` not followed by two hex digits is an error, as is a decoded byte
/// sequence that is not UTF-8.
pub fn unescape(s: &str) -> Result<String, QueryError> {
    let bytes = s.as_bytes();
    for (i, _) in s.match_indices('%') {
        let valid = bytes
            .get(i + 1..i + 3)
            .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
        if !valid {
            return Err(QueryError::Unescape(s.to_string()));
        }
    }
    let spaced = s.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|v| v.into_owned())
        .map_err(|_| QueryError::Unescape(s.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoded pairs
// ─────────────────────────────────────────────────────────────────────────────

/// Ordered query pairs, both halves already escaped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryValues {
    pairs: Vec<(String, String)>,
}

impl QueryValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair; the key is escaped here, the value must already be
    pub fn push(&mut self, key: &str, escaped_value: impl Into<String>) {
        self.pairs.push((escape(key), escaped_value.into()));
    }

    /// Append a pre-encoded `key=value` fragment verbatim
    pub fn push_fragment(&mut self, fragment: &str) {
        let (key, value) = fragment.split_once('=').unwrap_or((fragment, ""));
        self.pairs.push((key.to_string(), value.to_string()));
    }

    /// Escaped value of the first pair under `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = escape(key);
        self.pairs
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for QueryValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsed query
// ─────────────────────────────────────────────────────────────────────────────

/// Raw query parsed into a multi-map: keys unescaped, values left as sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryMap(BTreeMap<String, Vec<String>>);

impl QueryMap {
    pub fn parse(raw: &str) -> Result<Self, QueryError> {
        let mut map = Self::default();
        let mut first_err = None;
        for segment in raw.split('&') {
            if segment.contains(';') {
                first_err.get_or_insert(QueryError::InvalidQuery(segment.to_string()));
                continue;
            }
            if segment.is_empty() {
                continue;
            }
            let (key, value) = segment.split_once('=').unwrap_or((segment, ""));
            match unescape(key) {
                Ok(key) => map.0.entry(key).or_default().push(value.to_string()),
                Err(e) => {
                    first_err.get_or_insert(e);
                }
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(map),
        }
    }

    /// Last value sent under `key`
    pub fn last(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|vs| vs.last()).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl FromIterator<(String, String)> for QueryMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (k, v) in iter {
            map.0.entry(k).or_default().push(v);
        }
        map
    }
}

/// Every key of `sub` appears in `sup` with at least the same comma-separated
/// values (multiset containment, last value of each key wins)
pub fn is_query_subset(sup: &QueryMap, sub: &QueryMap) -> bool {
    for (key, sub_values) in sub.iter() {
        let Some(sub_last) = sub_values.last() else {
            continue;
        };
        let Some(sup_last) = sup.last(key) else {
            return false;
        };

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for v in sup_last.split(',') {
            *counts.entry(v).or_default() += 1;
        }
        for v in sub_last.split(',') {
            match counts.get_mut(v) {
                Some(n) if *n > 0 => *n -= 1,
                _ => return false,
            }
        }
    }
    true
}

/// [`is_query_subset`] over two raw query strings
pub fn is_raw_query_subset(sup: &str, sub: &str) -> bool {
    let parse = |raw: &str| -> QueryMap {
        url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    };
    is_query_subset(&parse(sup), &parse(sub))
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

fn to_object<T: Serialize + ?Sized>(value: &T) -> Result<Map<String, Value>, QueryError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(QueryError::Json(format!("expected a JSON object, got {other}"))),
    }
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn encode_scalar(tag: &QueryTag, value: &Value) -> Result<String, QueryError> {
    scalar_text(value)
        .map(|text| escape(&text))
        .ok_or_else(|| QueryError::Unencodable(tag.path.clone()))
}

fn encode_struct(tag: &QueryTag, obj: &Map<String, Value>) -> Result<String, QueryError> {
    let mut keys: Vec<&String> = obj.keys().collect();
    keys.sort();
    let parts = keys
        .into_iter()
        .map(|k| encode_scalar(tag, &obj[k]))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join("_"))
}

fn encode_seq(tag: &QueryTag, items: &[Value]) -> Result<String, QueryError> {
    let parts = items
        .iter()
        .map(|item| match item {
            Value::Object(obj) => encode_struct(tag, obj),
            other => encode_scalar(tag, other),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(","))
}

impl QueryTags {
    /// Encode the tagged fields of `value`, in tag order
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<QueryValues, QueryError> {
        let obj = to_object(value)?;
        let mut out = QueryValues::new();

        for tag in self.iter() {
            let Some(value) = obj.get(&tag.json_name) else {
                continue;
            };

            if !tag.method.is_empty() {
                let method = query_method(&tag.method)
                    .ok_or_else(|| QueryError::UnknownMethod(tag.method.clone()))?;
                (method.encode)(value, tag, &mut out)?;
                continue;
            }

            if tag.omitempty && is_falsy(value) {
                continue;
            }
            match value {
                Value::Array(items) => {
                    if tag.omitempty && items.is_empty() {
                        continue;
                    }
                    out.push(&tag.name, encode_seq(tag, items)?);
                }
                Value::Object(map) => out.push(&tag.name, encode_struct(tag, map)?),
                scalar => out.push(&tag.name, encode_scalar(tag, scalar)?),
            }
        }
        Ok(out)
    }

    /// Write query values from `raw_query` into the tagged fields of `dest`
    ///
    /// Keys absent from the query leave their field untouched; a key present
    /// with an empty value resets the field to its zero value. A panic while
    /// decoding is caught and reported as [`QueryError::Panic`].
    pub fn decode<T: 'static>(&self, raw_query: &str, dest: &mut T) -> Result<(), QueryError> {
        match catch_unwind(AssertUnwindSafe(|| self.decode_into(raw_query, dest))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(QueryError::Panic(message))
            }
        }
    }

    fn decode_into(&self, raw_query: &str, dest: &mut dyn Any) -> Result<(), QueryError> {
        let qs = QueryMap::parse(raw_query)?;

        // parse everything first so a bad value leaves `dest` untouched
        let mut updates = Vec::new();
        for tag in self.iter() {
            if !tag.method.is_empty() {
                let method = query_method(&tag.method)
                    .ok_or_else(|| QueryError::UnknownMethod(tag.method.clone()))?;
                let mut scratch = Map::new();
                (method.decode)(&qs, tag, &mut scratch)?;
                if let Some(value) = scratch.remove(&tag.json_name) {
                    updates.push((tag, value));
                }
                continue;
            }

            let Some(raw) = qs.last(&tag.name) else {
                continue;
            };
            let value = if raw.is_empty() {
                tag.shape.zero_value()
            } else {
                decode_value(tag, &tag.shape, raw)?
            };
            updates.push((tag, value));
        }

        for (tag, value) in updates {
            let assign = tag
                .assign
                .as_ref()
                .ok_or_else(|| QueryError::Unassignable(tag.path.clone()))?;
            assign.apply(dest, value)?;
        }
        Ok(())
    }
}

fn decode_value(tag: &QueryTag, shape: &Shape, raw: &str) -> Result<Value, QueryError> {
    match shape.unwrap_optional() {
        Shape::Seq(elem) => {
            let items = raw
                .split(',')
                .map(|token| match elem.unwrap_optional() {
                    Shape::Struct(s) => decode_struct(tag, s, token),
                    other => parse_scalar(tag, other, &unescape(token)?),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        }
        Shape::Struct(s) => decode_struct(tag, s, raw),
        other => parse_scalar(tag, other, &unescape(raw)?),
    }
}

fn decode_struct(tag: &QueryTag, shape: &StructShape, token: &str) -> Result<Value, QueryError> {
    let fields = token
        .split('_')
        .map(unescape)
        .collect::<Result<Vec<_>, _>>()?;
    let keys = shape.json_keys()?;

    let mut obj = match shape.zero_value() {
        Value::Object(obj) => obj,
        _ => Map::new(),
    };
    for (field, (key, field_shape)) in fields.iter().zip(keys.iter()) {
        obj.insert(key.clone(), parse_scalar(tag, field_shape, field)?);
    }
    Ok(Value::Object(obj))
}

fn parse_scalar(tag: &QueryTag, shape: &Shape, text: &str) -> Result<Value, QueryError> {
    let invalid = |expected: &'static str| QueryError::InvalidValue {
        field: tag.path.clone(),
        value: text.to_string(),
        expected,
    };

    if text.is_empty() {
        return Ok(shape.zero_value());
    }
    match shape {
        Shape::String => Ok(Value::String(text.to_string())),
        Shape::Int => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| invalid("int")),
        Shape::Uint => text
            .parse::<u64>()
            .map(Value::from)
            .map_err(|_| invalid("uint")),
        Shape::Float => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| invalid("float")),
        Shape::Bool => match text {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(Value::Bool(true)),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(Value::Bool(false)),
            _ => Err(invalid("bool")),
        },
        Shape::Optional(inner) => parse_scalar(tag, inner, text),
        Shape::Seq(_) | Shape::Struct(_) => Err(invalid("scalar")),
    }
}
