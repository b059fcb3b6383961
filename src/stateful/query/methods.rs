//! Custom query codecs selected with `method:<name>` in a query tag
//!
//! Each codec ships a browser-side encoder (opaque JS source handed to the
//! client in the scope init script) and a server-side encode/decode pair.

use super::codec::{unescape, QueryMap, QueryValues};
use super::QueryTag;
use crate::error::QueryError;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

type EncodeFn = fn(&Value, &QueryTag, &mut QueryValues) -> Result<(), QueryError>;
type DecodeFn = fn(&QueryMap, &QueryTag, &mut Map<String, Value>) -> Result<(), QueryError>;

pub struct QueryMethod {
    pub name: &'static str,
    /// JS function `({ value, queries, tag }) => ...`
    pub encoder: &'static str,
    pub encode: EncodeFn,
    pub decode: DecodeFn,
}

impl fmt::Debug for QueryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryMethod").field("name", &self.name).finish()
    }
}

/// `method:bare,<prefix>`
///
/// Packs every query pair whose key starts with `<prefix>` into one string
/// field holding an already-encoded query (`f_a=1&f_b=2`). Useful for filter
/// widgets that own a family of keys.
pub static BARE: QueryMethod = QueryMethod {
    name: "bare",
    encoder: r#"({ value, queries, tag }) => {
		if (value) {
			value.split('&').forEach((query) => {
				queries.push(query)
			})
		}
	}"#,
    encode: bare_encode,
    decode: bare_decode,
};

pub static QUERY_METHODS: &[&QueryMethod] = &[&BARE];

pub fn query_method(name: &str) -> Option<&'static QueryMethod> {
    QUERY_METHODS.iter().copied().find(|m| m.name == name)
}

fn bare_encode(value: &Value, _tag: &QueryTag, out: &mut QueryValues) -> Result<(), QueryError> {
    if let Value::String(packed) = value {
        packed
            .split('&')
            .filter(|fragment| !fragment.is_empty())
            .for_each(|fragment| out.push_fragment(fragment));
    }
    Ok(())
}

fn bare_decode(qs: &QueryMap, tag: &QueryTag, obj: &mut Map<String, Value>) -> Result<(), QueryError> {
    let Some(prefix) = tag.args.first() else {
        return Err(QueryError::MissingMethodArg {
            method: BARE.name,
            field: tag.path.clone(),
        });
    };

    let mut picked: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for (key, values) in qs.iter().filter(|(k, _)| k.starts_with(prefix.as_str())) {
        for value in values {
            picked.entry(key.as_str()).or_default().push(unescape(value)?);
        }
    }

    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, values) in &picked {
        for value in values {
            serializer.append_pair(key, value);
        }
    }
    obj.insert(tag.json_name.clone(), Value::String(serializer.finish()));
    Ok(())
}
