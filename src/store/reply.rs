//! Raw store replies
//!
//! The command proxy answers with plain JSON: strings, integers, `null`,
//! arrays, and for HGETALL either an object or a flat alternating key/value
//! array. [`Reply`] is the decoded form; the typed accessors on it are what
//! [`crate::store::KvClient`] uses to turn replies into Rust values.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{ChatKvError, Result};

/// A decoded store reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Missing key or field
    Nil,
    /// Integer reply (counts, INCR results, booleans as 0/1)
    Integer(i64),
    /// Bulk or status string
    Text(String),
    /// Multi-bulk reply
    Array(Vec<Reply>),
    /// Field map, as some proxies return for HGETALL
    Map(Vec<(String, String)>),
}

impl Reply {
    /// Decode a JSON value produced by the command proxy.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Nil,
            Value::Bool(b) => Self::Integer(i64::from(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Text(n.to_string()),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Map(
                map.into_iter()
                    .map(|(k, v)| {
                        let v = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, v)
                    })
                    .collect(),
            ),
        }
    }

    /// Encode back into JSON, the inverse of [`Reply::from_json`].
    pub fn to_json(&self) -> Value {
        match self {
            Self::Nil => Value::Null,
            Self::Integer(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(pairs) => Value::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
        }
    }

    /// Optional string (GET, HGET).
    ///
    /// Integers are rendered as text because a counter read with GET comes
    /// back as a number from some proxies.
    pub fn into_opt_string(self) -> Result<Option<String>> {
        match self {
            Self::Nil => Ok(None),
            Self::Text(s) => Ok(Some(s)),
            Self::Integer(i) => Ok(Some(i.to_string())),
            other => Err(unexpected("string", &other)),
        }
    }

    /// Integer reply. Numeric strings are accepted.
    pub fn into_integer(self) -> Result<i64> {
        match self {
            Self::Integer(i) => Ok(i),
            Self::Text(ref s) => s.trim().parse::<i64>().map_err(|_| unexpected("integer", &self)),
            Self::Nil => Ok(0),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// Boolean reply (EXISTS, EXPIRE, SETNX); any non-zero integer is true.
    pub fn into_bool(self) -> Result<bool> {
        self.into_integer().map(|i| i != 0)
    }

    /// List of strings (SMEMBERS, ZRANGE, KEYS). Nil decodes as empty.
    pub fn into_string_list(self) -> Result<Vec<String>> {
        match self {
            Self::Nil => Ok(Vec::new()),
            Self::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Self::Text(s) => Ok(s),
                    Self::Integer(i) => Ok(i.to_string()),
                    other => Err(unexpected("string element", &other)),
                })
                .collect(),
            other => Err(unexpected("array", &other)),
        }
    }

    /// Field map (HGETALL).
    ///
    /// Accepts either a JSON object or a flat `[field, value, field, value]`
    /// array paired by position. Nil and an empty array both decode as an
    /// empty map, which callers treat as "not found".
    pub fn into_field_map(self) -> Result<HashMap<String, String>> {
        match self {
            Self::Nil => Ok(HashMap::new()),
            Self::Map(pairs) => Ok(pairs.into_iter().collect()),
            Self::Array(_) => {
                let flat = self.into_string_list()?;
                if flat.len() % 2 != 0 {
                    return Err(ChatKvError::MalformedResponse(format!(
                        "field list has odd length {}",
                        flat.len()
                    ))
                    .into());
                }
                let mut map = HashMap::with_capacity(flat.len() / 2);
                let mut iter = flat.into_iter();
                while let (Some(field), Some(value)) = (iter.next(), iter.next()) {
                    map.insert(field, value);
                }
                Ok(map)
            }
            other => Err(unexpected("field map", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> anyhow::Error {
    ChatKvError::MalformedResponse(format!("expected {}, got {:?}", expected, got)).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_array_pairs_into_field_map() {
        let reply = Reply::from_json(json!(["id", "1001", "username", "alice"]));
        let map = reply.into_field_map().unwrap();
        assert_eq!(map.get("id").map(String::as_str), Some("1001"));
        assert_eq!(map.get("username").map(String::as_str), Some("alice"));
    }

    #[test]
    fn test_object_reply_decodes_into_field_map() {
        let reply = Reply::from_json(json!({"id": "1001", "is_admin": "false"}));
        let map = reply.into_field_map().unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["is_admin"], "false");
    }

    #[test]
    fn test_odd_field_list_is_malformed() {
        let reply = Reply::from_json(json!(["id", "1001", "username"]));
        let err = reply.into_field_map().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatKvError>(),
            Some(ChatKvError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_empty_reply_is_empty_map() {
        assert!(Reply::Nil.into_field_map().unwrap().is_empty());
        assert!(Reply::from_json(json!([]))
            .into_field_map()
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_integer_accepts_numeric_text() {
        assert_eq!(Reply::Text("42".into()).into_integer().unwrap(), 42);
        assert!(Reply::Text("nope".into()).into_integer().is_err());
    }

    #[test]
    fn test_opt_string_renders_integers() {
        assert_eq!(
            Reply::from_json(json!(1000)).into_opt_string().unwrap(),
            Some("1000".to_string())
        );
        assert_eq!(Reply::Nil.into_opt_string().unwrap(), None);
    }

    #[test]
    fn test_string_list_rejects_nested_arrays() {
        let reply = Reply::from_json(json!([["a"]]));
        assert!(reply.into_string_list().is_err());
    }
}
