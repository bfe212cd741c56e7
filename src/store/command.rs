//! The closed set of store primitives
//!
//! Every command the repository can issue is a variant of [`Command`]. The
//! wire form is the flat string array the command proxy expects
//! (`["HSET", "user:1001", "username", "alice", ...]`). Parsing goes the other
//! way for the proxy server: anything outside this set is rejected when the
//! command is built, never at execution time.

use std::fmt;

use crate::error::{ChatKvError, Result};

/// A single key-value primitive with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Connectivity probe
    Ping,
    /// Read a string value
    Get { key: String },
    /// Write a string value, clearing any TTL
    Set { key: String, value: String },
    /// Write a string value with a TTL in seconds
    SetEx {
        key: String,
        seconds: u64,
        value: String,
    },
    /// Write a string value only when the key is absent
    SetNx { key: String, value: String },
    /// Delete one or more keys
    Del { keys: Vec<String> },
    /// Test key presence
    Exists { key: String },
    /// Write one or more hash fields
    HSet {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Read one hash field
    HGet { key: String, field: String },
    /// Read every field of a hash
    HGetAll { key: String },
    /// Add a set member
    SAdd { key: String, member: String },
    /// Remove a set member
    SRem { key: String, member: String },
    /// List set members
    SMembers { key: String },
    /// Add or rescore a sorted-set member
    ZAdd {
        key: String,
        score: i64,
        member: String,
    },
    /// Members by rank, lowest score first
    ZRange { key: String, start: i64, stop: i64 },
    /// Members by rank, highest score first
    ZRevRange { key: String, start: i64, stop: i64 },
    /// Remove a sorted-set member
    ZRem { key: String, member: String },
    /// Sorted-set cardinality
    ZCard { key: String },
    /// Atomic increment
    Incr { key: String },
    /// Set a TTL in seconds
    Expire { key: String, seconds: u64 },
    /// Keys matching a glob pattern
    Keys { pattern: String },
    /// Drop every key in the current database
    FlushDb,
}

impl Command {
    /// Build a multi-field HSET.
    ///
    /// # Errors
    ///
    /// Returns [`ChatKvError::UnsupportedCommand`] when `fields` is empty,
    /// since HSET without a field/value pair is not a valid command.
    pub fn hset(key: impl Into<String>, fields: Vec<(String, String)>) -> Result<Self> {
        if fields.is_empty() {
            return Err(ChatKvError::UnsupportedCommand("HSET requires at least one field".into()).into());
        }
        Ok(Self::HSet {
            key: key.into(),
            fields,
        })
    }

    /// Upper-case command name as sent on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "PING",
            Self::Get { .. } => "GET",
            Self::Set { .. } => "SET",
            Self::SetEx { .. } => "SETEX",
            Self::SetNx { .. } => "SETNX",
            Self::Del { .. } => "DEL",
            Self::Exists { .. } => "EXISTS",
            Self::HSet { .. } => "HSET",
            Self::HGet { .. } => "HGET",
            Self::HGetAll { .. } => "HGETALL",
            Self::SAdd { .. } => "SADD",
            Self::SRem { .. } => "SREM",
            Self::SMembers { .. } => "SMEMBERS",
            Self::ZAdd { .. } => "ZADD",
            Self::ZRange { .. } => "ZRANGE",
            Self::ZRevRange { .. } => "ZREVRANGE",
            Self::ZRem { .. } => "ZREM",
            Self::ZCard { .. } => "ZCARD",
            Self::Incr { .. } => "INCR",
            Self::Expire { .. } => "EXPIRE",
            Self::Keys { .. } => "KEYS",
            Self::FlushDb => "FLUSHDB",
        }
    }

    /// Flatten into the `["NAME", arg, ...]` wire array.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![self.name().to_string()];
        match self {
            Self::Ping | Self::FlushDb => {}
            Self::Get { key }
            | Self::Exists { key }
            | Self::HGetAll { key }
            | Self::SMembers { key }
            | Self::ZCard { key }
            | Self::Incr { key } => args.push(key.clone()),
            Self::Set { key, value } | Self::SetNx { key, value } => {
                args.push(key.clone());
                args.push(value.clone());
            }
            Self::SetEx {
                key,
                seconds,
                value,
            } => {
                args.push(key.clone());
                args.push(seconds.to_string());
                args.push(value.clone());
            }
            Self::Del { keys } => args.extend(keys.iter().cloned()),
            Self::HSet { key, fields } => {
                args.push(key.clone());
                for (field, value) in fields {
                    args.push(field.clone());
                    args.push(value.clone());
                }
            }
            Self::HGet { key, field } => {
                args.push(key.clone());
                args.push(field.clone());
            }
            Self::SAdd { key, member } | Self::SRem { key, member } | Self::ZRem { key, member } => {
                args.push(key.clone());
                args.push(member.clone());
            }
            Self::ZAdd { key, score, member } => {
                args.push(key.clone());
                args.push(score.to_string());
                args.push(member.clone());
            }
            Self::ZRange { key, start, stop } | Self::ZRevRange { key, start, stop } => {
                args.push(key.clone());
                args.push(start.to_string());
                args.push(stop.to_string());
            }
            Self::Expire { key, seconds } => {
                args.push(key.clone());
                args.push(seconds.to_string());
            }
            Self::Keys { pattern } => args.push(pattern.clone()),
        }
        args
    }

    /// Parse a wire array back into a command.
    ///
    /// The name is matched case-insensitively. `SET key value seconds` is
    /// accepted as an alias of SETEX, matching what the command proxy has
    /// always allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ChatKvError::UnsupportedCommand`] for unknown names, wrong
    /// arity, or non-numeric scores, offsets and TTLs.
    pub fn parse(parts: &[String]) -> Result<Self> {
        let (name, args) = parts
            .split_first()
            .ok_or_else(|| ChatKvError::UnsupportedCommand("empty command".into()))?;
        let upper = name.to_ascii_uppercase();

        let command = match (upper.as_str(), args) {
            ("PING", []) => Self::Ping,
            ("FLUSHDB", []) => Self::FlushDb,
            ("GET", [key]) => Self::Get { key: key.clone() },
            ("SET", [key, value]) => Self::Set {
                key: key.clone(),
                value: value.clone(),
            },
            ("SET", [key, value, seconds]) | ("SETEX", [key, seconds, value]) => Self::SetEx {
                key: key.clone(),
                seconds: parse_number(&upper, seconds)?,
                value: value.clone(),
            },
            ("SETNX", [key, value]) => Self::SetNx {
                key: key.clone(),
                value: value.clone(),
            },
            ("DEL", keys) if !keys.is_empty() => Self::Del {
                keys: keys.to_vec(),
            },
            ("EXISTS", [key]) => Self::Exists { key: key.clone() },
            ("HSET", [key, rest @ ..]) if !rest.is_empty() && rest.len() % 2 == 0 => {
                let fields = rest
                    .chunks(2)
                    .map(|pair| (pair[0].clone(), pair[1].clone()))
                    .collect();
                Self::HSet {
                    key: key.clone(),
                    fields,
                }
            }
            ("HGET", [key, field]) => Self::HGet {
                key: key.clone(),
                field: field.clone(),
            },
            ("HGETALL", [key]) => Self::HGetAll { key: key.clone() },
            ("SADD", [key, member]) => Self::SAdd {
                key: key.clone(),
                member: member.clone(),
            },
            ("SREM", [key, member]) => Self::SRem {
                key: key.clone(),
                member: member.clone(),
            },
            ("SMEMBERS", [key]) => Self::SMembers { key: key.clone() },
            ("ZADD", [key, score, member]) => Self::ZAdd {
                key: key.clone(),
                score: parse_score(score)?,
                member: member.clone(),
            },
            ("ZRANGE", [key, start, stop]) => Self::ZRange {
                key: key.clone(),
                start: parse_number(&upper, start)?,
                stop: parse_number(&upper, stop)?,
            },
            ("ZREVRANGE", [key, start, stop]) => Self::ZRevRange {
                key: key.clone(),
                start: parse_number(&upper, start)?,
                stop: parse_number(&upper, stop)?,
            },
            ("ZREM", [key, member]) => Self::ZRem {
                key: key.clone(),
                member: member.clone(),
            },
            ("ZCARD", [key]) => Self::ZCard { key: key.clone() },
            ("INCR", [key]) => Self::Incr { key: key.clone() },
            ("EXPIRE", [key, seconds]) => Self::Expire {
                key: key.clone(),
                seconds: parse_number(&upper, seconds)?,
            },
            ("KEYS", [pattern]) => Self::Keys {
                pattern: pattern.clone(),
            },
            _ => {
                return Err(ChatKvError::UnsupportedCommand(format!(
                    "{} with {} argument(s)",
                    upper,
                    args.len()
                ))
                .into())
            }
        };

        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_args().join(" "))
    }
}

fn parse_number<T: std::str::FromStr>(command: &str, raw: &str) -> Result<T> {
    raw.parse::<T>().map_err(|_| {
        ChatKvError::UnsupportedCommand(format!("{}: '{}' is not an integer", command, raw)).into()
    })
}

/// Scores may arrive as floats (`"1700000000000.0"`); they are stored as
/// whole milliseconds.
fn parse_score(raw: &str) -> Result<i64> {
    if let Ok(score) = raw.parse::<i64>() {
        return Ok(score);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|score| score.is_finite())
        .map(|score| score as i64)
        .ok_or_else(|| {
            ChatKvError::UnsupportedCommand(format!("ZADD: '{}' is not a valid score", raw)).into()
        })
}
