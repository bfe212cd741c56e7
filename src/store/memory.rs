//! In-process key-value store
//!
//! [`MemoryExecutor`] implements every [`Command`] with the same observable
//! semantics as the Redis instance behind the command proxy: typed values,
//! wrong-type errors, lazy TTL expiry, negative range offsets and glob
//! `KEYS`. It backs the unit and integration tests and the `serve` proxy.
//!
//! Expiry uses [`tokio::time::Instant`], so tests running on a paused clock
//! can move past a TTL with `tokio::time::advance`.
//!
//! # Fault injection
//!
//! [`MemoryExecutor::fail_on`] makes every subsequent command with the given
//! name fail with a transport error, which is how tests exercise the
//! "swallow and continue" paths of the cache and startup jobs.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::{ChatKvError, Result};
use crate::store::{Command, CommandExecutor, Reply};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(BTreeSet<String>),
    ZSet(BTreeMap<String, i64>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }
}

#[derive(Debug, Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    /// Drop the key if its TTL has passed, then return it.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let expired = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }

    fn purge_expired(&mut self) {
        let now = Instant::now();
        self.entries
            .retain(|_, e| e.expires_at.map_or(true, |at| at > now));
    }

    fn string(&mut self, key: &str) -> Result<Option<&mut String>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn hash(&mut self, key: &str, create: bool) -> Result<Option<&mut HashMap<String, String>>> {
        if create && self.live(key).is_none() {
            self.entries
                .insert(key.to_string(), Entry::new(Value::Hash(HashMap::new())));
        }
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(h),
                ..
            }) => Ok(Some(h)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn set(&mut self, key: &str, create: bool) -> Result<Option<&mut BTreeSet<String>>> {
        if create && self.live(key).is_none() {
            self.entries
                .insert(key.to_string(), Entry::new(Value::Set(BTreeSet::new())));
        }
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Set(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(wrong_type()),
        }
    }

    fn zset(&mut self, key: &str, create: bool) -> Result<Option<&mut BTreeMap<String, i64>>> {
        if create && self.live(key).is_none() {
            self.entries
                .insert(key.to_string(), Entry::new(Value::ZSet(BTreeMap::new())));
        }
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::ZSet(z),
                ..
            }) => Ok(Some(z)),
            Some(_) => Err(wrong_type()),
        }
    }

    /// Remove an aggregate key once its last member is gone.
    fn drop_if_empty(&mut self, key: &str) {
        let empty = match self.entries.get(key).map(|e| &e.value) {
            Some(Value::Hash(h)) => h.is_empty(),
            Some(Value::Set(s)) => s.is_empty(),
            Some(Value::ZSet(z)) => z.is_empty(),
            _ => false,
        };
        if empty {
            self.entries.remove(key);
        }
    }
}

/// In-memory implementation of [`CommandExecutor`].
#[derive(Debug, Default)]
pub struct MemoryExecutor {
    keyspace: Mutex<Keyspace>,
    failing: StdMutex<HashSet<&'static str>>,
}

impl MemoryExecutor {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later command named `command` (e.g. `"GET"`) fail with a
    /// transport error.
    pub fn fail_on(&self, command: &'static str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(command);
        }
    }

    /// Undo every [`MemoryExecutor::fail_on`].
    pub fn heal(&self) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.clear();
        }
    }

    /// Number of live keys.
    pub async fn key_count(&self) -> usize {
        let mut keyspace = self.keyspace.lock().await;
        keyspace.purge_expired();
        keyspace.entries.len()
    }

    fn should_fail(&self, name: &str) -> bool {
        self.failing
            .lock()
            .map(|failing| failing.contains(name))
            .unwrap_or(false)
    }

    fn apply(keyspace: &mut Keyspace, command: Command) -> Result<Reply> {
        let reply = match command {
            Command::Ping => Reply::Text("PONG".into()),
            Command::FlushDb => {
                keyspace.entries.clear();
                ok()
            }
            Command::Get { key } => match keyspace.string(&key)? {
                Some(s) => Reply::Text(s.clone()),
                None => Reply::Nil,
            },
            Command::Set { key, value } => {
                keyspace.entries.insert(key, Entry::new(Value::Str(value)));
                ok()
            }
            Command::SetEx {
                key,
                seconds,
                value,
            } => {
                if seconds == 0 {
                    return Err(store_error("invalid expire time in 'setex' command"));
                }
                keyspace.entries.insert(
                    key,
                    Entry {
                        value: Value::Str(value),
                        expires_at: Some(Instant::now() + Duration::from_secs(seconds)),
                    },
                );
                ok()
            }
            Command::SetNx { key, value } => {
                if keyspace.live(&key).is_some() {
                    Reply::Integer(0)
                } else {
                    keyspace.entries.insert(key, Entry::new(Value::Str(value)));
                    Reply::Integer(1)
                }
            }
            Command::Del { keys } => {
                let mut removed = 0;
                for key in keys {
                    if keyspace.live(&key).is_some() {
                        keyspace.entries.remove(&key);
                        removed += 1;
                    }
                }
                Reply::Integer(removed)
            }
            Command::Exists { key } => Reply::Integer(i64::from(keyspace.live(&key).is_some())),
            Command::HSet { key, fields } => {
                let hash = keyspace.hash(&key, true)?.ok_or_else(missing)?;
                let mut added = 0;
                for (field, value) in fields {
                    if hash.insert(field, value).is_none() {
                        added += 1;
                    }
                }
                Reply::Integer(added)
            }
            Command::HGet { key, field } => match keyspace.hash(&key, false)? {
                Some(hash) => hash.get(&field).cloned().map_or(Reply::Nil, Reply::Text),
                None => Reply::Nil,
            },
            Command::HGetAll { key } => {
                let mut flat = Vec::new();
                if let Some(hash) = keyspace.hash(&key, false)? {
                    let mut fields: Vec<_> = hash.iter().collect();
                    fields.sort();
                    for (field, value) in fields {
                        flat.push(Reply::Text(field.clone()));
                        flat.push(Reply::Text(value.clone()));
                    }
                }
                Reply::Array(flat)
            }
            Command::SAdd { key, member } => {
                let set = keyspace.set(&key, true)?.ok_or_else(missing)?;
                Reply::Integer(i64::from(set.insert(member)))
            }
            Command::SRem { key, member } => {
                let removed = match keyspace.set(&key, false)? {
                    Some(set) => set.remove(&member),
                    None => false,
                };
                keyspace.drop_if_empty(&key);
                Reply::Integer(i64::from(removed))
            }
            Command::SMembers { key } => match keyspace.set(&key, false)? {
                Some(set) => Reply::Array(set.iter().cloned().map(Reply::Text).collect()),
                None => Reply::Array(Vec::new()),
            },
            Command::ZAdd { key, score, member } => {
                let zset = keyspace.zset(&key, true)?.ok_or_else(missing)?;
                Reply::Integer(i64::from(zset.insert(member, score).is_none()))
            }
            Command::ZRange { key, start, stop } => {
                let members = keyspace
                    .zset(&key, false)?
                    .map(|z| sorted_members(z))
                    .unwrap_or_default();
                Reply::Array(slice_range(members, start, stop))
            }
            Command::ZRevRange { key, start, stop } => {
                let mut members = keyspace
                    .zset(&key, false)?
                    .map(|z| sorted_members(z))
                    .unwrap_or_default();
                members.reverse();
                Reply::Array(slice_range(members, start, stop))
            }
            Command::ZRem { key, member } => {
                let removed = match keyspace.zset(&key, false)? {
                    Some(zset) => zset.remove(&member).is_some(),
                    None => false,
                };
                keyspace.drop_if_empty(&key);
                Reply::Integer(i64::from(removed))
            }
            Command::ZCard { key } => {
                let len = keyspace.zset(&key, false)?.map_or(0, |z| z.len());
                Reply::Integer(len as i64)
            }
            Command::Incr { key } => match keyspace.string(&key)? {
                Some(current) => {
                    let next = current
                        .parse::<i64>()
                        .ok()
                        .and_then(|n| n.checked_add(1))
                        .ok_or_else(|| store_error("value is not an integer or out of range"))?;
                    *current = next.to_string();
                    Reply::Integer(next)
                }
                None => {
                    keyspace
                        .entries
                        .insert(key, Entry::new(Value::Str("1".into())));
                    Reply::Integer(1)
                }
            },
            Command::Expire { key, seconds } => {
                if keyspace.live(&key).is_none() {
                    Reply::Integer(0)
                } else {
                    if seconds == 0 {
                        keyspace.entries.remove(&key);
                    } else if let Some(entry) = keyspace.entries.get_mut(&key) {
                        entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                    }
                    Reply::Integer(1)
                }
            }
            Command::Keys { pattern } => {
                keyspace.purge_expired();
                let matcher = KeyPattern::new(&pattern);
                let mut keys: Vec<String> = keyspace
                    .entries
                    .keys()
                    .filter(|k| matcher.matches(k))
                    .cloned()
                    .collect();
                keys.sort();
                Reply::Array(keys.into_iter().map(Reply::Text).collect())
            }
        };
        Ok(reply)
    }
}

#[async_trait::async_trait]
impl CommandExecutor for MemoryExecutor {
    async fn execute(&self, command: Command) -> Result<Reply> {
        if self.should_fail(command.name()) {
            return Err(ChatKvError::Transport(format!(
                "injected failure for {}",
                command.name()
            ))
            .into());
        }
        let mut keyspace = self.keyspace.lock().await;
        Self::apply(&mut keyspace, command)
    }
}

/// KEYS pattern with Redis glob rules: `*` and `?` match any character,
/// including `/`, and `[^..]` negates a class.
struct KeyPattern {
    raw: String,
    compiled: Option<glob::Pattern>,
}

impl KeyPattern {
    const OPTIONS: glob::MatchOptions = glob::MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    fn new(pattern: &str) -> Self {
        let compiled = glob::Pattern::new(&pattern.replace("[^", "[!")).ok();
        if compiled.is_none() {
            tracing::debug!(pattern, "KEYS pattern is not a valid glob, matching literally");
        }
        Self {
            raw: pattern.to_string(),
            compiled,
        }
    }

    fn matches(&self, key: &str) -> bool {
        match &self.compiled {
            Some(pattern) => pattern.matches_with(key, Self::OPTIONS),
            None => self.raw == key,
        }
    }
}

/// Members ordered by (score, member), the order ZRANGE reports.
fn sorted_members(zset: &BTreeMap<String, i64>) -> Vec<String> {
    let mut members: Vec<(&String, &i64)> = zset.iter().collect();
    members.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
    members.into_iter().map(|(m, _)| m.clone()).collect()
}

/// Apply Redis range semantics: inclusive bounds, negative offsets from the
/// tail, out-of-range bounds clamped.
fn slice_range(members: Vec<String>, start: i64, stop: i64) -> Vec<Reply> {
    let len = members.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        return Vec::new();
    }
    members
        .into_iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .map(Reply::Text)
        .collect()
}

fn ok() -> Reply {
    Reply::Text("OK".into())
}

fn wrong_type() -> anyhow::Error {
    store_error(WRONGTYPE)
}

fn missing() -> anyhow::Error {
    store_error("key vanished during write")
}

fn store_error(message: &str) -> anyhow::Error {
    ChatKvError::Transport(message.to_string()).into()
}
