//! Stored entities and their hash encodings
//!
//! Each entity is persisted as a flat string field-map (one Redis hash).
//! Booleans are stored as `"true"`/`"false"` and timestamps as RFC 3339 with
//! millisecond precision. Every entity has exactly one encoder
//! (`to_fields`) and one decoder (`from_fields`).

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ChatKvError, Result};

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Store-assigned id; empty until the user is first saved
    pub id: String,
    pub username: String,
    /// Never included in JSON output
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_admin: bool,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// A new, unsaved, pending account.
    pub fn pending(username: impl Into<String>, password_hash: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            username: username.into(),
            password_hash: password_hash.into(),
            is_admin: false,
            is_approved: false,
            created_at: now(),
        }
    }

    /// Awaiting approval: neither approved nor an admin.
    pub fn is_pending(&self) -> bool {
        !self.is_approved && !self.is_admin
    }

    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".into(), self.id.clone()),
            ("username".into(), self.username.clone()),
            ("password_hash".into(), self.password_hash.clone()),
            ("is_admin".into(), self.is_admin.to_string()),
            ("is_approved".into(), self.is_approved.to_string()),
            ("created_at".into(), encode_time(&self.created_at)),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        Ok(Self {
            id: required(fields, "user", "id")?,
            username: required(fields, "user", "username")?,
            password_hash: fields.get("password_hash").cloned().unwrap_or_default(),
            is_admin: decode_bool(fields, "is_admin"),
            is_approved: decode_bool(fields, "is_approved"),
            created_at: decode_time(fields, "created_at")?,
        })
    }
}

/// A conversation owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatSession {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".into(), self.id.clone()),
            ("user_id".into(), self.user_id.clone()),
            ("title".into(), self.title.clone()),
            ("created_at".into(), encode_time(&self.created_at)),
            ("updated_at".into(), encode_time(&self.updated_at)),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let created_at = decode_time(fields, "created_at")?;
        let updated_at = match fields.get("updated_at") {
            Some(_) => decode_time(fields, "updated_at")?,
            None => created_at,
        };
        Ok(Self {
            id: required(fields, "session", "id")?,
            user_id: required(fields, "session", "user_id")?,
            title: fields.get("title").cloned().unwrap_or_default(),
            created_at,
            updated_at,
        })
    }
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ChatKvError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(ChatKvError::Decode(format!("unknown role '{}'", other))),
        }
    }
}

/// One message within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// `<session id>:<millis>:<random suffix>`
    pub id: String,
    pub user_id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
}

impl Message {
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            ("id".into(), self.id.clone()),
            ("user_id".into(), self.user_id.clone()),
            ("role".into(), self.role.as_str().into()),
            ("content".into(), self.content.clone()),
            ("timestamp".into(), encode_time(&self.timestamp)),
            ("session_id".into(), self.session_id.clone()),
        ]
    }

    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self> {
        let role = match fields.get("role") {
            Some(r) => r.parse()?,
            None => Role::User,
        };
        Ok(Self {
            id: required(fields, "message", "id")?,
            user_id: fields.get("user_id").cloned().unwrap_or_default(),
            role,
            content: fields.get("content").cloned().unwrap_or_default(),
            timestamp: decode_time(fields, "timestamp")?,
            session_id: required(fields, "message", "session_id")?,
        })
    }
}

/// Current time at the millisecond precision timestamps are stored with.
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub(crate) fn encode_time(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn required(fields: &HashMap<String, String>, entity: &str, name: &str) -> Result<String> {
    match fields.get(name) {
        Some(v) if !v.is_empty() => Ok(v.clone()),
        _ => Err(ChatKvError::Decode(format!("{} is missing field '{}'", entity, name)).into()),
    }
}

fn decode_bool(fields: &HashMap<String, String>, name: &str) -> bool {
    matches!(fields.get(name).map(String::as_str), Some("true") | Some("1"))
}

/// Missing timestamps decode as the Unix epoch; malformed ones are an error.
fn decode_time(fields: &HashMap<String, String>, name: &str) -> Result<DateTime<Utc>> {
    match fields.get(name) {
        None => Ok(DateTime::<Utc>::UNIX_EPOCH),
        Some(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                ChatKvError::Decode(format!("field '{}' is not a timestamp: {}", name, e)).into()
            }),
    }
}
