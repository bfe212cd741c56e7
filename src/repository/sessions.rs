//! Chat sessions and their messages
//!
//! Layout:
//!
//! - `session:<id>` hash, one per session
//! - `user_sessions:<user id>` sorted set of session ids, scored by last
//!   activity in epoch milliseconds
//! - `session_messages:<session id>` sorted set of message ids, scored by
//!   insertion time
//! - `message:<id>` hash, one per message

use chrono::{TimeZone, Utc};
use rand::Rng;

use crate::error::{Refusal, Result};
use crate::models::{encode_time, now, ChatSession, Message, Role};
use crate::repository::{keys, ActionResult, Database, DeletedCounts};

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

impl Database {
    /// Create a session, evicting the least recently active ones first when
    /// the user is at `max_chats_per_user`.
    pub async fn create_chat_session(
        &self,
        user_id: &str,
        title: Option<&str>,
    ) -> Result<ChatSession> {
        let index = keys::user_sessions(user_id);
        let held = self.kv.zcard(&index).await?.max(0) as usize;
        let max = self.limits.max_chats_per_user;
        if held >= max {
            let excess = (held + 1 - max) as i64;
            for oldest in self.kv.zrange(&index, 0, excess - 1).await? {
                tracing::info!(user_id, session_id = %oldest, "Evicting oldest chat session");
                self.delete_chat_session(user_id, &oldest).await?;
            }
        }

        let score = self.next_score();
        let now = now();
        let session = ChatSession {
            id: format!("{}_{}_{}", user_id, score, random_suffix(6)),
            user_id: user_id.to_string(),
            title: title
                .map(str::to_string)
                .unwrap_or_else(|| format!("Chat {}", now.format("%Y-%m-%d %H:%M"))),
            created_at: now,
            updated_at: now,
        };

        self.kv
            .hset_multiple(&keys::session(&session.id), session.to_fields())
            .await?;
        self.kv.zadd(&index, score, &session.id).await?;

        tracing::debug!(user_id, session_id = %session.id, "Created chat session");
        Ok(session)
    }

    pub async fn get_chat_session(&self, id: &str) -> Result<Option<ChatSession>> {
        let fields = self.kv.hgetall(&keys::session(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        ChatSession::from_fields(&fields).map(Some)
    }

    /// The user's sessions, most recently active first, at most
    /// `max_chats_per_user` of them.
    pub async fn get_user_chat_sessions(&self, user_id: &str) -> Result<Vec<ChatSession>> {
        let stop = self.limits.max_chats_per_user as i64 - 1;
        let ids = self
            .kv
            .zrevrange(&keys::user_sessions(user_id), 0, stop)
            .await?;
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(session) = self.get_chat_session(&id).await? {
                sessions.push(session);
            }
        }
        Ok(sessions)
    }

    /// Delete a session and every message in it.
    ///
    /// Order: messages, message index, session hash, user index entry. A
    /// failure part way leaves the later steps undone.
    pub async fn delete_chat_session(
        &self,
        user_id: &str,
        session_id: &str,
    ) -> Result<DeletedCounts> {
        let messages = self.purge_messages(session_id).await?;
        let sessions = self.kv.del(&keys::session(session_id)).await?.max(0) as usize;
        self.kv
            .zrem(&keys::user_sessions(user_id), session_id)
            .await?;

        tracing::debug!(user_id, session_id, messages, "Deleted chat session");
        Ok(DeletedCounts { sessions, messages })
    }

    /// Delete every session in the user's index, then the index itself.
    pub(crate) async fn delete_all_sessions(&self, user_id: &str) -> Result<DeletedCounts> {
        let index = keys::user_sessions(user_id);
        let mut total = DeletedCounts::default();
        for session_id in self.kv.zrange(&index, 0, -1).await? {
            let deleted = self.delete_chat_session(user_id, &session_id).await?;
            total.sessions += 1;
            total.messages += deleted.messages;
        }
        self.kv.del(&index).await?;
        Ok(total)
    }

    /// Delete a session's messages but keep the session. Returns the number
    /// of messages removed.
    pub async fn clear_session_messages(&self, session_id: &str) -> Result<usize> {
        let removed = self.purge_messages(session_id).await?;
        self.touch_session(session_id).await?;
        tracing::debug!(session_id, removed, "Cleared session messages");
        Ok(removed)
    }

    pub async fn rename_chat_session(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<ActionResult<ChatSession>> {
        let Some(mut session) = self.get_chat_session(session_id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "Session not found"));
        };
        session.title = title.to_string();
        session.updated_at = now();
        self.kv
            .hset_multiple(&keys::session(session_id), session.to_fields())
            .await?;
        Ok(ActionResult::ok_with("Session renamed", session))
    }

    /// Append a message to a session.
    ///
    /// The message is stored even when the session hash is gone; in that
    /// case the activity bump is skipped.
    pub async fn save_message(
        &self,
        user_id: &str,
        role: Role,
        content: &str,
        session_id: &str,
    ) -> Result<Message> {
        let score = self.next_score();
        let message = Message {
            id: format!("{}:{}:{}", session_id, score, random_suffix(8)),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            timestamp: Utc
                .timestamp_millis_opt(score)
                .single()
                .unwrap_or_else(Utc::now),
            session_id: session_id.to_string(),
        };

        self.kv
            .hset_multiple(&keys::message(&message.id), message.to_fields())
            .await?;
        self.kv
            .zadd(&keys::session_messages(session_id), score, &message.id)
            .await?;

        match self.touch_session(session_id).await? {
            Some(session) => {
                self.kv
                    .zadd(&keys::user_sessions(&session.user_id), score, session_id)
                    .await?;
            }
            None => tracing::debug!(session_id, "Message saved for a missing session"),
        }

        Ok(message)
    }

    /// The trailing `limit` messages of a session, oldest first.
    ///
    /// `None` uses `chat_history_limit`; `Some(0)` returns nothing.
    pub async fn get_session_messages(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let limit = limit.unwrap_or(self.limits.chat_history_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        let window = i64::try_from(limit).unwrap_or(i64::MAX);
        self.load_messages(session_id, -window, -1).await
    }

    /// Every message in a session, oldest first.
    pub async fn get_all_session_messages(&self, session_id: &str) -> Result<Vec<Message>> {
        self.load_messages(session_id, 0, -1).await
    }

    /// Messages across all of the user's sessions ordered by timestamp,
    /// trimmed to the trailing `limit` when given.
    pub async fn get_user_messages(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let mut all = Vec::new();
        for session_id in self
            .kv
            .zrange(&keys::user_sessions(user_id), 0, -1)
            .await?
        {
            let messages = match limit {
                Some(limit) => self.get_session_messages(&session_id, Some(limit)).await?,
                None => self.get_all_session_messages(&session_id).await?,
            };
            all.extend(messages);
        }

        all.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = limit {
            let skip = all.len().saturating_sub(limit);
            all.drain(..skip);
        }
        Ok(all)
    }

    async fn load_messages(&self, session_id: &str, start: i64, stop: i64) -> Result<Vec<Message>> {
        let ids = self
            .kv
            .zrange(&keys::session_messages(session_id), start, stop)
            .await?;
        let mut messages = Vec::with_capacity(ids.len());
        for id in ids {
            let fields = self.kv.hgetall(&keys::message(&id)).await?;
            if !fields.is_empty() {
                messages.push(Message::from_fields(&fields)?);
            }
        }
        Ok(messages)
    }

    /// Delete every message hash of a session and the message index.
    async fn purge_messages(&self, session_id: &str) -> Result<usize> {
        let index = keys::session_messages(session_id);
        let ids = self.kv.zrange(&index, 0, -1).await?;
        for id in &ids {
            self.kv.del(&keys::message(id)).await?;
        }
        self.kv.del(&index).await?;
        Ok(ids.len())
    }

    /// Bump `updated_at` if the session still exists.
    async fn touch_session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        let Some(mut session) = self.get_chat_session(session_id).await? else {
            return Ok(None);
        };
        session.updated_at = now();
        self.kv
            .hset(
                &keys::session(session_id),
                "updated_at",
                &encode_time(&session.updated_at),
            )
            .await?;
        Ok(Some(session))
    }
}
