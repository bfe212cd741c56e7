//! Maintenance scans, admin statistics and data export
//!
//! The scans here are either read-only (`validate_data_integrity`, stats)
//! or idempotent (`cleanup_expired_sessions`, `migrate_legacy_data`), so
//! they are safe to run on every startup.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{Refusal, Result};
use crate::models::{ChatSession, Message, User};
use crate::repository::{keys, ActionResult, Database, DeletedCounts};

/// A consistency violation found by [`Database::validate_data_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityIssue {
    /// A session whose owning user no longer exists
    OrphanedSession { session_id: String, user_id: String },
    /// A message whose session no longer exists
    OrphanedMessage {
        message_key: String,
        session_id: String,
    },
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OrphanedSession {
                session_id,
                user_id,
            } => write!(
                f,
                "Orphaned session {} - user {} not found",
                session_id, user_id
            ),
            Self::OrphanedMessage {
                message_key,
                session_id,
            } => write!(
                f,
                "Orphaned message {} - session {} not found",
                message_key, session_id
            ),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub sessions_checked: usize,
    pub messages_checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub is_admin: bool,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub session_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_keys: usize,
    /// Key counts grouped by the segment before the first `:`
    pub key_types: BTreeMap<String, usize>,
    pub users: Vec<UserSummary>,
    pub user_count: usize,
    pub pending_count: usize,
    pub approved_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub connected: bool,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything stored for one user.
#[derive(Debug, Clone, Serialize)]
pub struct UserExport {
    pub user: User,
    pub sessions: Vec<ChatSession>,
    pub messages: Vec<Message>,
    pub export_timestamp: DateTime<Utc>,
}

impl Database {
    /// Drop `user_sessions` entries whose session hash is gone. Returns how
    /// many entries were removed.
    pub async fn cleanup_expired_sessions(&self) -> Result<usize> {
        let mut cleaned = 0;
        for user_id in self.kv.smembers(keys::USERS).await? {
            let index = keys::user_sessions(&user_id);
            for session_id in self.kv.zrange(&index, 0, -1).await? {
                if !self.kv.exists(&keys::session(&session_id)).await? {
                    self.kv.zrem(&index, &session_id).await?;
                    tracing::debug!(user_id = %user_id, session_id = %session_id, "Removed dangling session entry");
                    cleaned += 1;
                }
            }
        }
        if cleaned > 0 {
            tracing::info!(cleaned, "Cleaned up dangling session entries");
        }
        Ok(cleaned)
    }

    /// Report sessions without a user and messages without a session.
    /// Nothing is repaired.
    pub async fn validate_data_integrity(&self) -> Result<IntegrityReport> {
        let mut report = IntegrityReport::default();

        for key in self.kv.keys(&format!("{}*", keys::SESSION_PREFIX)).await? {
            let Some(session_id) = key.strip_prefix(keys::SESSION_PREFIX) else {
                continue;
            };
            report.sessions_checked += 1;
            if let Some(session) = self.get_chat_session(session_id).await? {
                if !self.kv.exists(&keys::user(&session.user_id)).await? {
                    report.issues.push(IntegrityIssue::OrphanedSession {
                        session_id: session.id,
                        user_id: session.user_id,
                    });
                }
            }
        }

        for key in self.kv.keys(&format!("{}*", keys::MESSAGE_PREFIX)).await? {
            report.messages_checked += 1;
            let Some(session_id) = self.kv.hget(&key, "session_id").await? else {
                continue;
            };
            if !self.kv.exists(&keys::session(&session_id)).await? {
                report.issues.push(IntegrityIssue::OrphanedMessage {
                    message_key: key,
                    session_id,
                });
            }
        }

        Ok(report)
    }

    /// Run the v1 migration once. The migration itself has no steps; only
    /// the completion marker is written.
    pub async fn migrate_legacy_data(&self) -> Result<ActionResult> {
        if self.kv.exists(keys::MIGRATION_V1).await? {
            return Ok(ActionResult::ok("Migration already complete"));
        }
        tracing::info!("Running database migration v1");
        self.kv.set(keys::MIGRATION_V1, "true").await?;
        Ok(ActionResult::ok("Migration completed successfully"))
    }

    pub async fn get_database_stats(&self) -> Result<DatabaseStats> {
        let all_keys = self.kv.keys("*").await?;
        let mut key_types = BTreeMap::new();
        for key in &all_keys {
            let kind = key.split(':').next().unwrap_or(key.as_str());
            *key_types.entry(kind.to_string()).or_insert(0) += 1;
        }

        let mut users = Vec::new();
        let (mut pending_count, mut approved_count) = (0, 0);
        for user in self.get_all_users().await? {
            if user.is_pending() {
                pending_count += 1;
            } else {
                approved_count += 1;
            }
            let session_count = self.kv.zcard(&keys::user_sessions(&user.id)).await?;
            users.push(UserSummary {
                id: user.id,
                username: user.username,
                is_admin: user.is_admin,
                is_approved: user.is_approved,
                created_at: user.created_at,
                session_count,
            });
        }

        Ok(DatabaseStats {
            total_keys: all_keys.len(),
            key_types,
            user_count: users.len(),
            users,
            pending_count,
            approved_count,
        })
    }

    /// Ping the store and time it. Never fails; an unreachable store is
    /// reported as unhealthy.
    pub async fn get_system_health(&self) -> SystemHealth {
        let started = Instant::now();
        let result = self.kv.ping().await;
        let response_time_ms = started.elapsed().as_millis();
        match result {
            Ok(_) => SystemHealth {
                status: HealthStatus::Healthy,
                timestamp: Utc::now(),
                connected: true,
                response_time_ms,
                error: None,
            },
            Err(e) => SystemHealth {
                status: HealthStatus::Unhealthy,
                timestamp: Utc::now(),
                connected: false,
                response_time_ms,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn export_user_data(&self, user_id: &str) -> Result<ActionResult<UserExport>> {
        let Some(user) = self.get_user_by_id(user_id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "User not found"));
        };

        let mut sessions = Vec::new();
        let mut messages = Vec::new();
        for session_id in self
            .kv
            .zrange(&keys::user_sessions(user_id), 0, -1)
            .await?
        {
            if let Some(session) = self.get_chat_session(&session_id).await? {
                messages.extend(self.get_all_session_messages(&session.id).await?);
                sessions.push(session);
            }
        }

        let message = format!("Exported data for user {}", user.username);
        Ok(ActionResult::ok_with(
            message,
            UserExport {
                user,
                sessions,
                messages,
                export_timestamp: Utc::now(),
            },
        ))
    }

    /// Delete a user's sessions, messages and rate-limit window but keep the
    /// account. Refused for admins.
    pub async fn clear_all_user_data(&self, user_id: &str) -> Result<ActionResult<DeletedCounts>> {
        let Some(user) = self.get_user_by_id(user_id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "User not found"));
        };
        if user.is_admin {
            return Ok(ActionResult::refused(
                Refusal::Forbidden,
                "Cannot clear admin user data",
            ));
        }

        let deleted = self.delete_all_sessions(user_id).await?;
        self.kv.del(&keys::rate_limit(user_id)).await?;

        tracing::info!(user_id, sessions = deleted.sessions, messages = deleted.messages, "Cleared user data");
        Ok(ActionResult::ok_with(
            format!("Successfully cleared all data for user {}", user.username),
            deleted,
        ))
    }

    /// DEL every key matching a glob pattern. Returns the number deleted.
    pub async fn bulk_delete_keys(&self, pattern: &str) -> Result<usize> {
        let mut deleted = 0;
        for key in self.kv.keys(pattern).await? {
            deleted += self.kv.del(&key).await?.max(0) as usize;
        }
        tracing::info!(pattern, deleted, "Bulk deleted keys");
        Ok(deleted)
    }
}
