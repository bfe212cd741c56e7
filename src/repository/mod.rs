//! Entity repository over the key-value store
//!
//! [`Database`] maps users, chat sessions and messages onto hashes, sets and
//! sorted sets, and owns the rate limiter, the response cache and the
//! maintenance scans. Its methods are split by concern:
//!
//! - [`users`]: accounts, registration, approval workflow
//! - [`sessions`]: chat sessions and messages
//! - [`cache`]: rate-limit windows and cached responses
//! - [`maintenance`]: cleanup, integrity, migration, stats, export
//!
//! # Outcomes
//!
//! Operations that can be refused for domain reasons (unknown id, admin
//! protection, wrong approval state) return `Ok(ActionResult)` with
//! `success == false`. Only transport and decode failures are `Err`.
//!
//! # Consistency
//!
//! There are no transactions. Multi-step writes and cascading deletes are
//! best effort; an interrupted cascade leaves index entries that
//! [`Database::cleanup_expired_sessions`] and
//! [`Database::validate_data_integrity`] detect.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::{default_password_salt, Config, LimitsConfig};
use crate::error::{ChatKvError, Refusal, Result};
use crate::store::http::HttpExecutor;
use crate::store::{CommandExecutor, KvClient};

pub mod cache;
pub mod keys;
pub mod maintenance;
pub mod sessions;
pub mod users;

pub use cache::prompt_hash;
pub use maintenance::{
    DatabaseStats, HealthStatus, IntegrityIssue, IntegrityReport, SystemHealth, UserExport,
    UserSummary,
};
pub use users::AdminStatus;

/// Outcome of a repository operation that may be refused.
///
/// Serializes as `{"success": .., "message": ..}` plus the refusal kind and
/// payload when present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResult<T = ()> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal: Option<Refusal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ActionResult<T> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            refusal: None,
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            refusal: None,
            data: Some(data),
        }
    }

    pub fn refused(refusal: Refusal, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            refusal: Some(refusal),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

/// Counts reported by cascading deletes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletedCounts {
    pub sessions: usize,
    pub messages: usize,
}

impl std::ops::AddAssign for DeletedCounts {
    fn add_assign(&mut self, other: Self) {
        self.sessions += other.sessions;
        self.messages += other.messages;
    }
}

/// Repository handle. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct Database {
    kv: KvClient,
    limits: LimitsConfig,
    password_salt: String,
    last_score: AtomicI64,
}

impl Database {
    /// Create a repository over `executor` with the given limits.
    pub fn new(executor: Arc<dyn CommandExecutor>, limits: LimitsConfig) -> Self {
        Self {
            kv: KvClient::new(executor),
            limits,
            password_salt: default_password_salt(),
            last_score: AtomicI64::new(0),
        }
    }

    /// Replace the salt appended to passwords before hashing.
    pub fn with_password_salt(mut self, salt: impl Into<String>) -> Self {
        self.password_salt = salt.into();
        self
    }

    /// Build a repository for the configured command proxy without
    /// contacting it.
    ///
    /// # Errors
    ///
    /// Returns [`ChatKvError::Config`] for an unusable URL.
    pub fn from_config(config: &Config) -> Result<Self> {
        let endpoint = url::Url::parse(&config.store.url)
            .map_err(|e| ChatKvError::Config(format!("Invalid store URL: {}", e)))?;
        let executor = HttpExecutor::new(
            endpoint,
            Duration::from_secs(config.store.timeout_seconds),
        )?;
        Ok(Self::new(Arc::new(executor), config.limits.clone())
            .with_password_salt(config.admin.password_salt.clone()))
    }

    /// Like [`Database::from_config`], then check that the proxy answers.
    ///
    /// # Errors
    ///
    /// Also returns [`ChatKvError::Transport`] when the proxy does not
    /// answer PING.
    pub async fn connect(config: &Config) -> Result<Self> {
        let db = Self::from_config(config)?;
        let pong = db.kv.ping().await?;
        tracing::info!(url = %config.store.url, reply = %pong, "Connected to store");
        Ok(db)
    }

    /// Raw typed client, for callers that need a primitive directly.
    pub fn kv(&self) -> &KvClient {
        &self.kv
    }

    pub fn limits(&self) -> &LimitsConfig {
        &self.limits
    }

    /// Millisecond timestamp for sorted-set scores, strictly increasing
    /// within this process so back-to-back inserts never tie.
    pub(crate) fn next_score(&self) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let prev = self
            .last_score
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(prev + 1)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::store::memory::MemoryExecutor;

    /// Repository over a fresh in-memory store, plus a handle to the store
    /// for fault injection and direct inspection.
    pub fn memory_db(limits: LimitsConfig) -> (Database, Arc<MemoryExecutor>) {
        let store = Arc::new(MemoryExecutor::new());
        let db = Database::new(store.clone(), limits);
        (db, store)
    }

    pub fn default_db() -> (Database, Arc<MemoryExecutor>) {
        memory_db(LimitsConfig::default())
    }
}
