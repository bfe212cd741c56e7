//! Rate-limit windows and the response cache

use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::repository::{keys, Database};

/// Hex SHA-256 of a prompt, the key under which its response is cached.
pub fn prompt_hash(prompt: &str) -> String {
    format!("{:x}", Sha256::digest(prompt.as_bytes()))
}

impl Database {
    /// Count one request against the user's fixed window.
    ///
    /// INCR the counter; the call that creates it (value 1) also sets the
    /// window TTL. Returns whether the request is within `max`.
    pub async fn check_rate_limit(&self, user_id: &str, max: i64) -> Result<bool> {
        let key = keys::rate_limit(user_id);
        let current = self.kv.incr(&key).await?;
        if current == 1 {
            self.kv.expire(&key, self.limits.rate_limit_window).await?;
        }
        let allowed = current <= max;
        if !allowed {
            tracing::debug!(user_id, current, max, "Rate limit exceeded");
        }
        Ok(allowed)
    }

    /// Cached response for `prompt_hash`. Store failures count as a miss.
    pub async fn get_cached_response(&self, prompt_hash: &str) -> Option<String> {
        match self.kv.get(&keys::ai_response(prompt_hash)).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(error = %e, "Response cache lookup failed");
                None
            }
        }
    }

    /// Store `response` under `prompt_hash` for `chat_cache_ttl` seconds.
    /// Store failures are logged and ignored.
    pub async fn cache_response(&self, prompt_hash: &str, response: &str) {
        if let Err(e) = self
            .kv
            .set_ex(
                &keys::ai_response(prompt_hash),
                response,
                self.limits.chat_cache_ttl,
            )
            .await
        {
            tracing::warn!(error = %e, "Response cache write failed");
        }
    }
}
