//! Typed helpers over a [`CommandExecutor`]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{histogram, increment_counter};

use crate::error::Result;
use crate::store::{Command, CommandExecutor, Reply};

/// Typed key-value client.
///
/// Each method issues exactly one command and decodes the reply. Cloning is
/// cheap; clones share the executor.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use chatkv::store::{KvClient, memory::MemoryExecutor};
///
/// # #[tokio::main]
/// # async fn main() -> chatkv::error::Result<()> {
/// let kv = KvClient::new(Arc::new(MemoryExecutor::new()));
/// kv.set("greeting", "hello").await?;
/// assert_eq!(kv.get("greeting").await?, Some("hello".to_string()));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct KvClient {
    executor: Arc<dyn CommandExecutor>,
}

impl KvClient {
    /// Wrap an executor.
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run a raw command, recording metrics and logging failures.
    pub async fn execute(&self, command: Command) -> Result<Reply> {
        let name = command.name();
        let started = Instant::now();
        tracing::debug!(command = %command, "store command");

        let result = self.executor.execute(command).await;

        increment_counter!("chatkv_store_commands_total", "command" => name);
        histogram!(
            "chatkv_store_command_duration_seconds",
            started.elapsed().as_secs_f64(),
            "command" => name
        );
        if let Err(e) = &result {
            increment_counter!("chatkv_store_command_errors_total", "command" => name);
            tracing::error!(command = name, error = %e, "store command failed");
        }

        result
    }

    pub async fn ping(&self) -> Result<String> {
        Ok(self
            .execute(Command::Ping)
            .await?
            .into_opt_string()?
            .unwrap_or_default())
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        self.execute(Command::Get { key: key.into() })
            .await?
            .into_opt_string()
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.execute(Command::Set {
            key: key.into(),
            value: value.into(),
        })
        .await?;
        Ok(())
    }

    /// SET with a TTL, sent as `SETEX key seconds value`.
    pub async fn set_ex(&self, key: &str, value: &str, seconds: u64) -> Result<()> {
        self.execute(Command::SetEx {
            key: key.into(),
            seconds,
            value: value.into(),
        })
        .await?;
        Ok(())
    }

    /// Returns true when the key was written (it did not exist before).
    pub async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        self.execute(Command::SetNx {
            key: key.into(),
            value: value.into(),
        })
        .await?
        .into_bool()
    }

    /// Returns the number of keys removed.
    pub async fn del(&self, key: &str) -> Result<i64> {
        self.execute(Command::Del {
            keys: vec![key.into()],
        })
        .await?
        .into_integer()
    }

    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.execute(Command::Exists { key: key.into() })
            .await?
            .into_bool()
    }

    pub async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.hset_multiple(key, vec![(field.into(), value.into())])
            .await
    }

    pub async fn hset_multiple(&self, key: &str, fields: Vec<(String, String)>) -> Result<()> {
        self.execute(Command::hset(key, fields)?).await?;
        Ok(())
    }

    pub async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        self.execute(Command::HGet {
            key: key.into(),
            field: field.into(),
        })
        .await?
        .into_opt_string()
    }

    /// All fields of a hash; empty when the key does not exist.
    pub async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        self.execute(Command::HGetAll { key: key.into() })
            .await?
            .into_field_map()
    }

    pub async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        self.execute(Command::SAdd {
            key: key.into(),
            member: member.into(),
        })
        .await?;
        Ok(())
    }

    pub async fn srem(&self, key: &str, member: &str) -> Result<()> {
        self.execute(Command::SRem {
            key: key.into(),
            member: member.into(),
        })
        .await?;
        Ok(())
    }

    pub async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        self.execute(Command::SMembers { key: key.into() })
            .await?
            .into_string_list()
    }

    pub async fn zadd(&self, key: &str, score: i64, member: &str) -> Result<()> {
        self.execute(Command::ZAdd {
            key: key.into(),
            score,
            member: member.into(),
        })
        .await?;
        Ok(())
    }

    /// Members by ascending score; negative offsets count from the tail.
    pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.execute(Command::ZRange {
            key: key.into(),
            start,
            stop,
        })
        .await?
        .into_string_list()
    }

    /// Members by descending score.
    pub async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.execute(Command::ZRevRange {
            key: key.into(),
            start,
            stop,
        })
        .await?
        .into_string_list()
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<()> {
        self.execute(Command::ZRem {
            key: key.into(),
            member: member.into(),
        })
        .await?;
        Ok(())
    }

    pub async fn zcard(&self, key: &str) -> Result<i64> {
        self.execute(Command::ZCard { key: key.into() })
            .await?
            .into_integer()
    }

    pub async fn incr(&self, key: &str) -> Result<i64> {
        self.execute(Command::Incr { key: key.into() })
            .await?
            .into_integer()
    }

    pub async fn expire(&self, key: &str, seconds: u64) -> Result<bool> {
        self.execute(Command::Expire {
            key: key.into(),
            seconds,
        })
        .await?
        .into_bool()
    }

    pub async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.execute(Command::Keys {
            pattern: pattern.into(),
        })
        .await?
        .into_string_list()
    }

    pub async fn flushdb(&self) -> Result<()> {
        self.execute(Command::FlushDb).await?;
        Ok(())
    }
}
