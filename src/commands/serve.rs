use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::Config;
use crate::error::{ChatKvError, Result};
use crate::proxy;
use crate::store::memory::MemoryExecutor;

/// Serve the command proxy over a fresh in-memory store until Ctrl-C.
pub async fn run_serve(config: &Config) -> Result<()> {
    let bind = &config.proxy.bind;
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| ChatKvError::Config(format!("Cannot bind {}: {}", bind, e)))?;

    tracing::warn!("Serving an in-memory store; data is lost on exit");
    let executor = Arc::new(MemoryExecutor::new());
    proxy::serve(listener, executor, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_failure_is_config_error() {
        let mut config = Config::default();
        config.proxy.bind = "not-an-address".to_string();
        let err = run_serve(&config).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ChatKvError>(),
            Some(ChatKvError::Config(_))
        ));
    }
}
