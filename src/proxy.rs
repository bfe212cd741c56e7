//! HTTP command proxy
//!
//! Exposes any [`CommandExecutor`] over the same wire protocol that
//! [`crate::store::http::HttpExecutor`] speaks, so the CLI and tests can run
//! against a local in-memory store.
//!
//! # Endpoints
//!
//! ```text
//! POST /       {"command": ["HGETALL", "user:1001"]}  -> raw JSON reply
//! GET  /ping                                          -> "PONG"
//! GET  /info                                          -> {"server": .., "keys": ..}
//! ```
//!
//! Bodies that are not a command array, or name an unsupported command, get
//! `400 {"error": ..}`. Execution failures get `500 {"error": ..}`.

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::error::{ChatKvError, Result};
use crate::store::{Command, CommandExecutor};

#[derive(Debug, Deserialize)]
struct CommandBody {
    command: Vec<Value>,
}

type ProxyState = Arc<dyn CommandExecutor>;

/// Build the proxy router over `executor`.
pub fn router(executor: Arc<dyn CommandExecutor>) -> Router {
    Router::new()
        .route("/", post(execute_command))
        .route("/ping", get(ping))
        .route("/info", get(info))
        .with_state(executor)
}

/// Serve the proxy on `listener` until `shutdown` resolves.
pub async fn serve<F>(
    listener: TcpListener,
    executor: Arc<dyn CommandExecutor>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!("Command proxy listening on http://{}", addr);
    axum::serve(listener, router(executor))
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("Command proxy stopped");
    Ok(())
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Command arguments may arrive as strings or bare numbers.
fn to_args(parts: Vec<Value>) -> std::result::Result<Vec<String>, String> {
    parts
        .into_iter()
        .map(|part| match part {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("Command arguments must be strings, got {}", other)),
        })
        .collect()
}

async fn execute_command(
    State(executor): State<ProxyState>,
    body: std::result::Result<Json<CommandBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(rejection = %rejection.body_text(), "Rejected proxy request body");
            return error_response(StatusCode::BAD_REQUEST, "Command must be an array");
        }
    };

    let args = match to_args(body.command) {
        Ok(args) => args,
        Err(message) => return error_response(StatusCode::BAD_REQUEST, message),
    };

    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    match executor.execute(command).await {
        Ok(reply) => Json(reply.to_json()).into_response(),
        Err(e) => {
            let message = match e.downcast_ref::<ChatKvError>() {
                Some(ChatKvError::Transport(m)) => m.clone(),
                _ => e.to_string(),
            };
            tracing::debug!(error = %message, "Proxied command failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, message)
        }
    }
}

async fn ping(State(executor): State<ProxyState>) -> Response {
    match executor.execute(Command::Ping).await {
        Ok(reply) => Json(reply.to_json()).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn info(State(executor): State<ProxyState>) -> Response {
    let keys = executor
        .execute(Command::Keys {
            pattern: "*".into(),
        })
        .await
        .and_then(|reply| reply.into_string_list());
    match keys {
        Ok(keys) => Json(json!({
            "server": "chatkv",
            "version": env!("CARGO_PKG_VERSION"),
            "keys": keys.len(),
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
