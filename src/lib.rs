//! chatkv - chat data access over a Redis-like key-value store
//!
//! This library maps users, chat sessions and messages onto the primitives
//! of a Redis-like store reached through an HTTP command proxy, and provides
//! the admin CLI and a local proxy server.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `store`: command model, reply decoding, executors (HTTP and in-memory)
//! - `models`: `User`, `ChatSession`, `Message` and their field-map codecs
//! - `repository`: entity operations, approval workflow, rate limits, cache,
//!   maintenance scans
//! - `bootstrap`: startup sequence and system reset
//! - `proxy`: HTTP command proxy server
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli` / `commands`: Command-line interface and handlers
//!
//! # Example
//!
//! ```no_run
//! use chatkv::{Config, Database};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let db = Database::connect(&config).await?;
//!     let pending = db.get_pending_users().await?;
//!     println!("{} users awaiting approval", pending.len());
//!     Ok(())
//! }
//! ```

pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod repository;
pub mod store;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChatKvError, Refusal, Result};
pub use models::{ChatSession, Message, Role, User};
pub use repository::{ActionResult, Database};
