//! Command-line interface definition for chatkv
//!
//! This module defines the CLI structure using clap's derive API, providing
//! admin commands over the chat data store and the `serve` command proxy.

use clap::{Parser, Subcommand};

/// chatkv - chat data store administration
///
/// Inspect and maintain users, chat sessions and messages held in a
/// Redis-like store behind an HTTP command proxy.
#[derive(Parser, Debug, Clone)]
#[command(name = "chatkv")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the command proxy URL from config
    #[arg(long)]
    pub store_url: Option<String>,

    /// Print results as JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for chatkv
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the startup sequence (migration, counter, admin, cleanup, integrity)
    Startup,

    /// Manage user accounts
    Users {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Manage chat sessions and messages
    Sessions {
        #[command(subcommand)]
        command: SessionCommand,
    },

    /// Show key and user statistics
    Stats,

    /// Check store connectivity and latency
    Health,

    /// Remove session index entries whose session is gone
    Cleanup,

    /// Report orphaned sessions and messages
    Validate,

    /// Apply pending data migrations
    Migrate,

    /// Delete every key matching a glob pattern
    Purge {
        /// Glob pattern, e.g. `ai_response:*`
        pattern: String,
    },

    /// Flush the whole store and re-run startup
    Reset {
        /// Must be exactly RESET_ALL_DATA
        #[arg(long)]
        confirm: String,
    },

    /// Serve the HTTP command proxy over an in-memory store
    Serve {
        /// Override the bind address from config
        #[arg(short, long)]
        bind: Option<String>,
    },
}

/// User management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// List all users
    List,

    /// List users awaiting approval
    Pending,

    /// Show one user by id
    Show {
        /// User id
        id: String,
    },

    /// Register a new pending user
    Register {
        username: String,

        #[arg(long)]
        password: String,

        /// Password confirmation (defaults to --password)
        #[arg(long)]
        confirm: Option<String>,
    },

    /// Approve a pending user
    Approve { id: String },

    /// Reject (remove) a pending user
    Reject { id: String },

    /// Delete a user and all of their chat data
    Delete { id: String },

    /// Grant admin rights, or revoke them with --revoke
    Promote {
        id: String,

        #[arg(long)]
        revoke: bool,
    },

    /// Dump a user's account, sessions and messages
    Export { id: String },

    /// Delete a user's sessions, messages and rate-limit window
    ClearData { id: String },
}

/// Chat session subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List a user's sessions, most recent first
    List { user_id: String },

    /// Show a session and its latest messages
    Show {
        session_id: String,

        /// Number of trailing messages to show
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Create a session for a user
    Create {
        user_id: String,

        #[arg(short, long)]
        title: Option<String>,
    },

    /// Append a message to a session
    AddMessage {
        session_id: String,

        #[arg(long)]
        user_id: String,

        /// user or assistant
        #[arg(long, default_value = "user")]
        role: String,

        content: String,
    },

    /// Change a session's title
    Rename { session_id: String, title: String },

    /// Delete a session and its messages
    Delete { user_id: String, session_id: String },

    /// Delete a session's messages but keep the session
    Clear { session_id: String },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            store_url: None,
            json: false,
            command: Commands::Health,
        }
    }
}
