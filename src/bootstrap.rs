//! Startup sequence and system reset
//!
//! [`run_startup`] brings a store into a usable state:
//!
//! 1. ping the store
//! 2. apply migrations
//! 3. seed `user_id_counter` (exactly once)
//! 4. create or repair the admin account
//! 5. clean up dangling session entries
//! 6. check data integrity
//!
//! Steps 1 to 4 abort startup on failure. Steps 5 and 6 only log a warning.

use serde::Serialize;

use crate::config::AdminConfig;
use crate::error::{Refusal, Result};
use crate::repository::{keys, ActionResult, AdminStatus, Database, IntegrityIssue};

/// Confirmation phrase required by [`reset_system`].
pub const RESET_CONFIRMATION: &str = "RESET_ALL_DATA";

/// What each startup step did.
#[derive(Debug, Clone, Serialize)]
pub struct StartupReport {
    pub migration: String,
    /// True when this run created the counter
    pub counter_initialized: bool,
    pub admin: AdminStatus,
    /// `None` when the cleanup step failed
    pub cleaned_sessions: Option<usize>,
    /// `None` when the integrity scan failed
    pub integrity_issues: Option<Vec<IntegrityIssue>>,
}

/// Seed the user id counter with `user_id_counter_start` unless it exists.
///
/// Uses SETNX so concurrent startups cannot both write it. Returns whether
/// this call created it.
pub async fn initialize_user_id_counter(db: &Database) -> Result<bool> {
    let start = db.limits().user_id_counter_start;
    let created = db
        .kv()
        .set_nx(keys::USER_ID_COUNTER, &start.to_string())
        .await?;
    if created {
        tracing::info!(start, "Initialized user id counter");
    } else {
        let current = db.kv().get(keys::USER_ID_COUNTER).await?;
        tracing::debug!(current = ?current, "User id counter already present");
    }
    Ok(created)
}

/// Run the full startup sequence.
///
/// # Errors
///
/// Fails when the store is unreachable, or when migration, counter
/// initialisation or admin bootstrap fail.
pub async fn run_startup(db: &Database, admin: &AdminConfig) -> Result<StartupReport> {
    tracing::info!("Running startup");
    db.kv().ping().await?;

    let migration = db.migrate_legacy_data().await?.message;
    tracing::info!("{}", migration);

    let counter_initialized = initialize_user_id_counter(db).await?;
    let admin_status = db.ensure_admin_user(admin).await?;

    let cleaned_sessions = match db.cleanup_expired_sessions().await {
        Ok(cleaned) => Some(cleaned),
        Err(e) => {
            tracing::warn!(error = %e, "Session cleanup failed, continuing");
            None
        }
    };

    let integrity_issues = match db.validate_data_integrity().await {
        Ok(report) => {
            for issue in &report.issues {
                tracing::warn!("Integrity issue: {}", issue);
            }
            Some(report.issues)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Integrity check failed, continuing");
            None
        }
    };

    tracing::info!("Startup complete");
    Ok(StartupReport {
        migration,
        counter_initialized,
        admin: admin_status,
        cleaned_sessions,
        integrity_issues,
    })
}

/// Flush every key and run startup again. Refused unless `confirmation` is
/// exactly [`RESET_CONFIRMATION`].
pub async fn reset_system(
    db: &Database,
    admin: &AdminConfig,
    confirmation: &str,
) -> Result<ActionResult<StartupReport>> {
    if confirmation != RESET_CONFIRMATION {
        return Ok(ActionResult::refused(
            Refusal::InvalidInput,
            format!("Confirmation must be {}", RESET_CONFIRMATION),
        ));
    }

    tracing::warn!("Flushing all data");
    db.kv().flushdb().await?;
    let report = run_startup(db, admin).await?;
    Ok(ActionResult::ok_with("System reset complete", report))
}
