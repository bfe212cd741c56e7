//! Store-wide maintenance commands

use colored::Colorize;
use prettytable::{format, Table};
use serde_json::json;

use super::{print_json, report_action, yes_no};
use crate::bootstrap::{self, StartupReport};
use crate::config::AdminConfig;
use crate::error::{ChatKvError, Result};
use crate::repository::{Database, HealthStatus};

pub async fn run_startup(db: &Database, admin: &AdminConfig, json: bool) -> Result<()> {
    let report = bootstrap::run_startup(db, admin).await?;
    if json {
        return print_json(&report);
    }
    print_startup_report(&report);
    Ok(())
}

fn print_startup_report(report: &StartupReport) {
    println!("{}", "Startup complete".green());
    println!("  Migration:        {}", report.migration);
    println!(
        "  Counter created:  {}",
        yes_no(report.counter_initialized)
    );
    println!("  Admin account:    {:?}", report.admin);
    match report.cleaned_sessions {
        Some(n) => println!("  Sessions cleaned: {}", n),
        None => println!("  Sessions cleaned: {}", "failed".red()),
    }
    match &report.integrity_issues {
        Some(issues) if issues.is_empty() => println!("  Integrity:        {}", "clean".green()),
        Some(issues) => {
            println!("  Integrity:        {} issues", issues.len().to_string().yellow());
            for issue in issues {
                println!("    - {}", issue);
            }
        }
        None => println!("  Integrity:        {}", "check failed".red()),
    }
}

pub async fn show_stats(db: &Database, json: bool) -> Result<()> {
    let stats = db.get_database_stats().await?;
    if json {
        return print_json(&stats);
    }

    println!("\nTotal keys: {}", stats.total_keys.to_string().cyan());
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row!["Key Type".bold(), "Count".bold()]);
    for (prefix, count) in &stats.key_types {
        table.add_row(prettytable::row![prefix, count]);
    }
    table.printstd();

    println!(
        "\nUsers: {} total, {} approved, {} pending",
        stats.user_count, stats.approved_count, stats.pending_count
    );
    if !stats.users.is_empty() {
        let mut table = Table::new();
        table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
        table.add_row(prettytable::row![
            "ID".bold(),
            "Username".bold(),
            "Admin".bold(),
            "Approved".bold(),
            "Sessions".bold()
        ]);
        for user in &stats.users {
            table.add_row(prettytable::row![
                user.id.cyan(),
                user.username,
                yes_no(user.is_admin),
                yes_no(user.is_approved),
                user.session_count
            ]);
        }
        table.printstd();
    }
    println!();
    Ok(())
}

/// Print store health. Exits with an error when the store is unhealthy.
pub async fn show_health(db: &Database, json: bool) -> Result<()> {
    let health = db.get_system_health().await;
    if json {
        print_json(&health)?;
    } else {
        match health.status {
            HealthStatus::Healthy => println!(
                "{} ({} ms)",
                "healthy".green(),
                health.response_time_ms
            ),
            HealthStatus::Unhealthy => println!(
                "{}: {}",
                "unhealthy".red(),
                health.error.as_deref().unwrap_or("no response")
            ),
        }
    }

    match health.status {
        HealthStatus::Healthy => Ok(()),
        HealthStatus::Unhealthy => Err(ChatKvError::Transport(
            health.error.unwrap_or_else(|| "store unhealthy".to_string()),
        )
        .into()),
    }
}

pub async fn run_cleanup(db: &Database, json: bool) -> Result<()> {
    let cleaned = db.cleanup_expired_sessions().await?;
    if json {
        return print_json(&json!({ "cleaned_sessions": cleaned }));
    }
    println!(
        "{}",
        format!("Removed {} dangling session entries", cleaned).green()
    );
    Ok(())
}

pub async fn run_validate(db: &Database, json: bool) -> Result<()> {
    let report = db.validate_data_integrity().await?;
    if json {
        return print_json(&report);
    }

    println!(
        "Checked {} sessions and {} messages",
        report.sessions_checked, report.messages_checked
    );
    if report.is_clean() {
        println!("{}", "No integrity issues found.".green());
    } else {
        println!(
            "{}",
            format!("{} integrity issues:", report.issues.len()).yellow()
        );
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
    Ok(())
}

pub async fn run_migrate(db: &Database, json: bool) -> Result<()> {
    let result = db.migrate_legacy_data().await?;
    report_action(&result, json)
}

pub async fn run_purge(db: &Database, pattern: &str, json: bool) -> Result<()> {
    let deleted = db.bulk_delete_keys(pattern).await?;
    if json {
        return print_json(&json!({ "pattern": pattern, "deleted": deleted }));
    }
    println!(
        "{}",
        format!("Deleted {} keys matching {}", deleted, pattern).green()
    );
    Ok(())
}

pub async fn run_reset(
    db: &Database,
    admin: &AdminConfig,
    confirmation: &str,
    json: bool,
) -> Result<()> {
    let result = bootstrap::reset_system(db, admin, confirmation).await?;
    if !json && !result.success {
        eprintln!("{}", result.message.red());
    }
    report_action(&result, json)?;
    if let (false, Some(report)) = (json, &result.data) {
        print_startup_report(report);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::default_db;

    #[tokio::test]
    async fn test_health_fails_when_store_down() {
        let (db, store) = default_db();
        assert!(show_health(&db, true).await.is_ok());
        store.fail_on("PING");
        assert!(show_health(&db, true).await.is_err());
    }

    #[tokio::test]
    async fn test_reset_without_phrase_is_error() {
        let (db, _) = default_db();
        db.kv().set("keep", "1").await.unwrap();
        assert!(run_reset(&db, &AdminConfig::default(), "please", true)
            .await
            .is_err());
        assert!(db.kv().exists("keep").await.unwrap());
    }

    #[tokio::test]
    async fn test_purge_pattern() {
        let (db, _) = default_db();
        db.kv().set("ai_response:a", "x").await.unwrap();
        db.kv().set("ai_response:b", "y").await.unwrap();
        db.kv().set("other", "z").await.unwrap();

        run_purge(&db, "ai_response:*", true).await.unwrap();
        assert_eq!(db.kv().keys("*").await.unwrap(), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_startup_then_stats() {
        let (db, _) = default_db();
        run_startup(&db, &AdminConfig::default(), true).await.unwrap();
        run_migrate(&db, true).await.unwrap();
        show_stats(&db, true).await.unwrap();
        run_validate(&db, true).await.unwrap();
        run_cleanup(&db, true).await.unwrap();
    }
}
