use colored::Colorize;
use prettytable::{format, Table};

use super::{print_json, report_action, yes_no};
use crate::cli::UserCommand;
use crate::config::AdminConfig;
use crate::error::{ChatKvError, Result};
use crate::models::User;
use crate::repository::{keys, Database};

/// Handle `chatkv users ...`
pub async fn handle_users(
    db: &Database,
    admin: &AdminConfig,
    command: UserCommand,
    json: bool,
) -> Result<()> {
    match command {
        UserCommand::List => {
            let users = db.get_all_users().await?;
            print_users(&users, "Users", json)?;
        }
        UserCommand::Pending => {
            let users = db.get_pending_users().await?;
            print_users(&users, "Pending Users", json)?;
        }
        UserCommand::Show { id } => {
            let Some(user) = db.get_user_by_id(&id).await? else {
                return Err(ChatKvError::Validation(format!("User not found: {}", id)).into());
            };
            if json {
                print_json(&user)?;
            } else {
                print_users(std::slice::from_ref(&user), "User", false)?;
                let sessions = db.kv().zcard(&keys::user_sessions(&id)).await?;
                println!("Sessions: {}", sessions);
            }
        }
        UserCommand::Register {
            username,
            password,
            confirm,
        } => {
            let confirm = confirm.unwrap_or_else(|| password.clone());
            let result = db.register_user(&username, &password, &confirm).await?;
            show_refusal(&result.message, result.success, json);
            report_action(&result, json)?;
            if let (false, Some(user)) = (json, &result.data) {
                println!("Assigned id {}", user.id.cyan());
            }
        }
        UserCommand::Approve { id } => {
            let result = db.approve_user(&id).await?;
            show_refusal(&result.message, result.success, json);
            report_action(&result, json)?;
        }
        UserCommand::Reject { id } => {
            let result = db.reject_user(&id).await?;
            show_refusal(&result.message, result.success, json);
            report_action(&result, json)?;
        }
        UserCommand::Delete { id } => {
            let result = db.delete_user(&id).await?;
            show_refusal(&result.message, result.success, json);
            report_action(&result, json)?;
            if let (false, Some(counts)) = (json, result.data) {
                println!(
                    "Removed {} sessions and {} messages",
                    counts.sessions, counts.messages
                );
            }
        }
        UserCommand::Promote { id, revoke } => {
            // Admins are always approved; revoking leaves approval untouched.
            let existing = db.get_user_by_id(&id).await?;
            let bootstrap = existing
                .as_ref()
                .filter(|user| revoke && is_bootstrap_admin(user, admin));
            if let Some(user) = bootstrap {
                tracing::warn!(user_id = %user.id, "Revoking admin rights of the bootstrap admin");
                if !json {
                    eprintln!(
                        "{}",
                        format!(
                            "Warning: {} is the configured admin; without admin rights it can be deleted. Startup restores the rights.",
                            user.username
                        )
                        .yellow()
                    );
                }
            }
            let is_approved = existing.map_or(true, |user| user.is_approved || !revoke);
            let result = db.update_user_privileges(&id, !revoke, is_approved).await?;
            show_refusal(&result.message, result.success, json);
            report_action(&result, json)?;
        }
        UserCommand::Export { id } => {
            let result = db.export_user_data(&id).await?;
            if json {
                report_action(&result, true)?;
            } else {
                show_refusal(&result.message, result.success, false);
                match &result.data {
                    Some(export) => print_json(export)?,
                    None => report_action(&result, false)?,
                }
            }
        }
        UserCommand::ClearData { id } => {
            let result = db.clear_all_user_data(&id).await?;
            show_refusal(&result.message, result.success, json);
            report_action(&result, json)?;
        }
    }

    Ok(())
}

/// The account `startup` creates and repairs from config.
fn is_bootstrap_admin(user: &User, admin: &AdminConfig) -> bool {
    user.id == admin.user_id || user.username == admin.username
}

fn show_refusal(message: &str, success: bool, json: bool) {
    if !json && !success {
        eprintln!("{}", message.red());
    }
}

fn print_users(users: &[User], heading: &str, json: bool) -> Result<()> {
    if json {
        return print_json(&users);
    }

    if users.is_empty() {
        println!("{}", "No users found.".yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "ID".bold(),
        "Username".bold(),
        "Admin".bold(),
        "Approved".bold(),
        "Created".bold()
    ]);

    for user in users {
        table.add_row(prettytable::row![
            user.id.cyan(),
            user.username,
            yes_no(user.is_admin),
            yes_no(user.is_approved),
            user.created_at.format("%Y-%m-%d %H:%M").to_string()
        ]);
    }

    println!("\n{}:", heading);
    table.printstd();
    println!();
    Ok(())
}
