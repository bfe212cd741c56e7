use colored::Colorize;
use prettytable::{format, Table};
use serde_json::json;

use super::{print_json, report_action, truncate};
use crate::cli::SessionCommand;
use crate::error::{ChatKvError, Result};
use crate::models::{Message, Role};
use crate::repository::Database;

/// Handle `chatkv sessions ...`
pub async fn handle_sessions(db: &Database, command: SessionCommand, json: bool) -> Result<()> {
    match command {
        SessionCommand::List { user_id } => {
            let sessions = db.get_user_chat_sessions(&user_id).await?;
            if json {
                return print_json(&sessions);
            }
            if sessions.is_empty() {
                println!("{}", format!("No sessions for user {}.", user_id).yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Created".bold(),
                "Last Updated".bold()
            ]);
            for session in sessions {
                table.add_row(prettytable::row![
                    session.id.cyan(),
                    truncate(&session.title, 40),
                    session.created_at.format("%Y-%m-%d %H:%M").to_string(),
                    session.updated_at.format("%Y-%m-%d %H:%M").to_string()
                ]);
            }

            println!("\nChat Sessions for {}:", user_id);
            table.printstd();
            println!();
        }
        SessionCommand::Show { session_id, limit } => {
            let Some(session) = db.get_chat_session(&session_id).await? else {
                return Err(
                    ChatKvError::Validation(format!("Session not found: {}", session_id)).into(),
                );
            };
            let messages = db.get_session_messages(&session_id, limit).await?;
            if json {
                return print_json(&json!({ "session": session, "messages": messages }));
            }

            println!("\n{} {}", session.title.bold(), format!("({})", session.id).dimmed());
            print_messages(&messages);
        }
        SessionCommand::Create { user_id, title } => {
            if db.get_user_by_id(&user_id).await?.is_none() {
                return Err(ChatKvError::Validation(format!("User not found: {}", user_id)).into());
            }
            let session = db.create_chat_session(&user_id, title.as_deref()).await?;
            if json {
                return print_json(&session);
            }
            println!(
                "{}",
                format!("Created session {} \"{}\"", session.id, session.title).green()
            );
        }
        SessionCommand::AddMessage {
            session_id,
            user_id,
            role,
            content,
        } => {
            let role: Role = role.parse()?;
            let message = db.save_message(&user_id, role, &content, &session_id).await?;
            if json {
                return print_json(&message);
            }
            println!("{}", format!("Stored message {}", message.id).green());
        }
        SessionCommand::Rename { session_id, title } => {
            let result = db.rename_chat_session(&session_id, &title).await?;
            if !json && !result.success {
                eprintln!("{}", result.message.red());
            }
            report_action(&result, json)?;
        }
        SessionCommand::Delete {
            user_id,
            session_id,
        } => {
            let counts = db.delete_chat_session(&user_id, &session_id).await?;
            if json {
                return print_json(&counts);
            }
            println!(
                "{}",
                format!(
                    "Deleted session {} ({} messages)",
                    session_id, counts.messages
                )
                .green()
            );
        }
        SessionCommand::Clear { session_id } => {
            let removed = db.clear_session_messages(&session_id).await?;
            if json {
                return print_json(&json!({ "removed": removed }));
            }
            println!("{}", format!("Removed {} messages", removed).green());
        }
    }

    Ok(())
}

fn print_messages(messages: &[Message]) {
    if messages.is_empty() {
        println!("{}", "No messages.".yellow());
        return;
    }

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BORDERS_ONLY);
    table.add_row(prettytable::row![
        "Time".bold(),
        "Role".bold(),
        "Content".bold()
    ]);
    for message in messages {
        let role = match message.role {
            Role::User => message.role.as_str().cyan(),
            Role::Assistant => message.role.as_str().magenta(),
        };
        table.add_row(prettytable::row![
            message.timestamp.format("%H:%M:%S").to_string(),
            role,
            truncate(&message.content, 60)
        ]);
    }
    table.printstd();
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::repository::test_support::default_db;

    #[tokio::test]
    async fn test_create_add_and_clear() {
        let (db, _) = default_db();
        let user = db.save_user(User::pending("carol", "h")).await.unwrap();

        handle_sessions(
            &db,
            SessionCommand::Create {
                user_id: user.id.clone(),
                title: Some("Plans".into()),
            },
            true,
        )
        .await
        .unwrap();
        let sessions = db.get_user_chat_sessions(&user.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        let session_id = sessions[0].id.clone();

        handle_sessions(
            &db,
            SessionCommand::AddMessage {
                session_id: session_id.clone(),
                user_id: user.id.clone(),
                role: "assistant".into(),
                content: "hello".into(),
            },
            true,
        )
        .await
        .unwrap();
        let messages = db.get_all_session_messages(&session_id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Assistant);

        handle_sessions(&db, SessionCommand::Clear { session_id: session_id.clone() }, true)
            .await
            .unwrap();
        assert!(db.get_all_session_messages(&session_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_for_unknown_user_fails() {
        let (db, _) = default_db();
        let result = handle_sessions(
            &db,
            SessionCommand::Create {
                user_id: "nobody".into(),
                title: None,
            },
            true,
        )
        .await;
        assert!(result.is_err());
        assert!(db.kv().keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_role_rejected() {
        let (db, _) = default_db();
        let result = handle_sessions(
            &db,
            SessionCommand::AddMessage {
                session_id: "s".into(),
                user_id: "1".into(),
                role: "system".into(),
                content: "x".into(),
            },
            true,
        )
        .await;
        assert!(result.is_err());
    }
}
