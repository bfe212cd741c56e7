//! Cross-cutting repository scenarios against the in-memory store

mod common;

use std::time::Duration;

use chatkv::bootstrap::run_startup;
use chatkv::config::{AdminConfig, LimitsConfig};
use chatkv::models::User;
use chatkv::repository::keys;
use chatkv::{Refusal, Role};

#[tokio::test]
async fn test_user_roundtrip_by_username() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    let saved = db
        .save_user(User::pending("dora", db.hash_password("pw1234")))
        .await
        .unwrap();

    let loaded = db.get_user_by_username("dora").await.unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[tokio::test]
async fn test_session_cap_evicts_oldest_with_messages() {
    let (db, _) = common::memory_db(LimitsConfig {
        max_chats_per_user: 3,
        ..LimitsConfig::default()
    });
    let user = db.save_user(User::pending("eve", "h")).await.unwrap();

    let oldest = db.create_chat_session(&user.id, None).await.unwrap();
    db.save_message(&user.id, Role::User, "old", &oldest.id)
        .await
        .unwrap();
    for _ in 0..3 {
        db.create_chat_session(&user.id, None).await.unwrap();
    }

    let sessions = db.get_user_chat_sessions(&user.id).await.unwrap();
    assert_eq!(sessions.len(), 3);
    assert!(sessions.iter().all(|s| s.id != oldest.id));
    assert!(!db
        .kv()
        .exists(&keys::session_messages(&oldest.id))
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_window_resets() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    let window = db.limits().rate_limit_window;

    for _ in 0..3 {
        assert!(db.check_rate_limit("1001", 3).await.unwrap());
    }
    assert!(!db.check_rate_limit("1001", 3).await.unwrap());

    tokio::time::advance(Duration::from_secs(window + 1)).await;
    assert!(db.check_rate_limit("1001", 3).await.unwrap());
}

#[tokio::test]
async fn test_delete_user_protects_admin_and_cascades() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    run_startup(&db, &AdminConfig::default()).await.unwrap();

    let refused = db.delete_user("admin").await.unwrap();
    assert_eq!(refused.refusal, Some(Refusal::Forbidden));
    assert!(db.get_user_by_id("admin").await.unwrap().is_some());

    let user = db.save_user(User::pending("finn", "h")).await.unwrap();
    let session = db.create_chat_session(&user.id, None).await.unwrap();
    let message = db
        .save_message(&user.id, Role::User, "bye", &session.id)
        .await
        .unwrap();

    let deleted = db.delete_user(&user.id).await.unwrap();
    assert!(deleted.is_success());
    assert!(db.get_user_by_id(&user.id).await.unwrap().is_none());
    assert!(db.get_user_by_username("finn").await.unwrap().is_none());
    assert!(db.get_chat_session(&session.id).await.unwrap().is_none());
    assert!(!db.kv().exists(&keys::message(&message.id)).await.unwrap());
}

#[tokio::test]
async fn test_reject_only_pending_users() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    let pending = db.save_user(User::pending("gus", "h")).await.unwrap();
    let mut approved = User::pending("hal", "h");
    approved.is_approved = true;
    let approved = db.save_user(approved).await.unwrap();

    let refused = db.reject_user(&approved.id).await.unwrap();
    assert!(!refused.is_success());
    assert_eq!(
        db.get_user_by_id(&approved.id).await.unwrap(),
        Some(approved)
    );

    assert!(db.reject_user(&pending.id).await.unwrap().is_success());
    assert!(db.get_user_by_id(&pending.id).await.unwrap().is_none());
    assert!(db.get_user_by_username("gus").await.unwrap().is_none());
}

#[tokio::test]
async fn test_latest_message_window_of_one() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    let session = db.create_chat_session("1001", None).await.unwrap();
    db.save_message("1001", Role::User, "first", &session.id)
        .await
        .unwrap();
    let last = db
        .save_message("1001", Role::Assistant, "second", &session.id)
        .await
        .unwrap();

    let window = db.get_session_messages(&session.id, Some(1)).await.unwrap();
    assert_eq!(window, vec![last]);
}

#[tokio::test]
async fn test_approval_flow() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    run_startup(&db, &AdminConfig::default()).await.unwrap();

    let alice = db
        .register_user("alice", "secret1", "secret1")
        .await
        .unwrap()
        .data
        .unwrap();
    let before = db.get_pending_users_count().await.unwrap();
    assert!(db.approve_user(&alice.id).await.unwrap().is_success());
    assert_eq!(db.get_pending_users_count().await.unwrap(), before - 1);

    let all = db.get_all_users().await.unwrap();
    let listed = all.iter().find(|u| u.username == "alice").unwrap();
    assert!(listed.is_approved);
}

#[tokio::test]
async fn test_single_session_cap_keeps_store_consistent() {
    let (db, _) = common::memory_db(LimitsConfig {
        max_chats_per_user: 1,
        ..LimitsConfig::default()
    });
    let user = db.save_user(User::pending("ivy", "h")).await.unwrap();

    let first = db.create_chat_session(&user.id, None).await.unwrap();
    let second = db.create_chat_session(&user.id, None).await.unwrap();

    let ids: Vec<_> = db
        .get_user_chat_sessions(&user.id)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec![second.id]);
    assert!(db.get_chat_session(&first.id).await.unwrap().is_none());
    assert!(db.validate_data_integrity().await.unwrap().is_clean());
}

#[tokio::test]
async fn test_cleanup_removes_dangling_session_entry() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    let user = db.save_user(User::pending("jo", "h")).await.unwrap();
    let session = db.create_chat_session(&user.id, None).await.unwrap();

    db.kv().del(&keys::session(&session.id)).await.unwrap();
    assert_eq!(db.cleanup_expired_sessions().await.unwrap(), 1);
    assert!(db.get_user_chat_sessions(&user.id).await.unwrap().is_empty());
    assert_eq!(db.cleanup_expired_sessions().await.unwrap(), 0);
}

#[tokio::test]
async fn test_maintenance_scans_see_keys_with_slashes() {
    let (db, _) = common::memory_db(LimitsConfig::default());
    let user = db.save_user(User::pending("ops/team", "h")).await.unwrap();
    db.create_chat_session("tenant/1", None).await.unwrap();

    let stats = db.get_database_stats().await.unwrap();
    assert_eq!(stats.key_types.get("username"), Some(&1));
    assert_eq!(stats.key_types.get("session"), Some(&1));

    let report = db.validate_data_integrity().await.unwrap();
    assert_eq!(report.sessions_checked, 1);
    assert_eq!(report.issues.len(), 1);

    assert_eq!(db.bulk_delete_keys("username:*").await.unwrap(), 1);
    assert!(db.get_user_by_username(&user.username).await.unwrap().is_none());
}
