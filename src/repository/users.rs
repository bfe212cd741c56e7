//! User accounts and the registration/approval workflow

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::AdminConfig;
use crate::error::{ChatKvError, Refusal, Result};
use crate::models::User;
use crate::repository::{keys, ActionResult, Database, DeletedCounts};

const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=50;
const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 6..=128;
const USERNAME_PATTERN: &str = r"^[a-zA-Z0-9_-]+$";

/// What [`Database::ensure_admin_user`] had to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminStatus {
    Created,
    Repaired,
    Unchanged,
}

impl Database {
    /// Draw the next numeric user id with a single INCR.
    pub async fn next_user_id(&self) -> Result<String> {
        Ok(self.kv.incr(keys::USER_ID_COUNTER).await?.to_string())
    }

    /// Persist `user`, assigning an id first if it has none.
    ///
    /// Rewrites the hash, points the username index at the id and adds the
    /// id to `users`. When an existing user was renamed the old username
    /// index is dropped.
    pub async fn save_user(&self, mut user: User) -> Result<User> {
        if user.id.is_empty() {
            user.id = self.next_user_id().await?;
        } else if let Some(previous) = self.kv.hget(&keys::user(&user.id), "username").await? {
            if previous != user.username {
                tracing::info!(user_id = %user.id, from = %previous, to = %user.username, "Username changed");
                self.kv.del(&keys::username(&previous)).await?;
            }
        }

        self.kv
            .hset_multiple(&keys::user(&user.id), user.to_fields())
            .await?;
        self.kv
            .set(&keys::username(&user.username), &user.id)
            .await?;
        self.kv.sadd(keys::USERS, &user.id).await?;

        tracing::debug!(user_id = %user.id, username = %user.username, "Saved user");
        Ok(user)
    }

    pub async fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        let fields = self.kv.hgetall(&keys::user(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        User::from_fields(&fields).map(Some)
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.kv.get(&keys::username(username)).await? {
            Some(id) => self.get_user_by_id(&id).await,
            None => Ok(None),
        }
    }

    /// Every user in `users`, oldest first. Ids whose hash is gone are
    /// skipped.
    pub async fn get_all_users(&self) -> Result<Vec<User>> {
        let ids = self.kv.smembers(keys::USERS).await?;
        let mut users = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_user_by_id(&id).await? {
                Some(user) => users.push(user),
                None => tracing::debug!(user_id = %id, "users set references a missing user"),
            }
        }
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(users)
    }

    /// Users that are neither approved nor admin.
    pub async fn get_pending_users(&self) -> Result<Vec<User>> {
        Ok(self
            .get_all_users()
            .await?
            .into_iter()
            .filter(User::is_pending)
            .collect())
    }

    pub async fn get_pending_users_count(&self) -> Result<usize> {
        Ok(self.get_pending_users().await?.len())
    }

    pub async fn approve_user(&self, id: &str) -> Result<ActionResult<User>> {
        let Some(mut user) = self.get_user_by_id(id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "User not found"));
        };
        if user.is_approved {
            return Ok(ActionResult::refused(
                Refusal::AlreadyApproved,
                "User is already approved",
            ));
        }

        user.is_approved = true;
        let user = self.save_user(user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "Approved user");
        Ok(ActionResult::ok_with(
            format!("User {} approved successfully", user.username),
            user,
        ))
    }

    /// Remove a pending registration. No cascade: a pending user owns no
    /// sessions.
    pub async fn reject_user(&self, id: &str) -> Result<ActionResult> {
        let Some(user) = self.get_user_by_id(id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "User not found"));
        };
        if user.is_approved {
            return Ok(ActionResult::refused(
                Refusal::InvalidState,
                "Cannot reject approved user",
            ));
        }

        self.kv.del(&keys::user(id)).await?;
        self.kv.del(&keys::username(&user.username)).await?;
        self.kv.srem(keys::USERS, id).await?;

        tracing::info!(user_id = %id, username = %user.username, "Rejected user");
        Ok(ActionResult::ok(format!(
            "User {} rejected and deleted",
            user.username
        )))
    }

    /// Delete a non-admin user together with every session, message and the
    /// rate-limit window.
    pub async fn delete_user(&self, id: &str) -> Result<ActionResult<DeletedCounts>> {
        let Some(user) = self.get_user_by_id(id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "User not found"));
        };
        if user.is_admin {
            return Ok(ActionResult::refused(
                Refusal::Forbidden,
                "Cannot delete admin user",
            ));
        }

        let deleted = self.delete_all_sessions(id).await?;
        self.kv.del(&keys::rate_limit(id)).await?;
        self.kv.del(&keys::user(id)).await?;
        self.kv.del(&keys::username(&user.username)).await?;
        self.kv.srem(keys::USERS, id).await?;

        tracing::info!(
            user_id = %id,
            sessions = deleted.sessions,
            messages = deleted.messages,
            "Deleted user"
        );
        Ok(ActionResult::ok_with(
            format!("Successfully deleted user {}", user.username),
            deleted,
        ))
    }

    /// Set both privilege flags on an existing user.
    pub async fn update_user_privileges(
        &self,
        id: &str,
        is_admin: bool,
        is_approved: bool,
    ) -> Result<ActionResult<User>> {
        let Some(mut user) = self.get_user_by_id(id).await? else {
            return Ok(ActionResult::refused(Refusal::NotFound, "User not found"));
        };
        user.is_admin = is_admin;
        user.is_approved = is_approved;
        let user = self.save_user(user).await?;
        tracing::info!(user_id = %id, is_admin, is_approved, "Updated user privileges");
        Ok(ActionResult::ok_with(
            format!("Updated privileges for {}", user.username),
            user,
        ))
    }

    /// Hex SHA-256 of `password` followed by the configured salt.
    pub fn hash_password(&self, password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(password.as_bytes());
        hasher.update(self.password_salt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// The user, if `username` exists and `password` matches its hash.
    /// Pending users are returned too; callers check `is_approved`.
    pub async fn verify_credentials(&self, username: &str, password: &str) -> Result<Option<User>> {
        let Some(user) = self.get_user_by_username(username).await? else {
            return Ok(None);
        };
        if user.password_hash == self.hash_password(password) {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    /// Validate and store a new pending registration.
    pub async fn register_user(
        &self,
        username: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<ActionResult<User>> {
        if let Some(problem) = validate_registration(username, password, confirm_password)? {
            return Ok(ActionResult::refused(Refusal::InvalidInput, problem));
        }

        let pending = self.get_pending_users_count().await?;
        let max_pending = self.limits.max_pending_users;
        if pending >= max_pending {
            return Ok(ActionResult::refused(
                Refusal::RegistrationClosed,
                format!(
                    "Registration temporarily closed. Too many pending approvals ({}/{})",
                    pending, max_pending
                ),
            ));
        }

        if self.get_user_by_username(username).await?.is_some() {
            return Ok(ActionResult::refused(
                Refusal::UsernameTaken,
                "Username already exists",
            ));
        }

        let user = self
            .save_user(User::pending(username, self.hash_password(password)))
            .await?;
        tracing::info!(user_id = %user.id, username = %user.username, "Registered pending user");
        Ok(ActionResult::ok_with(
            "Registration successful, pending admin approval",
            user,
        ))
    }

    /// Make sure the bootstrap admin exists with admin and approved flags.
    ///
    /// An existing account keeps its password hash; only the flags are
    /// repaired.
    pub async fn ensure_admin_user(&self, admin: &AdminConfig) -> Result<AdminStatus> {
        match self.get_user_by_username(&admin.username).await? {
            None => {
                let user = User {
                    id: admin.user_id.clone(),
                    username: admin.username.clone(),
                    password_hash: self.hash_password(&admin.password),
                    is_admin: true,
                    is_approved: true,
                    created_at: crate::models::now(),
                };
                self.save_user(user).await?;
                tracing::info!(username = %admin.username, "Created admin user");
                Ok(AdminStatus::Created)
            }
            Some(mut user) if !user.is_admin || !user.is_approved => {
                user.is_admin = true;
                user.is_approved = true;
                self.save_user(user).await?;
                tracing::info!(username = %admin.username, "Repaired admin privileges");
                Ok(AdminStatus::Repaired)
            }
            Some(_) => Ok(AdminStatus::Unchanged),
        }
    }
}

/// First problem with the registration input, if any.
fn validate_registration(
    username: &str,
    password: &str,
    confirm_password: &str,
) -> Result<Option<String>> {
    let username_len = username.chars().count();
    if username_len < *USERNAME_LEN.start() {
        return Ok(Some(format!(
            "Username must be at least {} characters",
            USERNAME_LEN.start()
        )));
    }
    if username_len > *USERNAME_LEN.end() {
        return Ok(Some(format!(
            "Username must be no more than {} characters",
            USERNAME_LEN.end()
        )));
    }

    let password_len = password.chars().count();
    if password_len < *PASSWORD_LEN.start() {
        return Ok(Some(format!(
            "Password must be at least {} characters",
            PASSWORD_LEN.start()
        )));
    }
    if password_len > *PASSWORD_LEN.end() {
        return Ok(Some(format!(
            "Password must be no more than {} characters",
            PASSWORD_LEN.end()
        )));
    }

    if password != confirm_password {
        return Ok(Some("Passwords do not match".to_string()));
    }

    let pattern = regex::Regex::new(USERNAME_PATTERN)
        .map_err(|e| ChatKvError::Validation(format!("username pattern: {}", e)))?;
    if !pattern.is_match(username) {
        return Ok(Some(
            "Username can only contain letters, numbers, underscore and dash".to_string(),
        ));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LimitsConfig;
    use crate::repository::test_support::{default_db, memory_db};

    async fn approved(db: &Database, name: &str) -> User {
        let mut user = User::pending(name, db.hash_password("password1"));
        user.is_approved = true;
        db.save_user(user).await.unwrap()
    }

    #[tokio::test]
    async fn test_save_user_assigns_counter_ids() {
        let (db, _) = default_db();
        db.kv().set_nx(keys::USER_ID_COUNTER, "1000").await.unwrap();

        let alice = db.save_user(User::pending("alice", "h")).await.unwrap();
        let bob = db.save_user(User::pending("bob", "h")).await.unwrap();
        assert_eq!(alice.id, "1001");
        assert_eq!(bob.id, "1002");
    }

    #[tokio::test]
    async fn test_lookup_by_username_matches_saved_fields() {
        let (db, _) = default_db();
        let saved = db.save_user(User::pending("alice", "h1")).await.unwrap();

        let found = db.get_user_by_username("alice").await.unwrap().unwrap();
        assert_eq!(found.id, saved.id);
        assert_eq!(found.password_hash, "h1");
        assert_eq!(
            found.created_at.timestamp_millis(),
            saved.created_at.timestamp_millis()
        );
        assert!(db.get_user_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resave_does_not_duplicate_membership() {
        let (db, _) = default_db();
        let user = db.save_user(User::pending("alice", "h")).await.unwrap();
        db.save_user(user.clone()).await.unwrap();
        db.save_user(user).await.unwrap();

        assert_eq!(db.kv().smembers(keys::USERS).await.unwrap().len(), 1);
        assert_eq!(db.get_all_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rename_drops_stale_username_index() {
        let (db, _) = default_db();
        let mut user = db.save_user(User::pending("alice", "h")).await.unwrap();
        user.username = "alicia".into();
        db.save_user(user.clone()).await.unwrap();

        assert!(db.get_user_by_username("alice").await.unwrap().is_none());
        assert_eq!(
            db.get_user_by_username("alicia").await.unwrap().unwrap().id,
            user.id
        );
    }

    #[tokio::test]
    async fn test_approve_user_transitions() {
        let (db, _) = default_db();
        let alice = db.save_user(User::pending("alice", "h")).await.unwrap();
        assert_eq!(db.get_pending_users_count().await.unwrap(), 1);

        let result = db.approve_user(&alice.id).await.unwrap();
        assert!(result.is_success());
        assert_eq!(db.get_pending_users_count().await.unwrap(), 0);

        let again = db.approve_user(&alice.id).await.unwrap();
        assert_eq!(again.refusal, Some(Refusal::AlreadyApproved));

        let missing = db.approve_user("9999").await.unwrap();
        assert_eq!(missing.refusal, Some(Refusal::NotFound));
    }

    #[tokio::test]
    async fn test_reject_approved_user_is_refused_without_mutation() {
        let (db, _) = default_db();
        let alice = approved(&db, "alice").await;

        let result = db.reject_user(&alice.id).await.unwrap();
        assert_eq!(result.refusal, Some(Refusal::InvalidState));
        assert!(db.get_user_by_id(&alice.id).await.unwrap().is_some());
        assert!(db.get_user_by_username("alice").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reject_pending_user_removes_indexes() {
        let (db, _) = default_db();
        let bob = db.save_user(User::pending("bob", "h")).await.unwrap();

        assert!(db.reject_user(&bob.id).await.unwrap().is_success());
        assert!(db.get_user_by_id(&bob.id).await.unwrap().is_none());
        assert!(db.get_user_by_username("bob").await.unwrap().is_none());
        assert!(!db
            .kv()
            .smembers(keys::USERS)
            .await
            .unwrap()
            .contains(&bob.id));
    }

    #[tokio::test]
    async fn test_delete_admin_is_forbidden() {
        let (db, _) = default_db();
        db.ensure_admin_user(&AdminConfig::default()).await.unwrap();

        let result = db.delete_user("admin").await.unwrap();
        assert_eq!(result.refusal, Some(Refusal::Forbidden));
        let admin = db.get_user_by_id("admin").await.unwrap().unwrap();
        assert!(admin.is_admin && admin.is_approved);
    }

    #[tokio::test]
    async fn test_delete_user_cascades() {
        let (db, _) = default_db();
        let alice = approved(&db, "alice").await;
        let session = db.create_chat_session(&alice.id, None).await.unwrap();
        db.save_message(&alice.id, crate::models::Role::User, "hi", &session.id)
            .await
            .unwrap();
        db.check_rate_limit(&alice.id, 5).await.unwrap();

        let result = db.delete_user(&alice.id).await.unwrap();
        assert!(result.is_success());
        assert_eq!(
            result.data,
            Some(DeletedCounts {
                sessions: 1,
                messages: 1
            })
        );
        assert_eq!(
            db.kv().keys("*").await.unwrap(),
            vec![keys::USER_ID_COUNTER.to_string()]
        );
    }

    #[tokio::test]
    async fn test_register_user_validation() {
        let (db, _) = default_db();
        let cases = [
            ("al", "secret1", "secret1"),
            ("alice", "short", "short"),
            ("alice", "secret1", "secret2"),
            ("al ice", "secret1", "secret1"),
        ];
        for (username, password, confirm) in cases {
            let result = db.register_user(username, password, confirm).await.unwrap();
            assert_eq!(result.refusal, Some(Refusal::InvalidInput), "{}", username);
        }
        assert!(db.get_all_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_register_user_closes_at_pending_limit() {
        let (db, _) = memory_db(LimitsConfig {
            max_pending_users: 2,
            ..LimitsConfig::default()
        });
        assert!(db.register_user("alice", "secret1", "secret1").await.unwrap().is_success());
        assert!(db.register_user("bob_1", "secret1", "secret1").await.unwrap().is_success());

        let third = db.register_user("carol", "secret1", "secret1").await.unwrap();
        assert_eq!(third.refusal, Some(Refusal::RegistrationClosed));
    }

    #[tokio::test]
    async fn test_register_duplicate_username() {
        let (db, _) = default_db();
        db.register_user("alice", "secret1", "secret1").await.unwrap();
        let again = db.register_user("alice", "secret1", "secret1").await.unwrap();
        assert_eq!(again.refusal, Some(Refusal::UsernameTaken));
    }

    #[tokio::test]
    async fn test_verify_credentials() {
        let (db, _) = default_db();
        db.register_user("alice", "secret1", "secret1").await.unwrap();

        assert!(db.verify_credentials("alice", "secret1").await.unwrap().is_some());
        assert!(db.verify_credentials("alice", "wrong!!").await.unwrap().is_none());
        assert!(db.verify_credentials("ghost", "secret1").await.unwrap().is_none());
    }

    #[test]
    fn test_hash_password_is_salted_sha256() {
        let (db, _) = default_db();
        let hash = db.hash_password("admin");
        assert_eq!(hash.len(), 64);
        assert_ne!(hash, db.with_password_salt("other").hash_password("admin"));
    }

    #[tokio::test]
    async fn test_ensure_admin_user_creates_then_repairs() {
        let (db, _) = default_db();
        let admin = AdminConfig::default();
        assert_eq!(db.ensure_admin_user(&admin).await.unwrap(), AdminStatus::Created);
        assert_eq!(db.ensure_admin_user(&admin).await.unwrap(), AdminStatus::Unchanged);

        db.update_user_privileges("admin", false, false).await.unwrap();
        assert_eq!(db.ensure_admin_user(&admin).await.unwrap(), AdminStatus::Repaired);
        let user = db.get_user_by_id("admin").await.unwrap().unwrap();
        assert!(user.is_admin && user.is_approved);
    }

    #[tokio::test]
    async fn test_admin_flagged_unapproved_is_not_pending() {
        let (db, _) = default_db();
        let mut user = User::pending("ops", "h");
        user.is_admin = true;
        db.save_user(user).await.unwrap();
        assert_eq!(db.get_pending_users_count().await.unwrap(), 0);
    }
}
