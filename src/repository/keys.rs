//! Store key layout

pub const USERS: &str = "users";
pub const USER_ID_COUNTER: &str = "user_id_counter";
pub const MIGRATION_V1: &str = "migration:v1_complete";

pub const USER_PREFIX: &str = "user:";
pub const USERNAME_PREFIX: &str = "username:";
pub const SESSION_PREFIX: &str = "session:";
pub const USER_SESSIONS_PREFIX: &str = "user_sessions:";
pub const SESSION_MESSAGES_PREFIX: &str = "session_messages:";
pub const MESSAGE_PREFIX: &str = "message:";
pub const RATE_LIMIT_PREFIX: &str = "rate_limit:";
pub const AI_RESPONSE_PREFIX: &str = "ai_response:";

pub fn user(id: &str) -> String {
    format!("{}{}", USER_PREFIX, id)
}

pub fn username(name: &str) -> String {
    format!("{}{}", USERNAME_PREFIX, name)
}

pub fn session(id: &str) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

pub fn user_sessions(user_id: &str) -> String {
    format!("{}{}", USER_SESSIONS_PREFIX, user_id)
}

pub fn session_messages(session_id: &str) -> String {
    format!("{}{}", SESSION_MESSAGES_PREFIX, session_id)
}

pub fn message(id: &str) -> String {
    format!("{}{}", MESSAGE_PREFIX, id)
}

pub fn rate_limit(user_id: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, user_id)
}

pub fn ai_response(prompt_hash: &str) -> String {
    format!("{}{}", AI_RESPONSE_PREFIX, prompt_hash)
}
