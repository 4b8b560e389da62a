//! # Taskdeck
//!
//! `taskdeck` is a task-management service with session-based authentication,
//! optional TOTP two-factor login, and a Telegram reminder worker for overdue
//! deadlines.
//!
//! ## Authentication
//!
//! Passwords are stored as Argon2id PHC strings; a login checks the salted
//! hash and either issues an authenticated session or, when the account has a
//! second factor enabled, a short-lived `pending_2fa` session that must be
//! upgraded with a valid TOTP code.
//!
//! Session cookies carry an opaque random token; the database only ever sees
//! a SHA-256 hash of it.
//!
//! ## Two-factor setup
//!
//! Enabling 2FA stages a freshly generated secret on the caller's session.
//! The secret is persisted to the user record only after the first valid code
//! is submitted, through a single conditional update so concurrent
//! confirmations cannot both win. Staged secrets expire after a configurable
//! TTL and are replaced on every new setup request.
//!
//! ## Reminders
//!
//! A background worker polls for overdue tasks once a minute and sends one
//! Telegram message per (task, subscribed chat) pair. Chat subscriptions are
//! persisted per user, not kept in process memory.

pub mod api;
pub mod cli;
pub mod password;
#[cfg(test)]
mod test_support;
pub mod totp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
