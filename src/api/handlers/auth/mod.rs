//! Auth handlers and supporting modules.
//!
//! This module coordinates password login, session management, and the TOTP
//! two-factor flow.
//!
//! ## Session model
//!
//! Sessions live in Postgres, keyed by the SHA-256 hash of an opaque cookie
//! token. A row is either `authenticated` or `pending_2fa`; anonymous clients
//! have no row. A `pending_2fa` session is issued after a correct password
//! for an account with 2FA enabled and only the verify endpoint can upgrade
//! it. Expiry is enforced on lookup via `expires_at`.
//!
//! ## Two-factor enrollment
//!
//! Setup stages an unconfirmed secret on the session (never on the user) and
//! confirmation persists it with a single conditional update, so two racing
//! confirmations cannot both enable 2FA with different secrets.

pub(crate) mod error;
pub(crate) mod login;
mod rate_limit;
pub(crate) mod register;
pub(crate) mod session;
mod state;
mod storage;
pub(crate) mod two_factor;
pub(crate) mod types;
mod utils;

pub use error::AuthError;
pub use rate_limit::NoopRateLimiter;
pub use state::{AuthConfig, AuthState};
pub(crate) use utils::{is_unique_violation, normalize_email, valid_email};

#[cfg(test)]
mod tests;
