//! TOTP secret generation and code verification.
//!
//! Codes are 6 digits over a 30 second step, accepted within one step of
//! skew (current, previous, next). Candidate comparison is constant-time
//! inside `totp-rs`.

use anyhow::{anyhow, Result};
use std::time::{SystemTime, UNIX_EPOCH};
use totp_rs::{Algorithm, Secret, TOTP};

const DIGITS: usize = 6;
const SKEW: u8 = 1;
const STEP: u64 = 30;

/// Freshly generated enrollment material for an authenticator app.
#[derive(Clone, Debug)]
pub struct Enrollment {
    /// Base32 secret for manual entry. 160 bits of entropy.
    pub secret_base32: String,
    /// otpauth:// URI embedding issuer and account label.
    pub otpauth_uri: String,
    /// PNG QR code of the URI as a base64 data URL.
    pub qr_png_base64: String,
}

#[derive(Clone, Debug)]
pub struct TotpEngine {
    issuer: String,
}

impl TotpEngine {
    #[must_use]
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }

    /// Generate a fresh random secret and the matching enrollment material.
    ///
    /// # Errors
    /// Returns an error if secret or QR generation fails.
    pub fn generate(&self, account: &str) -> Result<Enrollment> {
        let secret = Secret::generate_secret();
        let secret_bytes = secret
            .to_bytes()
            .map_err(|err| anyhow!("Secret gen error: {err:?}"))?;

        let totp = self.build(secret_bytes, account)?;

        let qr = totp
            .get_qr_base64()
            .map_err(|err| anyhow!("QR gen error: {err}"))?;

        Ok(Enrollment {
            secret_base32: totp.get_secret_base32(),
            otpauth_uri: totp.get_url(),
            qr_png_base64: format!("data:image/png;base64,{qr}"),
        })
    }

    /// Check a submitted code against a base32 secret at the current time.
    ///
    /// Malformed codes (wrong length, non-numeric) and undecodable secrets
    /// never match.
    #[must_use]
    pub fn verify(&self, secret_base32: &str, code: &str) -> bool {
        let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) else {
            return false;
        };
        self.verify_at(secret_base32, code, now.as_secs())
    }

    fn verify_at(&self, secret_base32: &str, code: &str, time: u64) -> bool {
        if code.len() != DIGITS || !code.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }

        let Ok(secret_bytes) = Secret::Encoded(secret_base32.to_string()).to_bytes() else {
            return false;
        };

        // Account label has no effect on the generated codes.
        match self.build(secret_bytes, "user") {
            Ok(totp) => totp.check(code, time),
            Err(_) => false,
        }
    }

    fn build(&self, secret_bytes: Vec<u8>, account: &str) -> Result<TOTP> {
        TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP,
            secret_bytes,
            Some(self.issuer.clone()),
            account.to_string(),
        )
        .map_err(|err| anyhow!("TOTP init error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_for(engine: &TotpEngine, secret_base32: &str, time: u64) -> String {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .unwrap();
        engine.build(secret_bytes, "user").unwrap().generate(time)
    }

    #[test]
    fn enrollment_has_secret_and_uri() {
        let engine = TotpEngine::new("Taskdeck");
        let enrollment = engine.generate("alice@example.com").unwrap();

        // 20 raw bytes encode to 32 base32 chars
        assert_eq!(enrollment.secret_base32.len(), 32);
        assert!(enrollment.otpauth_uri.starts_with("otpauth://totp/"));
        assert!(enrollment.otpauth_uri.contains("issuer=Taskdeck"));
        assert!(enrollment
            .qr_png_base64
            .starts_with("data:image/png;base64,"));
    }

    #[test]
    fn secrets_are_not_reused() {
        let engine = TotpEngine::new("Taskdeck");
        let first = engine.generate("alice@example.com").unwrap();
        let second = engine.generate("alice@example.com").unwrap();
        assert_ne!(first.secret_base32, second.secret_base32);
    }

    #[test]
    fn current_window_code_verifies() {
        let engine = TotpEngine::new("Taskdeck");
        let enrollment = engine.generate("alice@example.com").unwrap();
        let now = 1_700_000_000;

        let code = code_for(&engine, &enrollment.secret_base32, now);
        assert!(engine.verify_at(&enrollment.secret_base32, &code, now));
    }

    #[test]
    fn adjacent_step_codes_verify_but_not_two_steps() {
        let engine = TotpEngine::new("Taskdeck");
        let enrollment = engine.generate("alice@example.com").unwrap();
        let now = 1_700_000_000;

        let previous = code_for(&engine, &enrollment.secret_base32, now - STEP);
        let next = code_for(&engine, &enrollment.secret_base32, now + STEP);
        assert!(engine.verify_at(&enrollment.secret_base32, &previous, now));
        assert!(engine.verify_at(&enrollment.secret_base32, &next, now));

        let current = code_for(&engine, &enrollment.secret_base32, now);
        let stale = code_for(&engine, &enrollment.secret_base32, now + 2 * STEP);
        if stale != current && stale != previous && stale != next {
            assert!(!engine.verify_at(&enrollment.secret_base32, &stale, now));
        }
    }

    #[test]
    fn malformed_codes_are_rejected() {
        let engine = TotpEngine::new("Taskdeck");
        let enrollment = engine.generate("alice@example.com").unwrap();
        let now = 1_700_000_000;

        assert!(!engine.verify_at(&enrollment.secret_base32, "", now));
        assert!(!engine.verify_at(&enrollment.secret_base32, "12345", now));
        assert!(!engine.verify_at(&enrollment.secret_base32, "1234567", now));
        assert!(!engine.verify_at(&enrollment.secret_base32, "12345a", now));
    }

    #[test]
    fn undecodable_secret_never_matches() {
        let engine = TotpEngine::new("Taskdeck");
        assert!(!engine.verify_at("not base32!!", "123456", 1_700_000_000));
    }
}
