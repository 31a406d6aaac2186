//! One-time passcodes issued before a profile is committed.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;

/// Number of digits in a passcode.
pub const CODE_LENGTH: usize = 6;

/// Source of passcode strings.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Uniformly random 6-digit codes, leading zeros allowed.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
    fn generate(&self) -> String {
        let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
        format!("{n:0width$}", width = CODE_LENGTH)
    }
}

/// An issued passcode and its attempt counter.
#[derive(Debug, Clone, Serialize)]
pub struct PasscodeChallenge {
    #[serde(skip_serializing)]
    code: String,
    /// Verification attempts made against this code.
    pub attempts: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PasscodeChallenge {
    pub fn new(code: String, valid_for: Duration) -> Self {
        let issued_at = Utc::now();
        let ttl = chrono::Duration::from_std(valid_for).unwrap_or_else(|_| chrono::Duration::days(365));
        Self {
            code,
            attempts: 0,
            issued_at,
            expires_at: issued_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// Count one verification attempt; returns the new total.
    pub fn register_attempt(&mut self) -> u32 {
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Exact match against the issued code, ignoring surrounding whitespace.
    pub fn matches(&self, candidate: &str) -> bool {
        candidate.trim() == self.code
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_codes_are_six_digits() {
        let codes = RandomCodes;
        for _ in 0..200 {
            let code = codes.generate();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.chars().all(|c| c.is_ascii_digit()), "{code}");
        }
    }

    #[test]
    fn attempts_increment() {
        let mut c = PasscodeChallenge::new("123456".into(), Duration::from_secs(60));
        assert_eq!(c.attempts, 0);
        assert_eq!(c.register_attempt(), 1);
        assert_eq!(c.register_attempt(), 2);
        assert_eq!(c.attempts, 2);
    }

    #[test]
    fn matches_is_exact_after_trim() {
        let c = PasscodeChallenge::new("042918".into(), Duration::from_secs(60));
        assert!(c.matches("042918"));
        assert!(c.matches(" 042918\n"));
        assert!(!c.matches("42918"));
        assert!(!c.matches("0429180"));
        assert!(!c.matches(""));
    }

    #[test]
    fn expiry_window() {
        let c = PasscodeChallenge::new("000000".into(), Duration::from_secs(600));
        assert!(!c.is_expired(Utc::now()));
        assert!(c.is_expired(c.expires_at));
        assert!(c.is_expired(Utc::now() + chrono::Duration::minutes(11)));

        let zero = PasscodeChallenge::new("000000".into(), Duration::ZERO);
        assert!(zero.is_expired(Utc::now()));
    }

    #[test]
    fn code_is_never_serialized() {
        let c = PasscodeChallenge::new("987654".into(), Duration::from_secs(60));
        let json = serde_json::to_string(&c).unwrap();
        assert!(!json.contains("987654"));
        assert!(json.contains("\"attempts\":0"));
    }
}
