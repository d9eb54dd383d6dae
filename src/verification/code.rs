//! One-time verification codes
//!
//! Codes are 6 decimal digits, keyed by channel and account, and expire a
//! fixed time after issue. A code is consumed on success, on expiry, and
//! once the wrong-attempt budget is spent.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::AccountRole;

pub const CODE_LENGTH: usize = 6;

/// Delivery channel of a code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationChannel {
    Phone,
    Email,
}

impl VerificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationChannel::Phone => "phone",
            VerificationChannel::Email => "email",
        }
    }
}

/// Account a code was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VerificationSubject {
    pub role: AccountRole,
    pub account_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct PendingCode {
    pub code: String,
    pub destination: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub failed_attempts: u32,
}

impl PendingCode {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Outcome of checking a submitted code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeCheck {
    Verified { destination: String },
    Mismatch { attempts_left: u32 },
    Expired,
    TooManyAttempts,
    NotFound,
}

/// Outcome of trying to issue a code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueOutcome {
    Issued { code: String, expires_at: DateTime<Utc> },
    Cooldown { retry_after_secs: i64 },
}

/// Generate a random 6 digit code, zero padded
pub fn generate_code() -> String {
    let value: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{:0width$}", value, width = CODE_LENGTH)
}

/// Pending codes for all accounts
pub struct CodeStore {
    codes: DashMap<(VerificationChannel, VerificationSubject), PendingCode>,
    ttl: Duration,
    resend_cooldown: Duration,
    max_attempts: u32,
}

impl CodeStore {
    pub fn new(ttl: Duration, resend_cooldown: Duration, max_attempts: u32) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
            resend_cooldown,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh code, replacing any earlier one once the cooldown passed
    pub fn issue(
        &self,
        channel: VerificationChannel,
        subject: VerificationSubject,
        destination: &str,
        now: DateTime<Utc>,
    ) -> IssueOutcome {
        let key = (channel, subject);

        if let Some(existing) = self.codes.get(&key) {
            let ready_at = existing.issued_at + self.resend_cooldown;
            if !existing.is_expired(now) && now < ready_at {
                let wait = (ready_at - now).num_seconds().max(1);
                return IssueOutcome::Cooldown {
                    retry_after_secs: wait,
                };
            }
        }

        let code = generate_code();
        let expires_at = now + self.ttl;
        self.codes.insert(
            key,
            PendingCode {
                code: code.clone(),
                destination: destination.to_string(),
                issued_at: now,
                expires_at,
                failed_attempts: 0,
            },
        );

        IssueOutcome::Issued { code, expires_at }
    }

    /// Check a submitted code at `now`
    ///
    /// The `max_attempts`-th wrong submission removes the code, so a caller
    /// gets `max_attempts - 1` replies of [`CodeCheck::Mismatch`] at most.
    pub fn check(
        &self,
        channel: VerificationChannel,
        subject: VerificationSubject,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> CodeCheck {
        let key = (channel, subject);

        let outcome = match self.codes.get_mut(&key) {
            None => return CodeCheck::NotFound,
            Some(mut pending) => {
                if pending.is_expired(now) {
                    CodeCheck::Expired
                } else if pending.code == submitted.trim() {
                    CodeCheck::Verified {
                        destination: pending.destination.clone(),
                    }
                } else {
                    pending.failed_attempts += 1;
                    if pending.failed_attempts >= self.max_attempts {
                        CodeCheck::TooManyAttempts
                    } else {
                        CodeCheck::Mismatch {
                            attempts_left: self.max_attempts - pending.failed_attempts,
                        }
                    }
                }
            }
        };

        if !matches!(outcome, CodeCheck::Mismatch { .. }) {
            self.codes.remove(&key);
        }

        outcome
    }

    /// Drop a code, e.g. when delivery failed
    pub fn discard(&self, channel: VerificationChannel, subject: VerificationSubject) {
        self.codes.remove(&(channel, subject));
    }

    /// Remove expired codes (call periodically)
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let before = self.codes.len();
        self.codes.retain(|_, pending| !pending.is_expired(now));
        before - self.codes.len()
    }

    pub fn pending_count(&self) -> usize {
        self.codes.len()
    }
}
