//! Verification Manager
//!
//! Drives every verification step an account can take: phone and email
//! codes, student confirmation and the seller acknowledgements. Each
//! successful step sets a flag on the account; for sellers the reputation is
//! recomputed right after.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::VerificationConfig;
use crate::error::{MarketError, MarketResult};
use crate::market::{Account, AccountRole, Principal, VerificationFlag, VerificationFlags};
use crate::reputation::{ReputationManager, SellerReport};
use crate::security::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};
use crate::store::MarketStore;
use crate::verification::code::{
    CodeCheck, CodeStore, IssueOutcome, VerificationChannel, VerificationSubject,
};
use crate::verification::gateway::{CodeSender, code_message, mask_destination};

impl From<Principal> for VerificationSubject {
    fn from(principal: Principal) -> Self {
        VerificationSubject {
            role: principal.role,
            account_id: principal.account_id,
        }
    }
}

/// Reply to a code request. Never carries the code itself.
#[derive(Debug, Clone, Serialize)]
pub struct CodeDispatch {
    pub channel: VerificationChannel,
    pub destination: String,
    pub expires_at: DateTime<Utc>,
    pub expires_in_secs: i64,
}

/// Account flags after a verification step
#[derive(Debug, Clone, Serialize)]
pub struct VerificationStatus {
    pub role: AccountRole,
    pub account_id: Uuid,
    pub flags: VerificationFlags,
    /// Fresh reputation report, sellers only
    pub reputation: Option<SellerReport>,
}

/// Seller-only acknowledgements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acknowledgement {
    Safety,
    AntiScam,
}

impl Acknowledgement {
    fn as_str(&self) -> &'static str {
        match self {
            Acknowledgement::Safety => "safety",
            Acknowledgement::AntiScam => "anti_scam",
        }
    }

    fn flag(&self) -> VerificationFlag {
        match self {
            Acknowledgement::Safety => VerificationFlag::Safety,
            Acknowledgement::AntiScam => VerificationFlag::AntiScam,
        }
    }
}

pub struct VerificationManager {
    codes: CodeStore,
    sms: Arc<dyn CodeSender>,
    email: Arc<dyn CodeSender>,
    store: Arc<dyn MarketStore>,
    reputation: Arc<ReputationManager>,
    audit: Arc<AuditLogger>,
    campus_domains: Vec<String>,
}

impl VerificationManager {
    pub fn new(
        config: &VerificationConfig,
        sms: Arc<dyn CodeSender>,
        email: Arc<dyn CodeSender>,
        store: Arc<dyn MarketStore>,
        reputation: Arc<ReputationManager>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            codes: CodeStore::new(
                Duration::minutes(config.code_ttl_minutes),
                Duration::seconds(config.resend_cooldown_secs),
                config.max_attempts,
            ),
            sms,
            email,
            store,
            reputation,
            audit,
            campus_domains: config
                .campus_domains
                .iter()
                .map(|d| d.trim().to_lowercase())
                .collect(),
        }
    }

    fn sender(&self, channel: VerificationChannel) -> &Arc<dyn CodeSender> {
        match channel {
            VerificationChannel::Phone => &self.sms,
            VerificationChannel::Email => &self.email,
        }
    }

    /// Issue a code and deliver it to the account's phone or email
    pub async fn send_code(
        &self,
        subject: VerificationSubject,
        channel: VerificationChannel,
    ) -> MarketResult<CodeDispatch> {
        self.send_code_at(subject, channel, Utc::now()).await
    }

    pub async fn send_code_at(
        &self,
        subject: VerificationSubject,
        channel: VerificationChannel,
        now: DateTime<Utc>,
    ) -> MarketResult<CodeDispatch> {
        let account = Account::load(self.store.as_ref(), subject.role, subject.account_id).await?;

        let (destination, already) = match channel {
            VerificationChannel::Phone => (account.phone(), account.flags().phone_verified),
            VerificationChannel::Email => (account.email(), account.flags().email_verified),
        };
        if already {
            return Err(MarketError::invalid(format!(
                "Your {} is already verified",
                channel_label(channel)
            )));
        }

        let (code, expires_at) = match self.codes.issue(channel, subject, destination, now) {
            IssueOutcome::Issued { code, expires_at } => (code, expires_at),
            IssueOutcome::Cooldown { retry_after_secs } => {
                return Err(MarketError::invalid(format!(
                    "Please wait {} seconds before requesting another code",
                    retry_after_secs
                )));
            }
        };

        let message = code_message(&code, self.codes.ttl().num_minutes());
        let sender = self.sender(channel);
        if let Err(e) = sender.send(destination, &message).await {
            // Undelivered codes are not redeemable
            self.codes.discard(channel, subject);
            warn!(
                channel = channel.as_str(),
                gateway = sender.name(),
                error = %e,
                "Verification code delivery failed"
            );
            return Err(MarketError::Internal(
                e.context("Verification code delivery failed"),
            ));
        }

        self.audit
            .log(AuditEntry::new(
                AuditEventType::CodeSent {
                    channel: channel.as_str().to_string(),
                    account_id: subject.account_id,
                },
                AuditSeverity::Info,
            ))
            .await;
        debug!(
            channel = channel.as_str(),
            account_id = %subject.account_id,
            "Verification code issued"
        );

        Ok(CodeDispatch {
            channel,
            destination: mask_destination(destination),
            expires_at,
            expires_in_secs: (expires_at - now).num_seconds(),
        })
    }

    /// Check a submitted code and set the matching flag on success
    pub async fn check_code(
        &self,
        subject: VerificationSubject,
        channel: VerificationChannel,
        code: &str,
    ) -> MarketResult<VerificationStatus> {
        self.check_code_at(subject, channel, code, Utc::now()).await
    }

    pub async fn check_code_at(
        &self,
        subject: VerificationSubject,
        channel: VerificationChannel,
        code: &str,
        now: DateTime<Utc>,
    ) -> MarketResult<VerificationStatus> {
        let failure = match self.codes.check(channel, subject, code, now) {
            CodeCheck::Verified { destination } => {
                return self.complete_code(subject, channel, &destination).await;
            }
            CodeCheck::NotFound => {
                "No pending verification code, please request a new one".to_string()
            }
            CodeCheck::Expired => {
                "Verification code has expired, please request a new one".to_string()
            }
            CodeCheck::TooManyAttempts => {
                "Too many incorrect attempts, please request a new code".to_string()
            }
            CodeCheck::Mismatch { attempts_left } => {
                format!("Incorrect code, {} attempt(s) left", attempts_left)
            }
        };

        self.audit
            .log_verification(channel.as_str(), subject.account_id, Some(&failure))
            .await;
        Err(MarketError::invalid(failure))
    }

    async fn complete_code(
        &self,
        subject: VerificationSubject,
        channel: VerificationChannel,
        destination: &str,
    ) -> MarketResult<VerificationStatus> {
        let account = Account::load(self.store.as_ref(), subject.role, subject.account_id).await?;

        let current = match channel {
            VerificationChannel::Phone => account.phone(),
            VerificationChannel::Email => account.email(),
        };
        if current != destination {
            return Err(MarketError::invalid(format!(
                "Your {} changed after the code was sent, please request a new one",
                channel_label(channel)
            )));
        }

        let flag = match channel {
            VerificationChannel::Phone => VerificationFlag::Phone,
            VerificationChannel::Email => VerificationFlag::Email,
        };

        info!(
            channel = channel.as_str(),
            account_id = %subject.account_id,
            role = subject.role.as_str(),
            "Verification succeeded"
        );
        self.finish(subject.role, subject.account_id, flag, channel.as_str())
            .await
    }

    /// Confirm student status from a verified campus email address
    pub async fn confirm_student(
        &self,
        subject: VerificationSubject,
    ) -> MarketResult<VerificationStatus> {
        let account = Account::load(self.store.as_ref(), subject.role, subject.account_id).await?;

        if account.flags().student_confirmed {
            return self
                .status(subject.role, subject.account_id, *account.flags())
                .await;
        }

        let failure = if !account.flags().email_verified {
            Some("Verify your email address before confirming student status")
        } else if !self.is_campus_email(account.email()) {
            Some("Your email address is not a recognised campus address")
        } else {
            None
        };

        if let Some(reason) = failure {
            self.audit
                .log_verification("student", subject.account_id, Some(reason))
                .await;
            return Err(MarketError::invalid(reason));
        }

        self.finish(
            subject.role,
            subject.account_id,
            VerificationFlag::Student,
            "student",
        )
        .await
    }

    /// Manual student confirmation by an administrator
    pub async fn admin_confirm_student(
        &self,
        role: AccountRole,
        account_id: Uuid,
    ) -> MarketResult<VerificationStatus> {
        Account::load(self.store.as_ref(), role, account_id).await?;

        self.audit
            .log(
                AuditEntry::new(
                    AuditEventType::AdminAction {
                        action: "confirm_student".to_string(),
                        target: account_id,
                    },
                    AuditSeverity::Warning,
                )
                .with_metadata("role", role.as_str()),
            )
            .await;

        self.finish(role, account_id, VerificationFlag::Student, "student")
            .await
    }

    /// Record a seller's acceptance of the safety or anti-scam guidelines
    pub async fn acknowledge(
        &self,
        subject: VerificationSubject,
        which: Acknowledgement,
        accepted: bool,
    ) -> MarketResult<VerificationStatus> {
        if subject.role != AccountRole::Seller {
            return Err(MarketError::Forbidden(
                "Only sellers acknowledge the marketplace guidelines".to_string(),
            ));
        }
        if !accepted {
            return Err(MarketError::invalid(
                "The guidelines must be accepted to continue",
            ));
        }

        self.finish(subject.role, subject.account_id, which.flag(), which.as_str())
            .await
    }

    pub async fn acknowledge_safety(
        &self,
        subject: VerificationSubject,
        accepted: bool,
    ) -> MarketResult<VerificationStatus> {
        self.acknowledge(subject, Acknowledgement::Safety, accepted)
            .await
    }

    pub async fn acknowledge_anti_scam(
        &self,
        subject: VerificationSubject,
        accepted: bool,
    ) -> MarketResult<VerificationStatus> {
        self.acknowledge(subject, Acknowledgement::AntiScam, accepted)
            .await
    }

    /// Remove expired codes (call periodically)
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        self.codes.cleanup(now)
    }

    fn is_campus_email(&self, email: &str) -> bool {
        let Some((_, domain)) = email.rsplit_once('@') else {
            return false;
        };
        let domain = domain.to_lowercase();
        self.campus_domains.iter().any(|allowed| {
            let bare = allowed.trim_start_matches('.');
            !bare.is_empty() && (domain == bare || domain.ends_with(&format!(".{}", bare)))
        })
    }

    async fn finish(
        &self,
        role: AccountRole,
        account_id: Uuid,
        flag: VerificationFlag,
        check: &str,
    ) -> MarketResult<VerificationStatus> {
        let flags = Account::set_flag(self.store.as_ref(), role, account_id, flag).await?;
        self.audit.log_verification(check, account_id, None).await;
        self.status(role, account_id, flags).await
    }

    /// Refreshes seller reputation after the flag write so the new flag is counted
    async fn status(
        &self,
        role: AccountRole,
        account_id: Uuid,
        flags: VerificationFlags,
    ) -> MarketResult<VerificationStatus> {
        let reputation = match role {
            AccountRole::Seller => Some(self.reputation.refresh_seller(account_id).await?),
            AccountRole::Buyer => None,
        };

        Ok(VerificationStatus {
            role,
            account_id,
            flags,
            reputation,
        })
    }
}

fn channel_label(channel: VerificationChannel) -> &'static str {
    match channel {
        VerificationChannel::Phone => "phone number",
        VerificationChannel::Email => "email address",
    }
}
