//! Audit trail for trust-relevant events
//!
//! Entries are kept in a bounded in-memory ring and mirrored to tracing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::market::AccountRole;

const DEFAULT_MAX_ENTRIES: usize = 100_000;

/// Types of auditable events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEventType {
    // Account events
    AccountRegistered {
        role: AccountRole,
        account_id: Uuid,
    },
    LoginSucceeded {
        role: AccountRole,
        account_id: Uuid,
    },
    LoginFailed {
        role: AccountRole,
        reason: String,
    },

    // Verification events
    CodeSent {
        channel: String,
        account_id: Uuid,
    },
    VerificationSucceeded {
        check: String,
        account_id: Uuid,
    },
    VerificationFailed {
        check: String,
        account_id: Uuid,
        reason: String,
    },

    // Trust events
    TierChanged {
        seller_id: Uuid,
        from: String,
        to: String,
    },
    PurchaseRejected {
        buyer_id: Uuid,
        amount: f64,
        level: String,
    },
    FraudFlagged {
        seller_id: Uuid,
        flag: String,
        description: String,
    },

    // Administrative events
    AdminAction {
        action: String,
        target: Uuid,
    },
}

impl AuditEventType {
    /// Account the event concerns, if any
    pub fn account_id(&self) -> Option<Uuid> {
        match self {
            AuditEventType::AccountRegistered { account_id, .. }
            | AuditEventType::LoginSucceeded { account_id, .. }
            | AuditEventType::CodeSent { account_id, .. }
            | AuditEventType::VerificationSucceeded { account_id, .. }
            | AuditEventType::VerificationFailed { account_id, .. } => Some(*account_id),
            AuditEventType::TierChanged { seller_id, .. }
            | AuditEventType::FraudFlagged { seller_id, .. } => Some(*seller_id),
            AuditEventType::PurchaseRejected { buyer_id, .. } => Some(*buyer_id),
            AuditEventType::AdminAction { target, .. } => Some(*target),
            AuditEventType::LoginFailed { .. } => None,
        }
    }
}

/// Severity levels for audit events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AuditSeverity {
    Debug = 0,
    Info = 1,
    Warning = 2,
    Error = 3,
    Critical = 4,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: AuditSeverity,
    pub metadata: HashMap<String, String>,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, severity: AuditSeverity) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            severity,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

pub struct AuditLogger {
    entries: Arc<RwLock<VecDeque<AuditEntry>>>,
    max_entries: usize,
    min_severity: AuditSeverity,
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries: DEFAULT_MAX_ENTRIES,
            min_severity: AuditSeverity::Info,
        }
    }

    pub fn with_min_severity(mut self, severity: AuditSeverity) -> Self {
        self.min_severity = severity;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub async fn log(&self, entry: AuditEntry) {
        if entry.severity < self.min_severity {
            return;
        }

        match entry.severity {
            AuditSeverity::Debug => tracing::debug!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Info => tracing::info!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Warning => tracing::warn!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Error => tracing::error!("AUDIT: {:?}", entry.event_type),
            AuditSeverity::Critical => tracing::error!("AUDIT CRITICAL: {:?}", entry.event_type),
        }

        let mut entries = self.entries.write().await;
        entries.push_back(entry);

        while entries.len() > self.max_entries {
            entries.pop_front();
        }
    }

    pub async fn log_account_registered(&self, role: AccountRole, account_id: Uuid) {
        self.log(AuditEntry::new(
            AuditEventType::AccountRegistered { role, account_id },
            AuditSeverity::Info,
        ))
        .await;
    }

    pub async fn log_login_succeeded(&self, role: AccountRole, account_id: Uuid) {
        self.log(AuditEntry::new(
            AuditEventType::LoginSucceeded { role, account_id },
            AuditSeverity::Info,
        ))
        .await;
    }

    pub async fn log_login_failed(&self, role: AccountRole, reason: &str) {
        self.log(AuditEntry::new(
            AuditEventType::LoginFailed {
                role,
                reason: reason.to_string(),
            },
            AuditSeverity::Warning,
        ))
        .await;
    }

    pub async fn log_verification(&self, check: &str, account_id: Uuid, failure: Option<&str>) {
        let entry = match failure {
            None => AuditEntry::new(
                AuditEventType::VerificationSucceeded {
                    check: check.to_string(),
                    account_id,
                },
                AuditSeverity::Info,
            ),
            Some(reason) => AuditEntry::new(
                AuditEventType::VerificationFailed {
                    check: check.to_string(),
                    account_id,
                    reason: reason.to_string(),
                },
                AuditSeverity::Warning,
            ),
        };
        self.log(entry).await;
    }

    pub async fn log_fraud_flag(&self, seller_id: Uuid, flag: &str, description: &str, high: bool) {
        let severity = if high {
            AuditSeverity::Critical
        } else {
            AuditSeverity::Warning
        };
        self.log(AuditEntry::new(
            AuditEventType::FraudFlagged {
                seller_id,
                flag: flag.to_string(),
                description: description.to_string(),
            },
            severity,
        ))
        .await;
    }

    /// Most recent entries first
    pub async fn get_recent(&self, count: usize) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries.iter().rev().take(count).cloned().collect()
    }

    pub async fn get_by_severity(&self, min_severity: AuditSeverity) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.severity >= min_severity)
            .cloned()
            .collect()
    }

    pub async fn get_for_account(&self, account_id: Uuid) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.event_type.account_id() == Some(account_id))
            .cloned()
            .collect()
    }
}
