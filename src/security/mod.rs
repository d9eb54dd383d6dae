//! Audit trail and fraud heuristics

pub mod audit;
pub mod fraud;

pub use audit::{AuditEntry, AuditEventType, AuditLogger, AuditSeverity};
pub use fraud::{FraudDetector, FraudFlag, FraudSeverity, FraudThresholds, FraudType, ScanInput};

/// Compare two secrets without stopping at the first differing byte.
/// Only the length leaks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
