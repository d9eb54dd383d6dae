//! Account verification: one-time codes, delivery gateways and the manager
//! that turns successful checks into account flags.

pub mod code;
pub mod gateway;
mod manager;

pub use code::{
    CODE_LENGTH, CodeCheck, CodeStore, IssueOutcome, VerificationChannel, VerificationSubject,
};
pub use gateway::{CodeSender, LogSender, WebhookSender};
pub use manager::{Acknowledgement, CodeDispatch, VerificationManager, VerificationStatus};
