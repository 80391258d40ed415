//! Botcast - a periodic posting bot for X
//!
//! Each cycle refreshes the OAuth credential, asks a text generator for a
//! draft, shapes it to the account's content policy, rejects repeats,
//! splits long text into a numbered thread and publishes it as a reply
//! chain. Everything published is recorded in an append-only ledger.

pub mod config;
pub mod credentials;
pub mod error;
pub mod finalize;
pub mod gate;
pub mod generation;
pub mod history;
pub mod logging;
pub mod platforms;
pub mod poster;
pub mod scheduler;
pub mod scheduling;
pub mod thread;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use credentials::{Credential, CredentialStore};
pub use error::{BotcastError, FailureKind, Result};
pub use gate::{GenerationOutcome, UniquenessGate};
pub use history::{HistoryLedger, HistoryRecord, SiteUsageMark, SiteUsageStore};
pub use poster::{PublishOutcome, PublishReport, Publisher};
pub use scheduler::{CycleOutcome, Scheduler};
pub use types::{FinalizedPost, PostPolicy};
