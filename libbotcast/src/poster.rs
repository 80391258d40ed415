//! Thread publishing with reply chaining
//!
//! Chunks are submitted one at a time, each as a reply to the one before.
//! The first failure stops the thread; what was already published stays
//! published and is reported back so it can be recorded.

use tracing::{error, info, warn};

use crate::error::{FailureKind, PlatformError};
use crate::platforms::Platform;

/// How far a publish got
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every chunk is live
    Complete,
    /// Some leading chunks are live, the rest were never sent
    Partial,
    /// Nothing was published
    Failed,
}

#[derive(Debug, Clone)]
pub struct PublishReport {
    /// Ids of the published chunks, in thread order
    pub ids: Vec<String>,
    /// Number of chunks that were to be published
    pub total: usize,
    /// The error that stopped publishing, if any
    pub failure: Option<PlatformError>,
}

impl PublishReport {
    pub fn outcome(&self) -> PublishOutcome {
        match (&self.failure, self.ids.is_empty()) {
            (None, false) => PublishOutcome::Complete,
            (Some(_), false) => PublishOutcome::Partial,
            (_, true) => PublishOutcome::Failed,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(PlatformError::kind)
    }

    pub fn published_any(&self) -> bool {
        !self.ids.is_empty()
    }
}

/// Log a stopped publish the way the operator needs to read it
fn log_failure(platform: &str, index: usize, total: usize, error: &PlatformError) {
    match error.kind() {
        FailureKind::RateLimited => warn!(
            "{} rate limited on chunk {}/{}; retrying next cycle: {}",
            platform, index, total, error
        ),
        FailureKind::ContentPolicy => error!(
            "{} refused chunk {}/{} on content grounds (check length limits for this account tier): {}",
            platform, index, total, error
        ),
        FailureKind::Other => warn!(
            "Publishing chunk {}/{} to {} failed: {}",
            index, total, platform, error
        ),
    }
}

pub struct Publisher {
    platform: Box<dyn Platform>,
}

impl Publisher {
    pub fn new(platform: Box<dyn Platform>) -> Self {
        Self { platform }
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Publish `chunks` as a linear reply chain
    ///
    /// Never returns an error: a failure is carried in the report next to
    /// the ids that made it out before it.
    pub async fn publish(&self, access_token: &str, chunks: &[String]) -> PublishReport {
        let total = chunks.len();
        let name = self.platform.name();
        let mut ids: Vec<String> = Vec::with_capacity(total);

        for (i, chunk) in chunks.iter().enumerate() {
            let index = i + 1;
            let result = match self.platform.validate_content(chunk) {
                Ok(()) => {
                    let reply_to = ids.last().map(String::as_str);
                    self.platform.submit(access_token, chunk, reply_to).await
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(id) => {
                    info!("Published chunk {}/{} to {}: {}", index, total, name, id);
                    ids.push(id);
                }
                Err(e) => {
                    log_failure(name, index, total, &e);
                    return PublishReport {
                        ids,
                        total,
                        failure: Some(e),
                    };
                }
            }
        }

        PublishReport {
            ids,
            total,
            failure: None,
        }
    }
}
