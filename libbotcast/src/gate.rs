//! Duplicate and near-duplicate rejection against the history ledger

use tracing::{debug, info, warn};

use crate::config::GateConfig;
use crate::error::Result;
use crate::history::{content_words, fingerprint, HistoryLedger};
use crate::types::FinalizedPost;

/// Why a candidate was turned away
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Fingerprint already in the ledger
    Duplicate,
    /// Shares too many words with recent posts
    Overlap { shared: usize },
    /// Shorter than the sanity floor
    TooShort { length: usize },
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::Duplicate => write!(f, "exact duplicate of an earlier post"),
            Rejection::Overlap { shared } => {
                write!(f, "shares {} words with recent posts", shared)
            }
            Rejection::TooShort { length } => write!(f, "too short ({} chars)", length),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Accept,
    Reject(Rejection),
}

impl GateDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, GateDecision::Accept)
    }
}

#[derive(Debug, Clone)]
pub struct UniquenessGate {
    /// Shared-word count at which a candidate counts as a near duplicate
    pub overlap_threshold: usize,
    /// How many recent ledger previews feed the overlap check
    pub recent_window: usize,
    pub min_length: usize,
}

impl UniquenessGate {
    pub fn new(overlap_threshold: usize, recent_window: usize, min_length: usize) -> Self {
        Self {
            overlap_threshold,
            recent_window,
            min_length,
        }
    }

    pub fn from_config(config: &GateConfig, min_length: usize) -> Self {
        Self::new(config.overlap_threshold, config.recent_window, min_length)
    }

    pub fn evaluate(&self, candidate: &FinalizedPost, ledger: &HistoryLedger) -> GateDecision {
        let length = candidate.len();
        if length < self.min_length {
            return GateDecision::Reject(Rejection::TooShort { length });
        }

        if ledger.contains(&fingerprint(candidate.as_str())) {
            return GateDecision::Reject(Rejection::Duplicate);
        }

        if self.overlap_threshold > 0 && self.recent_window > 0 {
            let recent = ledger.recent_words(self.recent_window);
            let shared = content_words(candidate.as_str())
                .iter()
                .filter(|w| recent.contains(*w))
                .count();
            if shared >= self.overlap_threshold {
                return GateDecision::Reject(Rejection::Overlap { shared });
            }
        }

        GateDecision::Accept
    }

    pub fn accept(&self, candidate: &FinalizedPost, ledger: &HistoryLedger) -> bool {
        self.evaluate(candidate, ledger).is_accept()
    }
}

/// Result of the bounded generate/finalize/gate loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Accepted { post: FinalizedPost, attempts: usize },
    Exhausted { attempts: usize },
}

/// Run `attempt` up to `max_attempts` times until the gate accepts.
///
/// `attempt` receives the 1-based attempt number and produces a finalized
/// candidate. A failing attempt (generation error) uses up one try, exactly
/// like a rejected one.
pub async fn generate_until_accepted<F, Fut>(
    gate: &UniquenessGate,
    ledger: &HistoryLedger,
    max_attempts: usize,
    mut attempt: F,
) -> GenerationOutcome
where
    F: FnMut(usize) -> Fut,
    Fut: std::future::Future<Output = Result<FinalizedPost>>,
{
    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(candidate) => match gate.evaluate(&candidate, ledger) {
                GateDecision::Accept => {
                    if n > 1 {
                        info!("Candidate accepted on attempt {}/{}", n, max_attempts);
                    }
                    return GenerationOutcome::Accepted {
                        post: candidate,
                        attempts: n,
                    };
                }
                GateDecision::Reject(reason) => {
                    debug!(
                        "Attempt {}/{} rejected: {} ({:?})",
                        n,
                        max_attempts,
                        reason,
                        candidate.as_str()
                    );
                }
            },
            Err(e) => warn!("Attempt {}/{} failed: {}", n, max_attempts, e),
        }
    }
    GenerationOutcome::Exhausted {
        attempts: max_attempts,
    }
}
