//! Mock platform implementation for testing
//!
//! Outcomes can be scripted per call, so tests can make the second chunk of
//! a thread hit a rate limit and check what the publisher does next. Every
//! submission is recorded along with the id it replied to.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::platforms::{Platform, SubmitResult};

/// One recorded call to [`MockPlatform::submit`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub text: String,
    pub reply_to: Option<String>,
}

/// What the next call should do
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Succeed,
    Fail(PlatformError),
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone)]
pub struct MockConfig {
    pub name: String,

    /// Outcomes consumed in order; once empty every call uses `fallback`
    pub script: Arc<Mutex<VecDeque<MockOutcome>>>,

    pub fallback: MockOutcome,

    /// Simulated network latency
    pub delay: Duration,

    pub character_limit: Option<usize>,

    pub submit_call_count: Arc<Mutex<usize>>,

    pub submissions: Arc<Mutex<Vec<Submission>>>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            name: "mock".to_string(),
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: MockOutcome::Succeed,
            delay: Duration::from_millis(0),
            character_limit: None,
            submit_call_count: Arc::new(Mutex::new(0)),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock platform for testing
///
/// Successful submissions get ids `"<name>-<call number>"`.
pub struct MockPlatform {
    config: MockConfig,
}

impl MockPlatform {
    pub fn new(config: MockConfig) -> Self {
        Self { config }
    }

    /// Create a mock platform that always succeeds
    pub fn success(name: &str) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            ..Default::default()
        })
    }

    /// Create a mock platform whose every submission fails with `error`
    pub fn post_failure(name: &str, error: PlatformError) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            fallback: MockOutcome::Fail(error),
            ..Default::default()
        })
    }

    /// Create a mock platform that plays `outcomes` in order, then succeeds
    pub fn scripted(name: &str, outcomes: Vec<MockOutcome>) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            script: Arc::new(Mutex::new(outcomes.into())),
            ..Default::default()
        })
    }

    pub fn with_delay(name: &str, delay: Duration) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            delay,
            ..Default::default()
        })
    }

    pub fn with_limit(name: &str, limit: usize) -> Self {
        Self::new(MockConfig {
            name: name.to_string(),
            character_limit: Some(limit),
            ..Default::default()
        })
    }

    /// Handle sharing this mock's recorded state, for use after the
    /// platform itself has been boxed and moved
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            submit_call_count: self.config.submit_call_count.clone(),
            submissions: self.config.submissions.clone(),
        }
    }

    pub fn submit_call_count(&self) -> usize {
        self.handle().submit_call_count()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.handle().submissions()
    }
}

/// Read side of a [`MockPlatform`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    submit_call_count: Arc<Mutex<usize>>,
    submissions: Arc<Mutex<Vec<Submission>>>,
}

impl MockHandle {
    pub fn submit_call_count(&self) -> usize {
        *self
            .submit_call_count
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Platform for MockPlatform {
    async fn submit(
        &self,
        _access_token: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> SubmitResult {
        let call = {
            let mut count = self
                .config
                .submit_call_count
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            *count += 1;
            *count
        };

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        let outcome = self
            .config
            .script
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
            .unwrap_or_else(|| self.config.fallback.clone());

        match outcome {
            MockOutcome::Succeed => {
                self.config
                    .submissions
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(Submission {
                        text: text.to_string(),
                        reply_to: reply_to.map(str::to_string),
                    });
                Ok(format!("{}-{}", self.config.name, call))
            }
            MockOutcome::Fail(error) => Err(error),
        }
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    fn character_limit(&self) -> Option<usize> {
        self.config.character_limit
    }
}
