//! Platform that logs instead of posting (`botcast-send --dry-run`)

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::platforms::{Platform, SubmitResult};

pub struct DryRunPlatform {
    character_limit: Option<usize>,
    submitted: AtomicUsize,
}

impl DryRunPlatform {
    pub fn new(character_limit: Option<usize>) -> Self {
        Self {
            character_limit,
            submitted: AtomicUsize::new(0),
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Platform for DryRunPlatform {
    async fn submit(
        &self,
        _access_token: &str,
        text: &str,
        reply_to: Option<&str>,
    ) -> SubmitResult {
        let n = self.submitted.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("dry-run-{}", n);
        match reply_to {
            Some(parent) => info!("[dry-run] {} (reply to {}): {}", id, parent, text),
            None => info!("[dry-run] {}: {}", id, text),
        }
        Ok(id)
    }

    fn name(&self) -> &str {
        "dry-run"
    }

    fn character_limit(&self) -> Option<usize> {
        self.character_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dry_run_returns_sequential_ids() {
        let platform = DryRunPlatform::new(Some(280));
        assert_eq!(platform.submit("t", "one", None).await.unwrap(), "dry-run-1");
        assert_eq!(
            platform
                .submit("t", "two", Some("dry-run-1"))
                .await
                .unwrap(),
            "dry-run-2"
        );
        assert_eq!(platform.submitted(), 2);
        assert_eq!(platform.name(), "dry-run");
    }
}
