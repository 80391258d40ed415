//! Publish collaborator abstraction and implementations
//!
//! A [`Platform`] submits one post, optionally as a reply to an earlier one,
//! and returns the platform's id for it. Threads are built by the
//! [`Publisher`](crate::poster::Publisher) on top of this single operation.
//!
//! # Examples
//!
//! ```no_run
//! use libbotcast::platforms::{x::XPlatform, Platform};
//!
//! # async fn example() -> libbotcast::Result<()> {
//! let platform = XPlatform::new("https://api.twitter.com/2", std::time::Duration::from_secs(30))?;
//!
//! let first = platform.submit("access-token", "Hello (1/2)", None).await?;
//! let second = platform
//!     .submit("access-token", "world (2/2)", Some(&first))
//!     .await?;
//! println!("thread: {} -> {}", first, second);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::PlatformError;
use crate::finalize::char_len;

pub mod dry_run;
pub mod mock;
pub mod x;

/// Outcome of a single submission
pub type SubmitResult = std::result::Result<String, PlatformError>;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Submit `text`, chained to `reply_to` when given
    ///
    /// # Errors
    ///
    /// Returns a classified [`PlatformError`]; see
    /// [`PlatformError::from_status`] for how HTTP failures are mapped.
    async fn submit(&self, access_token: &str, text: &str, reply_to: Option<&str>)
        -> SubmitResult;

    /// Lowercase identifier used in logs (e.g. "x", "dry-run")
    fn name(&self) -> &str;

    /// Maximum post length in chars, `None` when unbounded
    fn character_limit(&self) -> Option<usize>;

    /// Check `content` before it is sent
    ///
    /// # Errors
    ///
    /// `PlatformError::Validation` for empty content or content over
    /// [`character_limit`](Platform::character_limit).
    fn validate_content(&self, content: &str) -> std::result::Result<(), PlatformError> {
        if content.trim().is_empty() {
            return Err(PlatformError::Validation(
                "Content cannot be empty".to_string(),
            ));
        }
        if let Some(limit) = self.character_limit() {
            let length = char_len(content);
            if length > limit {
                return Err(PlatformError::Validation(format!(
                    "Content exceeds {} character limit (got {} characters)",
                    limit, length
                )));
            }
        }
        Ok(())
    }
}
