//! Core types for Botcast

use serde::{Deserialize, Serialize};

use crate::config::ContentConfig;

/// Content rules active for one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostPolicy {
    /// Character limit of one post (counted in chars, not bytes)
    pub max_length: usize,
    /// Appended when missing, in order
    pub required_substrings: Vec<String>,
    /// Removed wherever they appear, case-insensitively
    pub forbidden_substrings: Vec<String>,
    pub min_tags: usize,
    pub tag_pool: Vec<String>,
    /// Sanity floor below which a finalized post is rejected
    pub min_total_length: usize,
}

impl PostPolicy {
    /// A policy with only a length limit
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            required_substrings: Vec::new(),
            forbidden_substrings: Vec::new(),
            min_tags: 0,
            tag_pool: Vec::new(),
            min_total_length: 0,
        }
    }

    /// Build the cycle policy from content settings.
    ///
    /// The brand is always required. The site link is required when
    /// `include_site_link` is set and forbidden otherwise.
    pub fn for_cycle(content: &ContentConfig, include_site_link: bool) -> Self {
        let mut required = vec![content.brand.clone()];
        let mut forbidden = Vec::new();
        if let Some(link) = content.site_link.as_ref().filter(|l| !l.trim().is_empty()) {
            if include_site_link {
                required.push(link.clone());
            } else {
                forbidden.push(link.clone());
            }
        }

        Self {
            max_length: content.max_length,
            required_substrings: required,
            forbidden_substrings: forbidden,
            min_tags: content.min_tags,
            tag_pool: content.tags.clone(),
            min_total_length: content.min_length,
        }
    }

    /// Whether `substring` is one of the required entries
    pub fn requires(&self, substring: &str) -> bool {
        self.required_substrings.iter().any(|s| s == substring)
    }
}

/// Text that satisfies the policy it was finalized against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedPost {
    pub text: String,
}

impl FinalizedPost {
    pub fn new(text: String) -> Self {
        Self { text }
    }

    /// Length in chars
    pub fn len(&self) -> usize {
        self.text.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl std::fmt::Display for FinalizedPost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}
