//! Subscription Management Types
//!
//! Domain types for tracking which instruments the streaming session is
//! subscribed to.
//!
//! # Design
//!
//! The subscription list tracks:
//! - Every instrument code ever requested, in request order, once each
//! - How many of those have already been sent on the current connection
//!
//! New codes are therefore sent exactly once per connection, and after a
//! reconnect the whole list is replayed in its original order.

use thiserror::Error;

/// Longest instrument code accepted by the feed.
pub const MAX_CODE_LEN: usize = 12;

// =============================================================================
// Errors
// =============================================================================

/// Rejected instrument code.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// Code was empty or whitespace.
    #[error("instrument code is empty")]
    Empty,

    /// Code contained something other than ASCII letters and digits.
    #[error("instrument code {0:?} contains invalid characters")]
    InvalidCharacters(String),

    /// Code was longer than [`MAX_CODE_LEN`].
    #[error("instrument code {code:?} exceeds {max} characters")]
    TooLong {
        /// The offending code.
        code: String,
        /// Maximum length.
        max: usize,
    },
}

// =============================================================================
// Subscription Target
// =============================================================================

/// A validated instrument code, e.g. `005930`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionTarget(String);

impl SubscriptionTarget {
    /// Validate and wrap an instrument code. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    ///
    /// Returns an error if the code is empty, too long, or not ASCII
    /// alphanumeric.
    pub fn parse(code: &str) -> Result<Self, SubscriptionError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(SubscriptionError::Empty);
        }
        if code.len() > MAX_CODE_LEN {
            return Err(SubscriptionError::TooLong {
                code: code.to_string(),
                max: MAX_CODE_LEN,
            });
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(SubscriptionError::InvalidCharacters(code.to_string()));
        }
        Ok(Self(code.to_string()))
    }

    /// Parse a comma-separated list, skipping empty entries.
    ///
    /// # Errors
    ///
    /// Returns the first invalid code's error.
    pub fn parse_list(raw: &str) -> Result<Vec<Self>, SubscriptionError> {
        raw.split(',')
            .filter(|s| !s.trim().is_empty())
            .map(Self::parse)
            .collect()
    }

    /// The instrument code.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Subscription List
// =============================================================================

/// Append-only, insertion-ordered, de-duplicated list of subscription
/// targets with a per-connection send cursor.
///
/// # Example
///
/// ```rust
/// use kis_feed_bridge::domain::subscription::{SubscriptionList, SubscriptionTarget};
///
/// let mut list = SubscriptionList::new();
/// let samsung = SubscriptionTarget::parse("005930").unwrap();
///
/// // First request: one new code, pending on the current connection
/// assert_eq!(list.add([samsung.clone()]), 1);
/// assert_eq!(list.take_pending(), vec![samsung.clone()]);
///
/// // Requesting it again changes nothing
/// assert_eq!(list.add([samsung.clone()]), 0);
/// assert!(list.take_pending().is_empty());
///
/// // New connection: everything is pending again
/// list.reset_sent();
/// assert_eq!(list.take_pending(), vec![samsung]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct SubscriptionList {
    targets: Vec<SubscriptionTarget>,
    sent: usize,
}

impl SubscriptionList {
    /// Create an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            targets: Vec::new(),
            sent: 0,
        }
    }

    /// Append targets not already present, keeping first-seen order.
    ///
    /// Returns how many were new.
    pub fn add(&mut self, targets: impl IntoIterator<Item = SubscriptionTarget>) -> usize {
        let mut added = 0;
        for target in targets {
            if !self.targets.contains(&target) {
                self.targets.push(target);
                added += 1;
            }
        }
        added
    }

    /// Targets not yet sent on the current connection, in order. Marks them
    /// as sent.
    pub fn take_pending(&mut self) -> Vec<SubscriptionTarget> {
        let pending = self.targets[self.sent..].to_vec();
        self.sent = self.targets.len();
        pending
    }

    /// Forget what was sent; called when a new connection is established.
    pub const fn reset_sent(&mut self) {
        self.sent = 0;
    }

    /// Number of targets not yet sent on the current connection.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.targets.len() - self.sent
    }

    /// All targets in insertion order.
    #[must_use]
    pub fn targets(&self) -> &[SubscriptionTarget] {
        &self.targets
    }

    /// Whether `code` is in the list.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.targets.iter().any(|t| t.as_str() == code)
    }

    /// Number of targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
