//! Subscription status as mirrored from the billing platform.
//!
//! The ledger never derives a status on its own; whatever the platform
//! reports is stored verbatim. The only local interpretation is which
//! statuses count as "active" for lookups and which end a membership.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::foundation::ValidationError;

/// Upstream subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Paid and current.
    Active,

    /// In a free trial period.
    Trialing,

    /// Latest invoice failed; the platform is retrying.
    PastDue,

    /// Retries exhausted, subscription kept open without payment.
    Unpaid,

    /// First invoice not yet paid.
    Incomplete,

    /// First invoice never paid; the subscription is dead.
    IncompleteExpired,

    /// Subscription ended.
    Canceled,
}

impl SubscriptionStatus {
    /// All statuses, in declaration order.
    pub const ALL: [SubscriptionStatus; 7] = [
        SubscriptionStatus::Active,
        SubscriptionStatus::Trialing,
        SubscriptionStatus::PastDue,
        SubscriptionStatus::Unpaid,
        SubscriptionStatus::Incomplete,
        SubscriptionStatus::IncompleteExpired,
        SubscriptionStatus::Canceled,
    ];

    /// Wire name used by the billing platform and the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    /// Statuses that end the trainer/member relationship.
    pub fn is_terminal_negative(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Canceled | SubscriptionStatus::IncompleteExpired
        )
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SubscriptionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                ValidationError::invalid_format("status", format!("unknown subscription status '{}'", s))
            })
    }
}

/// The statuses a caller treats as "currently subscribed".
///
/// `canceled` and `incomplete_expired` can never be members of the set,
/// whatever the caller asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveStatusSet(Vec<SubscriptionStatus>);

impl ActiveStatusSet {
    /// Builds a set from the caller's statuses, dropping terminal ones and duplicates.
    pub fn new(statuses: impl IntoIterator<Item = SubscriptionStatus>) -> Self {
        let mut set: Vec<SubscriptionStatus> = statuses
            .into_iter()
            .filter(|s| !s.is_terminal_negative())
            .collect();
        set.sort();
        set.dedup();
        Self(set)
    }

    pub fn contains(&self, status: SubscriptionStatus) -> bool {
        self.0.contains(&status)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SubscriptionStatus> {
        self.0.iter()
    }

    /// Wire names, for binding into SQL `ANY($n)` filters.
    pub fn as_strs(&self) -> Vec<String> {
        self.0.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl Default for ActiveStatusSet {
    fn default() -> Self {
        Self::new([
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::Incomplete,
        ])
    }
}
