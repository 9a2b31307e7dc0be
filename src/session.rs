use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Membership record as reported by the auth collaborator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Plan markers that identify a subscription plan.
const SUBSCRIPTION_MARKERS: [&str; 4] = ["SVOD", "SUB", "MONTH", "ANNUAL"];

/// Statuses that keep a subscription valid.
const ACTIVE_STATUSES: [&str; 3] = ["ACTIVE", "TRIALING", "PAID"];

const CANCELLATION_MARKER: &str = "CANCEL";

/// The viewer's entitlement state. Read-only to the playback core; the auth
/// collaborator rebuilds it on every auth-state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionFacts {
    #[serde(default)]
    pub signed_in: bool,
    #[serde(default)]
    pub membership: Option<Membership>,
    /// Client-side cached "subscription active" flag.
    #[serde(default)]
    pub cached_svod_active: bool,
    #[serde(default)]
    pub purchased: HashSet<String>,
    /// Per-item unlocks cached after a completed checkout.
    #[serde(default)]
    pub unlocked: HashSet<String>,
}

impl SessionFacts {
    pub fn anonymous() -> Self {
        SessionFacts::default()
    }

    pub fn signed_in(membership: Option<Membership>) -> Self {
        SessionFacts {
            signed_in: true,
            membership,
            ..Default::default()
        }
    }

    pub fn with_purchase(mut self, id: impl Into<String>) -> Self {
        self.purchased.insert(id.into());
        self
    }

    /// Whether a paid subscription is valid right now.
    pub fn has_active_subscription(&self) -> bool {
        self.has_active_subscription_at(Utc::now())
    }

    /// Subscription validity at an explicit instant.
    ///
    /// Rules:
    /// 1. No session -> false
    /// 2. Plan contains the cancellation marker -> false
    /// 3. Cached active flag -> true
    /// 4. Plan must look like a subscription plan
    /// 5. A present status must be one of the active statuses
    /// 6. A present expiry must not be in the past
    pub fn has_active_subscription_at(&self, now: DateTime<Utc>) -> bool {
        if !self.signed_in {
            return false;
        }
        let membership = self.membership.clone().unwrap_or_default();
        let plan = membership.plan.unwrap_or_default().to_uppercase();

        if plan.contains(CANCELLATION_MARKER) {
            return false;
        }
        if self.cached_svod_active {
            return true;
        }
        if !SUBSCRIPTION_MARKERS.iter().any(|m| plan.contains(m)) {
            return false;
        }
        if let Some(status) = membership.status.filter(|s| !s.trim().is_empty()) {
            let status = status.trim().to_uppercase();
            if !ACTIVE_STATUSES.contains(&status.as_str()) {
                return false;
            }
        }
        if let Some(expires_at) = membership.expires_at {
            if now > expires_at {
                return false;
            }
        }
        true
    }

    /// Purchased or locally unlocked.
    pub fn owns(&self, id: &str) -> bool {
        !id.is_empty() && (self.purchased.contains(id) || self.unlocked.contains(id))
    }
}
