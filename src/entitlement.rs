//! Playback gate: decides whether an item may play and whether it carries ads.
//!
//! Pure and deterministic given the evaluation instant. A denial is a normal
//! business outcome carried in the verdict, never an error.

use crate::content::ContentItem;
use crate::session::SessionFacts;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdMode {
    None,
    Avod,
}

impl fmt::Display for AdMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdMode::None => write!(f, "none"),
            AdMode::Avod => write!(f, "avod"),
        }
    }
}

/// Why playback was refused. Each maps to one actionable UI path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenyReason {
    /// Sign in (or create an account).
    Login,
    /// Upgrade to an active membership.
    Upgrade,
    /// Rent or buy this item.
    Tvod,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Login => write!(f, "login"),
            DenyReason::Upgrade => write!(f, "upgrade"),
            DenyReason::Tvod => write!(f, "tvod"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessVerdict {
    pub allowed: bool,
    pub ad_mode: AdMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenyReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AccessVerdict {
    pub fn allow(ad_mode: AdMode) -> Self {
        AccessVerdict {
            allowed: true,
            ad_mode,
            reason: None,
            message: None,
        }
    }

    pub fn deny(reason: DenyReason, message: &str) -> Self {
        AccessVerdict {
            allowed: false,
            ad_mode: AdMode::None,
            reason: Some(reason),
            message: Some(message.to_string()),
        }
    }

    pub fn is_avod(&self) -> bool {
        self.allowed && self.ad_mode == AdMode::Avod
    }
}

const SVOD_LOGIN_MESSAGE: &str =
    "This title is available with a membership. Please log in or create an account to continue.";
const SVOD_UPGRADE_MESSAGE: &str =
    "Your account does not have an active streaming membership. Upgrade your plan to watch this title.";
const TVOD_LOGIN_MESSAGE: &str = "Please log in to rent or buy this title.";
const TVOD_PURCHASE_MESSAGE: &str =
    "This title is available as a rental or purchase. Rent or buy it to unlock playback.";

/// Monetization classification of one item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub ad_supported: bool,
    pub subscription_gated: bool,
    pub transactional: bool,
}

impl AccessFlags {
    pub fn of(item: &ContentItem) -> Self {
        let flags = item.monetization_flags();
        let is_label = |value: Option<&str>, label: &str| {
            value.is_some_and(|v| v.trim().eq_ignore_ascii_case(label))
        };

        let ad_supported = flags.is_some_and(|m| m.avod)
            || item.avod
            || is_label(item.paywall.as_deref(), "AVOD")
            || is_label(item.access.as_deref(), "AVOD")
            || item
                .monetization_label()
                .is_some_and(|l| l.to_uppercase().contains("AVOD"));

        let subscription_gated = flags.is_some_and(|m| m.svod)
            || is_label(item.paywall.as_deref(), "SVOD")
            || is_label(item.access.as_deref(), "SVOD");

        let transactional = item.tvod_offer().is_some_and(|t| t.is_offered());

        AccessFlags {
            ad_supported,
            subscription_gated,
            transactional,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.ad_supported && !self.subscription_gated && !self.transactional
    }
}

/// Evaluate access for `item` against the viewer's facts, now.
pub fn evaluate(item: &ContentItem, facts: &SessionFacts) -> AccessVerdict {
    evaluate_at(item, facts, Utc::now())
}

/// Evaluate access at an explicit instant (subscription expiry is checked
/// against `now`).
///
/// Ad-supported + subscription hybrids always take the ad-free path for an
/// entitled member, and stay playable with ads for everyone else.
pub fn evaluate_at(item: &ContentItem, facts: &SessionFacts, now: DateTime<Utc>) -> AccessVerdict {
    let flags = AccessFlags::of(item);

    if flags.is_free() {
        return AccessVerdict::allow(AdMode::None);
    }

    if flags.ad_supported {
        if flags.subscription_gated && facts.has_active_subscription_at(now) {
            return AccessVerdict::allow(AdMode::None);
        }
        return AccessVerdict::allow(AdMode::Avod);
    }

    if flags.subscription_gated {
        if !facts.signed_in {
            return AccessVerdict::deny(DenyReason::Login, SVOD_LOGIN_MESSAGE);
        }
        if !facts.has_active_subscription_at(now) {
            return AccessVerdict::deny(DenyReason::Upgrade, SVOD_UPGRADE_MESSAGE);
        }
        return AccessVerdict::allow(AdMode::None);
    }

    if !facts.signed_in {
        return AccessVerdict::deny(DenyReason::Login, TVOD_LOGIN_MESSAGE);
    }
    if facts.owns(&item.id) {
        return AccessVerdict::allow(AdMode::None);
    }
    AccessVerdict::deny(DenyReason::Tvod, TVOD_PURCHASE_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Membership;
    use chrono::Duration;
    use serde_json::json;

    fn item(value: serde_json::Value) -> ContentItem {
        serde_json::from_value(value).unwrap()
    }

    fn active_member() -> SessionFacts {
        SessionFacts::signed_in(Some(Membership {
            plan: Some("svod-monthly".into()),
            status: Some("ACTIVE".into()),
            expires_at: None,
        }))
    }

    fn expired_member(now: DateTime<Utc>) -> SessionFacts {
        SessionFacts::signed_in(Some(Membership {
            plan: Some("svod-monthly".into()),
            status: None,
            expires_at: Some(now - Duration::days(1)),
        }))
    }

    #[test]
    fn free_content_plays_without_ads() {
        let v = evaluate(&item(json!({ "id": "f" })), &SessionFacts::anonymous());
        assert_eq!(v, AccessVerdict::allow(AdMode::None));
    }

    #[test]
    fn hybrid_member_skips_ads() {
        let it = item(json!({ "id": "h", "monetization": { "avod": true, "svod": true } }));
        let v = evaluate(&it, &active_member());
        assert!(v.allowed);
        assert_eq!(v.ad_mode, AdMode::None);
    }

    #[test]
    fn hybrid_logged_out_gets_avod() {
        let it = item(json!({ "id": "h", "monetization": { "avod": true, "svod": true } }));
        let v = evaluate(&it, &SessionFacts::anonymous());
        assert!(v.allowed);
        assert_eq!(v.ad_mode, AdMode::Avod);
    }

    #[test]
    fn avod_only_is_avod_regardless_of_session() {
        let it = item(json!({ "id": "a", "paywall": "avod" }));
        for facts in [SessionFacts::anonymous(), active_member(), SessionFacts::signed_in(None)] {
            let v = evaluate(&it, &facts);
            assert!(v.allowed);
            assert_eq!(v.ad_mode, AdMode::Avod);
        }
    }

    #[test]
    fn svod_requires_login() {
        let it = item(json!({ "id": "s", "monetization": { "svod": true } }));
        let v = evaluate(&it, &SessionFacts::anonymous());
        assert!(!v.allowed);
        assert_eq!(v.reason, Some(DenyReason::Login));
        assert!(v.message.is_some());
    }

    #[test]
    fn svod_expired_yesterday_requires_upgrade() {
        let now = Utc::now();
        let it = item(json!({ "id": "s", "monetization": { "svod": true } }));
        let v = evaluate_at(&it, &expired_member(now), now);
        assert!(!v.allowed);
        assert_eq!(v.reason, Some(DenyReason::Upgrade));
    }

    #[test]
    fn svod_active_member_plays() {
        let it = item(json!({ "id": "s", "access": "SVOD" }));
        assert_eq!(evaluate(&it, &active_member()), AccessVerdict::allow(AdMode::None));
    }

    #[test]
    fn tvod_without_session_requires_login() {
        let it = item(json!({ "id": "t", "monetization": { "tvod": { "enabled": true } } }));
        let v = evaluate(&it, &SessionFacts::anonymous());
        assert_eq!(v.reason, Some(DenyReason::Login));
        assert!(!v.allowed);
    }

    #[test]
    fn tvod_purchased_plays_without_ads() {
        let it = item(json!({ "id": "t", "monetization": { "tvod": { "buyPrice": 9.99 } } }));
        let facts = SessionFacts::signed_in(None).with_purchase("t");
        assert_eq!(evaluate(&it, &facts), AccessVerdict::allow(AdMode::None));
    }

    #[test]
    fn tvod_not_purchased_is_denied() {
        let it = item(json!({ "id": "t", "monetization": { "tvod": { "price": 4 } } }));
        let v = evaluate(&it, &active_member());
        assert_eq!(v.reason, Some(DenyReason::Tvod));
    }

    #[test]
    fn label_monetization_counts_as_avod() {
        let it = item(json!({ "id": "l", "monetization": "avod" }));
        assert!(AccessFlags::of(&it).ad_supported);
    }

    #[test]
    fn verdict_serializes_with_lowercase_reason() {
        let v = AccessVerdict::deny(DenyReason::Tvod, "x");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["reason"], "tvod");
        assert_eq!(json["ad_mode"], "none");
    }
}
