use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::collaborators::{SubscriptionProvider, SubscriptionStatus};
use super::domain::EducatorId;

pub const DEFAULT_FREE_CONVERSATIONS: u32 = 3;
pub const DEFAULT_FREE_BOOKINGS: u32 = 2;

/// Activity caps applied to educators without an active subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionLimits {
    pub free_conversations: u32,
    pub free_bookings: u32,
}

impl Default for SubscriptionLimits {
    fn default() -> Self {
        Self {
            free_conversations: DEFAULT_FREE_CONVERSATIONS,
            free_bookings: DEFAULT_FREE_BOOKINGS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GateDecision {
    Allowed,
    LimitReached { limit: u32 },
}

impl GateDecision {
    pub fn is_allowed(self) -> bool {
        matches!(self, GateDecision::Allowed)
    }
}

/// Answers "may this educator take on one more conversation/booking".
pub struct SubscriptionGate {
    provider: Arc<dyn SubscriptionProvider>,
    limits: SubscriptionLimits,
}

impl SubscriptionGate {
    pub fn new(provider: Arc<dyn SubscriptionProvider>, limits: SubscriptionLimits) -> Self {
        Self { provider, limits }
    }

    pub fn can_open_conversation(&self, educator_id: &EducatorId, active: u32) -> GateDecision {
        self.check(educator_id, active, self.limits.free_conversations)
    }

    pub fn can_accept_booking(&self, educator_id: &EducatorId, active: u32) -> GateDecision {
        self.check(educator_id, active, self.limits.free_bookings)
    }

    fn check(&self, educator_id: &EducatorId, active: u32, free_limit: u32) -> GateDecision {
        if self.is_subscribed(educator_id) || active < free_limit {
            GateDecision::Allowed
        } else {
            GateDecision::LimitReached { limit: free_limit }
        }
    }

    /// Provider failures fall back to the free tier.
    fn is_subscribed(&self, educator_id: &EducatorId) -> bool {
        match self.provider.active_subscription(educator_id) {
            Ok(Some(SubscriptionStatus { active, .. })) => active,
            Ok(None) => false,
            Err(err) => {
                warn!(educator = %educator_id, error = %err, "subscription lookup failed; applying free tier limits");
                false
            }
        }
    }
}
