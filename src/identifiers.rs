//! Type-safe identifiers.
//!
//! Newtype wrappers keep correlation ids and subscription handles from being
//! mixed up with arbitrary strings or integers.
//!
//! | Type | Backing | Purpose |
//! |------|---------|---------|
//! | [`ActionId`] | UUID v4 | Correlates one action request with one response |
//! | [`SubscriptionId`] | `u64` counter | Handle returned by `subscribe` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// ActionId
// ============================================================================

/// Correlation id for an outstanding action.
///
/// Backed by a random UUID v4 (122 random bits), so collisions among
/// outstanding requests are cryptographically negligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generates a fresh random id.
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ActionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Global counter for subscription ids.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next subscription id.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn test_action_id_roundtrip_string() {
        let id = ActionId::generate();
        let parsed: ActionId = id.to_string().parse().expect("parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_action_id_serializes_as_string() {
        let id = ActionId::generate();
        let json = serde_json::to_value(id).expect("serialize");
        assert_eq!(json.as_str(), Some(id.to_string().as_str()));
    }

    #[test]
    fn test_action_id_rejects_garbage() {
        assert!("not-an-id".parse::<ActionId>().is_err());
    }

    #[test]
    fn test_subscription_ids_increase() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert!(b > a);
        assert!(a.to_string().starts_with("sub-"));
    }

    proptest! {
        #[test]
        fn prop_generated_ids_are_distinct(count in 1usize..512) {
            let ids: FxHashSet<ActionId> = (0..count).map(|_| ActionId::generate()).collect();
            prop_assert_eq!(ids.len(), count);
        }
    }
}
