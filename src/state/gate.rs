use crate::entity::Value;
use crate::rate_limit::RateLimitPolicy;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::time::Instant;

/// What was last sent for an entity. Exists only after its first publish.
#[derive(Clone, Debug, PartialEq)]
pub struct PublishState {
    pub value: Value,
    pub at: Instant,
}

/// Decides whether a freshly read value is published.
///
/// Rules, in order:
/// 1. first observation of a key is always published
/// 2. a value equal to the last published one is suppressed
/// 3. keys without a rate limit publish every change
/// 4. rate-limited keys publish once the interval elapsed or the value moved
///    by at least the threshold
///
/// Suppressed observations leave the state untouched, so deltas are always
/// measured from the last published value.
#[derive(Debug, Default)]
pub struct ChangeGate {
    /// Entry locking serializes decisions per key
    published: DashMap<String, PublishState>,
    policies: BTreeMap<String, RateLimitPolicy>,
}

impl ChangeGate {
    pub fn new(policies: BTreeMap<String, RateLimitPolicy>) -> Self {
        Self {
            published: DashMap::new(),
            policies,
        }
    }

    /// Returns true when `value` should be published, recording it as the
    /// new anchor in that case.
    pub fn should_publish(&self, key: &str, value: &Value, now: Instant) -> bool {
        match self.published.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(PublishState {
                    value: value.clone(),
                    at: now,
                });
                true
            }
            Entry::Occupied(mut slot) => {
                let last = slot.get();
                if last.value == *value {
                    return false;
                }
                let allowed = match self.policies.get(key) {
                    None => true,
                    Some(policy) => policy.allows(last.at, now, value.delta(&last.value)),
                };
                if allowed {
                    slot.insert(PublishState {
                        value: value.clone(),
                        at: now,
                    });
                }
                allowed
            }
        }
    }

    /// Forget a publish that never reached the broker, so the value is
    /// offered again on the next cycle.
    pub fn revert(&self, key: &str, previous: Option<PublishState>) {
        match previous {
            Some(state) => {
                self.published.insert(key.to_string(), state);
            }
            None => {
                self.published.remove(key);
            }
        }
    }

    pub fn last_published(&self, key: &str) -> Option<PublishState> {
        self.published.get(key).map(|s| s.clone())
    }

    pub fn policy(&self, key: &str) -> Option<&RateLimitPolicy> {
        self.policies.get(key)
    }

    /// Number of keys published at least once
    pub fn published_count(&self) -> usize {
        self.published.len()
    }
}
