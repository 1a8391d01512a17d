//! Toggle coordinator: flips a remote boolean property with an optimistic
//! local update, a cancellation-immune confirm-and-retry loop, and a
//! refresh-bus notification on confirmed success.

use crate::cache::SubscriptionCache;
use crate::error::{EncoreError, Result};
use crate::remote::RemoteAuthority;
use crate::signal::RefreshBus;
use crate::types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Attempt budget for the confirm loop: `attempts` total calls with a fixed
/// `delay_ms` pause between consecutive attempts and none after the last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    500
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

// ---------------------------------------------------------------------------
// Ack / ToggleStart
// ---------------------------------------------------------------------------

/// One-shot user-visible acknowledgment, sent exactly once per completed
/// toggle. The sink is fire-and-forget; a dropped receiver is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Ack {
    Subscribed { entity: EntityId },
    Unsubscribed { entity: EntityId },
    ToggleFailed { entity: EntityId, desired: bool },
}

/// Outcome of a trigger, from the caller's perspective. The confirm loop
/// itself is detached and always completes without faulting the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleStart {
    Started,
    /// A toggle for the same entity is still confirming; this trigger was
    /// ignored, not queued.
    AlreadyInFlight,
}

// ---------------------------------------------------------------------------
// ToggleCoordinator
// ---------------------------------------------------------------------------

/// Cheap to clone; clones share the cache, remote handle, bus, and the
/// per-entity in-flight registry.
#[derive(Clone)]
pub struct ToggleCoordinator {
    cache: Arc<SubscriptionCache>,
    remote: Arc<dyn RemoteAuthority>,
    bus: RefreshBus,
    acks: mpsc::UnboundedSender<Ack>,
    policy: RetryPolicy,
    in_flight: Arc<Mutex<HashSet<EntityId>>>,
}

impl ToggleCoordinator {
    pub fn new(
        cache: Arc<SubscriptionCache>,
        remote: Arc<dyn RemoteAuthority>,
        bus: RefreshBus,
        acks: mpsc::UnboundedSender<Ack>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            remote,
            bus,
            acks,
            policy,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn cache(&self) -> &SubscriptionCache {
        &self.cache
    }

    /// Flip the entity's subscription. The local cell is inverted before
    /// this returns; remote confirmation (with retries) runs on a detached
    /// task that outlives the caller's scope and is stopped only by runtime
    /// shutdown.
    pub fn toggle(&self, entity: &EntityId) -> ToggleStart {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            if !in_flight.insert(entity.clone()) {
                tracing::debug!(entity = %entity, "toggle already confirming, ignored");
                return ToggleStart::AlreadyInFlight;
            }
        }

        // Optimistic: observable before the first remote attempt is issued.
        let desired = self.cache.flip(entity);

        let this = self.clone();
        let entity = entity.clone();
        tokio::spawn(async move {
            this.confirm(entity, desired).await;
        });

        ToggleStart::Started
    }

    async fn confirm(&self, entity: EntityId, desired: bool) {
        let outcome = self.confirm_with_retry(&entity, desired).await;
        // Terminal either way: release the entity before emitting side
        // effects so an ack handler can trigger the next toggle.
        self.in_flight.lock().unwrap().remove(&entity);
        match outcome {
            Ok(attempt) => {
                tracing::info!(entity = %entity, attempt, desired, "subscription confirmed");
                self.bus.notify();
                let ack = if desired {
                    Ack::Subscribed {
                        entity: entity.clone(),
                    }
                } else {
                    Ack::Unsubscribed {
                        entity: entity.clone(),
                    }
                };
                let _ = self.acks.send(ack);
            }
            Err(err) => {
                // Local state is intentionally left at the optimistic value;
                // it reconciles on the next full refetch.
                tracing::warn!(entity = %entity, error = %err, "toggle failed");
                let _ = self.acks.send(Ack::ToggleFailed {
                    entity: entity.clone(),
                    desired,
                });
            }
        }
    }

    /// Returns the 1-based attempt number that succeeded.
    async fn confirm_with_retry(&self, entity: &EntityId, desired: bool) -> Result<u32> {
        let attempts = self.policy.attempts.max(1);
        for attempt in 1..=attempts {
            match self.remote.set_subscription(entity, desired).await {
                Ok(()) => return Ok(attempt),
                Err(err) => {
                    tracing::warn!(
                        entity = %entity,
                        attempt,
                        error = %err,
                        "set_subscription failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.policy.delay()).await;
                    }
                }
            }
        }
        Err(EncoreError::RetriesExhausted {
            entity: entity.clone(),
            attempts,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
