//! Track registry implementation
//!
//! The process-wide table of the current publisher's tracks.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::config::{PublishPolicy, RegistryConfig};
use super::entry::{SlotInfo, TrackSlot};
use super::error::RegistryError;
use crate::engine::{MediaKind, TrackHandle};
use crate::session::SessionId;

/// Table of live tracks, one slot per media kind
///
/// Every operation takes the single table lock, so publish, release and
/// subscribe are atomic with respect to each other. Subscriber lookups
/// only need the read side.
pub struct TrackRegistry {
    /// Map of media kind to its current slot
    slots: RwLock<HashMap<MediaKind, TrackSlot>>,

    /// Configuration
    config: RegistryConfig,
}

impl TrackRegistry {
    /// Create a new registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Install `handle` as the current track of `kind`
    ///
    /// Returns the pre-empted owner when another session held the slot.
    /// Under [`PublishPolicy::Reject`] an occupied slot is an error instead.
    /// Re-publishing by the current owner always replaces the handle.
    pub async fn publish(
        &self,
        kind: MediaKind,
        owner: SessionId,
        handle: TrackHandle,
    ) -> Result<Option<SessionId>, RegistryError> {
        let mut slots = self.slots.write().await;

        let previous = slots.get(&kind).map(|slot| slot.owner);
        match previous {
            Some(current) if current != owner => {
                if self.config.publish_policy == PublishPolicy::Reject {
                    tracing::warn!(
                        kind = %kind,
                        owner = %current,
                        session_id = %owner,
                        "Publish rejected: slot occupied"
                    );
                    return Err(RegistryError::SlotOccupied {
                        kind,
                        owner: current,
                    });
                }

                tracing::info!(
                    kind = %kind,
                    session_id = %owner,
                    preempted = %current,
                    track = handle.id(),
                    "Track published (pre-empted previous publisher)"
                );
            }
            _ => {
                tracing::info!(
                    kind = %kind,
                    session_id = %owner,
                    track = handle.id(),
                    "Track published"
                );
            }
        }

        slots.insert(kind, TrackSlot::new(owner, handle));
        Ok(previous.filter(|p| *p != owner))
    }

    /// Current track of `kind`, if any
    ///
    /// Publications that happen later are not delivered to callers that
    /// already looked.
    pub async fn subscribe(&self, kind: MediaKind) -> Option<TrackHandle> {
        self.slots
            .read()
            .await
            .get(&kind)
            .map(|slot| slot.handle.clone())
    }

    /// Every live track, ordered by kind
    pub async fn snapshot(&self) -> Vec<TrackHandle> {
        let slots = self.slots.read().await;
        let mut tracks: Vec<TrackHandle> = slots.values().map(|s| s.handle.clone()).collect();
        tracks.sort_by_key(|t| t.kind());
        tracks
    }

    /// Clear the slot of `kind` if, and only if, `owner` still holds it
    pub async fn release(&self, kind: MediaKind, owner: SessionId) -> bool {
        let mut slots = self.slots.write().await;

        match slots.get(&kind) {
            Some(slot) if slot.is_owned_by(owner) => {
                slots.remove(&kind);
                tracing::info!(kind = %kind, session_id = %owner, "Track released");
                true
            }
            Some(slot) => {
                tracing::debug!(
                    kind = %kind,
                    session_id = %owner,
                    owner = %slot.owner,
                    "Release skipped: slot owned by another session"
                );
                false
            }
            None => false,
        }
    }

    /// Owner of the slot for `kind`
    pub async fn owner(&self, kind: MediaKind) -> Option<SessionId> {
        self.slots.read().await.get(&kind).map(|slot| slot.owner)
    }

    /// Summary of all occupied slots, ordered by kind
    pub async fn slots(&self) -> Vec<SlotInfo> {
        let slots = self.slots.read().await;
        let mut info: Vec<SlotInfo> = slots.values().map(SlotInfo::from).collect();
        info.sort_by_key(|s| s.kind);
        info
    }

    /// Number of occupied slots
    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

impl Default for TrackRegistry {
    fn default() -> Self {
        Self::new()
    }
}
