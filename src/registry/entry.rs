//! Per-kind slot stored in the registry

use std::time::{Duration, Instant};

use crate::engine::{MediaKind, TrackHandle};
use crate::session::SessionId;

/// The live track of one media kind and the session that published it
#[derive(Debug, Clone)]
pub struct TrackSlot {
    /// Session that published the track
    pub owner: SessionId,

    /// Track handed to subscribers
    pub handle: TrackHandle,

    /// When the track was published
    pub published_at: Instant,
}

impl TrackSlot {
    pub(super) fn new(owner: SessionId, handle: TrackHandle) -> Self {
        Self {
            owner,
            handle,
            published_at: Instant::now(),
        }
    }

    pub fn kind(&self) -> MediaKind {
        self.handle.kind()
    }

    /// Whether `session` currently owns this slot
    pub fn is_owned_by(&self, session: SessionId) -> bool {
        self.owner == session
    }

    /// How long the track has been live
    pub fn age(&self) -> Duration {
        self.published_at.elapsed()
    }
}

/// Summary of one occupied slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotInfo {
    pub kind: MediaKind,
    pub owner: SessionId,
    pub track_id: String,
}

impl From<&TrackSlot> for SlotInfo {
    fn from(slot: &TrackSlot) -> Self {
        Self {
            kind: slot.kind(),
            owner: slot.owner,
            track_id: slot.handle.id().to_string(),
        }
    }
}
