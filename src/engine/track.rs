//! Track handles shared between publisher and subscriber engines

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Kind of media a track carries
///
/// The registry keeps one slot per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
    /// Undifferentiated data stream
    Data,
}

impl MediaKind {
    /// Name used in SDP `m=` lines and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Audio => "audio",
            MediaKind::Video => "video",
            MediaKind::Data => "application",
        }
    }

    /// Parse the media field of an SDP `m=` line
    pub fn from_sdp_media(media: &str) -> Option<Self> {
        match media {
            "audio" => Some(MediaKind::Audio),
            "video" => Some(MediaKind::Video),
            "application" => Some(MediaKind::Data),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to a live track owned by a publisher's engine
///
/// The handle is opaque to the core. Engines put whatever they need to
/// re-attach the track to another peer into `source` and downcast it back
/// in [`MediaEngine::attach_track`](super::MediaEngine::attach_track).
/// Cloning only bumps a reference count.
#[derive(Clone)]
pub struct TrackHandle {
    id: Arc<str>,
    kind: MediaKind,
    source: Arc<dyn Any + Send + Sync>,
}

impl TrackHandle {
    /// Create a handle wrapping an engine-specific track source
    pub fn new<T>(id: impl Into<String>, kind: MediaKind, source: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        let id: String = id.into();
        Self {
            id: Arc::from(id),
            kind,
            source,
        }
    }

    /// Track identifier (unique per engine)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Media kind of this track
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Downcast the engine-specific source
    pub fn source<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.source).downcast::<T>().ok()
    }

    /// Whether two handles refer to the same underlying track
    pub fn same_track(&self, other: &TrackHandle) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downcast_source() {
        let handle = TrackHandle::new("t1", MediaKind::Video, Arc::new(42u32));

        assert_eq!(handle.id(), "t1");
        assert_eq!(handle.kind(), MediaKind::Video);
        assert_eq!(handle.source::<u32>().as_deref(), Some(&42));
        assert!(handle.source::<String>().is_none());
    }

    #[test]
    fn test_same_track() {
        let a = TrackHandle::new("t1", MediaKind::Audio, Arc::new(()));
        let b = a.clone();
        let c = TrackHandle::new("t1", MediaKind::Audio, Arc::new(()));

        assert!(a.same_track(&b));
        assert!(!a.same_track(&c));
    }

    #[test]
    fn test_sdp_media_names() {
        assert_eq!(MediaKind::from_sdp_media("audio"), Some(MediaKind::Audio));
        assert_eq!(MediaKind::from_sdp_media("application"), Some(MediaKind::Data));
        assert_eq!(MediaKind::from_sdp_media("text"), None);
        assert_eq!(MediaKind::Data.to_string(), "application");
    }
}
