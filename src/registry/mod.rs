//! Track registry for single-publisher fan-out
//!
//! The registry remembers, for each media kind, which track the current
//! publisher is sending and which session owns it. Subscriber sessions read
//! it when they pick their role and attach whatever is live at that moment.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<TrackRegistry>
//!                  ┌──────────────────────────────┐
//!                  │ slots: HashMap<MediaKind,    │
//!                  │   TrackSlot {                │
//!                  │     owner: SessionId,        │
//!                  │     handle: TrackHandle,     │
//!                  │   }                          │
//!                  │ >                            │
//!                  └──────────────┬───────────────┘
//!                                 │
//!         ┌───────────────────────┼───────────────────────┐
//!         │                       │                       │
//!         ▼                       ▼                       ▼
//!    [Publisher]            [Subscriber]            [Subscriber]
//!    TrackReceived          snapshot()              snapshot()
//!         │                       │                       │
//!         └──► publish()          └──► engine.attach_track(handle)
//! ```
//!
//! # Ownership
//!
//! `release` is compare-and-clear: a publisher that was pre-empted and later
//! disconnects cannot clear the slot its successor now owns.

pub mod config;
pub mod entry;
pub mod error;
pub mod store;

pub use config::{PublishPolicy, RegistryConfig};
pub use entry::{SlotInfo, TrackSlot};
pub use error::RegistryError;
pub use store::TrackRegistry;
