//! Registry error types

use crate::engine::MediaKind;
use crate::session::SessionId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Another session owns the slot and the policy forbids pre-emption
    SlotOccupied { kind: MediaKind, owner: SessionId },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::SlotOccupied { kind, owner } => {
                write!(f, "{} slot already published by session {}", kind, owner)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
