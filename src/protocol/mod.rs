//! Signaling protocol
//!
//! JSON messages carried in WebSocket text frames:
//!
//! | `type`      | direction       | payload                                        |
//! |-------------|-----------------|------------------------------------------------|
//! | `role`      | client → server | `{role: "publisher" \| "subscriber"}`          |
//! | `offer`     | both            | `{sdp}`                                        |
//! | `answer`    | both            | `{sdp}`                                        |
//! | `candidate` | both            | `{candidate: {candidate, sdpMid?, sdpMLineIndex?}}` |
//! | `hangup`    | client → server | none                                           |
//!
//! A missing, `null` or empty candidate decodes to the end-of-candidates
//! marker. Binary frames never go through this module.

pub mod codec;
pub mod message;

pub use codec::{decode, encode};
pub use message::{ClientMessage, RoleRequest, ServerMessage};
