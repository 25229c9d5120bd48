//! Inter-host guest authentication
//!
//! - `handshake`: Flows A, B and C
//! - `peer`: outbound form posts to peer hosts
//! - `tasks`: bounded, deadline-limited background completions

pub mod handshake;
pub mod peer;
pub mod tasks;

pub use handshake::{GuestConfig, GuestService, HostTokenOutcome};
pub use peer::{GuestRequestForm, HttpPeerClient, PeerClient, PeerReply, PlaceTokenForm};
pub use tasks::CallbackRunner;
