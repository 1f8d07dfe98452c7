//! Utility functions shared by the concord crates.
//!
//! - [`diff`]: Myers O(ND) difference over slices, strings and lines.
//! - [`peer`]: random replica identifiers.

pub mod diff;
pub mod peer;

pub use peer::random_peer_id;
