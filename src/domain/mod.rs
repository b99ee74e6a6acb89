//! Domain layer types and invariants.

pub mod error;
pub mod payload;
pub mod posts;
pub mod slug;
