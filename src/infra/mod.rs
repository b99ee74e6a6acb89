//! Infrastructure adapters and runtime bootstrap.

pub mod codec;
pub mod error;
pub mod memory;
pub mod telemetry;
