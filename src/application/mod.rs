//! Page-level services: prefetch, hydration, mutations, and page generation.

pub mod composer;
pub mod error;
pub mod mutation;
pub mod pages;
pub mod prefetch;
pub mod router;
pub mod session;
