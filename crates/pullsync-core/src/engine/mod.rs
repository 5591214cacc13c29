//! Sync Engine - the heart of pullsync
//!
//! This module implements the recursive pull-and-delete engine:
//! - Global admission pool bounding busy tasks across the whole tree
//! - Token bucket rate limiting shared by every transfer
//! - Checksum-verified downloads that delete the remote copy afterwards
//! - Bottom-up pruning of remote folders whose subtree finished cleanly

mod admission;
mod fetcher;
mod folder;
mod orchestrator;
mod rate_limiter;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::*;
pub use fetcher::*;
pub use folder::*;
pub use orchestrator::*;
pub use rate_limiter::*;
