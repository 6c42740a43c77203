//! Streaming content hashing for Portsy manifests.
//!
//! A [`Hasher`] is fixed to one algorithm; every hash inside a single
//! `ProjectState` comes from the same hasher, so digests are always
//! comparable without carrying the algorithm per entry.

pub mod error;
pub mod hasher;

pub use error::{HashError, HashResult};
pub use hasher::{HashedFile, Hasher};
