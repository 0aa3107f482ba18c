//! Repository layer for database access.
//!
//! Each repository is a trait with an SQLx implementation, so services can be
//! exercised against in-memory fakes.

pub mod blacklist;
pub mod subscription;

pub use blacklist::*;
pub use subscription::*;
