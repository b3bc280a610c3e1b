//! Critical Section Integration Tests
//!
//! Concurrent lock-protected decrements under each unit-of-work strategy,
//! plus contention, release and failure behavior of guarded calls.

#[path = "../common/mod.rs"]
mod common;

mod contention;
mod failures;
mod release;
mod strategies;
