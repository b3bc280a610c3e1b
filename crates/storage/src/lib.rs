//! Storage layer for stratalock
//!
//! This crate implements the committed-state side of the resource store:
//! - MemoryStore: DashMap-backed store with optional simulated commit latency
//! - testing::FaultyStore: commit failure injection
//!
//! Uncommitted state never lives here. Units of work buffer their writes in
//! the concurrency crate and hand them to [`Storage::apply`] at commit.
//!
//! [`Storage::apply`]: strata_core::traits::Storage::apply

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod testing;

pub use memory::MemoryStore;
