//! Warden integration tests.
//!
//! Cross-crate scenarios driven through the public service API with a
//! recording mock platform and an in-memory broadcast channel. The unit
//! behavior of each crate lives next to its code; this crate covers the
//! flows that span them: command to verdict, fleet exchange round trips,
//! and state surviving restarts.

pub mod harness;

mod persistence_tests;

pub use harness::{MemoryChannel, MockPlatform, TestEnv};
