//! Integration test infrastructure for the GPIO safety watchdog
//!
//! Provides:
//! - Simulated pin banks wired to a watchdog
//! - Fixtures for the gate controller's pin policies
//! - Deterministic tick stepping with synthetic timestamps
//! - Log capture and state verification helpers

pub mod fixtures;
mod verification;

pub use fixtures::*;
pub use verification::*;
