//! Integration test harness for the SQRL workspace.
//!
//! Provides an in-process site (driver + in-memory storage) and a
//! simulated device so tests can run whole protocol conversations
//! without a transport layer.

pub mod harness;

pub use harness::{TestDevice, TestSite};
