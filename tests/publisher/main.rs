//! Publisher integration tests.
//!
//! - Delivery to existing topics and the returned metadata
//! - Topic, size and configuration failures that never reach the send path
//! - Host resolution precedence and concurrent calls

#[path = "../support/mod.rs"]
mod support;

mod publish;
mod resolution;
