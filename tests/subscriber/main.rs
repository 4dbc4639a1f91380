//! Subscriber integration tests.
//!
//! - Decode, dispatch and commit against the in-memory broker
//! - At-least-once redelivery after a dispatch failure
//! - Startup: topic verification, connection retries, configuration errors
//! - Background thread handle and cooperative stop

#[path = "../support/mod.rs"]
mod support;

mod startup;
mod threaded;
