//! Subscriber - long-running, at-least-once consumption into a dispatch sink.
//!
//! ## Architecture
//!
//! ```text
//! Subscriber::new ──► setup ─────────────────────────────► run(&StopToken)
//!   validate         open consumer (Backoff, transient)     loop until stopped:
//!   defaults         list topics ─► MissingTopics ─► close    poll (bounded)
//!                    subscribe(all topics)                    decode ─► Event
//!                                                             sink.dispatch
//!                                                             commit (only on Ok)
//!                                                           close consumer
//! ```
//!
//! Lifecycle: `Configured → Connecting → Verifying → Ready → Running → Stopped`.
//!
//! A dispatch failure halts the loop without committing, so the record is
//! redelivered to the group after restart. `SubscriberThread` runs the whole
//! sequence on a background thread.

mod backoff;
mod error;
mod stop;
#[allow(clippy::module_inception)]
mod subscriber;
mod thread;

pub use backoff::Backoff;
pub use error::SubscribeError;
pub use stop::StopToken;
pub use subscriber::{Lifecycle, Subscriber, SubscriberStats, SubscriptionState};
pub use thread::SubscriberThread;
