//! # Result Sink and Dead-Letter Monitor
//!
//! The terminal listeners of the relay: the result service hands completed
//! process state back to synchronous callers, the dead-letter monitor records
//! envelopes the relay gave up on.

pub mod dead_letter;
pub mod result;

pub use dead_letter::{DeadLetter, DeadLetterMonitor};
pub use result::{ResultError, ResultService};
