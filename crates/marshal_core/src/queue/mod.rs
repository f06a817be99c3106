//! # Deferred Command Queue
//!
//! Multi-producer, single-consumer queue of type-erased calls.
//!
//! ## The Problem
//!
//! ```text
//! Thread 1 (Logic):   body_set_state(...)
//! Thread 2 (Render):  body_get_state(...)
//! Thread 3 (Worker):  owns the server, must be the only one touching it
//! ```
//!
//! ## The Solution
//!
//! Producers never touch the server. They box the call into a [`Command`]
//! and push it. The worker pops commands in FIFO order and runs each one
//! against the server it owns. A synchronous push parks the producer on a
//! one-shot completion channel until the worker has run the command.

mod command;
mod command_queue;

pub use command::{Call, Command, CompletionMode};
pub use command_queue::{CommandQueue, QueueStats};
