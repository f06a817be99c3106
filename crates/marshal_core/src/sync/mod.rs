//! # Synchronization Primitives for the Step/Sync Barrier
//!
//! ## The Problem
//!
//! ```text
//! Main thread:    step(dt) ──► (keeps working) ──► sync() ──► read results
//! Worker thread:       └──► server.step(dt) ──► done
//! ```
//!
//! `step` must not block the caller, yet `sync` must not return before the
//! worker has finished that step.
//!
//! ## The Solution: a Counting Signal
//!
//! The worker posts one permit per completed step. `sync` consumes one.
//! A permit posted before anyone waits is never lost.

mod step_signal;

pub use step_signal::StepSignal;
