//! # MARSHAL Core
//!
//! Runs a single-threaded, stateful server on one dedicated worker thread
//! while any number of other threads call it as if it were a plain
//! blocking API.
//!
//! ## Architecture Rules
//!
//! 1. **One owner** - the wrapped server is touched only by its worker thread
//! 2. **Exactly once, in order** - every queued command runs once, FIFO
//! 3. **Explicit rendezvous** - `step` runs concurrently, `sync` waits for it
//!
//! ```text
//!  Logic thread ─┐                          ┌──────────────────────┐
//!                ├──push──► CommandQueue ──►│ worker: thread_loop  │
//!  Render thread ┘                          │   server.step(dt)    │
//!        ▲                                  │   StepSignal::post   │
//!        └────────── sync: StepSignal::wait ┴──────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use marshal_core::{MarshalConfig, ServerProxy};
//!
//! let proxy = ServerProxy::new(my_server, &MarshalConfig::default());
//! proxy.init()?;
//! loop {
//!     proxy.sync();
//!     proxy.flush_queries();
//!     proxy.end_sync();
//!     proxy.step(1.0 / 60.0);
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod server;
pub mod sync;

pub use config::MarshalConfig;
pub use error::{fatal, MarshalError, MarshalResult};
pub use memory::{CacheStats, HandleCache, Rid, RidOwner};
pub use queue::{Command, CommandQueue, CompletionMode, QueueStats};
pub use server::{ProxyMode, ProxyState, Server, ServerProxy};
pub use sync::StepSignal;
