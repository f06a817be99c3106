//! # Server Proxy
//!
//! Thread lifecycle manager for a single-threaded server.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!                    │        ServerProxy<S>        │
//!                    │                              │
//!   call / step ────►│  CommandQueue<S> ──────────┐ │
//!                    │                            ▼ │
//!   sync ◄───────────│  StepSignal ◄──── worker: S  │
//!                    └──────────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! `Uninitialized → Running → Stopped`. In threaded mode `init` spawns the
//! worker and waits for it to report ready; `finish` queues an exit record
//! and joins it. In inline mode both call straight through.

mod proxy;
mod worker;

pub use proxy::ServerProxy;

/// The lifecycle every wrapped server exposes.
///
/// Implementors are single-threaded: the proxy guarantees that every call
/// after construction comes from one thread.
pub trait Server: Send + 'static {
    /// Brings the server up. Called on the owning thread.
    fn init(&mut self);

    /// Tears the server down. Called exactly once, after the last command.
    fn finish(&mut self);

    /// Advances the simulation by `delta` seconds.
    fn step(&mut self, delta: f32);

    /// Marks the start of the window in which results may be read.
    fn sync(&mut self);

    /// Answers queries and callbacks gathered during the last step.
    fn flush_queries(&mut self);

    /// Marks the end of the read window.
    fn end_sync(&mut self);

    /// Hook for per-thread registration on the owning thread.
    ///
    /// Runs on the worker before `init`.
    fn on_thread_start(&mut self) {}
}

/// Where the wrapped server runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProxyMode {
    /// On a dedicated worker thread.
    Threaded,
    /// On the calling thread.
    Inline,
}

/// Lifecycle state of a proxy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ProxyState {
    /// Constructed, `init` not yet called.
    Uninitialized = 0,
    /// `init` completed.
    Running = 1,
    /// `finish` completed.
    Stopped = 2,
}

impl ProxyState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Uninitialized,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }
}
