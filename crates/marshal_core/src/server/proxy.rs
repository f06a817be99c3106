//! # Server Proxy
//!
//! Drop-in, thread-safe front for a single-threaded [`Server`].

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam_channel::{bounded, RecvTimeoutError};
use parking_lot::Mutex;

use super::worker;
use super::{ProxyMode, ProxyState, Server};
use crate::config::MarshalConfig;
use crate::error::{fatal, MarshalError, MarshalResult};
use crate::queue::{CommandQueue, QueueStats};
use crate::sync::StepSignal;

/// Routes calls to a wrapped server that must stay on one thread.
///
/// In threaded mode the server is moved onto a worker thread by `init`
/// and every call becomes a command on the queue. In inline mode the
/// server stays in the proxy and calls run on the caller after pending
/// commands have been drained.
///
/// All methods take `&self`: share the proxy with `Arc` between the
/// logic and render threads.
///
/// ## Usage
///
/// ```rust,ignore
/// let proxy = Arc::new(ServerProxy::new(server, &MarshalConfig::threaded()));
/// proxy.init()?;
///
/// // Logic thread, every frame
/// proxy.sync();              // wait for the previous step
/// proxy.flush_queries();
/// proxy.end_sync();
/// proxy.step(1.0 / 60.0);    // returns at once
///
/// // Any thread
/// proxy.call(|server| server.set_gravity(9.8));
/// let bodies = proxy.call_sync(|server| server.body_count());
///
/// proxy.finish()?;
/// ```
pub struct ServerProxy<S: Server> {
    mode: ProxyMode,
    config: MarshalConfig,
    queue: Arc<CommandQueue<S>>,
    step_signal: Arc<StepSignal>,
    exit: Arc<AtomicBool>,
    /// The server while it is not owned by a worker thread.
    server: Mutex<Option<S>>,
    worker: Mutex<Option<JoinHandle<S>>>,
    /// Serializes `init` and `finish`.
    lifecycle: Mutex<()>,
    state: AtomicU8,
    first_frame: AtomicBool,
    /// Steps pushed whose signal has not been consumed by `sync`.
    pending_steps: AtomicU64,
    main_thread: ThreadId,
    server_thread: Mutex<Option<ThreadId>>,
}

impl<S: Server> ServerProxy<S> {
    /// Takes ownership of `server`. Nothing runs until `init`.
    #[must_use]
    pub fn new(server: S, config: &MarshalConfig) -> Self {
        let mode = if config.threaded {
            ProxyMode::Threaded
        } else {
            ProxyMode::Inline
        };
        let main_thread = thread::current().id();
        let queue = Arc::new(CommandQueue::new(config.queue_capacity));

        let server_thread = match mode {
            ProxyMode::Threaded => None,
            ProxyMode::Inline => {
                queue.bind_consumer(main_thread);
                Some(main_thread)
            }
        };

        Self {
            mode,
            config: config.clone(),
            queue,
            step_signal: Arc::new(StepSignal::new()),
            exit: Arc::new(AtomicBool::new(false)),
            server: Mutex::new(Some(server)),
            worker: Mutex::new(None),
            lifecycle: Mutex::new(()),
            state: AtomicU8::new(ProxyState::Uninitialized as u8),
            first_frame: AtomicBool::new(true),
            pending_steps: AtomicU64::new(0),
            main_thread,
            server_thread: Mutex::new(server_thread),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Brings the wrapped server up.
    ///
    /// Threaded: spawns the worker, which runs the server's `init`, and
    /// blocks until it reports ready. Inline: calls `init` directly.
    /// Calling `init` twice is a logged no-op.
    ///
    /// # Errors
    ///
    /// - `ThreadSpawn` if the worker could not be created
    /// - `WorkerStartup` if the worker died during the server's `init`
    /// - `StartupTimeout` if a configured bound elapsed first
    pub fn init(&self) -> MarshalResult<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.state() != ProxyState::Uninitialized {
            tracing::warn!(state = ?self.state(), "init called twice; ignored");
            return Ok(());
        }

        match self.mode {
            ProxyMode::Threaded => self.spawn_worker()?,
            ProxyMode::Inline => {
                let mut guard = self.server.lock();
                let server = guard.as_mut().ok_or(MarshalError::NotRunning)?;
                server.init();
                self.queue.flush_all(server);
            }
        }

        self.set_state(ProxyState::Running);
        tracing::info!(mode = ?self.mode, main = ?self.main_thread, "server proxy running");
        Ok(())
    }

    fn spawn_worker(&self) -> MarshalResult<()> {
        let server = self.server.lock().take().ok_or(MarshalError::NotRunning)?;
        let (ready_tx, ready_rx) = bounded(1);
        let queue = Arc::clone(&self.queue);
        let step_signal = Arc::clone(&self.step_signal);
        let exit = Arc::clone(&self.exit);

        let handle = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || worker::thread_loop(server, &queue, &step_signal, &exit, ready_tx))
            .map_err(MarshalError::ThreadSpawn)?;

        let ready = match self.config.startup_timeout() {
            Some(timeout) => ready_rx.recv_timeout(timeout).map_err(|e| match e {
                RecvTimeoutError::Timeout => MarshalError::StartupTimeout {
                    timeout_ms: self.config.startup_timeout_ms.unwrap_or_default(),
                },
                RecvTimeoutError::Disconnected => MarshalError::WorkerStartup,
            }),
            None => ready_rx.recv().map_err(|_| MarshalError::WorkerStartup),
        };

        match ready {
            Ok(id) => {
                *self.server_thread.lock() = Some(id);
                *self.worker.lock() = Some(handle);
                Ok(())
            }
            Err(error) => {
                // A late worker finds the queue closed and finishes on its own.
                self.queue.close();
                self.step_signal.close();
                self.set_state(ProxyState::Stopped);
                if matches!(error, MarshalError::WorkerStartup) {
                    let _ = handle.join();
                }
                Err(error)
            }
        }
    }

    /// Shuts the wrapped server down.
    ///
    /// Threaded: queues an exit record behind everything already pushed,
    /// joins the worker (which drains the queue and runs the server's
    /// `finish`) and takes the server back. Inline: drains the queue and
    /// calls `finish` directly. Calling `finish` on a proxy that is not
    /// running is a logged no-op.
    ///
    /// # Errors
    ///
    /// Returns `WorkerPanicked` if the worker died; the server is lost.
    pub fn finish(&self) -> MarshalResult<()> {
        let _lifecycle = self.lifecycle.lock();
        if self.state() != ProxyState::Running {
            tracing::warn!(state = ?self.state(), "finish on a proxy that is not running; ignored");
            return Ok(());
        }
        debug_assert!(
            !(self.is_threaded() && self.server_thread() == Some(thread::current().id())),
            "finish called from the server thread"
        );

        let result = match self.mode {
            ProxyMode::Threaded => {
                self.queue.push(worker::exit_command(&self.exit));
                let handle = self.worker.lock().take().ok_or(MarshalError::NotRunning)?;
                match handle.join() {
                    Ok(server) => {
                        *self.server.lock() = Some(server);
                        Ok(())
                    }
                    Err(_) => Err(MarshalError::WorkerPanicked),
                }
            }
            ProxyMode::Inline => {
                let mut guard = self.server.lock();
                let server = guard.as_mut().ok_or(MarshalError::NotRunning)?;
                self.queue.flush_all(server);
                server.finish();
                self.queue.close();
                Ok(())
            }
        };

        self.set_state(ProxyState::Stopped);
        tracing::info!(mode = ?self.mode, "server proxy stopped");
        result
    }

    // =========================================================================
    // Frame contract
    // =========================================================================

    /// Advances the simulation by `delta` seconds.
    ///
    /// Threaded: queues the step and returns at once; the worker raises
    /// the step signal when it is done. Only a step the queue accepted is
    /// waited for by the next `sync`. Inline: drains pending commands,
    /// then steps on the caller; before `init` the step is queued instead.
    ///
    /// # Panics
    ///
    /// Inline mode panics if the server is gone.
    pub fn step(&self, delta: f32) {
        if self.rejects_after_stop("step") {
            return;
        }

        match self.mode {
            ProxyMode::Threaded => {
                let signal = Arc::clone(&self.step_signal);
                let queued = self.queue.push(move |server: &mut S| {
                    server.step(delta);
                    signal.post();
                });
                if queued {
                    self.pending_steps.fetch_add(1, Ordering::AcqRel);
                }
            }
            ProxyMode::Inline if self.state() == ProxyState::Uninitialized => {
                self.queue.push(move |server: &mut S| server.step(delta));
            }
            ProxyMode::Inline => self.direct(|server| server.step(delta)),
        }
    }

    /// Rendezvous with the last step, then runs the server's `sync`.
    ///
    /// Threaded: blocks on the step signal if a step is outstanding. With
    /// no outstanding step it returns without waiting; that is expected on
    /// the first frame and logged as a contract violation afterwards.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached (not running, worker died).
    pub fn sync(&self) {
        if let Err(error) = self.try_sync() {
            fatal(&error);
        }
    }

    /// Like [`sync`](Self::sync), reporting failure instead of panicking.
    ///
    /// # Errors
    ///
    /// - `WorkerPanicked` if the worker died with a step outstanding
    /// - any error of [`try_call_sync`](Self::try_call_sync)
    pub fn try_sync(&self) -> MarshalResult<()> {
        match self.mode {
            ProxyMode::Threaded => {
                let first_frame = self.first_frame.swap(false, Ordering::AcqRel);
                let outstanding = self
                    .pending_steps
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                    .is_ok();

                if outstanding {
                    if !self.step_signal.wait() {
                        return Err(MarshalError::WorkerPanicked);
                    }
                } else if !first_frame {
                    tracing::warn!("sync without a preceding step; not waiting");
                }
                self.try_call_sync(S::sync)
            }
            ProxyMode::Inline => {
                self.first_frame.store(false, Ordering::Release);
                self.try_call_sync(S::sync)
            }
        }
    }

    /// Lets the server answer queries gathered during the last step.
    ///
    /// Only meaningful after `sync`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn flush_queries(&self) {
        self.call_sync(S::flush_queries);
    }

    /// Closes the read window opened by `sync`.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn end_sync(&self) {
        self.call_sync(S::end_sync);
    }

    // =========================================================================
    // Arbitrary calls
    // =========================================================================

    /// Queues a fire-and-forget call against the server.
    ///
    /// Inline mode runs it at once when issued from the owning thread of a
    /// running proxy. Calls before `init` run after the server's `init` in
    /// both modes. Calls after `finish` are discarded with a warning.
    pub fn call<F>(&self, call: F)
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        if self.rejects_after_stop("call") {
            return;
        }

        let runs_here = self.mode == ProxyMode::Inline
            && self.state() == ProxyState::Running
            && self.queue.is_consumer_thread();
        if runs_here {
            self.direct(call);
        } else {
            self.queue.push(call);
        }
    }

    /// Runs a call against the server and returns its result.
    ///
    /// Threaded: blocks until the worker has executed it. Inline: drains
    /// pending commands, then runs it on the caller.
    ///
    /// # Errors
    ///
    /// - `NotRunning` before `init` or after `finish`
    /// - `QueueClosed` / `CommandDropped` if the worker went away
    /// - `WouldDeadlock` if issued from the worker itself
    pub fn try_call_sync<F, R>(&self, call: F) -> MarshalResult<R>
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        match (self.mode, self.state()) {
            (_, ProxyState::Stopped | ProxyState::Uninitialized) => Err(MarshalError::NotRunning),
            (ProxyMode::Threaded, ProxyState::Running) => self.queue.push_and_sync(call),
            (ProxyMode::Inline, ProxyState::Running) => self.try_direct(call),
        }
    }

    /// Like [`try_call_sync`](Self::try_call_sync), treating failure as fatal.
    ///
    /// # Panics
    ///
    /// Panics if the server cannot be reached.
    pub fn call_sync<F, R>(&self, call: F) -> R
    where
        F: FnOnce(&mut S) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.try_call_sync(call).unwrap_or_else(|error| fatal(&error))
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Where the server runs.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> ProxyMode {
        self.mode
    }

    /// Returns true if the server runs on a worker thread.
    #[inline]
    #[must_use]
    pub fn is_threaded(&self) -> bool {
        self.mode == ProxyMode::Threaded
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ProxyState {
        ProxyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The thread that constructed the proxy.
    #[inline]
    #[must_use]
    pub fn main_thread(&self) -> ThreadId {
        self.main_thread
    }

    /// The thread that owns the server, once known.
    #[must_use]
    pub fn server_thread(&self) -> Option<ThreadId> {
        *self.server_thread.lock()
    }

    /// The configuration the proxy was built with.
    #[must_use]
    pub fn config(&self) -> &MarshalConfig {
        &self.config
    }

    /// Traffic counters of the command queue.
    #[must_use]
    pub fn queue_stats(&self) -> &QueueStats {
        self.queue.stats()
    }

    /// Commands queued but not yet executed.
    #[must_use]
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// Shuts down if needed and hands the wrapped server back.
    ///
    /// Returns `None` if the server was lost to a worker panic.
    #[must_use]
    pub fn into_server(self) -> Option<S> {
        if self.state() == ProxyState::Running {
            if let Err(error) = self.finish() {
                tracing::error!(%error, "finish failed while reclaiming server");
            }
        }
        self.server.lock().take()
    }

    /// Takes the wrapped server back once the proxy has stopped.
    ///
    /// Returns `None` while not stopped, or if the server was lost to a
    /// worker panic.
    #[must_use]
    pub fn take_server(&self) -> Option<S> {
        if self.state() != ProxyState::Stopped {
            return None;
        }
        self.server.lock().take()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn set_state(&self, state: ProxyState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn rejects_after_stop(&self, operation: &'static str) -> bool {
        if self.state() == ProxyState::Stopped {
            tracing::warn!(operation, "server proxy already stopped; call discarded");
            return true;
        }
        false
    }

    /// Inline path: drain stray commands, then run on the caller.
    fn try_direct<F, R>(&self, call: F) -> MarshalResult<R>
    where
        F: FnOnce(&mut S) -> R,
    {
        let mut guard = self.server.lock();
        let server = guard.as_mut().ok_or(MarshalError::NotRunning)?;
        self.queue.flush_all(server);
        Ok(call(server))
    }

    fn direct<F>(&self, call: F)
    where
        F: FnOnce(&mut S),
    {
        if let Err(error) = self.try_direct(call) {
            fatal(&error);
        }
    }
}

impl<S: Server> Drop for ServerProxy<S> {
    fn drop(&mut self) {
        if self.state() == ProxyState::Running {
            tracing::warn!("server proxy dropped while running; finishing");
            let this: &Self = self;
            if let Err(error) = this.finish() {
                tracing::error!(%error, "finish failed during drop");
            }
        }
    }
}

/// The proxy is itself a server, so it can stand in wherever one is
/// expected.
///
/// # Panics
///
/// `init` and `finish` panic on error; there is no error channel here.
impl<S: Server> Server for ServerProxy<S> {
    fn init(&mut self) {
        let this: &Self = self;
        if let Err(error) = this.init() {
            fatal(&error);
        }
    }

    fn finish(&mut self) {
        let this: &Self = self;
        if let Err(error) = this.finish() {
            fatal(&error);
        }
    }

    fn step(&mut self, delta: f32) {
        let this: &Self = self;
        this.step(delta);
    }

    fn sync(&mut self) {
        let this: &Self = self;
        this.sync();
    }

    fn flush_queries(&mut self) {
        let this: &Self = self;
        this.flush_queries();
    }

    fn end_sync(&mut self) {
        let this: &Self = self;
        this.end_sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        inits: u32,
        steps: u32,
        finishes: u32,
        threads: Vec<ThreadId>,
    }

    impl Counter {
        fn touch(&mut self) {
            let id = thread::current().id();
            if !self.threads.contains(&id) {
                self.threads.push(id);
            }
        }
    }

    impl Server for Counter {
        fn init(&mut self) {
            self.touch();
            self.inits += 1;
        }
        fn finish(&mut self) {
            self.touch();
            self.finishes += 1;
        }
        fn step(&mut self, _delta: f32) {
            self.touch();
            self.steps += 1;
        }
        fn sync(&mut self) {
            self.touch();
        }
        fn flush_queries(&mut self) {}
        fn end_sync(&mut self) {}
    }

    #[test]
    fn test_threaded_lifecycle() {
        let proxy = ServerProxy::new(Counter::default(), &MarshalConfig::threaded());
        assert_eq!(proxy.state(), ProxyState::Uninitialized);
        assert_eq!(proxy.server_thread(), None);

        proxy.init().unwrap();
        assert_eq!(proxy.state(), ProxyState::Running);
        let worker = proxy.server_thread().unwrap();
        assert_ne!(worker, proxy.main_thread());

        proxy.step(0.016);
        proxy.sync();
        assert_eq!(proxy.call_sync(|c| c.steps), 1);

        proxy.finish().unwrap();
        assert_eq!(proxy.state(), ProxyState::Stopped);

        let counter = proxy.into_server().unwrap();
        assert_eq!((counter.inits, counter.steps, counter.finishes), (1, 1, 1));
        assert_eq!(counter.threads, vec![worker]);
    }

    #[test]
    fn test_inline_lifecycle_runs_on_caller() {
        let proxy = ServerProxy::new(Counter::default(), &MarshalConfig::inline());
        assert_eq!(proxy.server_thread(), Some(proxy.main_thread()));

        proxy.init().unwrap();
        proxy.step(0.016);
        proxy.sync();
        proxy.finish().unwrap();

        let counter = proxy.into_server().unwrap();
        assert_eq!((counter.inits, counter.steps, counter.finishes), (1, 1, 1));
        assert_eq!(counter.threads, vec![thread::current().id()]);
    }

    #[test]
    fn test_sync_call_before_init_is_refused() {
        let proxy = ServerProxy::new(Counter::default(), &MarshalConfig::threaded());
        assert!(matches!(proxy.try_call_sync(|c| c.steps), Err(MarshalError::NotRunning)));
    }

    #[test]
    fn test_async_calls_before_init_run_after_server_init() {
        let proxy = ServerProxy::new(Counter::default(), &MarshalConfig::threaded());
        proxy.call(|c| c.steps = c.inits * 100);
        proxy.init().unwrap();
        assert_eq!(proxy.call_sync(|c| c.steps), 100);
    }

    #[test]
    fn test_calls_after_finish_are_discarded() {
        let proxy = ServerProxy::new(Counter::default(), &MarshalConfig::threaded());
        proxy.init().unwrap();
        proxy.finish().unwrap();
        proxy.finish().unwrap();

        proxy.call(|c| c.steps = 99);
        proxy.step(1.0);
        assert!(matches!(proxy.try_call_sync(|c| c.steps), Err(MarshalError::NotRunning)));

        let counter = proxy.into_server().unwrap();
        assert_eq!(counter.steps, 0);
        assert_eq!(counter.finishes, 1);
    }

    #[test]
    fn test_drop_finishes_running_proxy() {
        let proxy = ServerProxy::new(Counter::default(), &MarshalConfig::threaded());
        proxy.init().unwrap();
        proxy.step(0.5);
        drop(proxy);
    }

    #[test]
    fn test_proxy_is_a_server() {
        fn drive<S: Server>(server: &mut S) {
            server.init();
            server.step(0.1);
            server.sync();
            server.flush_queries();
            server.end_sync();
            server.finish();
        }

        let mut proxy = ServerProxy::new(Counter::default(), &MarshalConfig::threaded());
        drive(&mut proxy);
        let counter = proxy.into_server().unwrap();
        assert_eq!((counter.inits, counter.steps, counter.finishes), (1, 1, 1));
    }
}
