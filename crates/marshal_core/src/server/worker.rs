//! # Worker Thread Body
//!
//! The only code that ever holds the wrapped server by value while the
//! proxy is running.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crossbeam_channel::Sender;

use super::Server;
use crate::queue::CommandQueue;
use crate::sync::StepSignal;

/// Closes the queue and the step signal when the worker leaves, normally
/// or by unwinding.
///
/// Closing wakes every producer still parked in `push_and_sync` and a
/// main thread parked in `sync` on a step that will never complete.
struct ConsumerGuard<'a, S: 'static> {
    queue: &'a CommandQueue<S>,
    step_signal: &'a StepSignal,
}

impl<S: 'static> Drop for ConsumerGuard<'_, S> {
    fn drop(&mut self) {
        self.queue.close();
        self.step_signal.close();
    }
}

/// Runs the wrapped server until an exit record is observed.
///
/// Order of events:
/// 1. bind this thread as the queue consumer
/// 2. `on_thread_start`, then `init`
/// 3. report ready
/// 4. execute commands one at a time until `exit` is set
/// 5. drain anything pushed at the last moment
/// 6. `finish`, then hand the server back to the joiner
pub(crate) fn thread_loop<S: Server>(
    mut server: S,
    queue: &CommandQueue<S>,
    step_signal: &StepSignal,
    exit: &AtomicBool,
    ready: Sender<ThreadId>,
) -> S {
    let id = thread::current().id();
    queue.bind_consumer(id);
    let guard = ConsumerGuard { queue, step_signal };

    server.on_thread_start();
    server.init();

    // The proxy may have given up waiting; keep serving regardless.
    let _ = ready.send(id);
    tracing::info!(thread = ?id, "server thread up");

    while !exit.load(Ordering::Acquire) {
        if !queue.wait_and_flush_one(&mut server) {
            break;
        }
    }

    let drained = queue.flush_all(&mut server);
    if drained > 0 {
        tracing::debug!(drained, "flushed late commands before finish");
    }

    server.finish();
    drop(guard);
    tracing::info!(thread = ?id, "server thread finished");
    server
}

/// Builds the exit record pushed by `finish`.
pub(crate) fn exit_command<S: 'static>(exit: &Arc<AtomicBool>) -> impl FnOnce(&mut S) + Send + 'static {
    let exit = Arc::clone(exit);
    move |_: &mut S| exit.store(true, Ordering::Release)
}
