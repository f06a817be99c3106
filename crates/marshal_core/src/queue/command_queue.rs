//! # Command Queue
//!
//! A growable ring buffer behind one mutex, with a condition variable to
//! park the consumer while the buffer is empty.
//!
//! ## Thread Safety
//!
//! - `push` / `push_and_sync`: any thread, any number of producers
//! - `wait_and_flush_one` / `flush_all`: the single consumer only
//!
//! Commands execute outside the lock, so a running command may push more
//! commands without deadlocking.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use super::command::{Command, CompletionMode};
use crate::error::{fatal, MarshalError, MarshalResult};

/// Counters for queue traffic.
#[derive(Debug, Default)]
pub struct QueueStats {
    /// Commands accepted by `push` or `push_and_sync`.
    pub pushed: AtomicU64,
    /// Commands executed by the consumer.
    pub executed: AtomicU64,
    /// Synchronous round trips completed or attempted.
    pub sync_calls: AtomicU64,
    /// Commands discarded because the queue was closed.
    pub dropped: AtomicU64,
}

impl QueueStats {
    /// Commands accepted so far.
    #[must_use]
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Commands executed so far.
    #[must_use]
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Synchronous round trips so far.
    #[must_use]
    pub fn sync_calls(&self) -> u64 {
        self.sync_calls.load(Ordering::Relaxed)
    }

    /// Commands discarded so far.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Pending<T> {
    commands: VecDeque<Command<T>>,
    closed: bool,
}

/// Single-consumer queue of deferred calls against a `T`.
///
/// The queue does not own the target. The consumer lends it on every
/// flush, which is what keeps the target on one thread.
///
/// ## Usage
///
/// ```rust,ignore
/// let queue = Arc::new(CommandQueue::<Counter>::new(1024));
///
/// // Producer thread
/// queue.push(|c| c.add(1));
/// let total = queue.push_and_sync(|c| c.total())?;
///
/// // Consumer thread
/// loop {
///     queue.wait_and_flush_one(&mut counter);
/// }
/// ```
pub struct CommandQueue<T> {
    pending: Mutex<Pending<T>>,
    available: Condvar,
    consumer: Mutex<Option<ThreadId>>,
    stats: QueueStats,
}

impl<T: 'static> CommandQueue<T> {
    /// Creates a queue with room for `capacity` commands before growing.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            pending: Mutex::new(Pending {
                commands: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
            consumer: Mutex::new(None),
            stats: QueueStats::default(),
        }
    }

    /// Records the thread that consumes this queue.
    ///
    /// Synchronous pushes from that thread are refused, since nobody else
    /// would ever run them.
    pub fn bind_consumer(&self, thread: ThreadId) {
        *self.consumer.lock() = Some(thread);
    }

    /// Returns the bound consumer thread, if any.
    #[must_use]
    pub fn consumer_thread(&self) -> Option<ThreadId> {
        *self.consumer.lock()
    }

    /// Returns true when called from the bound consumer thread.
    #[must_use]
    pub fn is_consumer_thread(&self) -> bool {
        self.consumer_thread() == Some(thread::current().id())
    }

    /// Enqueues a fire-and-forget call. Never blocks.
    ///
    /// Returns false if the queue was closed; the call is discarded and a
    /// warning is logged.
    ///
    /// # Panics
    ///
    /// Panics if the ring buffer cannot grow.
    pub fn push<F>(&self, call: F) -> bool
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        self.enqueue(Command::asynchronous(call))
    }

    /// Enqueues a call and blocks until the consumer has executed it.
    ///
    /// The call's return value is handed back once it has run.
    ///
    /// # Errors
    ///
    /// - `WouldDeadlock` when issued from the consumer thread
    /// - `QueueClosed` when the queue no longer has a consumer
    /// - `CommandDropped` when the consumer went away before running it
    ///
    /// # Panics
    ///
    /// Panics if the ring buffer cannot grow.
    pub fn push_and_sync<F, R>(&self, call: F) -> MarshalResult<R>
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_consumer_thread() {
            return Err(MarshalError::WouldDeadlock);
        }

        let (command, result) = Command::synchronous(call);
        self.stats.sync_calls.fetch_add(1, Ordering::Relaxed);
        if !self.enqueue(command) {
            return Err(MarshalError::QueueClosed);
        }

        result.recv().map_err(|_| MarshalError::CommandDropped)
    }

    /// Appends a command. Returns false if the queue was closed.
    fn enqueue(&self, command: Command<T>) -> bool {
        let mut pending = self.pending.lock();
        if pending.closed {
            drop(pending);
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(mode = ?command.mode(), "command pushed after queue closed; discarded");
            return false;
        }

        if pending.commands.try_reserve(1).is_err() {
            drop(pending);
            fatal(&MarshalError::QueueExhausted);
        }
        pending.commands.push_back(command);
        drop(pending);

        self.stats.pushed.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        true
    }

    /// Blocks until a command is available, then executes exactly one.
    ///
    /// Returns false without executing anything once the queue is closed
    /// and empty.
    pub fn wait_and_flush_one(&self, target: &mut T) -> bool {
        let next = {
            let mut pending = self.pending.lock();
            loop {
                if let Some(command) = pending.commands.pop_front() {
                    break Some(command);
                }
                if pending.closed {
                    break None;
                }
                self.available.wait(&mut pending);
            }
        };

        match next {
            Some(command) => {
                self.run(command, target);
                true
            }
            None => false,
        }
    }

    /// Executes one command if any is queued. Never blocks.
    pub fn try_flush_one(&self, target: &mut T) -> bool {
        let next = self.pending.lock().commands.pop_front();
        match next {
            Some(command) => {
                self.run(command, target);
                true
            }
            None => false,
        }
    }

    /// Executes queued commands in order until the queue is observed empty.
    ///
    /// Commands pushed while flushing are executed too. Returns how many
    /// commands ran.
    pub fn flush_all(&self, target: &mut T) -> usize {
        let mut executed = 0;
        while self.try_flush_one(target) {
            executed += 1;
        }
        executed
    }

    /// Stops accepting commands and discards everything still queued.
    ///
    /// Producers blocked in `push_and_sync` on a discarded command wake
    /// with `CommandDropped`. Returns the number of discarded commands.
    pub fn close(&self) -> usize {
        let discarded = {
            let mut pending = self.pending.lock();
            pending.closed = true;
            std::mem::take(&mut pending.commands)
        };
        self.available.notify_all();

        let count = discarded.len();
        if count > 0 {
            self.stats.dropped.fetch_add(count as u64, Ordering::Relaxed);
            tracing::warn!(count, "queue closed with pending commands");
        }
        count
    }

    /// Returns true once `close` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pending.lock().closed
    }

    /// Number of commands waiting to run.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().commands.len()
    }

    /// Returns true if no command is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    fn run(&self, command: Command<T>, target: &mut T) {
        let mode = command.mode();
        command.execute(target);
        self.stats.executed.fetch_add(1, Ordering::Relaxed);
        if mode == CompletionMode::Sync {
            tracing::trace!("synchronous command executed");
        }
    }
}

impl<T: 'static> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_flush_all_preserves_push_order() {
        let queue = CommandQueue::<Vec<u32>>::new(4);
        for i in 0..100 {
            assert!(queue.push(move |log| log.push(i)));
        }
        assert_eq!(queue.len(), 100);

        let mut log = Vec::new();
        assert_eq!(queue.flush_all(&mut log), 100);
        assert_eq!(log, (0..100).collect::<Vec<_>>());
        assert!(queue.is_empty());
        assert_eq!(queue.stats().executed(), 100);
    }

    #[test]
    fn test_commands_may_push_while_flushing() {
        let queue = Arc::new(CommandQueue::<Vec<&'static str>>::new(4));
        let inner = Arc::clone(&queue);
        queue.push(move |log| {
            log.push("outer");
            inner.push(|log| log.push("nested"));
        });

        let mut log = Vec::new();
        assert_eq!(queue.flush_all(&mut log), 2);
        assert_eq!(log, vec!["outer", "nested"]);
    }

    #[test]
    fn test_push_and_sync_returns_after_execution() {
        let queue = Arc::new(CommandQueue::<u64>::new(16));
        let consumer = Arc::clone(&queue);
        let worker = thread::spawn(move || {
            let mut total = 0u64;
            while consumer.wait_and_flush_one(&mut total) {}
            total
        });

        queue.push(|total| *total += 40);
        let seen = queue.push_and_sync(|total| {
            *total += 2;
            *total
        });
        assert_eq!(seen.unwrap(), 42);

        queue.close();
        assert_eq!(worker.join().unwrap(), 42);
    }

    #[test]
    fn test_wait_blocks_until_push() {
        let queue = Arc::new(CommandQueue::<u32>::new(1));
        let consumer = Arc::clone(&queue);
        let worker = thread::spawn(move || {
            let mut value = 0;
            let ran = consumer.wait_and_flush_one(&mut value);
            (ran, value)
        });

        thread::sleep(Duration::from_millis(20));
        queue.push(|value| *value = 7);
        assert_eq!(worker.join().unwrap(), (true, 7));
    }

    #[test]
    fn test_sync_push_from_consumer_is_refused() {
        let queue = CommandQueue::<u32>::new(1);
        queue.bind_consumer(thread::current().id());
        assert!(matches!(queue.push_and_sync(|v| *v), Err(MarshalError::WouldDeadlock)));
    }

    #[test]
    fn test_close_wakes_sync_waiters() {
        let queue = Arc::new(CommandQueue::<u32>::new(1));
        let producer = Arc::clone(&queue);
        let waiter = thread::spawn(move || producer.push_and_sync(|v| *v));

        while queue.is_empty() {
            thread::yield_now();
        }
        assert_eq!(queue.close(), 1);
        assert!(matches!(waiter.join().unwrap(), Err(MarshalError::CommandDropped)));
    }

    #[test]
    fn test_push_after_close_is_discarded() {
        let queue = CommandQueue::<u32>::new(1);
        queue.close();
        assert!(!queue.push(|v| *v = 1));
        assert!(queue.is_empty());
        assert!(matches!(queue.push_and_sync(|v| *v), Err(MarshalError::QueueClosed)));
        assert_eq!(queue.stats().dropped(), 2);

        let mut value = 0;
        assert!(!queue.wait_and_flush_one(&mut value));
    }
}
