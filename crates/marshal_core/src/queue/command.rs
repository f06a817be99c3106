//! # Command Records
//!
//! One deferred invocation: the bound call plus how its producer waits.

use std::fmt;

use crossbeam_channel::{bounded, Receiver};

/// A boxed call against the consumer-owned target.
///
/// Arguments are captured by move, so any argument list collapses into
/// one uniform runnable type.
pub type Call<T> = Box<dyn FnOnce(&mut T) + Send + 'static>;

/// How the producer of a command waits for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CompletionMode {
    /// Fire-and-forget. The queue owns the record until it runs.
    Async,
    /// The producer blocks until the consumer has run the record.
    Sync,
}

/// A single queued invocation.
pub struct Command<T> {
    call: Call<T>,
    mode: CompletionMode,
}

impl<T: 'static> Command<T> {
    /// Wraps a fire-and-forget call.
    #[must_use]
    pub fn asynchronous<F>(call: F) -> Self
    where
        F: FnOnce(&mut T) + Send + 'static,
    {
        Self {
            call: Box::new(call),
            mode: CompletionMode::Async,
        }
    }

    /// Wraps a call whose result is delivered to the returned receiver.
    ///
    /// If the command is dropped without running, the receiver reports
    /// disconnection instead of blocking forever.
    #[must_use]
    pub fn synchronous<F, R>(call: F) -> (Self, Receiver<R>)
    where
        F: FnOnce(&mut T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done, result) = bounded(1);
        let command = Self {
            call: Box::new(move |target: &mut T| {
                // The producer may have given up; the call still ran.
                let _ = done.send(call(target));
            }),
            mode: CompletionMode::Sync,
        };
        (command, result)
    }

    /// Returns how the producer waits for this command.
    #[inline]
    #[must_use]
    pub fn mode(&self) -> CompletionMode {
        self.mode
    }

    /// Runs the call against the target, consuming the record.
    #[inline]
    pub fn execute(self, target: &mut T) {
        (self.call)(target);
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command").field("mode", &self.mode).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_async_command_runs_against_target() {
        let command = Command::asynchronous(|n: &mut u32| *n += 5);
        assert_eq!(command.mode(), CompletionMode::Async);

        let mut target = 1;
        command.execute(&mut target);
        assert_eq!(target, 6);
    }

    #[test]
    fn test_sync_command_delivers_result() {
        let (command, result) = Command::synchronous(|n: &mut u32| {
            *n *= 2;
            *n + 1
        });
        assert_eq!(command.mode(), CompletionMode::Sync);

        let mut target = 4;
        command.execute(&mut target);
        assert_eq!(target, 8);
        assert_eq!(result.recv().unwrap(), 9);
    }

    #[test]
    fn test_dropped_sync_command_disconnects() {
        let (command, result) = Command::synchronous(|_: &mut u32| 1u8);
        drop(command);
        assert!(result.recv().is_err());
    }
}
