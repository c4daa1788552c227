//! Single-use completion barrier: `N` workers signal once each, one coordinator waits.
//!
//! The countdown is a lock-free atomic; the mutex/condvar pair is only the wake-up channel for a
//! coordinator that arrives before the last signal. Every worker decrements with `AcqRel`, so
//! writes a worker made before signalling happen-before the coordinator's return from
//! [`CompletionBarrier::wait_for_all`].
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::foundation::error::{ParconvError, ParconvResult};

#[derive(Debug)]
pub struct CompletionBarrier {
    armed: u32,
    remaining: AtomicU32,
    released: Mutex<bool>,
    signal: Condvar,
}

impl CompletionBarrier {
    /// Arm a barrier for exactly `worker_count` completions.
    pub fn new(worker_count: u32) -> ParconvResult<Self> {
        if worker_count == 0 {
            return Err(ParconvError::invalid_configuration(
                "completion barrier needs at least one worker",
            ));
        }
        Ok(Self {
            armed: worker_count,
            remaining: AtomicU32::new(worker_count),
            released: Mutex::new(false),
            signal: Condvar::new(),
        })
    }

    pub fn armed(&self) -> u32 {
        self.armed
    }

    /// Completions still outstanding.
    pub fn remaining(&self) -> u32 {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    /// Record one worker's completion.
    ///
    /// Fails with [`ParconvError::BarrierOveruse`] once the barrier has already absorbed all of
    /// its armed completions; the counter never goes below zero.
    pub fn signal_done(&self) -> ParconvResult<()> {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| r.checked_sub(1))
            .map_err(|_| ParconvError::BarrierOveruse { armed: self.armed })?;

        if prev == 1 {
            *self.lock_released() = true;
            self.signal.notify_all();
        }
        Ok(())
    }

    /// Block until every armed completion has been signalled. Returns immediately if that has
    /// already happened; may be called any number of times.
    pub fn wait_for_all(&self) {
        if self.is_released() {
            return;
        }
        let mut released = self.lock_released();
        while !*released {
            released = self
                .signal
                .wait(released)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_for_all`](Self::wait_for_all) but gives up after `timeout`. Returns whether
    /// the barrier released.
    pub fn wait_for_all_timeout(&self, timeout: Duration) -> bool {
        if self.is_released() {
            return true;
        }
        let released = self.lock_released();
        let (released, _) = self
            .signal
            .wait_timeout_while(released, timeout, |released| !*released)
            .unwrap_or_else(PoisonError::into_inner);
        *released
    }

    /// Hand out a one-shot completion token for a worker.
    pub fn token(&self) -> CompletionToken<'_> {
        CompletionToken {
            barrier: self,
            spent: false,
        }
    }

    fn lock_released(&self) -> MutexGuard<'_, bool> {
        self.released.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A worker's single right to signal completion.
///
/// Consumed by [`signal_done`](Self::signal_done). A token dropped unspent (e.g. while its
/// worker unwinds from a panic) signals on drop so the coordinator is never left waiting.
#[derive(Debug)]
pub struct CompletionToken<'a> {
    barrier: &'a CompletionBarrier,
    spent: bool,
}

impl CompletionToken<'_> {
    pub fn signal_done(mut self) -> ParconvResult<()> {
        self.spent = true;
        self.barrier.signal_done()
    }
}

impl Drop for CompletionToken<'_> {
    fn drop(&mut self) {
        if !self.spent
            && let Err(err) = self.barrier.signal_done()
        {
            tracing::warn!(%err, "unspent completion token could not signal");
        }
    }
}
