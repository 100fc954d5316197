//! Ready queue and retirement list.
//!
//! `ContextQueue` is the FIFO from which both cores pull runnable contexts. It
//! sits behind a single non-reentrant try-lock; popping or pushing requires a
//! `QueueGuard`, so the lock discipline is checked by the compiler.
//! `FinishedContexts` records retired contexts in retirement order.

use std::collections::VecDeque;

use parking_lot::Mutex;

use super::context::Context;
use crate::common::error::SimError;
use crate::common::sync::{Held, Resource, TryLock};
use crate::sim::clock::Clock;

/// Lock-guarded FIFO of runnable contexts.
#[derive(Debug)]
pub struct ContextQueue {
    contexts: TryLock<VecDeque<Context>>,
}

impl ContextQueue {
    /// Creates a queue holding `contexts` in order.
    pub fn new(contexts: impl IntoIterator<Item = Context>) -> Self {
        Self {
            contexts: TryLock::new(Resource::ContextQueue, contexts.into_iter().collect()),
        }
    }

    /// Attempts to take the queue lock.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(guard))` - The lock is now held.
    /// * `Ok(None)` - Another thread holds it.
    /// * `Err(SimError::LockProtocol)` - The calling thread already holds it.
    pub fn try_acquire(&self) -> Result<Option<QueueGuard<'_>>, SimError> {
        Ok(self.contexts.try_acquire()?.map(|contexts| QueueGuard { contexts }))
    }

    /// Takes the queue lock, stalling `clock` one cycle per failed attempt.
    pub fn acquire<C: Clock>(&self, clock: &mut C) -> Result<QueueGuard<'_>, SimError> {
        loop {
            if let Some(guard) = self.try_acquire()? {
                return Ok(guard);
            }
            clock.stall()?;
        }
    }

    /// Removes the oldest queued context, blocking on the lock.
    ///
    /// For callers that are not parties of the clock.
    pub fn pop(&self) -> Result<Option<Context>, SimError> {
        Ok(self.contexts.lock()?.pop_front())
    }

    /// Number of queued contexts, blocking on the lock.
    pub fn len(&self) -> Result<usize, SimError> {
        Ok(self.contexts.lock()?.len())
    }

    /// Returns `true` if no context is queued, blocking on the lock.
    pub fn is_empty(&self) -> Result<bool, SimError> {
        Ok(self.len()? == 0)
    }
}

/// Exclusive access to the ready queue.
#[derive(Debug)]
pub struct QueueGuard<'a> {
    contexts: Held<'a, VecDeque<Context>>,
}

impl QueueGuard<'_> {
    /// Removes the oldest queued context; `None` means no work is left.
    pub fn pop_next(&mut self) -> Option<Context> {
        self.contexts.pop_front()
    }

    /// Appends `context` at the back of the queue.
    pub fn push(&mut self, context: Context) {
        self.contexts.push_back(context);
    }

    /// Number of queued contexts.
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns `true` if no context is queued.
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}

/// Retired contexts in retirement order.
#[derive(Debug, Default)]
pub struct FinishedContexts {
    contexts: Mutex<Vec<Context>>,
}

impl FinishedContexts {
    /// Creates an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a retired context.
    pub fn push(&self, context: Context) {
        self.contexts.lock().push(context);
    }

    /// Number of retired contexts.
    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    /// Returns `true` if nothing retired yet.
    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Copies the retired contexts.
    pub fn snapshot(&self) -> Vec<Context> {
        self.contexts.lock().clone()
    }

    /// Takes the retired contexts, leaving the list empty.
    pub fn take(&self) -> Vec<Context> {
        std::mem::take(&mut *self.contexts.lock())
    }
}
