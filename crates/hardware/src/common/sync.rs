//! Owner-tracking try-locks.
//!
//! Every shared structure of the simulated machine (cache lines, bus gates and
//! the context queue) sits behind a `TryLock`. It provides:
//! 1. **Non-Blocking Acquisition:** Contention is reported as `None` so the caller
//!    can advance the clock and retry, which is how the simulator turns lock
//!    contention into simulated latency.
//! 2. **Protocol Checking:** A thread that already holds the lock and asks for it
//!    again gets `SimError::LockProtocol` instead of deadlocking.
//! 3. **Scoped Access:** The protected value is reachable only through the `Held`
//!    guard, which releases the lock when dropped.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

use super::error::SimError;

/// Token meaning "no thread holds the lock".
const UNOWNED: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(UNOWNED + 1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Identifies a lockable resource in diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    /// A line of a core's data cache.
    DataLine {
        /// Owning core.
        core: usize,
        /// Line index.
        line: usize,
    },
    /// A line of a core's instruction cache.
    InstructionLine {
        /// Owning core.
        core: usize,
        /// Line index.
        line: usize,
    },
    /// The shared data bus gate.
    DataBus,
    /// The shared instruction bus gate.
    InstructionBus,
    /// The ready queue.
    ContextQueue,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DataLine { core, line } => write!(f, "core {core} data line {line}"),
            Self::InstructionLine { core, line } => {
                write!(f, "core {core} instruction line {line}")
            }
            Self::DataBus => write!(f, "data bus"),
            Self::InstructionBus => write!(f, "instruction bus"),
            Self::ContextQueue => write!(f, "context queue"),
        }
    }
}

/// A non-reentrant exclusive lock that remembers which thread holds it.
pub struct TryLock<T> {
    resource: Resource,
    owner: AtomicU64,
    inner: Mutex<T>,
}

impl<T> TryLock<T> {
    /// Wraps `value` in an unlocked lock.
    ///
    /// # Arguments
    ///
    /// * `resource` - Name of the resource, reported on protocol violations.
    /// * `value` - The protected value.
    pub fn new(resource: Resource, value: T) -> Self {
        Self {
            resource,
            owner: AtomicU64::new(UNOWNED),
            inner: Mutex::new(value),
        }
    }

    /// Attempts to take the lock without blocking.
    ///
    /// # Returns
    ///
    /// * `Ok(Some(guard))` - The lock was free and is now held by this thread.
    /// * `Ok(None)` - Another thread holds the lock.
    /// * `Err(SimError::LockProtocol)` - This thread already holds the lock.
    pub fn try_acquire(&self) -> Result<Option<Held<'_, T>>, SimError> {
        let me = current_thread_token();
        if self.owner.load(Ordering::Acquire) == me {
            return Err(SimError::LockProtocol {
                resource: self.resource,
            });
        }
        Ok(self.inner.try_lock().map(|guard| {
            self.owner.store(me, Ordering::Release);
            Held {
                owner: &self.owner,
                guard,
            }
        }))
    }

    /// Takes the lock, blocking the OS thread until it is free.
    ///
    /// Only for quiescent inspection (snapshots after the cores stopped). A
    /// thread that blocks here while registered with the clock stalls the
    /// whole simulation.
    pub fn lock(&self) -> Result<Held<'_, T>, SimError> {
        let me = current_thread_token();
        if self.owner.load(Ordering::Acquire) == me {
            return Err(SimError::LockProtocol {
                resource: self.resource,
            });
        }
        let guard = self.inner.lock();
        self.owner.store(me, Ordering::Release);
        Ok(Held {
            owner: &self.owner,
            guard,
        })
    }

    /// Returns `true` if the calling thread holds the lock.
    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == current_thread_token()
    }

    /// The resource this lock protects.
    pub const fn resource(&self) -> Resource {
        self.resource
    }
}

impl<T> fmt::Debug for TryLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryLock")
            .field("resource", &self.resource)
            .field("held", &(self.owner.load(Ordering::Relaxed) != UNOWNED))
            .finish_non_exhaustive()
    }
}

/// Proof that the current thread holds a `TryLock`.
///
/// Dropping the guard releases the lock.
pub struct Held<'a, T> {
    owner: &'a AtomicU64,
    guard: MutexGuard<'a, T>,
}

impl<T> Drop for Held<'_, T> {
    fn drop(&mut self) {
        // Runs before `guard` is dropped, so the owner is cleared while the
        // mutex is still held.
        self.owner.store(UNOWNED, Ordering::Release);
    }
}

impl<T> Deref for Held<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for Held<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: fmt::Debug> fmt::Debug for Held<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Held").field(&*self.guard).finish()
    }
}
