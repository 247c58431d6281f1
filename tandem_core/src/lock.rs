// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The locks of a render root, with ordering checks.
//!
//! Each root owns a render lock and an idle-queue lock. The acquisition rule
//! is that a thread holds at most one of them at a time, and never takes the
//! render lock twice. Every acquisition is recorded in a per-thread list so a
//! violation panics at the offending call instead of deadlocking.
//!
//! Scene node locks rank below every render lock: the render thread locks the
//! content root while holding the render lock, so no thread may take a render
//! lock while it holds a node lock. A node lock is not reentrant either.
//!
//! Locks belonging to different roots are independent.

use core::cell::RefCell;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// Which lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LockKind {
    Render,
    IdleQueue,
    /// A [`SharedNode`](crate::host::SharedNode). Each node is its own
    /// domain.
    Node,
}

impl fmt::Display for LockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Render => "render",
            Self::IdleQueue => "idle-queue",
            Self::Node => "scene node",
        })
    }
}

/// Groups the locks of one root, or names a single node lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LockDomain(u64);

impl LockDomain {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

std::thread_local! {
    static HELD: RefCell<Vec<(LockDomain, LockKind)>> = const { RefCell::new(Vec::new()) };
}

/// A non-reentrant mutex that enforces the acquisition rules.
pub(crate) struct OrderedMutex<T: ?Sized> {
    domain: LockDomain,
    kind: LockKind,
    inner: Mutex<T>,
}

impl<T: ?Sized> fmt::Debug for OrderedMutex<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedMutex")
            .field("domain", &self.domain)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T> OrderedMutex<T> {
    pub(crate) fn new(domain: LockDomain, kind: LockKind, value: T) -> Self {
        Self {
            domain,
            kind,
            inner: Mutex::new(value),
        }
    }
}

impl<T: ?Sized> OrderedMutex<T> {
    /// Blocks until the lock is acquired.
    ///
    /// # Panics
    ///
    /// Panics if the calling thread already holds a lock of the same
    /// domain, or takes a render lock while holding a node lock.
    pub(crate) fn lock(&self) -> OrderedGuard<'_, T> {
        HELD.with(|held| {
            let held = held.borrow();
            if self.kind == LockKind::Render
                && held.iter().any(|(_, kind)| *kind == LockKind::Node)
            {
                panic!(
                    "lock order violation: render lock acquired while a scene node lock is held"
                );
            }
            if let Some(&(_, other)) = held.iter().find(|(domain, _)| *domain == self.domain) {
                if other == self.kind {
                    panic!("the {} lock is not reentrant", self.kind);
                }
                panic!(
                    "lock order violation: {} lock acquired while the {other} lock is held",
                    self.kind
                );
            }
        });
        let guard = self.inner.lock();
        HELD.with(|held| held.borrow_mut().push((self.domain, self.kind)));
        OrderedGuard {
            guard,
            domain: self.domain,
            kind: self.kind,
        }
    }
}

/// Releases the lock and its ordering record on drop.
pub(crate) struct OrderedGuard<'a, T: ?Sized> {
    guard: MutexGuard<'a, T>,
    domain: LockDomain,
    kind: LockKind,
}

impl<T: ?Sized> fmt::Debug for OrderedGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedGuard")
            .field("domain", &self.domain)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> Deref for OrderedGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized> DerefMut for OrderedGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized> Drop for OrderedGuard<'_, T> {
    fn drop(&mut self) {
        let entry = (self.domain, self.kind);
        // `try_with`: the thread-local may already be gone during thread exit.
        let _ = HELD.try_with(|held| {
            let mut held = held.borrow_mut();
            if let Some(pos) = held.iter().rposition(|e| *e == entry) {
                held.remove(pos);
            }
        });
    }
}
