// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Round-robin idle work on the render thread.
//!
//! Idle tasks run between frames, one task per rotation. A rotation pops the
//! head task, runs it under the render lock, and pushes it back to the tail
//! if it asked to keep running. With tasks `T1, T2, T3` that always
//! reschedule, three rotations run `T1`, `T2`, `T3` in that order.
//!
//! The queue has its own lock, ordered against the render lock: a thread
//! never holds both. A rotation therefore happens in three steps (pop under
//! the queue lock, run under the render lock, push back under the queue
//! lock), driven by [`RenderRoot::run_idle_rotation`].
//!
//! A "scheduled" flag records that the host already owes the root one
//! rotation. Whoever sets it calls
//! [`RenderHost::schedule_idle`](crate::host::RenderHost::schedule_idle),
//! after letting go of the queue lock.
//!
//! [`RenderRoot::run_idle_rotation`]: crate::root::RenderRoot::run_idle_rotation

use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::VecDeque;

use crate::error::BoxError;
use crate::host::Canvas;
use crate::lock::{LockDomain, LockKind, OrderedMutex};

/// What an idle task wants after running.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IdleOutcome {
    /// Drop the task from the queue.
    Done,
    /// Run the task again after every other queued task has had a turn.
    Reschedule,
}

/// Work run on the render thread between frames.
///
/// The task sees the current canvas and whether a frame is also pending, so
/// it can keep its slice short when the user is waiting on a frame. Errors
/// are returned to the host unchanged and the failed task is dropped.
pub trait IdleTask: Send {
    /// Runs one slice of work.
    fn on_idle(
        &mut self,
        canvas: &mut dyn Canvas,
        render_requested: bool,
    ) -> Result<IdleOutcome, BoxError>;
}

impl<F> IdleTask for F
where
    F: FnMut(&mut dyn Canvas, bool) -> Result<IdleOutcome, BoxError> + Send,
{
    fn on_idle(
        &mut self,
        canvas: &mut dyn Canvas,
        render_requested: bool,
    ) -> Result<IdleOutcome, BoxError> {
        self(canvas, render_requested)
    }
}

/// Names a queued idle task, for removal and error reports.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdleTaskId(u64);

impl IdleTaskId {
    /// Builds an id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for IdleTaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdleTaskId({})", self.0)
    }
}

/// A task with its id, queued or popped for a rotation.
pub(crate) struct QueuedTask {
    pub(crate) id: IdleTaskId,
    pub(crate) task: Box<dyn IdleTask>,
}

impl fmt::Debug for QueuedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueuedTask")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    id: IdleTaskId,
    removed: bool,
}

#[derive(Default)]
struct QueueState {
    tasks: VecDeque<QueuedTask>,
    scheduled: bool,
    in_flight: Option<InFlight>,
}

impl QueueState {
    /// Sets the scheduled flag if there is work and nobody owes a rotation
    /// yet. Returns whether the caller must notify the host.
    fn claim_schedule(&mut self) -> bool {
        if self.tasks.is_empty() || self.scheduled {
            return false;
        }
        self.scheduled = true;
        true
    }
}

/// The idle task FIFO and its scheduled flag.
///
/// Ids come from an atomic counter outside the lock, so a render callback
/// can name a task before it is queued.
pub(crate) struct IdleTaskQueue {
    next_id: AtomicU64,
    state: OrderedMutex<QueueState>,
}

impl fmt::Debug for IdleTaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("IdleTaskQueue")
            .field("len", &state.tasks.len())
            .field("scheduled", &state.scheduled)
            .field("in_flight", &state.in_flight)
            .finish()
    }
}

impl IdleTaskQueue {
    pub(crate) fn new(domain: LockDomain) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            state: OrderedMutex::new(domain, LockKind::IdleQueue, QueueState::default()),
        }
    }

    /// Hands out the next task id without touching the queue.
    pub(crate) fn reserve(&self, task: Box<dyn IdleTask>) -> QueuedTask {
        let id = IdleTaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        QueuedTask { id, task }
    }

    /// Appends `task`. Returns its id and whether the caller must ask the
    /// host for a rotation.
    pub(crate) fn add(&self, task: Box<dyn IdleTask>) -> (IdleTaskId, bool) {
        let queued = self.reserve(task);
        let id = queued.id;
        (id, self.extend(vec![queued]))
    }

    /// Appends already-reserved tasks in order. Returns whether the caller
    /// must ask the host for a rotation.
    pub(crate) fn extend(&self, tasks: Vec<QueuedTask>) -> bool {
        let mut state = self.state.lock();
        state.tasks.extend(tasks);
        state.claim_schedule()
    }

    /// Removes the task named `id`. A task that is running right now is
    /// not pushed back when it returns.
    pub(crate) fn remove(&self, id: IdleTaskId) -> bool {
        let mut state = self.state.lock();
        if let Some(index) = state.tasks.iter().position(|queued| queued.id == id) {
            state.tasks.remove(index);
            return true;
        }
        match &mut state.in_flight {
            Some(flight) if flight.id == id && !flight.removed => {
                flight.removed = true;
                true
            }
            _ => false,
        }
    }

    /// Drops every task, including the one currently running.
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.state.lock();
        let mut dropped = state.tasks.len();
        state.tasks.clear();
        if let Some(flight) = &mut state.in_flight
            && !flight.removed
        {
            flight.removed = true;
            dropped += 1;
        }
        dropped
    }

    /// Starts a rotation: clears the scheduled flag and pops the head.
    pub(crate) fn begin_rotation(&self) -> Option<QueuedTask> {
        let mut state = self.state.lock();
        state.scheduled = false;
        let popped = state.tasks.pop_front()?;
        state.in_flight = Some(InFlight {
            id: popped.id,
            removed: false,
        });
        Some(popped)
    }

    /// Puts a task that could not run back at the head, where it keeps its
    /// turn.
    pub(crate) fn restore(&self, popped: QueuedTask) {
        let mut state = self.state.lock();
        if let Some(flight) = state.in_flight.take()
            && flight.removed
        {
            return;
        }
        state.tasks.push_front(popped);
    }

    /// Ends a rotation whose task failed. The task is dropped and nothing is
    /// scheduled.
    pub(crate) fn abandon(&self, popped: QueuedTask) {
        self.state.lock().in_flight = None;
        drop(popped);
    }

    /// Ends a rotation. The task goes back to the tail if `keep` and nobody
    /// removed it meanwhile. Returns whether the caller must ask the host for
    /// another rotation, which happens only when no frame is pending to do
    /// it instead.
    pub(crate) fn finish_rotation(
        &self,
        popped: QueuedTask,
        keep: bool,
        frame_pending: bool,
    ) -> bool {
        let mut state = self.state.lock();
        let removed = state.in_flight.take().is_some_and(|flight| flight.removed);
        if keep && !removed {
            state.tasks.push_back(popped);
        }
        !frame_pending && state.claim_schedule()
    }

    /// Claims a rotation if work is waiting and none is owed. Called at the
    /// end of each frame.
    pub(crate) fn schedule_if_waiting(&self) -> bool {
        self.state.lock().claim_schedule()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub(crate) fn is_scheduled(&self) -> bool {
        self.state.lock().scheduled
    }
}
