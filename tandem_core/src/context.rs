// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The view of root state handed to scene callbacks.
//!
//! Scene nodes are called with the render lock already held, and the render
//! lock is not reentrant. [`RootContext`] lets them request frames, request
//! layout, register animations, and add idle tasks by touching the locked
//! state directly, without going back through
//! [`RenderRoot`](crate::root::RenderRoot).
//!
//! Idle tasks added here are held back until the render lock is released,
//! since the idle queue's lock may not be taken under it.

use core::fmt;

use crate::animation::{PendingAnimation, PendingAnimationList};
use crate::clock::Clock;
use crate::host::RenderHost;
use crate::idle::{IdleTask, IdleTaskId, IdleTaskQueue, QueuedTask};
use crate::scheduler::FrameScheduler;
use crate::time::HostTime;

/// Layout bookkeeping guarded by the render lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct LayoutState {
    /// Set once the first surface is ready; layout requests before that are
    /// dropped.
    pub(crate) initialized: bool,
    pub(crate) needs_layout: bool,
}

impl LayoutState {
    /// A fresh root has a layout pending so its first frame lays out
    /// whatever content it has by then.
    pub(crate) const fn new() -> Self {
        Self {
            initialized: false,
            needs_layout: true,
        }
    }

    /// Marks layout dirty. Returns `true` only if this call changed the flag,
    /// in which case the caller owes a render request.
    pub(crate) fn request(&mut self, has_content: bool) -> bool {
        if !self.initialized || !has_content || self.needs_layout {
            return false;
        }
        self.needs_layout = true;
        true
    }

    /// Clears the flag, returning whether a layout was pending.
    pub(crate) fn take(&mut self) -> bool {
        core::mem::take(&mut self.needs_layout)
    }
}

/// Work recorded under the render lock for later: the layout flag, pending
/// animations, and idle tasks waiting for the lock to be released.
#[derive(Debug)]
pub(crate) struct PendingWork {
    pub(crate) layout: LayoutState,
    pub(crate) animations: PendingAnimationList,
    pub(crate) idle_tasks: Vec<QueuedTask>,
}

impl PendingWork {
    pub(crate) const fn new() -> Self {
        Self {
            layout: LayoutState::new(),
            animations: PendingAnimationList::new(),
            idle_tasks: Vec::new(),
        }
    }
}

/// Root services available while the render lock is held.
pub struct RootContext<'a> {
    clock: &'a Clock,
    frames: &'a FrameScheduler,
    host: &'a dyn RenderHost,
    idle: &'a IdleTaskQueue,
    work: &'a mut PendingWork,
    has_content: bool,
}

impl fmt::Debug for RootContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootContext")
            .field("now", &self.clock.now())
            .field("layout", &self.work.layout)
            .field("pending_animations", &self.work.animations.len())
            .field("deferred_idle_tasks", &self.work.idle_tasks.len())
            .finish_non_exhaustive()
    }
}

impl<'a> RootContext<'a> {
    pub(crate) fn new(
        clock: &'a Clock,
        frames: &'a FrameScheduler,
        host: &'a dyn RenderHost,
        idle: &'a IdleTaskQueue,
        work: &'a mut PendingWork,
        has_content: bool,
    ) -> Self {
        Self {
            clock,
            frames,
            host,
            idle,
            work,
            has_content,
        }
    }

    /// The current frame's time.
    #[must_use]
    pub fn now(&self) -> HostTime {
        self.clock.now()
    }

    /// Whether a frame has been requested since the last one started.
    #[must_use]
    pub fn render_requested(&self) -> bool {
        self.frames.is_requested()
    }

    /// Asks for a frame. Requests made while a frame is running are served
    /// by the next frame.
    pub fn request_render(&self) {
        if self.frames.request() {
            self.host.request_frame();
        }
    }

    /// Marks the content root for layout on the next frame.
    pub fn request_layout(&mut self) {
        if self.work.layout.request(self.has_content) {
            self.request_render();
        }
    }

    /// Queues `animation` to have its start time set by the next frame.
    pub fn register_pending_animation(&mut self, animation: impl PendingAnimation + 'static) {
        self.work.animations.register(Box::new(animation));
    }

    /// Adds an idle task. It joins the queue when the render lock is
    /// released; the returned id is valid for removal from then on.
    pub fn add_idle_task(&mut self, task: impl IdleTask + 'static) -> IdleTaskId {
        let queued = self.idle.reserve(Box::new(task));
        let id = queued.id;
        self.work.idle_tasks.push(queued);
        id
    }
}
