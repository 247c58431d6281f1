// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test doubles shared by the unit tests.

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kurbo::Rect;
use parking_lot::Mutex;

use crate::clock::{Clock, ManualSource};
use crate::context::{PendingWork, RootContext};
use crate::error::BoxError;
use crate::host::{Canvas, RenderHost, SceneNode, SharedNode};
use crate::idle::IdleTaskQueue;
use crate::input::{PointerAction, PointerEvent};
use crate::lock::LockDomain;
use crate::root::RootHandle;
use crate::scheduler::{FrameScheduler, RenderMode};
use crate::time::HostTime;

/// Counts what the root asked of its host.
#[derive(Debug, Default)]
pub(crate) struct RecordingHost {
    frames: AtomicUsize,
    idles: AtomicUsize,
    mode: Mutex<Option<RenderMode>>,
}

impl RecordingHost {
    pub(crate) fn frame_requests(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub(crate) fn idle_requests(&self) -> usize {
        self.idles.load(Ordering::SeqCst)
    }

    pub(crate) fn render_mode(&self) -> Option<RenderMode> {
        *self.mode.lock()
    }
}

impl RenderHost for RecordingHost {
    fn request_frame(&self) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }

    fn schedule_idle(&self) {
        self.idles.fetch_add(1, Ordering::SeqCst);
    }

    fn set_render_mode(&self, mode: RenderMode) {
        *self.mode.lock() = Some(mode);
    }
}

/// What a [`RecordingCanvas`] saw.
#[derive(Debug, Default)]
pub(crate) struct CanvasLog {
    pub(crate) sizes: Vec<(u32, u32)>,
    pub(crate) recycled_deletes: usize,
    pub(crate) budget_resets: usize,
    pub(crate) yields: usize,
    pub(crate) invalidations: usize,
    /// Number of upcoming frames that run out of upload budget.
    pub(crate) exhaust_frames: usize,
    exhausted: bool,
}

/// A canvas that records calls into a shared [`CanvasLog`].
#[derive(Debug, Default)]
pub(crate) struct RecordingCanvas {
    log: Arc<Mutex<CanvasLog>>,
}

impl RecordingCanvas {
    pub(crate) fn new() -> (Self, Arc<Mutex<CanvasLog>>) {
        let canvas = Self::default();
        let log = Arc::clone(&canvas.log);
        (canvas, log)
    }
}

impl Canvas for RecordingCanvas {
    fn set_size(&mut self, width: u32, height: u32) {
        self.log.lock().sizes.push((width, height));
    }

    fn delete_recycled_resources(&mut self) {
        self.log.lock().recycled_deletes += 1;
    }

    fn reset_upload_budget(&mut self) {
        let mut log = self.log.lock();
        log.budget_resets += 1;
        log.exhausted = log.exhaust_frames > 0;
        log.exhaust_frames = log.exhaust_frames.saturating_sub(1);
    }

    fn upload_budget_exhausted(&self) -> bool {
        self.log.lock().exhausted
    }

    fn yield_textures(&mut self) {
        self.log.lock().yields += 1;
    }

    fn invalidate_textures(&mut self) {
        self.log.lock().invalidations += 1;
    }
}

type Hook = Box<dyn FnMut(&mut RootContext<'_>) + Send>;

#[derive(Default)]
struct NodeRecord {
    consume: bool,
    events: Vec<PointerEvent>,
    layouts: Vec<Rect>,
    renders: usize,
    attaches: usize,
    detaches: usize,
    fail_layout: bool,
    fail_render: bool,
    on_render: Option<Hook>,
    on_pointer: Option<Hook>,
}

/// Inspects and steers a [`ScriptedNode`] from the test.
#[derive(Clone)]
pub(crate) struct NodeLog {
    record: Arc<Mutex<NodeRecord>>,
}

impl core::fmt::Debug for NodeLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let record = self.record.lock();
        f.debug_struct("NodeLog")
            .field("events", &record.events)
            .field("layouts", &record.layouts)
            .field("renders", &record.renders)
            .finish_non_exhaustive()
    }
}

impl NodeLog {
    pub(crate) fn actions(&self) -> Vec<PointerAction> {
        self.record.lock().events.iter().map(|e| e.action).collect()
    }

    pub(crate) fn last_event_time(&self) -> Option<HostTime> {
        self.record.lock().events.last().map(|e| e.time)
    }

    pub(crate) fn set_consume(&self, consume: bool) {
        self.record.lock().consume = consume;
    }

    pub(crate) fn layouts(&self) -> Vec<Rect> {
        self.record.lock().layouts.clone()
    }

    pub(crate) fn renders(&self) -> usize {
        self.record.lock().renders
    }

    pub(crate) fn attaches(&self) -> usize {
        self.record.lock().attaches
    }

    pub(crate) fn detaches(&self) -> usize {
        self.record.lock().detaches
    }

    pub(crate) fn fail_layout(&self) {
        self.record.lock().fail_layout = true;
    }

    pub(crate) fn fail_render(&self) {
        self.record.lock().fail_render = true;
    }

    /// Runs `hook` with the frame's context on every render.
    pub(crate) fn on_render(&self, hook: impl FnMut(&mut RootContext<'_>) + Send + 'static) {
        self.record.lock().on_render = Some(Box::new(hook));
    }

    /// Runs `hook` with the root's context on every pointer event.
    pub(crate) fn on_pointer(&self, hook: impl FnMut(&mut RootContext<'_>) + Send + 'static) {
        self.record.lock().on_pointer = Some(Box::new(hook));
    }
}

#[derive(Debug, thiserror::Error)]
#[error("scripted {0} failure")]
pub(crate) struct ScriptedFailure(pub(crate) &'static str);

/// A content root that logs everything and answers pointer events as told.
pub(crate) struct ScriptedNode {
    log: NodeLog,
}

impl ScriptedNode {
    fn build(consume: bool) -> (SharedNode, NodeLog) {
        let log = NodeLog {
            record: Arc::new(Mutex::new(NodeRecord {
                consume,
                ..NodeRecord::default()
            })),
        };
        let node = SharedNode::new(Self { log: log.clone() });
        (node, log)
    }

    pub(crate) fn consuming() -> (SharedNode, NodeLog) {
        Self::build(true)
    }

    pub(crate) fn rejecting() -> (SharedNode, NodeLog) {
        Self::build(false)
    }
}

impl SceneNode for ScriptedNode {
    fn layout(&mut self, bounds: Rect, _cx: &mut RootContext<'_>) -> Result<(), BoxError> {
        let mut record = self.log.record.lock();
        if record.fail_layout {
            return Err(Box::new(ScriptedFailure("layout")));
        }
        record.layouts.push(bounds);
        Ok(())
    }

    fn render(&mut self, _canvas: &mut dyn Canvas, cx: &mut RootContext<'_>) -> Result<(), BoxError> {
        let mut record = self.log.record.lock();
        if record.fail_render {
            return Err(Box::new(ScriptedFailure("render")));
        }
        record.renders += 1;
        if let Some(hook) = &mut record.on_render {
            hook(cx);
        }
        Ok(())
    }

    fn dispatch_pointer_event(&mut self, event: &PointerEvent, cx: &mut RootContext<'_>) -> bool {
        let mut record = self.log.record.lock();
        record.events.push(*event);
        if let Some(hook) = &mut record.on_pointer {
            hook(cx);
        }
        record.consume
    }

    fn attach(&mut self, _root: &RootHandle) {
        self.log.record.lock().attaches += 1;
    }

    fn detach(&mut self) {
        self.log.record.lock().detaches += 1;
    }
}

/// The pieces a [`RootContext`] borrows, without a root around them.
pub(crate) struct Harness {
    pub(crate) clock: Clock,
    pub(crate) frames: FrameScheduler,
    pub(crate) host: Arc<RecordingHost>,
    pub(crate) idle: IdleTaskQueue,
    pub(crate) work: PendingWork,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let source = Arc::new(ManualSource::new(HostTime::from_millis(1)));
        Self {
            clock: Clock::new(source),
            frames: FrameScheduler::new(RenderMode::OnDemand),
            host: Arc::default(),
            idle: IdleTaskQueue::new(LockDomain::next()),
            work: PendingWork::new(),
        }
    }

    pub(crate) fn cx(&mut self) -> RootContext<'_> {
        RootContext::new(
            &self.clock,
            &self.frames,
            &*self.host,
            &self.idle,
            &mut self.work,
            true,
        )
    }
}
