// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pointer events and gesture state.
//!
//! The [`InputDispatcher`] remembers whether the content root accepted the
//! down event that started the current gesture. A gesture the root never
//! accepted is invisible to it: the moves and the up that follow are not
//! forwarded. When the content root is swapped mid-gesture the dispatcher
//! synthesizes one cancel for the outgoing root so it can unwind whatever
//! the down started.

use kurbo::Point;

use crate::context::RootContext;
use crate::host::SharedNode;
use crate::time::HostTime;

/// What a pointer did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PointerAction {
    /// Contact began; starts a gesture.
    Down,
    /// Contact moved.
    Move,
    /// Contact ended; finishes the gesture.
    Up,
    /// The gesture was aborted.
    Cancel,
}

/// A pointer event in surface coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointerEvent {
    /// What happened.
    pub action: PointerAction,
    /// Where, in surface pixels.
    pub position: Point,
    /// When the event occurred.
    pub time: HostTime,
}

impl PointerEvent {
    /// Creates an event.
    #[must_use]
    pub const fn new(action: PointerAction, position: Point, time: HostTime) -> Self {
        Self {
            action,
            position,
            time,
        }
    }

    /// A cancel at the surface origin.
    #[must_use]
    pub const fn cancel(time: HostTime) -> Self {
        Self::new(PointerAction::Cancel, Point::ORIGIN, time)
    }
}

/// Tracks whether a gesture accepted by the content root is in progress.
#[derive(Clone, Copy, Debug, Default)]
pub struct InputDispatcher {
    in_down_state: bool,
}

impl InputDispatcher {
    /// Creates a dispatcher with no gesture in progress.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            in_down_state: false,
        }
    }

    /// Whether the content root accepted the down of the current gesture.
    #[must_use]
    pub const fn in_down_state(&self) -> bool {
        self.in_down_state
    }

    /// Routes `event` to `target` and returns whether it was consumed.
    ///
    /// A down is always offered and, if consumed, opens the gesture. Anything
    /// else is dropped unless a gesture is open; an up or cancel closes the
    /// gesture whatever the target answered.
    pub fn dispatch(
        &mut self,
        event: &PointerEvent,
        target: Option<&SharedNode>,
        cx: &mut RootContext<'_>,
    ) -> bool {
        if event.action != PointerAction::Down && !self.in_down_state {
            return false;
        }
        let consumed = target.is_some_and(|node| node.lock().dispatch_pointer_event(event, cx));
        match event.action {
            PointerAction::Down => {
                if consumed {
                    self.in_down_state = true;
                }
            }
            PointerAction::Up | PointerAction::Cancel => self.in_down_state = false,
            PointerAction::Move => {}
        }
        consumed
    }

    /// Ends an open gesture by delivering one cancel stamped `now` to
    /// `outgoing`. Returns whether a cancel was sent.
    pub fn cancel_gesture(
        &mut self,
        outgoing: &SharedNode,
        now: HostTime,
        cx: &mut RootContext<'_>,
    ) -> bool {
        if !self.in_down_state {
            return false;
        }
        self.in_down_state = false;
        // The answer is irrelevant; the gesture is over either way.
        let _ = outgoing
            .lock()
            .dispatch_pointer_event(&PointerEvent::cancel(now), cx);
        true
    }
}
