// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Failures surfaced to the host's frame-driving call.
//!
//! Only collaborator failures are errors: a scene node failing to lay out or
//! render, or an idle task failing. They are handed back unchanged inside
//! [`RootError`]; the root neither retries nor swallows them. Contract
//! violations by the host (a frame before the surface exists, a resize for a
//! different context, re-entering the render lock) panic instead.

use crate::idle::IdleTaskId;

/// The error type collaborators return.
pub type BoxError = Box<dyn core::error::Error + Send + Sync + 'static>;

/// A collaborator failure, tagged with where in the root it surfaced.
#[derive(thiserror::Error, Debug)]
pub enum RootError {
    /// The content root failed to lay out.
    #[error("content root layout failed")]
    Layout(#[source] BoxError),

    /// The content root failed to render.
    #[error("content root render failed")]
    Render(#[source] BoxError),

    /// An idle task failed. The task has been dropped from the queue.
    #[error("idle task {id:?} failed")]
    IdleTask {
        /// The task that failed.
        id: IdleTaskId,
        /// What the task returned.
        #[source]
        source: BoxError,
    },
}

impl RootError {
    /// Returns the collaborator's error exactly as it was returned.
    #[must_use]
    pub fn into_source(self) -> BoxError {
        match self {
            Self::Layout(source) | Self::Render(source) | Self::IdleTask { source, .. } => source,
        }
    }
}
