// Copyright 2026 the Tandem Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Development sinks for `tandem_core` trace events.
//!
//! - [`recorder`]: compact binary recording and decoding
//! - [`chrome`]: Chrome Trace Event Format exporter

pub mod chrome;
pub mod recorder;
