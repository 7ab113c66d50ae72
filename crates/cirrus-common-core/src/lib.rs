// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared primitives for the Cirrus control plane.

pub mod clock;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
