// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background cleanup: schedules destroy jobs for clusters past their TTL,
//! fails jobs that have been running for too long, and deletes expired
//! locks and idempotency keys.

pub mod config;
pub mod error;
pub mod janitor;

pub use config::JanitorConfig;
pub use error::{JanitorError, Result};
pub use janitor::{Janitor, JanitorReport, TTL_EXPIRED_REASON};
