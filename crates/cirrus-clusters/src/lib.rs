// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Turns user requests into cluster records and jobs.
//!
//! Creation goes through the policy engine and is optionally deduplicated by
//! a client-supplied idempotency key. Destroy and scale requests only queue
//! jobs; the worker carries them out.

pub mod error;
pub mod intake;
pub mod types;

pub use error::{IntakeError, Result};
pub use intake::{hash_request, IntakeService};
pub use types::{CreateOutcome, CreatedCluster, IntakeConfig};
