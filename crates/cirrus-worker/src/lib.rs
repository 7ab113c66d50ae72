// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Claims pending jobs, runs them through a [`cirrus_provisioner::Provisioner`]
//! and records the outcome.
//!
//! A job only runs while its worker holds the cluster's lease in
//! `job_locks`, so two workers never operate on the same cluster at once.
//! Failed attempts are retried with exponential backoff until the job's
//! `max_attempts` is reached.

pub mod backoff;
pub mod config;
pub mod error;
pub mod worker;

pub use backoff::calculate_backoff_delay;
pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use worker::{PollReport, Worker};
