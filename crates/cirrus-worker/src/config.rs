// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
	/// Written to `jobs.locked_by` and `job_locks.locked_by`.
	pub worker_id: String,
	/// Maximum number of jobs executing at once.
	pub concurrency: usize,
	pub poll_interval: Duration,
	/// How long a claimed cluster lease lasts without renewal.
	pub lease_duration: Duration,
	/// How long shutdown waits for in-flight jobs.
	pub drain_timeout: Duration,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		Self {
			worker_id: format!("worker-{}", std::process::id()),
			concurrency: 4,
			poll_interval: Duration::from_secs(5),
			lease_duration: Duration::from_secs(3600),
			drain_timeout: Duration::from_secs(30),
		}
	}
}

impl WorkerConfig {
	pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
		self.worker_id = worker_id.into();
		self
	}

	pub fn with_concurrency(mut self, concurrency: usize) -> Self {
		self.concurrency = concurrency;
		self
	}

	pub fn with_lease_duration(mut self, lease: Duration) -> Self {
		self.lease_duration = lease;
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	/// How often a running job's lease is extended.
	pub fn renew_interval(&self) -> Duration {
		(self.lease_duration / 3).max(Duration::from_millis(10))
	}
}
