// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use cirrus_db::{JobId, JobType};
use parking_lot::Mutex;

use crate::error::{ProvisionError, Result};
use crate::types::{ProvisionOutcome, ProvisionRequest, Provisioner};

/// A request for a freshly created cluster named `test-cluster-01`.
pub fn sample_request(job_type: JobType) -> ProvisionRequest {
	let cluster = cirrus_db::testing::make_cluster("test-cluster-01", chrono::Utc::now());
	ProvisionRequest {
		job_id: JobId::new(),
		job_type,
		attempt: 0,
		metadata: serde_json::json!({}),
		cluster,
	}
}

/// Replays a fixed script of results, then succeeds with empty artifacts.
/// Records every request it receives.
#[derive(Default)]
pub struct ScriptedProvisioner {
	script: Mutex<VecDeque<Result<ProvisionOutcome>>>,
	calls: Mutex<Vec<ProvisionRequest>>,
	delay: Duration,
}

impl ScriptedProvisioner {
	pub fn new(script: Vec<Result<ProvisionOutcome>>) -> Self {
		Self {
			script: Mutex::new(script.into()),
			..Default::default()
		}
	}

	pub fn succeeding() -> Self {
		Self::default()
	}

	/// Fails every call with a retryable `EXIT_1`.
	pub fn failing(times: usize) -> Self {
		Self::new(
			(0..times)
				.map(|_| Err(ProvisionError::retryable("EXIT_1", "scripted failure")))
				.collect(),
		)
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn calls(&self) -> Vec<ProvisionRequest> {
		self.calls.lock().clone()
	}

	pub fn call_count(&self) -> usize {
		self.calls.lock().len()
	}
}

#[async_trait]
impl Provisioner for ScriptedProvisioner {
	fn name(&self) -> &str {
		"scripted"
	}

	async fn execute(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome> {
		self.calls.lock().push(req.clone());
		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}
		self
			.script
			.lock()
			.pop_front()
			.unwrap_or_else(|| Ok(ProvisionOutcome::default()))
	}
}
