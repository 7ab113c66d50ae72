// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use cirrus_db::{Cluster, Job, JobId, JobType};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Everything an executor needs to carry out one job attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
	pub job_id: JobId,
	pub job_type: JobType,
	/// Zero-based attempt number being executed.
	pub attempt: u32,
	pub metadata: serde_json::Value,
	pub cluster: Cluster,
}

impl ProvisionRequest {
	pub fn for_job(job: &Job, cluster: Cluster) -> Self {
		Self {
			job_id: job.id,
			job_type: job.job_type,
			attempt: job.attempt,
			metadata: job.metadata.clone(),
			cluster,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionOutcome {
	/// Free-form output, merged into the job metadata under `artifacts`.
	pub artifacts: serde_json::Value,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
	fn name(&self) -> &str;
	async fn execute(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome>;
}
