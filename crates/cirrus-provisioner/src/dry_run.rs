// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::Result;
use crate::types::{ProvisionOutcome, ProvisionRequest, Provisioner};

/// Logs each job and reports success without touching any cloud.
#[derive(Debug, Default, Clone)]
pub struct DryRunProvisioner {
	delay: Duration,
}

impl DryRunProvisioner {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sleeps this long before succeeding, to make local runs look realistic.
	pub fn with_delay(delay: Duration) -> Self {
		Self { delay }
	}
}

#[async_trait]
impl Provisioner for DryRunProvisioner {
	fn name(&self) -> &str {
		"dry-run"
	}

	async fn execute(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome> {
		tracing::info!(
			job_id = %req.job_id,
			cluster_id = %req.cluster.id,
			cluster_name = %req.cluster.name,
			job_type = %req.job_type,
			attempt = req.attempt,
			"dry-run provision"
		);

		if !self.delay.is_zero() {
			tokio::time::sleep(self.delay).await;
		}

		Ok(ProvisionOutcome {
			artifacts: json!({
				"dry_run": true,
				"job_type": req.job_type.as_str(),
			}),
		})
	}
}
