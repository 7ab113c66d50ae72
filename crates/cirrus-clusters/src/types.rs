// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use cirrus_db::{Cluster, Job};
use cirrus_policy::ValidationError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct IntakeConfig {
	/// How long a cached create response answers repeats of its key.
	pub idempotency_ttl: Duration,
	/// `max_attempts` for jobs created here.
	pub max_attempts: u32,
}

impl Default for IntakeConfig {
	fn default() -> Self {
		Self {
			idempotency_ttl: Duration::from_secs(24 * 60 * 60),
			max_attempts: 3,
		}
	}
}

/// The persisted cluster and the CREATE job queued for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedCluster {
	pub cluster: Cluster,
	pub job: Job,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
	Created(CreatedCluster),
	/// A cached answer for a repeated idempotency key.
	Replayed(CreatedCluster),
	Rejected(Vec<ValidationError>),
}

impl CreateOutcome {
	pub fn created(&self) -> Option<&CreatedCluster> {
		match self {
			CreateOutcome::Created(created) | CreateOutcome::Replayed(created) => Some(created),
			CreateOutcome::Rejected(_) => None,
		}
	}

	pub fn errors(&self) -> &[ValidationError] {
		match self {
			CreateOutcome::Rejected(errors) => errors,
			_ => &[],
		}
	}
}
