// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct JanitorConfig {
	pub check_interval: Duration,
	/// A RUNNING job older than this is presumed dead.
	pub stuck_job_threshold: Duration,
	/// `max_attempts` for the destroy jobs the TTL sweep creates.
	pub max_attempts: u32,
}

impl Default for JanitorConfig {
	fn default() -> Self {
		Self {
			check_interval: Duration::from_secs(5 * 60),
			stuck_job_threshold: Duration::from_secs(2 * 60 * 60),
			max_attempts: 3,
		}
	}
}
