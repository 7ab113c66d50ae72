// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JanitorConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub check_interval_secs: Option<u64>,
	#[serde(default)]
	pub stuck_job_threshold_secs: Option<u64>,
}

impl JanitorConfigLayer {
	pub fn merge(&mut self, other: JanitorConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.check_interval_secs.is_some() {
			self.check_interval_secs = other.check_interval_secs;
		}
		if other.stuck_job_threshold_secs.is_some() {
			self.stuck_job_threshold_secs = other.stuck_job_threshold_secs;
		}
	}

	pub fn finalize(self) -> JanitorConfig {
		JanitorConfig {
			enabled: self.enabled.unwrap_or(true),
			check_interval_secs: self.check_interval_secs.unwrap_or(300), // 5 minutes
			stuck_job_threshold_secs: self.stuck_job_threshold_secs.unwrap_or(7200), // 2 hours
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JanitorConfig {
	pub enabled: bool,
	pub check_interval_secs: u64,
	pub stuck_job_threshold_secs: u64,
}

impl JanitorConfig {
	pub fn check_interval(&self) -> Duration {
		Duration::from_secs(self.check_interval_secs)
	}

	pub fn stuck_job_threshold(&self) -> Duration {
		Duration::from_secs(self.stuck_job_threshold_secs)
	}
}

impl Default for JanitorConfig {
	fn default() -> Self {
		JanitorConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = JanitorConfig::default();
		assert!(config.enabled);
		assert_eq!(config.check_interval(), Duration::from_secs(300));
		assert_eq!(config.stuck_job_threshold(), Duration::from_secs(7200));
	}

	#[test]
	fn test_disable() {
		let layer: JanitorConfigLayer = toml::from_str("enabled = false\n").unwrap();
		assert!(!layer.finalize().enabled);
	}
}
