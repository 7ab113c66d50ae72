// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Worker configuration section.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WorkerConfigLayer {
	#[serde(default)]
	pub id: Option<String>,
	#[serde(default)]
	pub concurrency: Option<usize>,
	#[serde(default)]
	pub poll_interval_secs: Option<u64>,
	#[serde(default)]
	pub lease_duration_secs: Option<u64>,
	#[serde(default)]
	pub max_attempts: Option<u32>,
	#[serde(default)]
	pub drain_timeout_secs: Option<u64>,
}

impl WorkerConfigLayer {
	pub fn merge(&mut self, other: WorkerConfigLayer) {
		if other.id.is_some() {
			self.id = other.id;
		}
		if other.concurrency.is_some() {
			self.concurrency = other.concurrency;
		}
		if other.poll_interval_secs.is_some() {
			self.poll_interval_secs = other.poll_interval_secs;
		}
		if other.lease_duration_secs.is_some() {
			self.lease_duration_secs = other.lease_duration_secs;
		}
		if other.max_attempts.is_some() {
			self.max_attempts = other.max_attempts;
		}
		if other.drain_timeout_secs.is_some() {
			self.drain_timeout_secs = other.drain_timeout_secs;
		}
	}

	pub fn finalize(self) -> WorkerConfig {
		WorkerConfig {
			id: self.id.unwrap_or_else(default_worker_id),
			concurrency: self.concurrency.unwrap_or(4),
			poll_interval_secs: self.poll_interval_secs.unwrap_or(5),
			lease_duration_secs: self.lease_duration_secs.unwrap_or(3600), // 1 hour
			max_attempts: self.max_attempts.unwrap_or(3),
			drain_timeout_secs: self.drain_timeout_secs.unwrap_or(30),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
	pub id: String,
	pub concurrency: usize,
	pub poll_interval_secs: u64,
	pub lease_duration_secs: u64,
	/// Attempts allowed for every job created by this process.
	pub max_attempts: u32,
	pub drain_timeout_secs: u64,
}

impl WorkerConfig {
	pub fn poll_interval(&self) -> Duration {
		Duration::from_secs(self.poll_interval_secs)
	}

	pub fn lease_duration(&self) -> Duration {
		Duration::from_secs(self.lease_duration_secs)
	}

	pub fn drain_timeout(&self) -> Duration {
		Duration::from_secs(self.drain_timeout_secs)
	}
}

impl Default for WorkerConfig {
	fn default() -> Self {
		WorkerConfigLayer::default().finalize()
	}
}

/// `<hostname>-<pid>`.
fn default_worker_id() -> String {
	let host = hostname::get()
		.map(|h| h.to_string_lossy().to_string())
		.unwrap_or_else(|_| "localhost".to_string());
	format!("{host}-{}", std::process::id())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = WorkerConfig::default();
		assert_eq!(config.concurrency, 4);
		assert_eq!(config.poll_interval(), Duration::from_secs(5));
		assert_eq!(config.lease_duration(), Duration::from_secs(3600));
		assert_eq!(config.max_attempts, 3);
		assert!(config
			.id
			.ends_with(&format!("-{}", std::process::id())));
	}

	#[test]
	fn test_merge_overwrites_only_set_fields() {
		let mut base = WorkerConfigLayer {
			id: Some("worker-1".to_string()),
			concurrency: Some(2),
			..Default::default()
		};
		base.merge(WorkerConfigLayer {
			concurrency: Some(16),
			lease_duration_secs: Some(600),
			..Default::default()
		});

		let config = base.finalize();
		assert_eq!(config.id, "worker-1");
		assert_eq!(config.concurrency, 16);
		assert_eq!(config.lease_duration_secs, 600);
		assert_eq!(config.poll_interval_secs, 5);
	}

	#[test]
	fn test_deserialize_partial() {
		let layer: WorkerConfigLayer = toml::from_str("concurrency = 8\n").unwrap();
		assert_eq!(layer.concurrency, Some(8));
		assert!(layer.id.is_none());
	}
}
