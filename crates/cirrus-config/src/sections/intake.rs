// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntakeConfigLayer {
	#[serde(default)]
	pub idempotency_ttl_secs: Option<u64>,
}

impl IntakeConfigLayer {
	pub fn merge(&mut self, other: IntakeConfigLayer) {
		if other.idempotency_ttl_secs.is_some() {
			self.idempotency_ttl_secs = other.idempotency_ttl_secs;
		}
	}

	pub fn finalize(self) -> IntakeConfig {
		IntakeConfig {
			idempotency_ttl_secs: self.idempotency_ttl_secs.unwrap_or(86400), // 24 hours
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeConfig {
	pub idempotency_ttl_secs: u64,
}

impl Default for IntakeConfig {
	fn default() -> Self {
		IntakeConfigLayer::default().finalize()
	}
}
