// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// A failed provisioning attempt.
///
/// `code` is stable and machine-readable (`EXIT_2`, `TIMEOUT`); it is what
/// ends up in the job's `error_code`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ProvisionError {
	pub code: String,
	pub message: String,
	pub retryable: bool,
}

impl ProvisionError {
	pub fn retryable(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
			retryable: true,
		}
	}

	pub fn fatal(code: impl Into<String>, message: impl Into<String>) -> Self {
		Self {
			code: code.into(),
			message: message.into(),
			retryable: false,
		}
	}

	pub fn timeout(after: std::time::Duration) -> Self {
		Self::retryable("TIMEOUT", format!("provisioner timed out after {after:?}"))
	}
}
