// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use cirrus_profiles::ProfileError;

pub type Result<T> = std::result::Result<T, PolicyError>;

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
	#[error("profile not found: {0}")]
	ProfileNotFound(String),

	#[error("profile registry error: {0}")]
	Registry(ProfileError),
}

impl From<ProfileError> for PolicyError {
	fn from(err: ProfileError) -> Self {
		match err {
			ProfileError::NotFound(name) => PolicyError::ProfileNotFound(name),
			other => PolicyError::Registry(other),
		}
	}
}
