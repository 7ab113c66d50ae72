// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ProfileError>;

#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
	#[error("profile not found: {0}")]
	NotFound(String),

	#[error("failed to read profile {path}: {source}")]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse profile {path}: {source}")]
	Parse {
		path: PathBuf,
		#[source]
		source: toml::de::Error,
	},

	#[error("invalid profile {name}: {}", problems.join("; "))]
	Invalid { name: String, problems: Vec<String> },

	#[error("duplicate profile name: {0}")]
	Duplicate(String),

	#[error("profile source unavailable: {0}")]
	Unavailable(String),
}

impl ProfileError {
	pub fn is_not_found(&self) -> bool {
		matches!(self, ProfileError::NotFound(_))
	}
}
