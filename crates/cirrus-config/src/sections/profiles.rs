// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct ProfilesConfig {
	/// Directory of `*.toml` profile files.
	pub dir: PathBuf,
}

impl Default for ProfilesConfig {
	fn default() -> Self {
		Self {
			dir: PathBuf::from("./profiles"),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilesConfigLayer {
	#[serde(default)]
	pub dir: Option<PathBuf>,
}

impl ProfilesConfigLayer {
	pub fn merge(&mut self, other: ProfilesConfigLayer) {
		if other.dir.is_some() {
			self.dir = other.dir;
		}
	}

	pub fn finalize(self) -> ProfilesConfig {
		ProfilesConfig {
			dir: self.dir.unwrap_or_else(|| ProfilesConfig::default().dir),
		}
	}
}
