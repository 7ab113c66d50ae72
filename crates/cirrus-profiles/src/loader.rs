// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Profile sources.
//!
//! A source only produces parsed profiles; structural validation happens
//! when the registry assembles them into a [`ProfileSet`](crate::ProfileSet).

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{ProfileError, Result};
use crate::types::Profile;

pub trait ProfileSource: Send + Sync {
	fn name(&self) -> &str;
	fn load(&self) -> Result<Vec<Profile>>;
}

/// Reads one profile per `*.toml` file in a directory.
pub struct DirectorySource {
	dir: PathBuf,
	label: String,
}

impl DirectorySource {
	pub fn new(dir: impl Into<PathBuf>) -> Self {
		let dir = dir.into();
		let label = format!("dir:{}", dir.display());
		Self { dir, label }
	}

	pub fn dir(&self) -> &Path {
		&self.dir
	}
}

impl ProfileSource for DirectorySource {
	fn name(&self) -> &str {
		&self.label
	}

	fn load(&self) -> Result<Vec<Profile>> {
		let entries = std::fs::read_dir(&self.dir).map_err(|e| ProfileError::Io {
			path: self.dir.clone(),
			source: e,
		})?;

		let mut paths = Vec::new();
		for entry in entries {
			let entry = entry.map_err(|e| ProfileError::Io {
				path: self.dir.clone(),
				source: e,
			})?;
			let path = entry.path();
			if path.is_file() && path.extension().is_some_and(|ext| ext == "toml") {
				paths.push(path);
			}
		}
		// Sorted so the same broken file is reported on every reload.
		paths.sort();

		let mut profiles = Vec::with_capacity(paths.len());
		for path in paths {
			trace!(path = %path.display(), "reading profile");
			profiles.push(parse_file(&path)?);
		}

		debug!(dir = %self.dir.display(), count = profiles.len(), "profiles read");
		Ok(profiles)
	}
}

fn parse_file(path: &Path) -> Result<Profile> {
	let content = std::fs::read_to_string(path).map_err(|e| ProfileError::Io {
		path: path.to_path_buf(),
		source: e,
	})?;
	toml::from_str(&content).map_err(|e| ProfileError::Parse {
		path: path.to_path_buf(),
		source: e,
	})
}

/// Serves a fixed list of profiles.
#[derive(Default)]
pub struct StaticSource {
	profiles: parking_lot::RwLock<Vec<Profile>>,
}

impl StaticSource {
	pub fn new(profiles: Vec<Profile>) -> Self {
		Self {
			profiles: parking_lot::RwLock::new(profiles),
		}
	}

	/// Replaces what the next `load` returns.
	pub fn replace(&self, profiles: Vec<Profile>) {
		*self.profiles.write() = profiles;
	}
}

impl ProfileSource for StaticSource {
	fn name(&self) -> &str {
		"static"
	}

	fn load(&self) -> Result<Vec<Profile>> {
		Ok(self.profiles.read().clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::MINIMAL_TOML;
	use crate::types::Platform;

	#[test]
	fn test_parse_minimal_profile() {
		let profile: Profile = toml::from_str(MINIMAL_TOML).unwrap();
		assert_eq!(profile.name, "aws-minimal-test");
		assert_eq!(profile.platform, Platform::Aws);
		assert!(profile.enabled);
		assert!(profile.lifecycle.allow_custom_ttl);
		assert!(profile.tags.allow_user_tags);
		assert_eq!(profile.tags.required["Environment"].value, "ephemeral");
		assert_eq!(profile.tags.defaults["Department"], "engineering");
		assert!(profile.features.offhours_scaling);
		assert!(!profile.features.fips);
		assert!(profile.problems().is_empty());
	}

	#[test]
	fn test_directory_source_reads_toml_only() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("minimal.toml"), MINIMAL_TOML).unwrap();
		std::fs::write(dir.path().join("README.md"), "# not a profile").unwrap();

		let source = DirectorySource::new(dir.path());
		let profiles = source.load().unwrap();
		assert_eq!(profiles.len(), 1);
		assert_eq!(profiles[0].name, "aws-minimal-test");
	}

	#[test]
	fn test_directory_source_reports_parse_errors() {
		let dir = tempfile::tempdir().unwrap();
		std::fs::write(dir.path().join("broken.toml"), "name = ").unwrap();

		let err = DirectorySource::new(dir.path()).load().unwrap_err();
		match err {
			ProfileError::Parse { path, .. } => assert!(path.ends_with("broken.toml")),
			other => panic!("expected parse error, got {other:?}"),
		}
	}

	#[test]
	fn test_directory_source_missing_dir() {
		let err = DirectorySource::new("/nonexistent/cirrus/profiles")
			.load()
			.unwrap_err();
		assert!(matches!(err, ProfileError::Io { .. }));
	}

	#[test]
	fn test_static_source_replace() {
		let source = StaticSource::new(Vec::new());
		assert!(source.load().unwrap().is_empty());

		let profile: Profile = toml::from_str(MINIMAL_TOML).unwrap();
		source.replace(vec![profile]);
		assert_eq!(source.load().unwrap().len(), 1);
	}
}
