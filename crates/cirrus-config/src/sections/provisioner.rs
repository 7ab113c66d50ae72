// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioner selection.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionerMode {
	/// Log each job and report success.
	#[default]
	DryRun,
	/// Run an external executable per job.
	Command,
}

impl ProvisionerMode {
	pub fn as_str(&self) -> &'static str {
		match self {
			ProvisionerMode::DryRun => "dry-run",
			ProvisionerMode::Command => "command",
		}
	}
}

impl fmt::Display for ProvisionerMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ProvisionerMode {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().as_str() {
			"dry-run" | "dryrun" | "dry_run" => Ok(ProvisionerMode::DryRun),
			"command" => Ok(ProvisionerMode::Command),
			other => Err(format!("unknown provisioner mode '{other}'")),
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvisionerConfigLayer {
	#[serde(default)]
	pub mode: Option<ProvisionerMode>,
	#[serde(default)]
	pub command: Option<PathBuf>,
	#[serde(default)]
	pub timeout_secs: Option<u64>,
}

impl ProvisionerConfigLayer {
	pub fn merge(&mut self, other: ProvisionerConfigLayer) {
		if other.mode.is_some() {
			self.mode = other.mode;
		}
		if other.command.is_some() {
			self.command = other.command;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
	}

	pub fn finalize(self) -> ProvisionerConfig {
		ProvisionerConfig {
			mode: self.mode.unwrap_or_default(),
			command: self.command,
			timeout_secs: self.timeout_secs.unwrap_or(5400), // 90 minutes
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionerConfig {
	pub mode: ProvisionerMode,
	pub command: Option<PathBuf>,
	pub timeout_secs: u64,
}

impl ProvisionerConfig {
	pub fn timeout(&self) -> Duration {
		Duration::from_secs(self.timeout_secs)
	}
}

impl Default for ProvisionerConfig {
	fn default() -> Self {
		ProvisionerConfigLayer::default().finalize()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_mode_parsing() {
		assert_eq!("dry-run".parse::<ProvisionerMode>(), Ok(ProvisionerMode::DryRun));
		assert_eq!("Command".parse::<ProvisionerMode>(), Ok(ProvisionerMode::Command));
		assert!("terraform".parse::<ProvisionerMode>().is_err());
	}

	#[test]
	fn test_deserialize_command_mode() {
		let layer: ProvisionerConfigLayer = toml::from_str(
			r#"
mode = "command"
command = "/usr/local/bin/cirrus-provision"
"#,
		)
		.unwrap();
		let config = layer.finalize();
		assert_eq!(config.mode, ProvisionerMode::Command);
		assert_eq!(
			config.command.as_deref(),
			Some(std::path::Path::new("/usr/local/bin/cirrus-provision"))
		);
		assert_eq!(config.timeout(), Duration::from_secs(5400));
	}
}
