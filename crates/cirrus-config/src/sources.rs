// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, a TOML file and environment
//! variables.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::CirrusConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, IntakeConfigLayer, JanitorConfigLayer, LoggingConfigLayer,
	ProfilesConfigLayer, ProvisionerConfigLayer, WorkerConfigLayer,
};

/// Default location of the config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/cirrus/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<CirrusConfigLayer, ConfigError>;
}

/// Built-in defaults. Every field is left unset so `finalize` fills it.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<CirrusConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(CirrusConfigLayer::default())
	}
}

/// TOML file source. A missing file is skipped.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<CirrusConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(CirrusConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: CirrusConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `CIRRUS_<SECTION>_<FIELD>`, e.g. `CIRRUS_WORKER_CONCURRENCY`.
pub struct EnvSource {
	vars: HashMap<String, String>,
}

impl EnvSource {
	/// Snapshot of the process environment.
	pub fn new() -> Self {
		Self::from_vars(std::env::vars())
	}

	pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
		Self {
			vars: vars
				.into_iter()
				.filter(|(key, _)| key.starts_with("CIRRUS_"))
				.collect(),
		}
	}

	fn var(&self, name: &str) -> Option<String> {
		self.vars.get(name).filter(|v| !v.is_empty()).cloned()
	}

	fn bool(&self, name: &str) -> Option<bool> {
		self
			.var(name)
			.map(|v| v.eq_ignore_ascii_case("true") || v == "1")
	}

	fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError>
	where
		T::Err: std::fmt::Display,
	{
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|e| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("'{v}': {e}"),
			}),
			None => Ok(None),
		}
	}
}

impl Default for EnvSource {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<CirrusConfigLayer, ConfigError> {
		debug!(count = self.vars.len(), "loading environment variables");
		Ok(CirrusConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: self.var("CIRRUS_DATABASE_URL"),
			}),
			profiles: Some(ProfilesConfigLayer {
				dir: self.var("CIRRUS_PROFILES_DIR").map(PathBuf::from),
			}),
			worker: Some(WorkerConfigLayer {
				id: self.var("CIRRUS_WORKER_ID"),
				concurrency: self.parse("CIRRUS_WORKER_CONCURRENCY")?,
				poll_interval_secs: self.parse("CIRRUS_WORKER_POLL_INTERVAL_SECS")?,
				lease_duration_secs: self.parse("CIRRUS_WORKER_LEASE_DURATION_SECS")?,
				max_attempts: self.parse("CIRRUS_WORKER_MAX_ATTEMPTS")?,
				drain_timeout_secs: self.parse("CIRRUS_WORKER_DRAIN_TIMEOUT_SECS")?,
			}),
			janitor: Some(JanitorConfigLayer {
				enabled: self.bool("CIRRUS_JANITOR_ENABLED"),
				check_interval_secs: self.parse("CIRRUS_JANITOR_CHECK_INTERVAL_SECS")?,
				stuck_job_threshold_secs: self.parse("CIRRUS_JANITOR_STUCK_JOB_THRESHOLD_SECS")?,
			}),
			intake: Some(IntakeConfigLayer {
				idempotency_ttl_secs: self.parse("CIRRUS_INTAKE_IDEMPOTENCY_TTL_SECS")?,
			}),
			provisioner: Some(ProvisionerConfigLayer {
				mode: self.parse("CIRRUS_PROVISIONER_MODE")?,
				command: self.var("CIRRUS_PROVISIONER_COMMAND").map(PathBuf::from),
				timeout_secs: self.parse("CIRRUS_PROVISIONER_TIMEOUT_SECS")?,
			}),
			logging: Some(LoggingConfigLayer {
				level: self.var("CIRRUS_LOGGING_LEVEL"),
				format: self.parse("CIRRUS_LOGGING_FORMAT")?,
			}),
		})
	}
}
