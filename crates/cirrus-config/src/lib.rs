// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for the Cirrus control plane.
//!
//! Built-in defaults, an optional TOML file and `CIRRUS_*` environment
//! variables are layered in that order; later sources override earlier
//! ones field by field. The merged layer is then resolved and checked for
//! cross-field consistency.
//!
//! ```ignore
//! let config = cirrus_config::load_config_with_file("/etc/cirrus/server.toml")?;
//! println!("{} workers", config.worker.concurrency);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::CirrusConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct CirrusConfig {
	pub database: DatabaseConfig,
	pub profiles: ProfilesConfig,
	pub worker: WorkerConfig,
	pub janitor: JanitorConfig,
	pub intake: IntakeConfig,
	pub provisioner: ProvisionerConfig,
	pub logging: LoggingConfig,
}

/// Loads defaults, `/etc/cirrus/server.toml` and the environment.
pub fn load_config() -> Result<CirrusConfig, ConfigError> {
	load_config_with_file(SYSTEM_CONFIG_PATH)
}

/// Loads defaults, the given TOML file and the environment.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<CirrusConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource::new()),
	])
}

/// Merges `sources` in precedence order, then resolves and validates.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<CirrusConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = CirrusConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	finalize(merged)
}

fn finalize(layer: CirrusConfigLayer) -> Result<CirrusConfig, ConfigError> {
	let config = CirrusConfig {
		database: layer.database.unwrap_or_default().finalize(),
		profiles: layer.profiles.unwrap_or_default().finalize(),
		worker: layer.worker.unwrap_or_default().finalize(),
		janitor: layer.janitor.unwrap_or_default().finalize(),
		intake: layer.intake.unwrap_or_default().finalize(),
		provisioner: layer.provisioner.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		database = %config.database.url,
		profiles_dir = %config.profiles.dir.display(),
		worker_id = %config.worker.id,
		concurrency = config.worker.concurrency,
		janitor_enabled = config.janitor.enabled,
		provisioner = %config.provisioner.mode,
		"configuration loaded"
	);

	Ok(config)
}

/// Cross-field rules.
pub fn validate_config(config: &CirrusConfig) -> Result<(), ConfigError> {
	let worker = &config.worker;

	if worker.concurrency == 0 {
		return Err(ConfigError::Validation(
			"worker.concurrency must be greater than 0".to_string(),
		));
	}
	if worker.max_attempts == 0 {
		return Err(ConfigError::Validation(
			"worker.max_attempts must be greater than 0".to_string(),
		));
	}
	if worker.poll_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"worker.poll_interval_secs must be greater than 0".to_string(),
		));
	}
	if worker.lease_duration_secs <= worker.poll_interval_secs {
		return Err(ConfigError::Validation(format!(
			"worker.lease_duration_secs ({}) must exceed worker.poll_interval_secs ({})",
			worker.lease_duration_secs, worker.poll_interval_secs
		)));
	}
	if config.janitor.check_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"janitor.check_interval_secs must be greater than 0".to_string(),
		));
	}
	if config.janitor.stuck_job_threshold_secs <= worker.lease_duration_secs {
		return Err(ConfigError::Validation(format!(
			"janitor.stuck_job_threshold_secs ({}) must exceed worker.lease_duration_secs ({})",
			config.janitor.stuck_job_threshold_secs, worker.lease_duration_secs
		)));
	}
	if config.provisioner.mode == ProvisionerMode::Command && config.provisioner.command.is_none() {
		return Err(ConfigError::Validation(
			"provisioner.mode = \"command\" requires provisioner.command".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	fn env(pairs: &[(&str, &str)]) -> Box<dyn ConfigSource> {
		Box::new(EnvSource::from_vars(
			pairs
				.iter()
				.map(|(k, v)| (k.to_string(), v.to_string())),
		))
	}

	#[test]
	fn test_defaults_are_valid() {
		let config = load_from_sources(vec![Box::new(DefaultsSource)]).unwrap();
		assert_eq!(config.database.url, "sqlite:./cirrus.db");
		assert_eq!(config.worker.concurrency, 4);
		assert_eq!(config.janitor.stuck_job_threshold_secs, 7200);
		assert_eq!(config.intake.idempotency_ttl_secs, 86400);
		assert_eq!(config.provisioner.mode, ProvisionerMode::DryRun);
		assert_eq!(config.logging.format, LogFormat::Pretty);
	}

	#[test]
	fn test_env_overrides_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(
			&path,
			r#"
[worker]
concurrency = 8
poll_interval_secs = 10

[logging]
level = "debug"
"#,
		)
		.unwrap();

		// Sources are sorted, so the order given here does not matter.
		let config = load_from_sources(vec![
			env(&[("CIRRUS_WORKER_CONCURRENCY", "2")]),
			Box::new(TomlSource::new(&path)),
			Box::new(DefaultsSource),
		])
		.unwrap();

		assert_eq!(config.worker.concurrency, 2);
		assert_eq!(config.worker.poll_interval_secs, 10);
		assert_eq!(config.logging.level, "debug");
	}

	#[test]
	fn test_command_mode_requires_command() {
		let err = load_from_sources(vec![env(&[("CIRRUS_PROVISIONER_MODE", "command")])])
			.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("provisioner.command")));

		let config = load_from_sources(vec![env(&[
			("CIRRUS_PROVISIONER_MODE", "command"),
			("CIRRUS_PROVISIONER_COMMAND", "/bin/true"),
		])])
		.unwrap();
		assert_eq!(config.provisioner.mode, ProvisionerMode::Command);
	}

	#[test]
	fn test_zero_concurrency_rejected() {
		let err = load_from_sources(vec![env(&[("CIRRUS_WORKER_CONCURRENCY", "0")])]).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_stuck_threshold_must_exceed_lease() {
		let err = load_from_sources(vec![env(&[
			("CIRRUS_WORKER_LEASE_DURATION_SECS", "7200"),
			("CIRRUS_JANITOR_STUCK_JOB_THRESHOLD_SECS", "3600"),
		])])
		.unwrap_err();
		assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("stuck_job_threshold_secs")));
	}

	proptest! {
		#[test]
		fn lease_must_exceed_poll_interval(poll in 1u64..10_000, lease in 1u64..10_000) {
			let mut config = CirrusConfig::default();
			config.worker.poll_interval_secs = poll;
			config.worker.lease_duration_secs = lease;
			config.janitor.stuck_job_threshold_secs = 20_000;
			prop_assert_eq!(validate_config(&config).is_ok(), lease > poll);
		}
	}
}
