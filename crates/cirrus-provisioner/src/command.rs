// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Runs an external executable for each job.
//!
//! The executable is invoked as `<program> <JOB_TYPE> <cluster-id>` with the
//! [`ProvisionRequest`] as JSON on stdin. Exit status 0 means success and
//! stdout, if not empty, must be a JSON value that becomes the artifacts.
//! Any other exit status is a retryable `EXIT_<n>` failure.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{ProvisionError, Result};
use crate::types::{ProvisionOutcome, ProvisionRequest, Provisioner};

const MAX_ERROR_BYTES: usize = 4 * 1024;

pub struct CommandProvisioner {
	program: PathBuf,
	timeout: Duration,
}

impl CommandProvisioner {
	pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
		Self {
			program: program.into(),
			timeout,
		}
	}

	fn truncate(output: &[u8]) -> String {
		let end = output.len().min(MAX_ERROR_BYTES);
		String::from_utf8_lossy(&output[..end]).trim().to_string()
	}

	async fn run(&self, req: &ProvisionRequest, input: Vec<u8>) -> Result<std::process::Output> {
		let mut child = Command::new(&self.program)
			.arg(req.job_type.as_str())
			.arg(req.cluster.id.to_string())
			.stdin(Stdio::piped())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped())
			.kill_on_drop(true)
			.spawn()
			.map_err(|e| {
				ProvisionError::fatal(
					"SPAWN_FAILED",
					format!("failed to start {}: {e}", self.program.display()),
				)
			})?;

		if let Some(mut stdin) = child.stdin.take() {
			// The program may exit without reading its input.
			if let Err(e) = stdin.write_all(&input).await {
				tracing::debug!(error = %e, "provisioner closed stdin early");
			}
		}

		child
			.wait_with_output()
			.await
			.map_err(|e| ProvisionError::retryable("IO_ERROR", e.to_string()))
	}
}

#[async_trait]
impl Provisioner for CommandProvisioner {
	fn name(&self) -> &str {
		"command"
	}

	#[tracing::instrument(skip(self, req), fields(job_id = %req.job_id, cluster_id = %req.cluster.id, job_type = %req.job_type))]
	async fn execute(&self, req: &ProvisionRequest) -> Result<ProvisionOutcome> {
		let input = serde_json::to_vec(req)
			.map_err(|e| ProvisionError::fatal("INVALID_REQUEST", e.to_string()))?;

		let output = match timeout(self.timeout, self.run(req, input)).await {
			Ok(result) => result?,
			Err(_) => {
				tracing::warn!(timeout = ?self.timeout, "provisioner timed out");
				return Err(ProvisionError::timeout(self.timeout));
			}
		};

		match output.status.code() {
			Some(0) => {
				let stdout = String::from_utf8_lossy(&output.stdout);
				let artifacts = if stdout.trim().is_empty() {
					serde_json::json!({})
				} else {
					serde_json::from_str(stdout.trim()).map_err(|e| {
						ProvisionError::fatal("INVALID_OUTPUT", format!("stdout is not JSON: {e}"))
					})?
				};
				tracing::debug!(stdout_len = output.stdout.len(), "provisioner succeeded");
				Ok(ProvisionOutcome { artifacts })
			}
			Some(code) => {
				let stderr = Self::truncate(&output.stderr);
				tracing::debug!(exit_code = code, "provisioner failed");
				Err(ProvisionError::retryable(
					format!("EXIT_{code}"),
					if stderr.is_empty() {
						format!("provisioner exited with status {code}")
					} else {
						stderr
					},
				))
			}
			None => Err(ProvisionError::retryable(
				"KILLED",
				"provisioner terminated by signal",
			)),
		}
	}
}

#[cfg(all(test, unix))]
mod tests {
	use super::*;
	use crate::testing::sample_request;
	use cirrus_db::JobType;
	use std::os::unix::fs::PermissionsExt;
	use std::path::Path;

	fn script(dir: &Path, body: &str) -> PathBuf {
		let path = dir.join("provision.sh");
		std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
		std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
		path
	}

	#[tokio::test]
	async fn test_success_parses_stdout() {
		let dir = tempfile::tempdir().unwrap();
		let program = script(
			dir.path(),
			r#"cat > /dev/null
echo '{"api_url": "https://api.test:6443"}'"#,
		);
		let provisioner = CommandProvisioner::new(program, Duration::from_secs(10));

		let outcome = provisioner
			.execute(&sample_request(JobType::Create))
			.await
			.unwrap();
		assert_eq!(outcome.artifacts["api_url"], "https://api.test:6443");
	}

	#[tokio::test]
	async fn test_receives_arguments_and_stdin() {
		let dir = tempfile::tempdir().unwrap();
		let program = script(
			dir.path(),
			r#"body=$(cat)
printf '{"type": "%s", "cluster": "%s", "request": %s}' "$1" "$2" "$body""#,
		);
		let provisioner = CommandProvisioner::new(program, Duration::from_secs(10));
		let req = sample_request(JobType::ScaleWorkers);

		let outcome = provisioner.execute(&req).await.unwrap();
		assert_eq!(outcome.artifacts["type"], "SCALE_WORKERS");
		assert_eq!(outcome.artifacts["cluster"], req.cluster.id.to_string());
		assert_eq!(outcome.artifacts["request"]["job_type"], "SCALE_WORKERS");
		assert_eq!(outcome.artifacts["request"]["cluster"]["name"], "test-cluster-01");
	}

	#[tokio::test]
	async fn test_empty_stdout_is_empty_artifacts() {
		let dir = tempfile::tempdir().unwrap();
		let program = script(dir.path(), "exit 0");
		let provisioner = CommandProvisioner::new(program, Duration::from_secs(10));

		let outcome = provisioner
			.execute(&sample_request(JobType::Destroy))
			.await
			.unwrap();
		assert_eq!(outcome.artifacts, serde_json::json!({}));
	}

	#[tokio::test]
	async fn test_nonzero_exit_is_retryable() {
		let dir = tempfile::tempdir().unwrap();
		let program = script(dir.path(), "echo 'quota exceeded' >&2\nexit 3");
		let provisioner = CommandProvisioner::new(program, Duration::from_secs(10));

		let err = provisioner
			.execute(&sample_request(JobType::Create))
			.await
			.unwrap_err();
		assert_eq!(err.code, "EXIT_3");
		assert_eq!(err.message, "quota exceeded");
		assert!(err.retryable);
	}

	#[tokio::test]
	async fn test_timeout() {
		let dir = tempfile::tempdir().unwrap();
		let program = script(dir.path(), "sleep 5");
		let provisioner = CommandProvisioner::new(program, Duration::from_millis(200));

		let err = provisioner
			.execute(&sample_request(JobType::Create))
			.await
			.unwrap_err();
		assert_eq!(err.code, "TIMEOUT");
		assert!(err.retryable);
	}

	#[tokio::test]
	async fn test_invalid_stdout_is_fatal() {
		let dir = tempfile::tempdir().unwrap();
		let program = script(dir.path(), "echo not-json");
		let provisioner = CommandProvisioner::new(program, Duration::from_secs(10));

		let err = provisioner
			.execute(&sample_request(JobType::Create))
			.await
			.unwrap_err();
		assert_eq!(err.code, "INVALID_OUTPUT");
		assert!(!err.retryable);
	}

	#[tokio::test]
	async fn test_missing_program() {
		let provisioner =
			CommandProvisioner::new("/nonexistent/cirrus-provision", Duration::from_secs(1));
		let err = provisioner
			.execute(&sample_request(JobType::Create))
			.await
			.unwrap_err();
		assert_eq!(err.code, "SPAWN_FAILED");
		assert!(!err.retryable);
	}
}
