// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cirrus control plane binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cirrus_clusters::CreateOutcome;
use cirrus_config::SYSTEM_CONFIG_PATH;
use cirrus_policy::CreateClusterRequest;
use cirrus_profiles::{DirectorySource, ProfileRegistry};
use cirrus_server::{init_tracing, outcome_json, App};
use tokio_util::sync::CancellationToken;

mod version;

/// Cirrus - ephemeral cluster lifecycle control plane.
#[derive(Parser, Debug)]
#[command(
	name = "cirrus-server",
	about = "Ephemeral cluster lifecycle control plane",
	version
)]
struct Args {
	/// Path to the TOML configuration file
	#[arg(long, short, env = "CIRRUS_CONFIG", default_value = SYSTEM_CONFIG_PATH)]
	config: PathBuf,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the worker and janitor until interrupted (default)
	Run,
	/// Load every profile from the profiles directory and report problems
	ValidateProfiles,
	/// Run a single janitor pass and print what it did
	JanitorOnce,
	/// Submit a cluster create request read from a JSON file
	Submit {
		/// Request body, camelCase JSON
		#[arg(long)]
		file: PathBuf,
		/// Replays the cached answer when the same key is submitted again
		#[arg(long)]
		idempotency_key: Option<String>,
	},
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();
	let command = args.command.unwrap_or(Command::Run);

	if let Command::Version = command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = cirrus_config::load_config_with_file(&args.config)?;
	init_tracing(&config.logging);

	match command {
		// Printed before configuration is loaded.
		Command::Version => {}
		Command::ValidateProfiles => {
			let registry = ProfileRegistry::load(DirectorySource::new(config.profiles.dir.clone()))?;
			for profile in registry.list(false) {
				println!(
					"{}\t{}\t{}",
					profile.name,
					profile.platform,
					if profile.enabled { "enabled" } else { "disabled" }
				);
			}
			println!("{} profile(s) valid", registry.list(false).len());
		}
		Command::JanitorOnce => {
			let app = App::build(config).await?;
			let report = app.janitor().run_once().await;
			println!("{}", serde_json::to_string_pretty(&report)?);
		}
		Command::Submit {
			file,
			idempotency_key,
		} => {
			let body = std::fs::read_to_string(&file)?;
			let request: CreateClusterRequest = serde_json::from_str(&body)?;

			let app = App::build(config).await?;
			let outcome = app
				.intake
				.request_create(&request, idempotency_key.as_deref())
				.await?;
			println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);

			if let CreateOutcome::Rejected(_) = outcome {
				std::process::exit(2);
			}
		}
		Command::Run => {
			tracing::info!(
				config = %args.config.display(),
				database = %config.database.url,
				"starting cirrus-server"
			);

			let app = App::build(config).await?;
			let cancel = CancellationToken::new();

			let shutdown = cancel.clone();
			tokio::spawn(async move {
				match tokio::signal::ctrl_c().await {
					Ok(()) => tracing::info!("Received shutdown signal"),
					Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C"),
				}
				shutdown.cancel();
			});

			app.run(cancel).await?;
			tracing::info!("cirrus-server shutdown complete");
		}
	}

	Ok(())
}
