// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections. Each has a partial `*Layer` for merging and a
//! resolved config produced by `finalize`.

mod database;
mod intake;
mod janitor;
mod logging;
mod profiles;
mod provisioner;
mod worker;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use intake::{IntakeConfig, IntakeConfigLayer};
pub use janitor::{JanitorConfig, JanitorConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use profiles::{ProfilesConfig, ProfilesConfigLayer};
pub use provisioner::{ProvisionerConfig, ProvisionerConfigLayer, ProvisionerMode};
pub use worker::{WorkerConfig, WorkerConfigLayer};
