// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The worker's contract with whatever actually builds and tears down
//! clusters: given a job, produce success plus artifacts, or a failure that
//! says whether retrying could help.

pub mod command;
pub mod dry_run;
pub mod error;
pub mod testing;
pub mod types;

pub use command::CommandProvisioner;
pub use dry_run::DryRunProvisioner;
pub use error::{ProvisionError, Result};
pub use types::{ProvisionOutcome, ProvisionRequest, Provisioner};
