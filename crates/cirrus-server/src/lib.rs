// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cirrus control plane daemon.
//!
//! Wires configuration, the profile registry, the SQLite store, the
//! provisioner, the worker and the janitor together for the
//! `cirrus-server` binary.

pub mod app;
pub mod error;
pub mod telemetry;

pub use app::{build_provisioner, outcome_json, App};
pub use error::{Result, ServerError};
pub use telemetry::init_tracing;
