// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Cluster profiles for Cirrus.
//!
//! A profile is a named, immutable template constraining what a cluster
//! request may ask for: allowed versions, regions and base domains, compute
//! shape, TTL limits and tag policy.
//!
//! Profiles are read from a [`ProfileSource`] and served by a
//! [`ProfileRegistry`], which publishes them as an immutable [`ProfileSet`]
//! snapshot and swaps the whole snapshot atomically on reload.

pub mod error;
pub mod loader;
pub mod registry;
pub mod testing;
pub mod types;

pub use error::{ProfileError, Result};
pub use loader::{DirectorySource, ProfileSource, StaticSource};
pub use registry::{ProfileRegistry, ProfileSet};
pub use types::{
	AllowList, ComputeShape, ControlPlaneShape, Features, Lifecycle, Platform, Profile, RequiredTag,
	TagPolicy, WorkerShape,
};
