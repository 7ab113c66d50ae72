// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy engine for cluster requests.
//!
//! Every mutating request passes through [`PolicyEngine::validate_create_request`],
//! which checks the request against the profile it names, merges tags by
//! fixed priority and computes when the cluster expires.
//!
//! Bad user input never produces an `Err`: it comes back as a
//! [`ValidationResult`] with `valid == false` and one [`ValidationError`]
//! per problem. `Err` is reserved for faults inside the engine itself.

pub mod engine;
pub mod error;
pub mod tags;
pub mod types;

pub use engine::{is_valid_cluster_name, PolicyEngine};
pub use error::{PolicyError, Result};
pub use tags::{
	is_reserved_tag, merge_tags, SystemTagInputs, MANAGED_BY, RESERVED_TAG_KEYS, SYSTEM_TAG_KEYS,
};
pub use types::{CreateClusterRequest, ResolvedRequest, ValidationError, ValidationResult};
