// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Wall-clock abstraction.
//!
//! Every component that compares against "now" (TTL expiry, lock leases,
//! stuck-job detection) reads time through a [`Clock`] so tests can move
//! time forward without sleeping.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

/// Reads the host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
	pub fn shared() -> SharedClock {
		Arc::new(SystemClock)
	}
}

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
	now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: Mutex::new(start),
		}
	}

	pub fn starting_now() -> Self {
		Self::new(Utc::now())
	}

	pub fn advance(&self, by: Duration) {
		let mut now = self.now.lock();
		*now += by;
	}

	pub fn set(&self, to: DateTime<Utc>) {
		*self.now.lock() = to;
	}
}

impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_manual_clock_advances() {
		let start = Utc::now();
		let clock = ManualClock::new(start);
		assert_eq!(clock.now(), start);

		clock.advance(Duration::hours(3));
		assert_eq!(clock.now(), start + Duration::hours(3));
	}

	#[test]
	fn test_manual_clock_set() {
		let clock = ManualClock::starting_now();
		let target = Utc::now() - Duration::days(1);
		clock.set(target);
		assert_eq!(clock.now(), target);
	}

	#[test]
	fn test_system_clock_is_monotonic_enough() {
		let clock = SystemClock;
		let a = clock.now();
		let b = clock.now();
		assert!(b >= a);
	}
}
