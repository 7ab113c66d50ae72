// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Duration;

const BASE_DELAY_SECS: i64 = 30;
const MAX_DELAY_SECS: i64 = 600;

/// Delay before retry number `attempt` (1-based): 30s, 60s, 120s, ... capped
/// at 10 minutes.
pub fn calculate_backoff_delay(attempt: u32) -> Duration {
	let exponent = attempt.saturating_sub(1).min(16);
	let secs = BASE_DELAY_SECS.saturating_mul(1i64 << exponent);
	Duration::seconds(secs.min(MAX_DELAY_SECS))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_backoff_doubles() {
		assert_eq!(calculate_backoff_delay(1), Duration::seconds(30));
		assert_eq!(calculate_backoff_delay(2), Duration::seconds(60));
		assert_eq!(calculate_backoff_delay(3), Duration::seconds(120));
		assert_eq!(calculate_backoff_delay(4), Duration::seconds(240));
		assert_eq!(calculate_backoff_delay(5), Duration::seconds(480));
	}

	#[test]
	fn test_backoff_is_capped() {
		assert_eq!(calculate_backoff_delay(6), Duration::seconds(600));
		assert_eq!(calculate_backoff_delay(40), Duration::seconds(600));
		assert_eq!(calculate_backoff_delay(u32::MAX), Duration::seconds(600));
	}

	#[test]
	fn test_attempt_zero_uses_base() {
		assert_eq!(calculate_backoff_delay(0), Duration::seconds(30));
	}
}
