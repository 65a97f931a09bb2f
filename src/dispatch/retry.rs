//! Bounded exponential backoff for transient failures.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Retry settings applied by [`HttpDispatcher`](crate::dispatch::HttpDispatcher).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Total attempts including the first one; `1` disables retries.
	pub max_attempts: u32,
	/// Delay before the first retry, in milliseconds.
	pub initial_backoff_ms: u64,
	/// Upper bound for any single delay, in milliseconds.
	pub max_backoff_ms: u64,
	/// Randomizes each delay within its upper half.
	pub jitter: bool,
}
impl RetryPolicy {
	/// Policy performing a single attempt.
	pub fn none() -> Self {
		Self { max_attempts: 1, ..Self::default() }
	}

	/// Policy with deterministic delays of `backoff_ms`, handy for tests.
	pub fn fixed(max_attempts: u32, backoff_ms: u64) -> Self {
		Self {
			max_attempts,
			initial_backoff_ms: backoff_ms,
			max_backoff_ms: backoff_ms,
			jitter: false,
		}
	}

	/// Attempts allowed, never below one.
	pub fn attempts(&self) -> u32 {
		self.max_attempts.max(1)
	}

	/// Delay before retrying after the `attempt`-th failure (1-based).
	///
	/// A server-provided `hint` raises the delay but never beyond `max_backoff_ms`.
	pub fn delay_for(&self, attempt: u32, hint: Option<Duration>) -> Duration {
		let exponent = attempt.saturating_sub(1).min(16);
		let base = self.initial_backoff_ms.saturating_mul(1 << exponent).min(self.max_backoff_ms);
		let mut delay_ms = if self.jitter && base > 1 {
			let floor = base / 2;

			rand::rng().random_range(floor..=base)
		} else {
			base
		};

		if let Some(hint_ms) = hint.and_then(|hint| u64::try_from(hint.whole_milliseconds()).ok()) {
			delay_ms = delay_ms.max(hint_ms.min(self.max_backoff_ms));
		}

		Duration::milliseconds(i64::try_from(delay_ms).unwrap_or(i64::MAX))
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { max_attempts: 3, initial_backoff_ms: 250, max_backoff_ms: 5_000, jitter: true }
	}
}
