// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::_prelude::*;

/// Counters for token-endpoint refresh calls, shared by every clone of a manager.
///
/// Tokens reused by [`OAuthManager::ensure_valid`](crate::flows::OAuthManager::ensure_valid)
/// and refreshes rejected locally for lack of a refresh token are not counted.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	calls: AtomicU64,
	committed: AtomicU64,
	rejected: AtomicU64,
	transient: AtomicU64,
}
impl RefreshMetrics {
	/// Refresh calls sent to the token endpoint.
	pub fn attempts(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}

	/// Refresh calls that produced a committed token.
	pub fn successes(&self) -> u64 {
		self.committed.load(Ordering::Relaxed)
	}

	/// Refresh calls that failed, whatever the cause.
	pub fn failures(&self) -> u64 {
		self.rejected.load(Ordering::Relaxed) + self.transient.load(Ordering::Relaxed)
	}

	/// Failed refresh calls that may succeed when retried later.
	pub fn transient_failures(&self) -> u64 {
		self.transient.load(Ordering::Relaxed)
	}

	/// Point-in-time copy of every counter.
	pub fn snapshot(&self) -> RefreshSnapshot {
		RefreshSnapshot {
			attempts: self.attempts(),
			successes: self.successes(),
			rejected: self.rejected.load(Ordering::Relaxed),
			transient: self.transient_failures(),
		}
	}

	pub(crate) fn record_call(&self) {
		self.calls.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome<T>(&self, outcome: &Result<T>) {
		let counter = match outcome {
			Ok(_) => &self.committed,
			Err(err) if err.is_transient() => &self.transient,
			Err(_) => &self.rejected,
		};

		counter.fetch_add(1, Ordering::Relaxed);
	}
}

/// Serializable view of [`RefreshMetrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefreshSnapshot {
	/// Refresh calls sent.
	pub attempts: u64,
	/// Calls that committed a token.
	pub successes: u64,
	/// Calls the provider refused.
	pub rejected: u64,
	/// Calls that hit a 5xx or a transport failure.
	pub transient: u64,
}
