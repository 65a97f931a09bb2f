//! Thread-safe in-memory [`ResponseCache`] with lazy eviction.

// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, CacheKey, ResponseCache, StoreOutcome},
	clock::{self, Clock},
};

/// In-process response cache that serves entries until their `Expires` instant.
///
/// Expired entries are not removed on lookup; the next store for the same key overwrites
/// them, and [`ExpirationCache::purge_expired`] reclaims the rest on demand.
#[derive(Clone)]
pub struct ExpirationCache {
	entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
	clock: Arc<dyn Clock>,
}
impl ExpirationCache {
	/// Creates an empty cache driven by the system clock.
	pub fn new() -> Self {
		Self::with_clock(clock::system())
	}

	/// Creates an empty cache driven by `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { entries: Default::default(), clock }
	}

	/// Drops the entry for `key`, returning it.
	pub fn invalidate(&self, key: &CacheKey) -> Option<CacheEntry> {
		self.entries.write().remove(key)
	}

	/// Removes every entry that can no longer be served; returns how many were dropped.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, entry| entry.is_fresh_at(now));

		before - entries.len()
	}

	/// Removes every entry.
	pub fn clear(&self) {
		self.entries.write().clear();
	}

	/// Number of stored entries, including expired ones not yet evicted.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}
}
impl Default for ExpirationCache {
	fn default() -> Self {
		Self::new()
	}
}
impl ResponseCache for ExpirationCache {
	fn lookup(&self, key: &CacheKey) -> Option<CacheEntry> {
		let now = self.clock.now();

		self.entries.read().get(key).filter(|entry| entry.is_fresh_at(now)).cloned()
	}

	fn store(&self, key: CacheKey, entry: CacheEntry) -> StoreOutcome {
		if entry.expires_at.is_none() {
			return StoreOutcome::NotCacheable;
		}

		self.entries.write().insert(key, entry);

		StoreOutcome::Stored
	}
}
impl Debug for ExpirationCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ExpirationCache").field("entries", &self.len()).finish()
	}
}
