//! Process-lifetime holder for the current bearer token.
//!
//! [`TokenStore`] is a cheap, cloneable handle: every clone observes the same slot. Reads
//! never block each other, replacements are atomic, and refreshes commit through
//! [`TokenStore::compare_and_swap`] so a stale refresh can never overwrite a newer token.
//! Persistence across restarts is left to callers through [`TokenStore::snapshot`],
//! [`TokenStore::restore`], and [`TokenStore::on_replace`].

// self
use crate::{_prelude::*, auth::Token};

/// Callback invoked after a token replaces the stored one.
pub type TokenListener = Arc<dyn Fn(&Token) + Send + Sync>;

/// Result of a compare-and-swap attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareAndSwapOutcome {
	/// The stored access token matched the expected value and the record was replaced.
	Updated,
	/// A token is stored but it is not the expected one.
	Mismatch,
	/// No token is stored.
	Missing,
}

/// Thread-safe slot holding the current [`Token`].
#[derive(Clone, Default)]
pub struct TokenStore {
	slot: Arc<RwLock<Option<Token>>>,
	listeners: Arc<RwLock<Vec<TokenListener>>>,
}
impl TokenStore {
	/// Creates a store pre-populated with `token`.
	pub fn with_token(token: Token) -> Self {
		let store = Self::default();

		store.restore(token);

		store
	}

	/// Returns a copy of the current token.
	pub fn current(&self) -> Option<Token> {
		self.slot.read().clone()
	}

	/// Returns `true` when a token is stored.
	pub fn is_authenticated(&self) -> bool {
		self.slot.read().is_some()
	}

	/// Replaces the stored token unconditionally and notifies listeners.
	pub fn replace(&self, token: Token) {
		*self.slot.write() = Some(token.clone());

		self.notify(&token);
	}

	/// Replaces the stored token only if its access token still equals `expected_access`.
	pub fn compare_and_swap(
		&self,
		expected_access: &str,
		replacement: Token,
	) -> CompareAndSwapOutcome {
		let outcome = {
			let mut guard = self.slot.write();
			let outcome = match guard.as_ref() {
				Some(existing) if existing.access_token.expose() == expected_access =>
					CompareAndSwapOutcome::Updated,
				Some(_) => CompareAndSwapOutcome::Mismatch,
				None => CompareAndSwapOutcome::Missing,
			};

			if matches!(outcome, CompareAndSwapOutcome::Updated) {
				*guard = Some(replacement.clone());
			}

			outcome
		};

		if matches!(outcome, CompareAndSwapOutcome::Updated) {
			self.notify(&replacement);
		}

		outcome
	}

	/// Removes the stored token, returning it.
	pub fn clear(&self) -> Option<Token> {
		self.slot.write().take()
	}

	/// Serializable copy of the current token for persistence.
	pub fn snapshot(&self) -> Option<Token> {
		self.current()
	}

	/// Restores a previously persisted token without notifying listeners.
	pub fn restore(&self, token: Token) {
		*self.slot.write() = Some(token);
	}

	/// Registers a listener invoked after every replacement (including refreshes).
	pub fn on_replace(&self, listener: TokenListener) {
		self.listeners.write().push(listener);
	}

	fn notify(&self, token: &Token) {
		let listeners = self.listeners.read().clone();

		for listener in listeners {
			listener(token);
		}
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("token", &*self.slot.read())
			.field("listeners", &self.listeners.read().len())
			.finish()
	}
}
