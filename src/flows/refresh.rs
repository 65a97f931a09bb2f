//! Refresh token orchestration with a single-flight guard and compare-and-swap commits.
//!
//! [`OAuthManager::ensure_valid`] is the path every authenticated request takes. It returns
//! the stored token while it is fresh and otherwise enters the manager-wide [`RefreshFlight`],
//! re-reads the store, and only then performs a `grant_type=refresh_token` call. Callers that
//! queued behind that call reuse its outcome, success or failure, so any number of concurrent
//! callers produce one token-endpoint request. Refreshed tokens are committed with
//! [`TokenStore::compare_and_swap`](crate::store::TokenStore::compare_and_swap) against the
//! access token they replace.

mod metrics;

pub use metrics::{RefreshMetrics, RefreshSnapshot};

// std
use std::sync::atomic::{AtomicU64, Ordering};
// crates.io
use async_lock::MutexGuard as AsyncMutexGuard;
// self
use crate::{
	_prelude::*,
	auth::{Token, TokenSecret},
	error::{AuthError, ConfigError},
	flows::OAuthManager,
	http::ApiHttpClient,
	oauth::{OAuth2Facade, TransportErrorMapper},
	obs::{self, FlowKind},
	store::CompareAndSwapOutcome,
};

/// Serializes refresh and revocation calls of one manager and its clones.
///
/// Every settled refresh bumps a generation counter. A failed refresh is kept together with
/// the access token it tried to replace; callers that were already waiting when it settled
/// receive the same failure instead of repeating the call.
#[derive(Debug, Default)]
pub(crate) struct RefreshFlight {
	generation: AtomicU64,
	last_failure: AsyncMutex<Option<FailedRefresh>>,
}
impl RefreshFlight {
	pub(crate) async fn enter(&self) -> FlightTicket<'_> {
		let observed = self.generation.load(Ordering::Acquire);
		let last_failure = self.last_failure.lock().await;

		FlightTicket { flight: self, observed, last_failure }
	}
}

#[derive(Debug)]
struct FailedRefresh {
	generation: u64,
	stale_access: TokenSecret,
	error: Error,
}

/// Exclusive access to a [`RefreshFlight`], remembering the generation seen before waiting.
pub(crate) struct FlightTicket<'a> {
	flight: &'a RefreshFlight,
	observed: u64,
	last_failure: AsyncMutexGuard<'a, Option<FailedRefresh>>,
}
impl FlightTicket<'_> {
	fn shared_failure(&self, current: &Token) -> Option<Error> {
		self.last_failure
			.as_ref()
			.filter(|failed| {
				failed.generation > self.observed && failed.stale_access == current.access_token
			})
			.map(|failed| failed.error.replay())
	}

	fn settle(&mut self, current: &Token, result: &Result<Token>) {
		let generation = self.flight.generation.fetch_add(1, Ordering::AcqRel) + 1;

		*self.last_failure = result.as_ref().err().map(|err| FailedRefresh {
			generation,
			stale_access: current.access_token.clone(),
			error: err.replay(),
		});
	}
}

impl<C, M> OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Returns a token that stays valid beyond the expiry skew, refreshing it when needed.
	///
	/// Tokens without a refresh token are returned until they actually expire and then fail
	/// with [`AuthError::NoRefreshToken`]. An empty store fails with
	/// [`AuthError::NotAuthenticated`].
	pub async fn ensure_valid(&self) -> Result<Token> {
		let current = self.store.current().ok_or(AuthError::NotAuthenticated)?;

		if let Some(token) = self.reusable(current)? {
			return Ok(token);
		}

		let mut ticket = self.refresh_flight.enter().await;
		let current = self.store.current().ok_or(AuthError::NotAuthenticated)?;

		match self.reusable(current.clone())? {
			Some(token) => Ok(token),
			None => self.refresh_exclusive(&mut ticket, &current).await,
		}
	}

	/// Exchanges the refresh token of `current` for a new token and commits it.
	///
	/// Fails with [`AuthError::NoRefreshToken`] without any network call when `current` has no
	/// refresh token. Runs inside the same single flight as [`ensure_valid`](Self::ensure_valid):
	/// when another caller already replaced `current`, the stored token is returned instead.
	/// A provider that omits `refresh_token` keeps the previous one. Failures leave the stored
	/// token unchanged.
	pub async fn refresh(&self, current: &Token) -> Result<Token> {
		if current.refresh_token.is_none() {
			return Err(AuthError::NoRefreshToken.into());
		}

		let mut ticket = self.refresh_flight.enter().await;
		let stored = self.store.current().ok_or(AuthError::NotAuthenticated)?;

		if stored.access_token != current.access_token {
			return Ok(stored);
		}

		self.refresh_exclusive(&mut ticket, &stored).await
	}

	async fn refresh_exclusive(
		&self,
		ticket: &mut FlightTicket<'_>,
		current: &Token,
	) -> Result<Token> {
		if let Some(err) = ticket.shared_failure(current) {
			return Err(err);
		}

		let result = self.exchange_refresh(current).await;

		ticket.settle(current, &result);

		result
	}

	async fn exchange_refresh(&self, current: &Token) -> Result<Token> {
		obs::observe(FlowKind::Refresh, "refresh", async move {
			let refresh_secret =
				current.refresh_token.as_ref().ok_or(AuthError::NoRefreshToken)?.clone();

			self.refresh_metrics.record_call();

			let result = self.refresh_with(current, refresh_secret.expose()).await;

			self.refresh_metrics.record_outcome(&result);

			result
		})
		.await
	}

	async fn refresh_with(&self, current: &Token, refresh_secret: &str) -> Result<Token> {
		let facade = self.facade()?;
		let (issued, new_refresh) = facade.refresh_token(refresh_secret).await?;
		let updated = if new_refresh.is_some() {
			issued
		} else {
			Token::builder()
				.access_token(issued.access_token.expose())
				.issued_at(issued.issued_at)
				.expires_at(issued.expires_at)
				.refresh_secret(current.refresh_token.clone())
				.build()
				.map_err(ConfigError::from)?
		};
		let outcome =
			self.store.compare_and_swap(current.access_token.expose(), updated.clone());

		match outcome {
			CompareAndSwapOutcome::Updated => Ok(updated),
			// Cleared while the call was in flight; the caller signed out.
			CompareAndSwapOutcome::Missing => Err(AuthError::NotAuthenticated.into()),
			CompareAndSwapOutcome::Mismatch => Ok(self.store.current().unwrap_or(updated)),
		}
	}

	fn reusable(&self, token: Token) -> Result<Option<Token>> {
		let now = self.now();

		if token.is_fresh_at(now, self.expiry_skew()) {
			return Ok(Some(token));
		}
		if token.can_refresh() {
			return Ok(None);
		}
		if token.is_expired_at(now) {
			return Err(AuthError::NoRefreshToken.into());
		}

		Ok(Some(token))
	}
}
