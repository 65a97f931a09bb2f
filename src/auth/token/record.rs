//! Immutable bearer token records, freshness checks, and builders.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Lifecycle status of a token at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenStatus {
	/// Token is usable and outside the renewal window.
	Fresh,
	/// Token has not expired yet but falls inside the renewal window.
	Expiring,
	/// Token reached its expiry instant.
	Expired,
}

/// Errors produced by [`TokenBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum TokenBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when no expiry (absolute or relative) was configured.
	#[error("Expiry must be supplied via expires_at or expires_in.")]
	MissingExpiry,
	/// Issued when the expiry precedes the issued-at instant.
	#[error("Expiry must not precede the issued-at instant.")]
	ExpiryBeforeIssue,
}

/// Bearer token issued by the identity provider.
///
/// Records are never mutated in place: a refresh produces a new value that replaces the
/// previous one atomically in [`TokenStore`](crate::store::TokenStore).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Instant the token was obtained.
	#[serde(with = "time::serde::rfc3339")]
	pub issued_at: OffsetDateTime,
	/// Expiry instant (`issued_at + expires_in`).
	#[serde(with = "time::serde::rfc3339")]
	pub expires_at: OffsetDateTime,
}
impl Token {
	/// Returns a builder for constructing tokens.
	pub fn builder() -> TokenBuilder {
		TokenBuilder::default()
	}

	/// Computes the lifecycle status at `instant`, treating the last `skew` before expiry
	/// as the renewal window.
	pub fn status_at(&self, instant: OffsetDateTime, skew: Duration) -> TokenStatus {
		if instant >= self.expires_at {
			TokenStatus::Expired
		} else if instant >= self.expires_at - skew {
			TokenStatus::Expiring
		} else {
			TokenStatus::Fresh
		}
	}

	/// Returns `true` when the token can be used without renewal at `instant`.
	pub fn is_fresh_at(&self, instant: OffsetDateTime, skew: Duration) -> bool {
		matches!(self.status_at(instant, skew), TokenStatus::Fresh)
	}

	/// Returns `true` if the token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		instant >= self.expires_at
	}

	/// Returns `true` if the provider issued a refresh token.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.is_some()
	}

	/// Remaining lifetime at `instant` (negative once expired).
	pub fn remaining_at(&self, instant: OffsetDateTime) -> Duration {
		self.expires_at - instant
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("issued_at", &self.issued_at)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}

/// Builder for [`Token`].
#[derive(Clone, Debug, Default)]
pub struct TokenBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	issued_at: Option<OffsetDateTime>,
	expires_at: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
}
impl TokenBuilder {
	/// Sets the issued-at instant.
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expires_at(mut self, instant: OffsetDateTime) -> Self {
		self.expires_at = Some(instant);

		self
	}

	/// Sets a relative expiry duration from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		self.refresh_token = Some(TokenSecret::new(token));

		self
	}

	/// Reuses an existing refresh secret.
	pub fn refresh_secret(mut self, secret: Option<TokenSecret>) -> Self {
		self.refresh_token = secret;

		self
	}

	/// Consumes the builder and produces a [`Token`].
	pub fn build(self) -> Result<Token, TokenBuilderError> {
		let access_token = self.access_token.ok_or(TokenBuilderError::MissingAccessToken)?;
		let issued_at = self.issued_at.unwrap_or_else(OffsetDateTime::now_utc);
		let expires_at = match (self.expires_at, self.expires_in) {
			(Some(instant), _) => instant,
			(None, Some(delta)) => issued_at + delta,
			(None, None) => return Err(TokenBuilderError::MissingExpiry),
		};

		if expires_at < issued_at {
			return Err(TokenBuilderError::ExpiryBeforeIssue);
		}

		Ok(Token { access_token, refresh_token: self.refresh_token, issued_at, expires_at })
	}
}
