//! Token lifecycle orchestration against the identity provider.

pub mod authorize;
pub mod refresh;

mod revoke;

pub use authorize::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	auth::Token,
	clock::{self, Clock},
	config::ClientConfig,
	http::ApiHttpClient,
	oauth::{BasicFacade, TransportErrorMapper},
	provider::ProviderDescriptor,
	store::TokenStore,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Manager specialized for the crate's default reqwest transport stack.
pub type ReqwestOAuthManager = OAuthManager<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Acquires, stores, refreshes, and revokes the bearer token of a single application.
///
/// The manager owns the HTTP client, [`TokenStore`], and provider descriptor so each flow
/// only deals with its grant-specific logic. Client credentials live next to the descriptor
/// so the configured client-auth method is applied consistently to every token call.
pub struct OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// HTTP client wrapper used for every identity-provider request.
	pub http_client: Arc<C>,
	/// Mapper applied to transport-layer errors before surfacing them to callers.
	pub transport_mapper: Arc<M>,
	/// Slot holding the current token; clones share state with this manager.
	pub store: TokenStore,
	/// Identity-provider endpoints and client-auth method.
	pub descriptor: ProviderDescriptor,
	/// OAuth 2.0 client identifier.
	pub client_id: String,
	/// Optional client secret for confidential authentication methods.
	pub client_secret: Option<String>,
	/// Redirect URI sent with [`OAuthManager::authenticate`] exchanges.
	pub redirect_uri: Option<Url>,
	/// Shared counters for refresh calls.
	pub refresh_metrics: Arc<RefreshMetrics>,
	clock: Arc<dyn Clock>,
	expiry_skew: Duration,
	refresh_flight: Arc<refresh::RefreshFlight>,
}
impl<C, M> OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a manager that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
			store: TokenStore::default(),
			descriptor,
			client_id: client_id.into(),
			client_secret: None,
			redirect_uri: None,
			refresh_metrics: Default::default(),
			clock: clock::system(),
			expiry_skew: ClientConfig::default().expiry_skew(),
			refresh_flight: Default::default(),
		}
	}

	/// Sets or replaces the client secret used for confidential client auth modes.
	pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
		self.client_secret = Some(secret.into());

		self
	}

	/// Sets the redirect URI registered with the identity provider.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Shares an existing [`TokenStore`], e.g. one restored from a persisted snapshot.
	pub fn with_store(mut self, store: TokenStore) -> Self {
		self.store = store;

		self
	}

	/// Overrides the time source used for issue timestamps and freshness checks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the renewal window ahead of token expiry.
	pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
		self.expiry_skew = skew;

		self
	}

	/// Applies the expiry skew from `config`.
	pub fn with_config(self, config: &ClientConfig) -> Self {
		self.with_expiry_skew(config.expiry_skew())
	}

	/// Renewal window ahead of token expiry.
	pub fn expiry_skew(&self) -> Duration {
		self.expiry_skew
	}

	/// Returns a copy of the stored token, if any.
	pub fn current_token(&self) -> Option<Token> {
		self.store.current()
	}

	pub(crate) fn now(&self) -> OffsetDateTime {
		self.clock.now()
	}

	pub(crate) fn facade(&self) -> Result<BasicFacade<C, M>> {
		BasicFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
			self.clock.clone(),
		)
	}
}
#[cfg(feature = "reqwest")]
impl OAuthManager<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a manager backed by a reqwest transport built from the default configuration.
	///
	/// Use [`OAuthManager::with_client_secret`] for confidential clients and
	/// [`OAuthManager::with_http_client`] with [`ReqwestHttpClient::from_config`] to send a
	/// custom `User-Agent`.
	pub fn new(descriptor: ProviderDescriptor, client_id: impl Into<String>) -> Result<Self> {
		let http_client = ReqwestHttpClient::from_config(&ClientConfig::default())?;

		Ok(Self::with_http_client(
			descriptor,
			client_id,
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> Clone for OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn clone(&self) -> Self {
		Self {
			http_client: self.http_client.clone(),
			transport_mapper: self.transport_mapper.clone(),
			store: self.store.clone(),
			descriptor: self.descriptor.clone(),
			client_id: self.client_id.clone(),
			client_secret: self.client_secret.clone(),
			redirect_uri: self.redirect_uri.clone(),
			refresh_metrics: self.refresh_metrics.clone(),
			clock: self.clock.clone(),
			expiry_skew: self.expiry_skew,
			refresh_flight: self.refresh_flight.clone(),
		}
	}
}
impl<C, M> Debug for OAuthManager<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthManager")
			.field("descriptor", &self.descriptor)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.field("redirect_uri", &self.redirect_uri)
			.field("expiry_skew", &self.expiry_skew)
			.finish()
	}
}

