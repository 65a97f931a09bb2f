//! Request façade composing the response cache, the OAuth manager, and the dispatcher.
//!
//! Every call follows the same path: look the request up in the cache (safe methods only),
//! obtain a valid bearer token when the request requires one, dispatch with retries, surface
//! the upstream `Warning` header, and store 2xx responses that carry a usable `Expires`.

// crates.io
use oauth2::http::HeaderMap;
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, VerifiedIdentity},
	cache::{CacheEntry, CacheKey, ExpirationCache, ResponseCache, StoreOutcome},
	clock::Clock,
	config::ClientConfig,
	dispatch::{HttpDispatcher, RawResponse, RetryPolicy},
	error::ConfigError,
	flows::OAuthManager,
	http::{ApiHttpClient, headers},
	oauth::TransportErrorMapper,
	obs::{self, CacheOutcome, FlowKind},
	provider::ProviderDescriptor,
	request::RequestDescriptor,
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

#[cfg(feature = "reqwest")]
/// Pipeline specialized for the crate's default reqwest transport stack.
pub type ReqwestRequestPipeline = RequestPipeline<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Response handed back to callers, whether fetched or served from the cache.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
	/// Instant until which the response may be reused, from the `Expires` header.
	pub expires_at: Option<OffsetDateTime>,
	/// Upstream `Warning` header, verbatim.
	pub warning: Option<String>,
	/// `true` when no network call was made.
	pub from_cache: bool,
}
impl ApiResponse {
	/// Decodes the body as JSON, reporting the failing path on error.
	pub fn json<T>(&self) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let mut de = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut de)
			.map_err(|source| Error::Decode { source, status: Some(self.status) })
	}

	/// Returns the body as UTF-8 text.
	pub fn text(&self) -> Result<String> {
		String::from_utf8(self.body.clone()).map_err(|_| Error::UnexpectedResponse {
			status: Some(self.status),
			message: "response body is not valid UTF-8".into(),
		})
	}

	fn fetched(raw: RawResponse) -> Self {
		let expires_at = headers::parse_expires(&raw.headers);
		let warning = headers::parse_warning(&raw.headers);

		Self {
			status: raw.status,
			headers: raw.headers,
			body: raw.body,
			expires_at,
			warning,
			from_cache: false,
		}
	}

	fn cached(entry: CacheEntry) -> Self {
		Self {
			status: entry.status,
			headers: entry.headers,
			body: entry.payload,
			expires_at: entry.expires_at,
			warning: entry.warning,
			from_cache: true,
		}
	}

	fn to_cache_entry(&self) -> CacheEntry {
		CacheEntry {
			status: self.status,
			headers: self.headers.clone(),
			payload: self.body.clone(),
			expires_at: self.expires_at,
			warning: self.warning.clone(),
		}
	}
}

/// Entry point for public and protected resource requests.
pub struct RequestPipeline<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	dispatcher: HttpDispatcher<C, M>,
	cache: Arc<dyn ResponseCache>,
	oauth: Option<Arc<OAuthManager<C, M>>>,
}
impl<C, M> RequestPipeline<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a pipeline for public requests with an in-memory [`ExpirationCache`].
	pub fn with_http_client(http_client: impl Into<Arc<C>>, mapper: impl Into<Arc<M>>) -> Self {
		Self {
			dispatcher: HttpDispatcher::new(http_client.into(), mapper.into()),
			cache: Arc::new(ExpirationCache::new()),
			oauth: None,
		}
	}

	/// Applies the retry policy and user agent from `config`.
	///
	/// The expiry skew belongs to the [`OAuthManager`]; see [`OAuthManager::with_config`].
	pub fn with_config(mut self, config: &ClientConfig) -> Self {
		self.dispatcher = self.dispatcher.with_config(config);

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.dispatcher = self.dispatcher.with_retry(retry);

		self
	}

	/// Replaces the response cache backend.
	pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
		self.cache = cache;

		self
	}

	/// Overrides the clock used by the dispatcher.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.dispatcher = self.dispatcher.with_clock(clock);

		self
	}

	/// Enables authenticated requests through `manager`.
	pub fn with_oauth(mut self, manager: impl Into<Arc<OAuthManager<C, M>>>) -> Self {
		self.oauth = Some(manager.into());

		self
	}

	/// Builds an [`OAuthManager`] sharing this pipeline's transport.
	pub fn oauth_manager(
		&self,
		descriptor: ProviderDescriptor,
		client_id: impl Into<String>,
	) -> OAuthManager<C, M> {
		let (http_client, mapper) = self.dispatcher.transport();

		OAuthManager::with_http_client(descriptor, client_id, http_client, mapper)
	}

	/// Attached OAuth manager, if any.
	pub fn oauth(&self) -> Option<&OAuthManager<C, M>> {
		self.oauth.as_deref()
	}

	/// Underlying dispatcher.
	pub fn dispatcher(&self) -> &HttpDispatcher<C, M> {
		&self.dispatcher
	}

	/// Runs `request` through cache, authentication, and dispatch.
	///
	/// A cache hit returns without touching the network or the token store. Protected requests
	/// fail before dispatch when no valid token can be obtained, or with
	/// [`ConfigError::OAuthNotConfigured`] when no manager is attached.
	pub async fn request(&self, request: &RequestDescriptor) -> Result<ApiResponse> {
		obs::observe(FlowKind::Dispatch, "request", async move {
			let key = if request.is_cacheable_method() {
				let key = CacheKey::for_request(request);

				if let Some(entry) = self.cache.lookup(&key) {
					obs::record_cache_outcome(CacheOutcome::Hit);

					return Ok(ApiResponse::cached(entry));
				}

				obs::record_cache_outcome(CacheOutcome::Miss);

				Some(key)
			} else {
				obs::record_cache_outcome(CacheOutcome::Bypass);

				None
			};
			let bearer =
				if request.requires_auth { Some(self.bearer().await?) } else { None };
			let raw = self.dispatcher.dispatch(request, bearer.as_ref()).await?;
			let response = ApiResponse::fetched(raw);

			if let Some(warning) = &response.warning {
				obs::record_upstream_warning(&request.url, warning);
			}
			if let Some(key) = key {
				let outcome = match self.cache.store(key, response.to_cache_entry()) {
					StoreOutcome::Stored => CacheOutcome::Stored,
					StoreOutcome::NotCacheable => CacheOutcome::NotCacheable,
				};

				obs::record_cache_outcome(outcome);
			}

			Ok(response)
		})
		.await
	}

	/// Public `GET` of `url`.
	pub async fn get(&self, url: Url) -> Result<ApiResponse> {
		self.request(&RequestDescriptor::get(url)).await
	}

	/// Authenticated `GET` of `url`.
	pub async fn get_authenticated(&self, url: Url) -> Result<ApiResponse> {
		self.request(&RequestDescriptor::get(url).authenticated()).await
	}

	/// Resolves the character behind the current token via the verification endpoint.
	///
	/// The call bypasses the cache. A 4xx answer surfaces as [`Error::Client`] and leaves the
	/// token store untouched.
	pub async fn verify(&self) -> Result<VerifiedIdentity> {
		obs::observe(FlowKind::Verify, "verify", async move {
			let manager = self.manager()?;
			let url = manager
				.descriptor
				.endpoints
				.verify
				.clone()
				.ok_or(ConfigError::MissingEndpoint { endpoint: "verify" })?;
			let token = manager.ensure_valid().await?;
			let request = RequestDescriptor::get(url).authenticated();
			let raw = self.dispatcher.dispatch(&request, Some(&token.access_token)).await?;

			ApiResponse::fetched(raw).json()
		})
		.await
	}

	fn manager(&self) -> Result<&OAuthManager<C, M>> {
		self.oauth.as_deref().ok_or_else(|| ConfigError::OAuthNotConfigured.into())
	}

	async fn bearer(&self) -> Result<TokenSecret> {
		Ok(self.manager()?.ensure_valid().await?.access_token)
	}
}
#[cfg(feature = "reqwest")]
impl RequestPipeline<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a pipeline backed by a reqwest transport built from `config`.
	pub fn from_config(config: &ClientConfig) -> Result<Self> {
		let http_client = ReqwestHttpClient::from_config(config)?;

		Ok(Self::with_http_client(http_client, Arc::new(ReqwestTransportErrorMapper))
			.with_config(config))
	}
}
impl<C, M> Debug for RequestPipeline<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestPipeline")
			.field("retry", self.dispatcher.retry_policy())
			.field("oauth", &self.oauth)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::{
		HeaderValue,
		header::{EXPIRES, WARNING},
	};
	// self
	use super::*;

	fn raw(body: &str) -> RawResponse {
		let mut headers = HeaderMap::new();

		headers.insert(EXPIRES, HeaderValue::from_static("Sun, 06 Nov 1994 08:49:37 GMT"));
		headers.insert(WARNING, HeaderValue::from_static("199 - This endpoint has been updated."));

		RawResponse { status: 200, headers, body: body.as_bytes().to_vec() }
	}

	#[derive(Debug, Deserialize)]
	struct Incursion {
		state: String,
	}

	#[test]
	fn fetched_responses_expose_header_metadata() {
		let response = ApiResponse::fetched(raw(r#"[{"state":"mobilizing"}]"#));

		assert_eq!(response.warning.as_deref(), Some("199 - This endpoint has been updated."));
		assert_eq!(response.expires_at.map(OffsetDateTime::unix_timestamp), Some(784_111_777));
		assert!(!response.from_cache);

		let incursions: Vec<Incursion> = response.json().expect("Body should decode.");

		assert_eq!(incursions[0].state, "mobilizing");
	}

	#[test]
	fn json_errors_report_the_failing_path() {
		let response = ApiResponse::fetched(raw(r#"[{"state":1}]"#));
		let err = response.json::<Vec<Incursion>>().expect_err("Wrong type should fail.");

		match err {
			Error::Decode { source, status } => {
				assert_eq!(source.path().to_string(), "[0].state");
				assert_eq!(status, Some(200));
			},
			other => panic!("Expected a decode error, got {other:?}."),
		}
	}

	#[test]
	fn cache_entries_round_trip_into_responses() {
		let response = ApiResponse::fetched(raw("[]"));
		let cached = ApiResponse::cached(response.to_cache_entry());

		assert!(cached.from_cache);
		assert_eq!(cached.body, response.body);
		assert_eq!(cached.warning, response.warning);
		assert_eq!(cached.text().expect("Body should be UTF-8."), "[]");
	}
}
