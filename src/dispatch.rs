//! Resource-endpoint calls with status classification and bounded retries.
//!
//! [`HttpDispatcher::send`] performs exactly one attempt. [`HttpDispatcher::dispatch`] wraps it
//! with the configured [`RetryPolicy`], retrying only transient failures of requests that are
//! safe to repeat.

pub mod retry;

pub use retry::RetryPolicy;

// crates.io
use oauth2::{AsyncHttpClient, HttpResponse, http::HeaderMap};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	clock::{self, Clock},
	config::ClientConfig,
	http::{ApiHttpClient, ResponseMetadataSlot, headers},
	oauth::TransportErrorMapper,
	obs,
	request::RequestDescriptor,
};

/// Successful (2xx) response of a single attempt.
#[derive(Clone, Debug)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub body: Vec<u8>,
}

/// Sends [`RequestDescriptor`]s through an [`ApiHttpClient`] and classifies the outcome.
pub struct HttpDispatcher<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
	retry: RetryPolicy,
	user_agent: String,
	clock: Arc<dyn Clock>,
}
impl<C, M> HttpDispatcher<C, M>
where
	C: ?Sized + ApiHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a dispatcher with the default retry policy and user agent.
	pub fn new(http_client: Arc<C>, transport_mapper: Arc<M>) -> Self {
		let config = ClientConfig::default();

		Self {
			http_client,
			transport_mapper,
			retry: config.retry,
			user_agent: config.user_agent,
			clock: clock::system(),
		}
	}

	/// Applies the retry policy and user agent from `config`.
	pub fn with_config(mut self, config: &ClientConfig) -> Self {
		self.retry = config.retry.clone();
		self.user_agent = config.user_agent.clone();

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the `User-Agent` header value.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the clock used to resolve `Retry-After` dates.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Active retry policy.
	pub fn retry_policy(&self) -> &RetryPolicy {
		&self.retry
	}

	pub(crate) fn transport(&self) -> (Arc<C>, Arc<M>) {
		(self.http_client.clone(), self.transport_mapper.clone())
	}

	/// Performs a single attempt, attaching `Authorization: Bearer` only when `bearer` is set.
	pub async fn send(
		&self,
		request: &RequestDescriptor,
		bearer: Option<&TokenSecret>,
	) -> Result<RawResponse> {
		self.attempt(request, bearer).await.0
	}

	/// Performs [`send`](Self::send) under the retry policy.
	///
	/// `Server` and `Network` failures are retried for idempotent requests (or requests that
	/// opted in via [`RequestDescriptor::allow_retry`]). The returned error carries the total
	/// number of attempts.
	pub async fn dispatch(
		&self,
		request: &RequestDescriptor,
		bearer: Option<&TokenSecret>,
	) -> Result<RawResponse> {
		let max_attempts = if request.is_retryable() { self.retry.attempts() } else { 1 };
		let mut attempt = 1;

		loop {
			let (outcome, retry_after) = self.attempt(request, bearer).await;

			match outcome {
				Ok(response) => return Ok(response),
				Err(err) if err.is_transient() && attempt < max_attempts => {
					let delay = self.retry.delay_for(attempt, retry_after);

					obs::record_retry(attempt, delay, &err);
					tokio::time::sleep(delay.unsigned_abs()).await;

					attempt += 1;
				},
				Err(err) => return Err(err.with_attempts(attempt)),
			}
		}
	}

	async fn attempt(
		&self,
		request: &RequestDescriptor,
		bearer: Option<&TokenSecret>,
	) -> (Result<RawResponse>, Option<Duration>) {
		let http_request = match request.to_http_request(bearer, &self.user_agent) {
			Ok(http_request) => http_request,
			Err(err) => return (Err(err), None),
		};
		let slot = ResponseMetadataSlot::default();
		let handle = self.http_client.with_metadata(slot.clone());

		match handle.call(http_request).await {
			Ok(response) => classify(response, self.clock.now()),
			Err(err) => {
				let meta = slot.take();
				let retry_after = meta.as_ref().and_then(|value| value.retry_after);

				(Err(self.transport_mapper.map_transport_error(meta.as_ref(), err)), retry_after)
			},
		}
	}
}

fn classify(
	response: HttpResponse,
	now: OffsetDateTime,
) -> (Result<RawResponse>, Option<Duration>) {
	let (parts, body) = response.into_parts();
	let status = parts.status.as_u16();

	if parts.status.is_success() {
		return (Ok(RawResponse { status, headers: parts.headers, body }), None);
	}

	let text = String::from_utf8_lossy(&body).into_owned();

	if parts.status.is_server_error() {
		let retry_after = headers::parse_retry_after(&parts.headers, now);

		(Err(Error::Server { status, body: text, attempts: 1 }), retry_after)
	} else {
		(Err(Error::Client { status, body: text }), None)
	}
}
