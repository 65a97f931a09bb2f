//! Scripted in-process transport and fixtures shared by the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::{HashMap, VecDeque},
	future::Future,
	io,
	pin::Pin,
	sync::Arc,
	time::Duration as StdDuration,
};
// crates.io
use esi_broker::{
	auth::Token,
	cache::ExpirationCache,
	clock::ManualClock,
	dispatch::RetryPolicy,
	flows::OAuthManager,
	http::{ApiHttpClient, ResponseMetadata, ResponseMetadataSlot},
	oauth::{
		PassthroughTransportErrorMapper,
		oauth2::{
			AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
			http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
		},
	},
	pipeline::RequestPipeline,
	provider::ProviderDescriptor,
	store::TokenStore,
};
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, macros::datetime};

pub const T0: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);
pub const TOKEN_PATH: &str = "/oauth/token";
pub const REVOKE_PATH: &str = "/oauth/revoke";
pub const VERIFY_PATH: &str = "/verify/";
pub const INCURSIONS: &str = "https://esi.evetech.net/latest/incursions/";

pub type ScriptedManager = OAuthManager<ScriptedHttpClient, PassthroughTransportErrorMapper>;
pub type ScriptedPipeline = RequestPipeline<ScriptedHttpClient, PassthroughTransportErrorMapper>;

/// Canned HTTP response.
#[derive(Clone, Debug)]
pub struct Reply {
	status: u16,
	headers: Vec<(String, String)>,
	body: String,
}
impl Reply {
	pub fn new(status: u16, body: impl Into<String>) -> Self {
		Self { status, headers: Vec::new(), body: body.into() }
	}

	pub fn json(status: u16, body: impl Into<String>) -> Self {
		Self::new(status, body).header("content-type", "application/json")
	}

	pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
		self.headers.push((name.to_owned(), value.into()));

		self
	}

	pub fn expires(self, instant: OffsetDateTime) -> Self {
		let value = esi_broker::http::headers::format_http_date(instant)
			.expect("Expires fixture should format.");

		self.header("expires", value)
	}

	fn into_response(self) -> HttpResponse {
		let mut response = HttpResponse::new(self.body.into_bytes());

		*response.status_mut() =
			StatusCode::from_u16(self.status).expect("Scripted status should be valid.");

		for (name, value) in self.headers {
			response.headers_mut().append(
				HeaderName::from_bytes(name.as_bytes()).expect("Scripted header name is valid."),
				HeaderValue::from_str(&value).expect("Scripted header value is valid."),
			);
		}

		response
	}
}

/// One scripted outcome for a path.
#[derive(Clone, Debug)]
pub enum Step {
	Reply(Reply),
	NetworkFailure,
}
impl From<Reply> for Step {
	fn from(reply: Reply) -> Self {
		Self::Reply(reply)
	}
}

/// Request observed by the scripted transport.
#[derive(Clone, Debug)]
pub struct RecordedRequest {
	pub method: String,
	pub path: String,
	pub headers: HeaderMap,
	pub body: String,
}
impl RecordedRequest {
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.get(name).and_then(|value| value.to_str().ok())
	}
}

#[derive(Default)]
struct Script {
	routes: Mutex<HashMap<String, VecDeque<Step>>>,
	requests: Mutex<Vec<RecordedRequest>>,
	latency: Mutex<Option<StdDuration>>,
}
impl Script {
	fn next(&self, request: &HttpRequest) -> Step {
		let path = request.uri().path().to_owned();

		self.requests.lock().push(RecordedRequest {
			method: request.method().to_string(),
			path: path.clone(),
			headers: request.headers().clone(),
			body: String::from_utf8_lossy(request.body()).into_owned(),
		});

		let mut routes = self.routes.lock();

		match routes.get_mut(&path) {
			Some(queue) if queue.len() > 1 => queue.pop_front().expect("Queue is not empty."),
			Some(queue) if !queue.is_empty() => queue[0].clone(),
			_ => Reply::json(404, "{\"error\":\"Not found\"}").into(),
		}
	}
}

/// In-process [`ApiHttpClient`] answering from per-path queues; the last step of a queue is
/// repeated for every further call.
#[derive(Clone, Default)]
pub struct ScriptedHttpClient(Arc<Script>);
impl ScriptedHttpClient {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn on(&self, path: &str, step: impl Into<Step>) -> &Self {
		self.0.routes.lock().entry(path.to_owned()).or_default().push_back(step.into());

		self
	}

	pub fn with_latency(self, latency: StdDuration) -> Self {
		*self.0.latency.lock() = Some(latency);

		self
	}

	pub fn calls(&self, path: &str) -> usize {
		self.0.requests.lock().iter().filter(|request| request.path == path).count()
	}

	pub fn requests(&self, path: &str) -> Vec<RecordedRequest> {
		self.0.requests.lock().iter().filter(|request| request.path == path).cloned().collect()
	}

	pub fn last(&self, path: &str) -> RecordedRequest {
		self.requests(path).pop().expect("At least one request should have been recorded.")
	}
}
impl ApiHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { script: self.0.clone(), slot }
	}
}

pub struct ScriptedHandle {
	script: Arc<Script>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for ScriptedHandle {
	type Error = HttpClientError<io::Error>;
	type Future = Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let script = self.script.clone();
		let slot = self.slot.clone();

		Box::pin(async move {
			slot.take();

			let step = script.next(&request);
			let latency = *script.latency.lock();

			if let Some(latency) = latency {
				tokio::time::sleep(latency).await;
			}

			match step {
				Step::Reply(reply) => {
					let response = reply.into_response();

					slot.store(ResponseMetadata::capture(&response));

					Ok(response)
				},
				Step::NetworkFailure => Err(HttpClientError::Io(io::Error::new(
					io::ErrorKind::ConnectionReset,
					"scripted network failure",
				))),
			}
		})
	}
}

pub fn descriptor() -> ProviderDescriptor {
	ProviderDescriptor::eve_sso().expect("EVE SSO preset should be valid.")
}

pub fn token_reply(access: &str, refresh: Option<&str>) -> Reply {
	let refresh =
		refresh.map(|value| format!(",\"refresh_token\":\"{value}\"")).unwrap_or_default();

	Reply::json(
		200,
		format!(
			"{{\"access_token\":\"{access}\",\"token_type\":\"Bearer\",\"expires_in\":1200{refresh}}}"
		),
	)
}

pub fn token(access: &str, refresh: Option<&str>, issued_at: OffsetDateTime) -> Token {
	let mut builder = Token::builder()
		.access_token(access)
		.issued_at(issued_at)
		.expires_in(Duration::seconds(1200));

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().expect("Token fixture should build.")
}

pub fn manager(client: &ScriptedHttpClient, clock: &ManualClock) -> ScriptedManager {
	OAuthManager::with_http_client(
		descriptor(),
		"esi-client",
		client.clone(),
		Arc::new(PassthroughTransportErrorMapper),
	)
	.with_client_secret("esi-secret")
	.with_clock(Arc::new(clock.clone()))
	.with_expiry_skew(Duration::ZERO)
}

pub fn manager_with_token(
	client: &ScriptedHttpClient,
	clock: &ManualClock,
	token: Token,
) -> ScriptedManager {
	manager(client, clock).with_store(TokenStore::with_token(token))
}

pub fn pipeline(client: &ScriptedHttpClient, clock: &ManualClock) -> ScriptedPipeline {
	RequestPipeline::with_http_client(client.clone(), Arc::new(PassthroughTransportErrorMapper))
		.with_cache(Arc::new(ExpirationCache::with_clock(Arc::new(clock.clone()))))
		.with_clock(Arc::new(clock.clone()))
		.with_retry(RetryPolicy::fixed(3, 1))
}

pub fn url(raw: &str) -> url::Url {
	url::Url::parse(raw).expect("URL fixture should parse.")
}
