//! Immutable description of a resource request handed to the pipeline.

// crates.io
use oauth2::{
	HttpRequest,
	http::{
		HeaderName, HeaderValue, Method,
		header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
	},
};
// self
use crate::{_prelude::*, auth::TokenSecret, error::ConfigError};

/// Verb, URL, headers, and body of a request plus its auth and retry flags.
///
/// Header names are stored lowercase so equal requests produce equal cache keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestDescriptor {
	/// HTTP method.
	pub method: Method,
	/// Absolute resource URL, including query parameters.
	pub url: Url,
	/// Extra request headers.
	pub headers: BTreeMap<String, String>,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
	/// Attach a bearer token, refreshing it first when needed.
	pub requires_auth: bool,
	/// Retry transient failures even though the method is not idempotent.
	pub retry_non_idempotent: bool,
}
impl RequestDescriptor {
	/// Creates a public request with no headers and no body.
	pub fn new(method: Method, url: Url) -> Self {
		Self {
			method,
			url,
			headers: BTreeMap::new(),
			body: None,
			requires_auth: false,
			retry_non_idempotent: false,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(url: Url) -> Self {
		Self::new(Method::GET, url)
	}

	/// Shorthand for a `POST` request.
	pub fn post(url: Url) -> Self {
		Self::new(Method::POST, url)
	}

	/// Adds or replaces a header.
	pub fn header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
		self.headers.insert(name.as_ref().to_ascii_lowercase(), value.into());

		self
	}

	/// Appends a query parameter.
	pub fn query(mut self, key: &str, value: &str) -> Self {
		self.url.query_pairs_mut().append_pair(key, value);

		self
	}

	/// Serializes `body` as JSON and sets the matching content type.
	pub fn json_body<T>(mut self, body: &T) -> Result<Self>
	where
		T: ?Sized + Serialize,
	{
		let bytes =
			serde_json::to_vec(body).map_err(|source| ConfigError::InvalidBody { source })?;

		self.body = Some(bytes);

		Ok(self.header(CONTENT_TYPE, "application/json"))
	}

	/// Encodes `pairs` as `application/x-www-form-urlencoded`.
	pub fn form_body<'a, I>(mut self, pairs: I) -> Self
	where
		I: IntoIterator<Item = (&'a str, &'a str)>,
	{
		let encoded =
			url::form_urlencoded::Serializer::new(String::new()).extend_pairs(pairs).finish();

		self.body = Some(encoded.into_bytes());

		self.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
	}

	/// Marks the request as protected.
	pub fn authenticated(mut self) -> Self {
		self.requires_auth = true;

		self
	}

	/// Opts a non-idempotent request into automatic retries.
	pub fn allow_retry(mut self) -> Self {
		self.retry_non_idempotent = true;

		self
	}

	/// Returns `true` for methods RFC 9110 defines as idempotent.
	pub fn is_idempotent(&self) -> bool {
		matches!(
			self.method,
			Method::GET
				| Method::HEAD | Method::OPTIONS
				| Method::TRACE | Method::PUT
				| Method::DELETE
		)
	}

	/// Returns `true` when transient failures may be retried.
	pub fn is_retryable(&self) -> bool {
		self.is_idempotent() || self.retry_non_idempotent
	}

	/// Returns `true` for the safe methods whose responses may be cached.
	pub fn is_cacheable_method(&self) -> bool {
		matches!(self.method, Method::GET | Method::HEAD)
	}

	pub(crate) fn to_http_request(
		&self,
		bearer: Option<&TokenSecret>,
		user_agent: &str,
	) -> Result<HttpRequest> {
		let mut builder = oauth2::http::Request::builder()
			.method(self.method.clone())
			.uri(self.url.as_str());

		for (name, value) in &self.headers {
			let name = HeaderName::from_bytes(name.as_bytes())
				.map_err(|_| ConfigError::InvalidHeader { name: name.clone() })?;
			let value = HeaderValue::from_str(value)
				.map_err(|_| ConfigError::InvalidHeader { name: name.to_string() })?;

			builder = builder.header(name, value);
		}

		let user_agent = HeaderValue::from_str(user_agent)
			.map_err(|_| ConfigError::InvalidHeader { name: USER_AGENT.to_string() })?;

		builder = builder.header(USER_AGENT, user_agent);

		if let Some(secret) = bearer {
			let mut value = HeaderValue::from_str(&secret.bearer())
				.map_err(|_| ConfigError::InvalidHeader { name: AUTHORIZATION.to_string() })?;

			value.set_sensitive(true);

			builder = builder.header(AUTHORIZATION, value);
		}

		builder
			.body(self.body.clone().unwrap_or_default())
			.map_err(|err| ConfigError::from(err).into())
	}
}
