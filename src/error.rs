//! Error types shared by the token lifecycle, cache, and dispatch layers.

// self
use crate::{_prelude::*, provider::GrantType};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
///
/// Upstream status codes and bodies are carried verbatim so callers can tell an expired
/// token from a malformed request without re-parsing messages.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Identity provider rejected the exchange, or no usable token is available.
	#[error(transparent)]
	Auth(#[from] AuthError),
	/// Resource endpoint answered with a client error (4xx and other non-success codes).
	#[error("Resource endpoint returned client error {status}.")]
	Client {
		/// HTTP status code.
		status: u16,
		/// Response body, unmodified.
		body: String,
	},
	/// Upstream answered with a server error (5xx).
	#[error("Upstream returned server error {status} after {attempts} attempt(s).")]
	Server {
		/// HTTP status code of the final attempt.
		status: u16,
		/// Response body of the final attempt, unmodified.
		body: String,
		/// Number of attempts performed.
		attempts: u32,
	},
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error("Network failure after {attempts} attempt(s).")]
	Network {
		/// Underlying transport failure of the final attempt.
		#[source]
		source: TransportError,
		/// Number of attempts performed.
		attempts: u32,
	},
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Response body could not be decoded as the requested JSON shape.
	#[error("Response body is not valid JSON for the requested type.")]
	Decode {
		/// Structured parsing failure including the failing path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Upstream returned a success status with an unusable payload.
	#[error("Upstream returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Description of the problem.
		message: String,
	},
}
impl Error {
	/// Returns `true` for failures that may succeed when retried (5xx and transport errors).
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Server { .. } | Self::Network { .. })
	}

	/// HTTP status code associated with the failure, when one was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Auth(
				AuthError::Rejected { status, .. } | AuthError::RevocationRejected { status, .. },
			)
			| Self::Client { status, .. }
			| Self::Server { status, .. } => Some(*status),
			Self::Decode { status, .. } | Self::UnexpectedResponse { status, .. } => *status,
			_ => None,
		}
	}

	/// Number of attempts performed before giving up, for retryable failures.
	pub fn attempts(&self) -> Option<u32> {
		match self {
			Self::Server { attempts, .. } | Self::Network { attempts, .. } => Some(*attempts),
			_ => None,
		}
	}

	pub(crate) fn with_attempts(self, count: u32) -> Self {
		match self {
			Self::Server { status, body, .. } => Self::Server { status, body, attempts: count },
			Self::Network { source, .. } => Self::Network { source, attempts: count },
			other => other,
		}
	}

	/// Rebuilds an equivalent error for callers that share the outcome of one operation.
	///
	/// Variant, status, body, and attempt count are kept. Sources that cannot be cloned are
	/// carried as their rendered message.
	pub(crate) fn replay(&self) -> Self {
		match self {
			Self::Auth(err) => Self::Auth(err.replay()),
			Self::Client { status, body } => Self::Client { status: *status, body: body.clone() },
			Self::Server { status, body, attempts } =>
				Self::Server { status: *status, body: body.clone(), attempts: *attempts },
			Self::Network { source, attempts } => Self::Network {
				source: TransportError::Other { message: source.to_string() },
				attempts: *attempts,
			},
			Self::Config(err) =>
				Self::UnexpectedResponse { status: None, message: err.to_string() },
			Self::Decode { source, status } =>
				Self::UnexpectedResponse { status: *status, message: source.to_string() },
			Self::UnexpectedResponse { status, message } =>
				Self::UnexpectedResponse { status: *status, message: message.clone() },
		}
	}
}
impl From<TransportError> for Error {
	fn from(source: TransportError) -> Self {
		Self::Network { source, attempts: 1 }
	}
}

/// Authentication failures; fatal to the current operation and never retried automatically.
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// Token endpoint answered with a 4xx status.
	#[error("Identity provider rejected the {grant} request with status {status}.")]
	Rejected {
		/// Grant that was rejected.
		grant: GrantType,
		/// HTTP status code.
		status: u16,
		/// Provider payload, unmodified.
		body: String,
	},
	/// Revocation endpoint answered with a 4xx status.
	#[error("Identity provider rejected the revocation with status {status}.")]
	RevocationRejected {
		/// HTTP status code.
		status: u16,
		/// Provider payload, unmodified.
		body: String,
	},
	/// Token is expired and carries no refresh token; re-authentication is required.
	#[error("Token cannot be renewed because no refresh token is available.")]
	NoRefreshToken,
	/// No token has been stored yet.
	#[error("No token is available; authenticate first.")]
	NotAuthenticated,
	/// Authorization redirect returned a different `state` value.
	#[error("Authorization state mismatch.")]
	StateMismatch,
}

impl AuthError {
	fn replay(&self) -> Self {
		match self {
			Self::Rejected { grant, status, body } =>
				Self::Rejected { grant: *grant, status: *status, body: body.clone() },
			Self::RevocationRejected { status, body } =>
				Self::RevocationRejected { status: *status, body: body.clone() },
			Self::NoRefreshToken => Self::NoRefreshToken,
			Self::NotAuthenticated => Self::NotAuthenticated,
			Self::StateMismatch => Self::StateMismatch,
		}
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// OAuth client rejected its endpoint configuration.
	#[error(transparent)]
	OAuthClient(#[from] oauth2::ConfigurationError),
	/// Provider descriptor contains an invalid URL.
	#[error("Descriptor contains an invalid URL.")]
	InvalidDescriptor {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Redirect URI cannot be parsed.
	#[error("Redirect URI is invalid.")]
	InvalidRedirect {
		/// Underlying parsing failure.
		#[source]
		source: oauth2::url::ParseError,
	},
	/// Request header name or value is not valid HTTP.
	#[error("Request header `{name}` is invalid.")]
	InvalidHeader {
		/// Offending header name.
		name: String,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	InvalidBody {
		/// Serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// Descriptor lacks an endpoint required by the operation.
	#[error("Descriptor does not define the {endpoint} endpoint.")]
	MissingEndpoint {
		/// Endpoint label.
		endpoint: &'static str,
	},
	/// Protected request issued on a pipeline without an OAuth manager.
	#[error("Request requires authentication but no OAuth manager is configured.")]
	OAuthNotConfigured,
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Token builder validation failed.
	#[error("Unable to build token.")]
	TokenBuild(#[from] crate::auth::TokenBuilderError),
	/// Token endpoint response omitted `expires_in`.
	#[error("Token endpoint response is missing expires_in.")]
	MissingExpiresIn,
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Token endpoint returned a non-positive duration.
	#[error("The expires_in value must be positive.")]
	NonPositiveExpiresIn,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeout).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling upstream.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Call exceeded the configured timeout.
	#[error("Request timed out while calling upstream.")]
	Timeout {
		/// Transport-specific timeout error.
		#[source]
		source: BoxError,
	},
	/// Transport failed without a structured error.
	#[error("HTTP client error occurred while calling upstream: {message}.")]
	Other {
		/// Transport-provided description.
		message: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling upstream.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}

	/// Wraps a transport-specific timeout error.
	pub fn timeout(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Timeout { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::timeout(e) } else { Self::network(e) }
	}
}
