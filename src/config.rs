//! Serde-friendly client configuration.

// self
use crate::{_prelude::*, dispatch::RetryPolicy};

/// Tunables shared by the transport, dispatcher, and OAuth manager.
///
/// Every field has a default, so partial JSON/TOML documents deserialize cleanly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
	/// `User-Agent` sent with every request.
	pub user_agent: String,
	/// Retry policy for resource requests.
	pub retry: RetryPolicy,
	/// Seconds before expiry at which a token is renewed proactively.
	pub expiry_skew_secs: u32,
	/// Per-request transport timeout in milliseconds.
	pub request_timeout_ms: u64,
}
impl ClientConfig {
	/// Default renewal window ahead of token expiry.
	pub const DEFAULT_EXPIRY_SKEW_SECS: u32 = 30;
	/// Default transport timeout.
	pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

	/// Overrides the user agent.
	pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = user_agent.into();

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Renewal window as a duration.
	pub fn expiry_skew(&self) -> Duration {
		Duration::seconds(self.expiry_skew_secs.into())
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).into(),
			retry: RetryPolicy::default(),
			expiry_skew_secs: Self::DEFAULT_EXPIRY_SKEW_SECS,
			request_timeout_ms: Self::DEFAULT_REQUEST_TIMEOUT_MS,
		}
	}
}
