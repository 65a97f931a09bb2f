//! Optional observability helpers for token flows and resource requests.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `esi_broker.flow` with the `flow` and
//!   `stage` (call site) fields, plus `warn!` events for upstream `Warning` headers and
//!   scheduled retries.
//! - Enable `metrics` to increment the `esi_broker_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`, and `esi_broker_cache_total`
//!   labeled by cache `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization Code exchange (with or without PKCE).
	AuthorizationCode,
	/// Refresh token flow.
	Refresh,
	/// Token revocation.
	Revoke,
	/// Token verification call.
	Verify,
	/// Resource request dispatched through the pipeline.
	Dispatch,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::AuthorizationCode => "authorization_code",
			FlowKind::Refresh => "refresh",
			FlowKind::Revoke => "revoke",
			FlowKind::Verify => "verify",
			FlowKind::Dispatch => "dispatch",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Cache decision recorded per pipeline request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheOutcome {
	/// Served from the cache without a network call.
	Hit,
	/// Looked up but absent or expired.
	Miss,
	/// Response stored after a network fetch.
	Stored,
	/// Response lacked a usable `Expires` header.
	NotCacheable,
	/// Method is never cached.
	Bypass,
}
impl CacheOutcome {
	/// Returns a stable label suitable for metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			CacheOutcome::Hit => "hit",
			CacheOutcome::Miss => "miss",
			CacheOutcome::Stored => "stored",
			CacheOutcome::NotCacheable => "not_cacheable",
			CacheOutcome::Bypass => "bypass",
		}
	}
}

/// Runs `fut` inside a flow span and records attempt + outcome counters.
pub(crate) async fn observe<T, F>(kind: FlowKind, stage: &'static str, fut: F) -> Result<T>
where
	F: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
