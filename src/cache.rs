//! Response caching keyed by request identity and bounded by server `Expires` metadata.
//!
//! [`ResponseCache`] is the seam the pipeline talks to. [`ExpirationCache`] is the
//! in-memory implementation; [`NoCache`] turns caching off entirely. An entry without an
//! expiry instant is "not cacheable": backends must neither store nor serve it.

pub mod memory;

pub use memory::ExpirationCache;

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use oauth2::http::{HeaderMap, header::AUTHORIZATION};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, request::RequestDescriptor};

/// Outcome of [`ResponseCache::store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreOutcome {
	/// Entry was inserted or overwrote a previous one.
	Stored,
	/// Entry carried no expiry and was dropped.
	NotCacheable,
}

/// Storage contract for cached responses.
pub trait ResponseCache
where
	Self: Send + Sync,
{
	/// Returns the entry for `key` when it has not expired yet.
	fn lookup(&self, key: &CacheKey) -> Option<CacheEntry>;

	/// Inserts or overwrites the entry for `key`; entries without expiry are ignored.
	fn store(&self, key: CacheKey, entry: CacheEntry) -> StoreOutcome;
}

/// Cache backend that never stores anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoCache;
impl ResponseCache for NoCache {
	fn lookup(&self, _: &CacheKey) -> Option<CacheEntry> {
		None
	}

	fn store(&self, _: CacheKey, _: CacheEntry) -> StoreOutcome {
		StoreOutcome::NotCacheable
	}
}

/// Stable digest of the request properties that select a representation.
///
/// Covers the method, the URL with its query pairs sorted and fragment removed, every
/// header except `Authorization`, and the body.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);
impl CacheKey {
	/// Derives the key for `request`.
	pub fn for_request(request: &RequestDescriptor) -> Self {
		let mut hasher = Sha256::new();

		hasher.update(request.method.as_str().as_bytes());
		hasher.update(b"\n");
		hasher.update(normalize_url(&request.url).as_bytes());
		hasher.update(b"\n");

		for (name, value) in &request.headers {
			if name.as_str() == AUTHORIZATION.as_str() {
				continue;
			}

			hasher.update(name.as_bytes());
			hasher.update(b":");
			hasher.update(value.as_bytes());
			hasher.update(b"\n");
		}

		if let Some(body) = &request.body {
			hasher.update(Sha256::digest(body));
		}

		Self(URL_SAFE_NO_PAD.encode(hasher.finalize()))
	}

	/// Encoded digest.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Display for CacheKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// Stored 2xx response.
#[derive(Clone, Debug)]
pub struct CacheEntry {
	/// HTTP status code.
	pub status: u16,
	/// Response headers.
	pub headers: HeaderMap,
	/// Raw response body.
	pub payload: Vec<u8>,
	/// Instant after which the entry must not be served; `None` means not cacheable.
	pub expires_at: Option<OffsetDateTime>,
	/// `Warning` header captured with the response.
	pub warning: Option<String>,
}
impl CacheEntry {
	/// Returns `true` if the entry may be served at `now`.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| now < expires_at)
	}
}

fn normalize_url(url: &Url) -> String {
	let mut normalized = url.clone();
	let mut pairs = url.query_pairs().into_owned().collect::<Vec<_>>();

	normalized.set_fragment(None);

	if pairs.is_empty() {
		normalized.set_query(None);
	} else {
		pairs.sort();
		normalized.query_pairs_mut().clear().extend_pairs(pairs);
	}

	normalized.into()
}
