//! Parsers for the caching and retry headers the pipeline honors.
//!
//! Every parser is lenient: a missing or malformed header yields `None` and never an
//! error, so a bad `Expires` simply makes a response uncacheable.

// crates.io
use oauth2::http::{
	HeaderMap,
	header::{EXPIRES, RETRY_AFTER, WARNING},
};
use time::{PrimitiveDateTime, format_description::BorrowedFormatItem, macros::format_description};
// self
use crate::_prelude::*;

/// RFC 7231 IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub const IMF_FIXDATE: &[BorrowedFormatItem<'static>] = format_description!(
	"[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Parses an IMF-fixdate value into a UTC instant.
pub fn parse_http_date(raw: &str) -> Option<OffsetDateTime> {
	PrimitiveDateTime::parse(raw.trim(), IMF_FIXDATE).ok().map(PrimitiveDateTime::assume_utc)
}

/// Formats a UTC instant as an IMF-fixdate value.
pub fn format_http_date(instant: OffsetDateTime) -> Option<String> {
	let utc = instant.to_offset(time::UtcOffset::UTC);

	PrimitiveDateTime::new(utc.date(), utc.time()).format(IMF_FIXDATE).ok()
}

/// Reads the `Expires` header as an absolute instant.
pub fn parse_expires(headers: &HeaderMap) -> Option<OffsetDateTime> {
	let value = headers.get(EXPIRES)?.to_str().ok()?;

	parse_http_date(value)
}

/// Reads the advisory `Warning` header (for example `199 - This endpoint has been updated.`).
pub fn parse_warning(headers: &HeaderMap) -> Option<String> {
	let value = headers.get(WARNING)?.to_str().ok()?.trim();

	if value.is_empty() { None } else { Some(value.to_owned()) }
}

/// Reads `Retry-After` as a delay relative to `now`; accepts delta-seconds or an IMF-fixdate.
pub fn parse_retry_after(headers: &HeaderMap, now: OffsetDateTime) -> Option<Duration> {
	if let Some(delay) = parse_retry_after_secs(headers) {
		return Some(delay);
	}

	let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();

	if let Some(moment) = parse_http_date(raw) {
		let delta = moment - now;

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

/// Reads `Retry-After` only in its delta-seconds form; dates need a clock and are ignored.
pub fn parse_retry_after_secs(headers: &HeaderMap) -> Option<Duration> {
	let secs = headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u32>().ok()?;

	Some(Duration::seconds(secs.into()))
}
