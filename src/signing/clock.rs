//! Server clock offset learned from response `Date` headers.
//!
//! OAuth 1.0a signatures embed `oauth_timestamp`, and the server rejects timestamps too far
//! from its own clock. A device with a skewed clock therefore signs every user request with a
//! rejected timestamp; stamping with the server's notion of "now" keeps signatures valid.

// std
use std::sync::atomic::{AtomicI64, Ordering};
// crates.io
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	http::{HeaderMap, header},
	obs,
};

/// Shared estimate of how far the server clock runs ahead of the local one, in whole seconds.
///
/// Clones share the offset, so the pipeline and the user refresh strategy can learn from each
/// other's responses.
#[derive(Clone, Debug, Default)]
pub struct ServerClock {
	offset_secs: Arc<AtomicI64>,
}
impl ServerClock {
	/// Current offset (server minus local).
	pub fn offset(&self) -> Duration {
		Duration::seconds(self.offset_secs.load(Ordering::Relaxed))
	}

	/// Local time corrected by the offset.
	pub fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc() + self.offset()
	}

	/// Updates the offset from the `Date` header in `headers`; returns `true` when it changed.
	pub fn sync(&self, headers: &HeaderMap) -> bool {
		self.sync_at(headers, OffsetDateTime::now_utc())
	}

	/// [`sync`](Self::sync) against an explicit local time.
	pub fn sync_at(&self, headers: &HeaderMap, local_now: OffsetDateTime) -> bool {
		let Some(server_now) = parse_date(headers) else {
			return false;
		};
		// `Date` has one-second resolution, so sub-second drift truncates to zero.
		let offset = (server_now - local_now).whole_seconds();
		let previous = self.offset_secs.swap(offset, Ordering::Relaxed);

		if previous != offset {
			obs::debug_event!(offset_secs = offset, "server clock offset updated");

			return true;
		}

		false
	}
}

fn parse_date(headers: &HeaderMap) -> Option<OffsetDateTime> {
	let raw = headers.get(header::DATE)?.to_str().ok()?.trim();

	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		return Some(moment);
	}

	// IMF-fixdate spells UTC as `GMT`.
	let numeric = format!("{} +0000", raw.strip_suffix("GMT")?.trim_end());

	OffsetDateTime::parse(&numeric, &Rfc2822).ok()
}
