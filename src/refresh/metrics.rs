// std
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing refresh activity of one credential store.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	started: AtomicU64,
	succeeded: AtomicU64,
	failed: AtomicU64,
	coalesced: AtomicU64,
}
impl RefreshMetrics {
	/// Refresh calls that reached a strategy.
	pub fn started(&self) -> u64 {
		self.started.load(Ordering::Relaxed)
	}

	/// Refreshes whose credential was installed in the store.
	pub fn succeeded(&self) -> u64 {
		self.succeeded.load(Ordering::Relaxed)
	}

	/// Refreshes that failed (strategy, persistence, or identity mismatch).
	pub fn failed(&self) -> u64 {
		self.failed.load(Ordering::Relaxed)
	}

	/// Requests that parked on an in-flight refresh instead of starting their own.
	pub fn coalesced(&self) -> u64 {
		self.coalesced.load(Ordering::Relaxed)
	}

	pub(crate) fn record_started(&self) {
		self.started.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_outcome(&self, success: bool) {
		let counter = if success { &self.succeeded } else { &self.failed };

		counter.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_coalesced(&self) {
		self.coalesced.fetch_add(1, Ordering::Relaxed);
	}
}
