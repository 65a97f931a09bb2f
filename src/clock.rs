//! Injectable UTC time sources.

// self
use crate::_prelude::*;

/// Supplies the current UTC instant to token and cache freshness checks.
pub trait Clock
where
	Self: Send + Sync,
{
	/// Returns the current instant.
	fn now(&self) -> OffsetDateTime;
}

/// Wall-clock time source.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Manually driven clock for deterministic tests and replays.
#[derive(Clone, Debug)]
pub struct ManualClock(Arc<Mutex<OffsetDateTime>>);
impl ManualClock {
	/// Creates a clock frozen at `instant`.
	pub fn new(instant: OffsetDateTime) -> Self {
		Self(Arc::new(Mutex::new(instant)))
	}

	/// Moves the clock forward (or backward for negative durations).
	pub fn advance(&self, delta: Duration) {
		let mut now = self.0.lock();

		*now += delta;
	}

	/// Pins the clock to `instant`.
	pub fn set(&self, instant: OffsetDateTime) {
		*self.0.lock() = instant;
	}
}
impl Clock for ManualClock {
	fn now(&self) -> OffsetDateTime {
		*self.0.lock()
	}
}

pub(crate) fn system() -> Arc<dyn Clock> {
	Arc::new(SystemClock)
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn manual_clock_advances_and_resets() {
		let clock = ManualClock::new(macros::datetime!(2025-01-01 00:00 UTC));

		clock.advance(Duration::seconds(90));

		assert_eq!(clock.now(), macros::datetime!(2025-01-01 00:01:30 UTC));

		clock.set(macros::datetime!(2024-12-31 23:00 UTC));

		assert_eq!(clock.now(), macros::datetime!(2024-12-31 23:00 UTC));
	}
}
