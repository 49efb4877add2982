use chrono::{DateTime, Utc};

/// Wall-clock source used to gauge child startup timeouts.
///
/// Acquisition can fail; `None` is treated as a clock fault by the
/// controller, which then fails closed into the corresponding error state.
pub trait Clock: Send + Sync {
	fn now(&self) -> Option<DateTime<Utc>>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Option<DateTime<Utc>> {
		Some(Utc::now())
	}
}
