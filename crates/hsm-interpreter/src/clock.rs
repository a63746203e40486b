//! The Clock (C2): the interpreter's only source of time. Real code uses
//! [`RealClock`]; tests use [`SimulatedClock`] so delayed-send behavior is
//! assertable without sleeping.

use std::collections::BinaryHeap;
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

pub type TimerCallback = Box<dyn FnOnce() + Send>;
pub type TimerToken = u64;

pub trait Clock: Send + Sync {
	fn set_timeout(&self, callback: TimerCallback, delay_ms: u64) -> TimerToken;
	fn clear_timeout(&self, token: TimerToken);
}

/// Spawns a cancellable tokio timer per registration, grounded on the
/// per-connection `CancellationToken::child_token()` pattern used to tear
/// down a single actor without affecting its siblings.
pub struct RealClock {
	root: CancellationToken,
	tokens: Mutex<std::collections::HashMap<TimerToken, CancellationToken>>,
	next_id: AtomicU64,
}

impl Default for RealClock {
	fn default() -> Self {
		Self::new()
	}
}

impl RealClock {
	#[must_use]
	pub fn new() -> Self {
		Self {
			root: CancellationToken::new(),
			tokens: Mutex::new(std::collections::HashMap::new()),
			next_id: AtomicU64::new(1),
		}
	}
}

impl Clock for RealClock {
	fn set_timeout(&self, callback: TimerCallback, delay_ms: u64) -> TimerToken {
		let id = self.next_id.fetch_add(1, Ordering::SeqCst);
		let cancel = self.root.child_token();
		self.tokens.lock().unwrap().insert(id, cancel.clone());

		tokio::spawn(async move {
			tokio::select! {
				() = tokio::time::sleep(std::time::Duration::from_millis(delay_ms)) => callback(),
				() = cancel.cancelled() => {}
			}
		});

		id
	}

	fn clear_timeout(&self, token: TimerToken) {
		if let Some(cancel) = self.tokens.lock().unwrap().remove(&token) {
			cancel.cancel();
		}
	}
}

struct Pending {
	fire_at: i64,
	id: u64,
	callback: Mutex<Option<TimerCallback>>,
}

impl PartialEq for Pending {
	fn eq(&self, other: &Self) -> bool {
		self.fire_at == other.fire_at && self.id == other.id
	}
}
impl Eq for Pending {}
impl PartialOrd for Pending {
	fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
		Some(self.cmp(other))
	}
}
impl Ord for Pending {
	fn cmp(&self, other: &Self) -> CmpOrdering {
		// Reverse so BinaryHeap (a max-heap) pops the earliest-firing, then
		// lowest-id (insertion order tiebreak), timer first.
		other.fire_at.cmp(&self.fire_at).then_with(|| other.id.cmp(&self.id))
	}
}

struct SimulatedClockInner {
	now: i64,
	next_id: u64,
	pending: BinaryHeap<Pending>,
}

/// A fully synchronous, manually advanced clock. `set_timeout` only
/// registers; nothing fires until `set`/`increment` is called, at which
/// point every timer due at or before the new time fires, in
/// (fire-time, registration-order) order.
#[derive(Clone)]
pub struct SimulatedClock {
	inner: Arc<Mutex<SimulatedClockInner>>,
}

impl Default for SimulatedClock {
	fn default() -> Self {
		Self::new()
	}
}

impl SimulatedClock {
	#[must_use]
	pub fn new() -> Self {
		Self {
			inner: Arc::new(Mutex::new(SimulatedClockInner {
				now: 0,
				next_id: 1,
				pending: BinaryHeap::new(),
			})),
		}
	}

	#[must_use]
	pub fn now(&self) -> i64 {
		self.inner.lock().unwrap().now
	}

	/// Jump to an absolute time, firing every timer due along the way.
	/// Errors (logged by the caller as a usage error) if `time` is behind
	/// the clock's current position.
	pub fn set(&self, time: i64) -> Result<(), ClockError> {
		let due = {
			let mut inner = self.inner.lock().unwrap();
			if time < inner.now {
				return Err(ClockError::MovedBackward { from: inner.now, to: time });
			}
			inner.now = time;
			Self::pop_due(&mut inner)
		};
		for p in due {
			if let Some(cb) = p.callback.lock().unwrap().take() {
				cb();
			}
		}
		Ok(())
	}

	/// Advance by a non-negative delta.
	pub fn increment(&self, delta_ms: i64) -> Result<(), ClockError> {
		let target = self.now() + delta_ms;
		self.set(target)
	}

	fn pop_due(inner: &mut SimulatedClockInner) -> Vec<Pending> {
		let mut due = Vec::new();
		while let Some(top) = inner.pending.peek() {
			if top.fire_at > inner.now {
				break;
			}
			due.push(inner.pending.pop().unwrap());
		}
		due
	}
}

impl Clock for SimulatedClock {
	fn set_timeout(&self, callback: TimerCallback, delay_ms: u64) -> TimerToken {
		let mut inner = self.inner.lock().unwrap();
		let id = inner.next_id;
		inner.next_id += 1;
		let fire_at = inner.now + i64::try_from(delay_ms).unwrap_or(i64::MAX);
		inner.pending.push(Pending {
			fire_at,
			id,
			callback: Mutex::new(Some(callback)),
		});
		id
	}

	fn clear_timeout(&self, token: TimerToken) {
		let mut inner = self.inner.lock().unwrap();
		inner.pending.retain(|p| p.id != token);
	}
}

#[derive(Debug, thiserror::Error)]
pub enum ClockError {
	#[error("clock moved backward: from {from} to {to}")]
	MovedBackward { from: i64, to: i64 },
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Mutex as StdMutex;

	#[test]
	fn fires_due_timers_in_registration_order_on_tie() {
		let clock = SimulatedClock::new();
		let order = Arc::new(StdMutex::new(Vec::new()));

		for i in 0..3 {
			let order = Arc::clone(&order);
			clock.set_timeout(Box::new(move || order.lock().unwrap().push(i)), 100);
		}

		clock.set(100).unwrap();
		assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
	}

	#[test]
	fn cleared_timer_never_fires() {
		let clock = SimulatedClock::new();
		let fired = Arc::new(StdMutex::new(false));
		let f = Arc::clone(&fired);
		let token = clock.set_timeout(Box::new(move || *f.lock().unwrap() = true), 50);
		clock.clear_timeout(token);
		clock.set(1000).unwrap();
		assert!(!*fired.lock().unwrap());
	}

	#[test]
	fn moving_backward_is_an_error() {
		let clock = SimulatedClock::new();
		clock.set(100).unwrap();
		assert!(matches!(clock.set(50), Err(ClockError::MovedBackward { from: 100, to: 50 })));
	}

	#[test]
	fn resetting_to_the_same_time_is_a_no_op_and_does_not_refire() {
		let clock = SimulatedClock::new();
		let calls = Arc::new(StdMutex::new(0));
		let c = Arc::clone(&calls);
		clock.set_timeout(Box::new(move || *c.lock().unwrap() += 1), 100);

		clock.set(1000).unwrap();
		clock.set(1000).unwrap();

		assert_eq!(*calls.lock().unwrap(), 1, "re-set to an already-reached time must not re-fire an already-fired timeout");
	}

	#[test]
	fn increment_is_relative_to_now() {
		let clock = SimulatedClock::new();
		clock.set(10).unwrap();
		clock.increment(5).unwrap();
		assert_eq!(clock.now(), 15);
	}
}
