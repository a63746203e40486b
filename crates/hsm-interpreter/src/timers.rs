//! The Timer Registry (C3): resolves a `send` action's delay against a
//! machine's delay table and tracks the live timer backing each named,
//! cancellable send. `delayed_events` (keyed by send id) and the clock's own
//! live timers are kept 1:1 — every insert here corresponds to exactly one
//! `Clock::set_timeout`, and `cancel` always tears down both sides together.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hsm_core::{Context, DelayRef, Event, MachineOptions};

use crate::clock::{Clock, TimerCallback, TimerToken};

pub struct TimerRegistry {
	clock: Arc<dyn Clock>,
	delayed_events: Mutex<HashMap<String, TimerToken>>,
}

/// Prefix marking a bookkeeping key the registry invented for a delayed send
/// that carried no `send_id` of its own. Such a send is never cancellable by
/// name (the caller has nothing to name it by), but it must still be torn
/// down by `clear_all` on `stop()` — every armed timer, not just the named
/// ones, per `spec.md` §4.3 "On service stop: all tokens cancelled."
const ANON_PREFIX: &str = "__anon:";

impl TimerRegistry {
	#[must_use]
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self {
			clock,
			delayed_events: Mutex::new(HashMap::new()),
		}
	}

	/// Resolves a `DelayRef` to a concrete millisecond count per `spec.md`
	/// §4.3's precedence: a literal or computed delay is used as-is; a named
	/// delay is looked up in the machine's table and silently dropped
	/// (returns `None`) if absent, rather than erroring.
	#[must_use]
	pub fn resolve_delay(delay: &DelayRef, options: &MachineOptions, context: &Context, event: &Event) -> Option<u64> {
		match delay {
			DelayRef::None => Some(0),
			DelayRef::Millis(ms) => Some(*ms),
			DelayRef::Expr(f) => Some(f(context, event)),
			DelayRef::Named(name) => options.delays.get(name).map(|d| d.resolve(context, event)),
		}
	}

	/// Decides the bookkeeping key a `schedule` call for `send_id` will use,
	/// without touching the clock — callers that need their own callback to
	/// know its key (to `forget` itself once fired) call this first. If
	/// `send_id` is absent, an internal key is invented so the timer still
	/// participates in `clear_all` — it just isn't reachable via `cancel`.
	#[must_use]
	pub fn reserve_key(send_id: Option<String>) -> String {
		send_id.unwrap_or_else(|| format!("{ANON_PREFIX}{}", uuid::Uuid::new_v4()))
	}

	/// Arms a timer under the given bookkeeping key (from [`Self::reserve_key`]).
	/// A previous timer registered under the same key is torn down first
	/// (re-sending with the same `send_id` replaces, not stacks).
	pub fn schedule(&self, key: String, delay_ms: u64, callback: TimerCallback) {
		let token = self.clock.set_timeout(callback, delay_ms);
		let previous = self.delayed_events.lock().unwrap().insert(key, token);
		if let Some(stale) = previous {
			self.clock.clear_timeout(stale);
		}
	}

	/// Cancels the live timer registered under `send_id`. A no-op if it
	/// already fired or was never scheduled with a cancellable id.
	pub fn cancel(&self, send_id: &str) {
		if let Some(token) = self.delayed_events.lock().unwrap().remove(send_id) {
			self.clock.clear_timeout(token);
		}
	}

	/// Drops the bookkeeping entry for a fired timer (named or anonymous)
	/// without touching the clock (the timer already fired on its own).
	pub fn forget(&self, key: &str) {
		self.delayed_events.lock().unwrap().remove(key);
	}

	pub fn clear_all(&self) {
		let mut map = self.delayed_events.lock().unwrap();
		for (_, token) in map.drain() {
			self.clock.clear_timeout(token);
		}
	}
}
