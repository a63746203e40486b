//! The five (plus `off`) listener sets a `Service` exposes, as described in
//! `spec.md` §4.6/§6: `onTransition`, `onEvent`, `onSend`, `onChange`,
//! `onDone`, and `onStop`. Each is stored as an insertion-ordered list keyed
//! by an opaque id so `off(id)` doesn't need `PartialEq` on boxed closures
//! (see `DESIGN.md` Open Question resolutions).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use hsm_core::{Context, Event, State};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type TransitionFn = Box<dyn Fn(&State) + Send + Sync>;
type EventFn = Box<dyn Fn(&Event) + Send + Sync>;
/// `(context, previous_context)`.
type ChangeFn = Box<dyn Fn(&Context, &Context) + Send + Sync>;
type StopFn = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct ListenerRegistry {
	next_id: AtomicU64,
	on_transition: Mutex<Vec<(ListenerId, TransitionFn)>>,
	on_event: Mutex<Vec<(ListenerId, EventFn)>>,
	on_send: Mutex<Vec<(ListenerId, EventFn)>>,
	on_change: Mutex<Vec<(ListenerId, ChangeFn)>>,
	on_done: Mutex<Vec<(ListenerId, EventFn)>>,
	on_stop: Mutex<Vec<(ListenerId, StopFn)>>,
}

impl ListenerRegistry {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	fn next(&self) -> ListenerId {
		ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst))
	}

	pub fn on_transition(&self, f: impl Fn(&State) + Send + Sync + 'static) -> ListenerId {
		let id = self.next();
		self.on_transition.lock().unwrap().push((id, Box::new(f)));
		id
	}

	pub fn on_event(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		let id = self.next();
		self.on_event.lock().unwrap().push((id, Box::new(f)));
		id
	}

	pub fn on_send(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		let id = self.next();
		self.on_send.lock().unwrap().push((id, Box::new(f)));
		id
	}

	pub fn on_change(&self, f: impl Fn(&Context, &Context) + Send + Sync + 'static) -> ListenerId {
		let id = self.next();
		self.on_change.lock().unwrap().push((id, Box::new(f)));
		id
	}

	pub fn on_done(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		let id = self.next();
		self.on_done.lock().unwrap().push((id, Box::new(f)));
		id
	}

	pub fn on_stop(&self, f: impl Fn() + Send + Sync + 'static) -> ListenerId {
		let id = self.next();
		self.on_stop.lock().unwrap().push((id, Box::new(f)));
		id
	}

	/// Removes `id` from whichever set it was registered in. A no-op if
	/// already removed or unknown.
	pub fn off(&self, id: ListenerId) {
		self.on_transition.lock().unwrap().retain(|(i, _)| *i != id);
		self.on_event.lock().unwrap().retain(|(i, _)| *i != id);
		self.on_send.lock().unwrap().retain(|(i, _)| *i != id);
		self.on_change.lock().unwrap().retain(|(i, _)| *i != id);
		self.on_done.lock().unwrap().retain(|(i, _)| *i != id);
		self.on_stop.lock().unwrap().retain(|(i, _)| *i != id);
	}

	pub fn notify_transition(&self, state: &State) {
		for (_, f) in self.on_transition.lock().unwrap().iter() {
			f(state);
		}
	}

	pub fn notify_event(&self, event: &Event) {
		for (_, f) in self.on_event.lock().unwrap().iter() {
			f(event);
		}
	}

	pub fn notify_send(&self, event: &Event) {
		for (_, f) in self.on_send.lock().unwrap().iter() {
			f(event);
		}
	}

	pub fn notify_change(&self, context: &Context, previous: &Context) {
		for (_, f) in self.on_change.lock().unwrap().iter() {
			f(context, previous);
		}
	}

	pub fn notify_done(&self, event: &Event) {
		for (_, f) in self.on_done.lock().unwrap().iter() {
			f(event);
		}
	}

	/// Fires every `onStop` listener exactly once, then empties all six
	/// listener sets (spec §4.6 `stop()`: "empties each listener set,
	/// calling stop-listeners exactly once as they are removed").
	pub fn notify_stop(&self) {
		let stops = std::mem::take(&mut *self.on_stop.lock().unwrap());
		for (_, f) in &stops {
			f();
		}
		self.on_transition.lock().unwrap().clear();
		self.on_event.lock().unwrap().clear();
		self.on_send.lock().unwrap().clear();
		self.on_change.lock().unwrap().clear();
		self.on_done.lock().unwrap().clear();
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn listeners_fire_in_insertion_order() {
		let registry = ListenerRegistry::new();
		let order = Mutex::new(Vec::new());
		let order = std::sync::Arc::new(order);

		for i in 0..3 {
			let order = std::sync::Arc::clone(&order);
			registry.on_change(move |_, _| order.lock().unwrap().push(i));
		}
		registry.notify_change(&json!(null), &json!(null));
		assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
	}

	#[test]
	fn notify_change_passes_both_the_new_and_previous_context() {
		let registry = ListenerRegistry::new();
		let seen = std::sync::Arc::new(Mutex::new(None));
		let s = std::sync::Arc::clone(&seen);

		registry.on_change(move |context, previous| {
			*s.lock().unwrap() = Some((context.clone(), previous.clone()));
		});
		registry.notify_change(&json!({"n": 2}), &json!({"n": 1}));

		assert_eq!(*seen.lock().unwrap(), Some((json!({"n": 2}), json!({"n": 1}))));
	}

	#[test]
	fn off_removes_only_the_named_listener() {
		let registry = ListenerRegistry::new();
		let calls = std::sync::Arc::new(Mutex::new(0));

		let c1 = std::sync::Arc::clone(&calls);
		let id = registry.on_stop(move || *c1.lock().unwrap() += 1);
		let c2 = std::sync::Arc::clone(&calls);
		registry.on_stop(move || *c2.lock().unwrap() += 1);

		registry.off(id);
		registry.notify_stop();

		assert_eq!(*calls.lock().unwrap(), 1);
	}
}
