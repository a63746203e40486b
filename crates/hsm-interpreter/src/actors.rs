//! The Actor Supervisor (C5): a uniform `{send, stop}` capability over the
//! four actor shapes a machine can spawn, generalized from the teacher's
//! `ConnectionHandle<K>` (a clone-cheap command-channel handle) and
//! `ConnectionStore<K>` (a `DashMap`-backed registry that spawns the actor's
//! backing task on insert).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use hsm_core::{Event, StopFn};

use crate::interpreter::Interpreter;

pub type ActorId = String;
pub type EventSender = Arc<dyn Fn(Event) + Send + Sync>;

/// One live child actor. `Callback`'s `receiver` is swapped in by the
/// invocation the first time it calls `on_receive`; events sent before that
/// point are dropped, matching the spec's callback-invocation contract
/// (there is no buffering guarantee before a callback registers a
/// listener).
pub enum ActorHandle {
	ChildMachine(Interpreter),
	Promise {
		cancelled: Arc<AtomicBool>,
		abort: tokio::task::AbortHandle,
	},
	Callback {
		receiver: Arc<Mutex<Option<EventSender>>>,
		stop: Mutex<Option<StopFn>>,
	},
	Activity {
		stop: Mutex<Option<StopFn>>,
	},
}

impl ActorHandle {
	pub fn send(&self, event: Event) {
		match self {
			Self::ChildMachine(child) => child.send(event),
			Self::Callback { receiver, .. } => {
				if let Some(f) = receiver.lock().unwrap().as_ref() {
					f(event);
				}
			}
			Self::Promise { .. } | Self::Activity { .. } => {
				tracing::warn!(kind = %event.kind, "sent an event to an actor that does not receive events");
			}
		}
	}

	pub fn stop(&self) {
		match self {
			Self::ChildMachine(child) => child.stop(),
			Self::Promise { cancelled, abort } => {
				cancelled.store(true, Ordering::SeqCst);
				abort.abort();
			}
			Self::Callback { stop, .. } | Self::Activity { stop } => {
				if let Some(f) = stop.lock().unwrap().take() {
					f();
				}
			}
		}
	}
}

/// Children live behind a `DashMap` so the interpreter's own thread, spawned
/// timer callbacks, and spawned child tasks can all reach in without a
/// single global lock serializing them — the same reason the teacher's
/// `ConnectionStore` uses one for its connection table.
#[derive(Default)]
pub struct ActorSupervisor {
	children: DashMap<ActorId, ActorHandle>,
}

impl ActorSupervisor {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	pub fn insert(&self, id: ActorId, handle: ActorHandle) {
		if let Some((_, old)) = self.children.remove(&id) {
			old.stop();
		}
		self.children.insert(id, handle);
	}

	#[must_use]
	pub fn get(&self, id: &str) -> Option<dashmap::mapref::one::Ref<'_, ActorId, ActorHandle>> {
		self.children.get(id)
	}

	pub fn send_to(&self, id: &str, event: Event) -> bool {
		match self.children.get(id) {
			Some(handle) => {
				handle.send(event);
				true
			}
			None => false,
		}
	}

	/// Removes and stops a single child, e.g. when it reports `done.invoke`.
	pub fn remove(&self, id: &str) {
		if let Some((_, handle)) = self.children.remove(id) {
			handle.stop();
		}
	}

	pub fn stop_all(&self) {
		for entry in self.children.iter() {
			entry.value().stop();
		}
		self.children.clear();
	}

	#[must_use]
	pub fn contains(&self, id: &str) -> bool {
		self.children.contains_key(id)
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.children.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.children.is_empty()
	}
}
