//! The spawn-context stack: while a service is inside its own
//! `transition` → action-execution pass, it pushes itself here so that
//! action code can call a free `spawn()`-style helper without threading an
//! interpreter handle through every call site. Thread-local rather than
//! global — each `Interpreter`'s scheduler may run its tasks on whichever
//! tokio worker thread picks them up, and a global stack would let unrelated
//! interpreters on different threads observe each other's context.

use std::cell::RefCell;
use std::sync::Arc;

use hsm_core::{Event, Invocation, Machine};

use crate::interpreter::Interpreter;

thread_local! {
	static STACK: RefCell<Vec<Interpreter>> = const { RefCell::new(Vec::new()) };
}

/// RAII guard popping the interpreter pushed by [`enter`] when dropped,
/// including on panic/early-return from the action code it wraps.
pub struct Guard;

impl Drop for Guard {
	fn drop(&mut self) {
		STACK.with(|stack| {
			stack.borrow_mut().pop();
		});
	}
}

#[must_use]
pub fn enter(interpreter: Interpreter) -> Guard {
	STACK.with(|stack| stack.borrow_mut().push(interpreter));
	Guard
}

/// The innermost currently-transitioning service on this thread, if any.
#[must_use]
pub fn current() -> Option<Interpreter> {
	STACK.with(|stack| stack.borrow().last().cloned())
}

/// A lightweight descriptor for a child spawned by the free-standing
/// [`spawn`] helper: enough to address it (`send`) without holding the
/// parent's whole `Interpreter` handle (spec §4.6).
#[derive(Clone)]
pub struct SpawnedChild {
	pub id: String,
	pub parent: Option<Interpreter>,
	sender: Arc<dyn Fn(Event) + Send + Sync>,
}

impl SpawnedChild {
	pub fn send(&self, event: impl Into<Event>) {
		(self.sender)(event.into());
	}
}

/// Spawns `machine` as a subscribed child of whatever service is currently
/// transitioning on this thread (the top of [`STACK`]). A no-op — returning
/// `None` — if nothing is transitioning: spawning outside a transition has
/// no interpreter to attach the child to.
pub fn spawn(machine: Arc<dyn Machine>, id: Option<String>) -> Option<SpawnedChild> {
	let interp = current()?;
	let child_id = id.unwrap_or_else(|| machine.id().to_string());

	interp.spawn_service(&child_id, Invocation::Machine(machine), None, true);

	let interp_for_send = interp.clone();
	let cid = child_id.clone();
	Some(SpawnedChild {
		id: child_id,
		parent: Some(interp),
		sender: Arc::new(move |event| {
			let _ = interp_for_send.send_to_child(&cid, event);
		}),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn empty_outside_any_transition() {
		assert!(current().is_none());
	}

	#[test]
	fn spawn_is_a_no_op_outside_any_transition() {
		let fetch_machine: Arc<dyn Machine> = Arc::new(hsm_core::toy::FetchMachine::new(true, 1));
		assert!(spawn(fetch_machine, None).is_none());
	}
}
