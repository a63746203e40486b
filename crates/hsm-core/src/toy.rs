//! A minimal, hand-written machine used to exercise the interpreter's tests
//! and demo. Deliberately not a general compiler: four flat states, no
//! guards, no parallel regions, no history. See `Machine`'s doc comment for
//! why that's out of scope here.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::action::{Action, DelayRef};
use crate::event::Event;
use crate::machine::{DelayValue, Invocation, MachineOptions, PromiseFuture};
use crate::state::{State, StateValue};
use crate::Machine;

/// `idle --FETCH--> loading --done.invoke.fetch--> success`
/// `loading --error.execution--> failure --RETRY--> loading`
///
/// `loading` invokes the `"fetch"` service and arms a cancellable
/// `"TIMEOUT"` send after the `"timeout"` delay; leaving `loading` cancels
/// it.
pub struct FetchMachine {
	options: MachineOptions,
}

impl FetchMachine {
	/// `succeed = true` makes the bundled `"fetch"` service resolve;
	/// `false` makes it reject. `timeout_ms` backs the `"timeout"` delay.
	#[must_use]
	pub fn new(succeed: bool, timeout_ms: u64) -> Self {
		let service: Arc<dyn Fn(&Value, &Event) -> Invocation + Send + Sync> = Arc::new(move |_ctx, _evt| {
			let fut: PromiseFuture = if succeed {
				Box::pin(async move { Ok(json!({ "items": 3 })) })
			} else {
				Box::pin(async move { Err(json!({ "reason": "network" })) })
			};
			Invocation::Promise(fut)
		});

		let options = MachineOptions::new().with_delay("timeout", DelayValue::Millis(timeout_ms)).with_service("fetch", service);

		Self { options }
	}

	/// Sets `machine.strict` (spec §7 class 3: stop the service on an
	/// unhandled invocation error instead of only logging a diagnostic).
	#[must_use]
	pub fn with_strict(mut self, strict: bool) -> Self {
		self.options = self.options.strict(strict);
		self
	}

	fn enter_loading(context: Value, event: Event) -> State {
		State::new(StateValue::atomic("loading"), context, event)
			.with_actions(vec![
				Action::invoke("fetch", "fetch"),
				Action::send("TIMEOUT").with_delay(DelayRef::Named("timeout".into())).with_send_id("timeout"),
			])
			.with_next_events(vec!["done.invoke.fetch".into(), "error.execution".into(), "TIMEOUT".into()])
	}
}

impl Machine for FetchMachine {
	fn id(&self) -> &str {
		"fetch"
	}

	fn initial_state(&self) -> State {
		State::new(StateValue::atomic("idle"), json!({ "retries": 0 }), Event::init()).with_next_events(vec!["FETCH".into()])
	}

	fn transition(&self, state: &State, event: &Event) -> State {
		let StateValue::Atomic(current) = &state.value else {
			return state.clone();
		};

		match (current.as_str(), event.kind.as_str()) {
			("idle", "FETCH") => Self::enter_loading(state.context.clone(), event.clone()),

			("loading", kind) if kind.starts_with("done.invoke.") => State::new(StateValue::atomic("success"), state.context.clone(), event.clone())
				.with_actions(vec![Action::cancel("timeout")])
				.with_next_events(vec![]),

			("loading", "error.execution" | "TIMEOUT") => {
				let retries = state.context.get("retries").and_then(Value::as_i64).unwrap_or(0);
				let mut ctx = state.context.clone();
				ctx["retries"] = json!(retries + 1);
				State::new(StateValue::atomic("failure"), ctx, event.clone())
					.with_actions(vec![Action::cancel("timeout")])
					.with_next_events(vec!["RETRY".into()])
			}

			("failure", "RETRY") => Self::enter_loading(state.context.clone(), event.clone()),

			_ => state.clone(),
		}
	}

	fn options(&self) -> &MachineOptions {
		&self.options
	}
}
