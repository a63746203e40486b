//! The Action Executor (C4): dispatches one resolved `Action` to its effect,
//! per the table in `spec.md` §4.4.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use hsm_core::{Action, CallbackCtx, Context, ContextMapper, Event, Invocation};

use crate::actors::ActorHandle;
use crate::error::InterpreterError;
use crate::interpreter::{resolve_delay, Interpreter, InterpreterOptions};
use crate::logger::report_unhandled_exception_on_invocation;
use crate::spawn_context;

pub(crate) fn execute_action(interp: &Interpreter, action: &Action, context: &Context, event: &Event) {
	match action {
		Action::Init => {}

		Action::Send { send_id, to, delay, event: event_fn } => {
			let outbound = event_fn(context, event);
			interp.note_send(&outbound);

			match resolve_delay(interp, delay, context, event) {
				None => {
					// Named delay absent from the machine's table: dropped
					// silently, per spec §4.3's precedence rule.
				}
				Some(0) => dispatch_now(interp, to.as_deref(), outbound),
				Some(ms) => {
					let interp_clone = interp.clone();
					let target = to.clone();
					let key = crate::timers::TimerRegistry::reserve_key(send_id.clone());
					let key_for_forget = key.clone();
					interp.timers().schedule(
						key,
						ms,
						Box::new(move || {
							interp_clone.timers().forget(&key_for_forget);
							dispatch_now(&interp_clone, target.as_deref(), outbound);
						}),
					);
				}
			}
		}

		Action::Cancel { send_id } => interp.timers().cancel(send_id),

		Action::Invoke { id, src, data, forward } => {
			let factory = interp.machine_options().services.get(src).cloned();
			match factory {
				Some(factory) => {
					let invocation = factory(context, event);
					spawn_invocation(interp, id, invocation, data.clone(), false);
					if *forward {
						if let Err(err) = interp.forward_to(id.clone()) {
							interp.logger().warn(&err.to_string());
						}
					}
				}
				None => interp.logger().warn(&format!("no service registered under {src:?}")),
			}
		}

		Action::Start { activity } => {
			let key = format!("activity:{}", activity.id);
			if interp.supervisor().contains(&key) {
				return;
			}
			let factory = interp.machine_options().activities.get(&activity.kind).cloned();
			match factory {
				Some(factory) => {
					let stop = factory(context, activity);
					interp.supervisor().insert(key, ActorHandle::Activity { stop: Mutex::new(stop) });
				}
				None => interp.logger().warn(&format!("no activity registered under {:?}", activity.kind)),
			}
		}

		// `activity.id` is tried first so a declarative `stop` can tear down
		// a pending invocation (registered under its plain id by
		// `Action::Invoke`), not just a transient activity (registered under
		// the `"activity:"`-prefixed key by `Action::Start`) — both are
		// valid targets for the same `stop` action per spec.md §3/§4.4.
		Action::Stop { activity } => {
			interp.stop_child(&activity.id);
			interp.stop_child(&format!("activity:{}", activity.id));
		}

		Action::Log { label, expr } => interp.logger().log(label.as_deref(), &expr(context, event)),

		Action::Custom(f) => {
			let _guard = spawn_context::enter(interp.clone());
			f(context, event);
		}
	}
}

/// Reserved `to` target routing a send up to `self.parent` instead of down
/// into `children` (`spec.md` §4.5 "Special targets").
const PARENT_SENTINEL: &str = "parent";

/// Addressing a missing *named* child is a usage error (spec §4.5 `sendTo`,
/// §7 class 1): "throw when addressing a named child, dev-only warn when
/// parent is absent". Only the missing-parent case is the dev-only warning;
/// a named target that resolves to nothing is the programmer's mistake, not
/// a recoverable runtime condition, so it panics the way a thrown error
/// surfaces synchronously at the call site. This call always runs inline
/// inside the `send`/`Action::Send` stack that produced it (either directly,
/// or as the body of a scheduled task the Scheduler runs synchronously), so
/// the panic reaches that caller rather than an unrelated task.
fn dispatch_now(interp: &Interpreter, to: Option<&str>, event: Event) {
	match to {
		Some(PARENT_SENTINEL) => {
			if !interp.send_to_parent(event) {
				interp.logger().warn("send target is the parent-sentinel, but this service has no parent");
			}
		}
		Some(target) => {
			if !interp.supervisor().send_to(target, event) {
				panic!("{}", InterpreterError::UnknownChild { id: target.to_string() });
			}
		}
		None => {
			let _ = interp.send(event);
		}
	}
}

/// Spawns the actor `invocation` describes, registered in `interp`'s
/// supervisor under `id`. Shared by `Action::Invoke` and any custom action
/// that spawns via the `spawn_context` free function. `mapper`, if present
/// and `invocation` turns out to be a child machine, rebinds the child's
/// initial context (spec §4.4 "`data` is present: rebind its context").
/// `subscribe` only matters for the `Invocation::Machine` case: when true,
/// the child's transitions are republished to `interp` as `xstate.update`
/// events (spec §4.5 "Child service").
pub(crate) fn spawn_invocation(interp: &Interpreter, id: &str, invocation: Invocation, mapper: Option<ContextMapper>, subscribe: bool) {
	match invocation {
		Invocation::Promise(fut) => {
			let interp_clone = interp.clone();
			let id_owned = id.to_string();
			let cancelled = Arc::new(AtomicBool::new(false));
			let cancelled_clone = Arc::clone(&cancelled);
			let strict = interp.machine_options().strict;

			let join = tokio::spawn(async move {
				match fut.await {
					Ok(data) => {
						if cancelled_clone.load(Ordering::SeqCst) {
							return;
						}
						let _ = interp_clone.send(Event::done_invoke(&id_owned, data));
						interp_clone.stop_child(&id_owned);
					}
					Err(data) => {
						if cancelled_clone.load(Ordering::SeqCst) {
							return;
						}
						report_invocation_error(&interp_clone, &id_owned, data, strict);
						interp_clone.stop_child(&id_owned);
					}
				}
			});

			interp.supervisor().insert(
				id.to_string(),
				ActorHandle::Promise {
					cancelled,
					abort: join.abort_handle(),
				},
			);
		}

		Invocation::Callback(f) => {
			let interp_clone = interp.clone();
			let receiver: Arc<Mutex<Option<crate::actors::EventSender>>> = Arc::new(Mutex::new(None));
			let receiver_for_on_receive = Arc::clone(&receiver);

			let send_to_parent: Arc<dyn Fn(Event) + Send + Sync> = Arc::new(move |event| {
				let _ = interp_clone.send(event);
			});
			let on_receive: Arc<dyn Fn(Arc<dyn Fn(Event) + Send + Sync>) + Send + Sync> = Arc::new(move |listener| {
				*receiver_for_on_receive.lock().unwrap() = Some(listener);
			});

			// A callback "throwing" has no direct Rust equivalent since the
			// signature returns a plain value rather than a Result; a panic
			// is the closest analogue, so it is caught and translated into
			// the same error.execution path a rejected promise takes.
			let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(CallbackCtx { send_to_parent, on_receive })));
			match outcome {
				Ok(stop) => {
					interp.supervisor().insert(id.to_string(), ActorHandle::Callback { receiver, stop: Mutex::new(stop) });
				}
				Err(panic) => {
					let reason = panic_message(&panic);
					report_invocation_error(interp, id, serde_json::json!({ "panic": reason }), interp.machine_options().strict);
				}
			}
		}

		Invocation::Machine(child_machine) => {
			let parent_link = interp.parent_link(id);
			let child_options = InterpreterOptions::default().with_clock(interp.clock());
			let child = crate::interpreter::Interpreter::new_with_parent(child_machine, child_options, Some(parent_link));

			if let Some(map_fn) = mapper {
				let ctx = interp.state().context;
				let evt = interp.state().event;
				child.seed_context(map_fn(&ctx, &evt));
			}

			if subscribe {
				let interp_clone = interp.clone();
				child.on_transition(move |state| {
					let payload = serde_json::json!({ "value": state.value.to_string(), "context": state.context });
					let _ = interp_clone.send(Event::with_payload(hsm_core::event::UPDATE, payload));
				});
			}

			let started = child.start();
			interp.supervisor().insert(id.to_string(), ActorHandle::ChildMachine(started));
		}

		Invocation::Reserved(name) => {
			interp.logger().warn(&format!("invocation source {name:?} is a reserved no-op in this interpreter"));
		}
	}
}

/// Routes an invocation failure (`data`) back to `interp` as `error.execution`.
/// If the current state has no handler for it, `send` hands the error right
/// back (spec §4.6 step 4); that's the trigger for the
/// `reportUnhandledExceptionOnInvocation` diagnostic, and for stopping the
/// service when `machine.strict` is set.
fn report_invocation_error(interp: &Interpreter, child_id: &str, data: serde_json::Value, strict: bool) {
	match interp.send(Event::error_execution(data.clone())) {
		Ok(()) => {}
		Err(InterpreterError::UnhandledInvocationError { data: current }) => {
			report_unhandled_exception_on_invocation(interp.logger(), child_id, &data, &current);
			if strict {
				interp.stop();
			}
		}
		Err(_) => {}
	}
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = panic.downcast_ref::<&str>() {
		(*s).to_string()
	} else if let Some(s) = panic.downcast_ref::<String>() {
		s.clone()
	} else {
		"callback panicked with a non-string payload".to_string()
	}
}
