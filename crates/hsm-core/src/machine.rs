use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::action::ActivityDef;
use crate::event::Event;
use crate::state::{Context, State};

/// A resolved or computed delay, as looked up from `MachineOptions::delays`.
#[derive(Clone)]
pub enum DelayValue {
	Millis(u64),
	Expr(Arc<dyn Fn(&Context, &Event) -> u64 + Send + Sync>),
}

impl DelayValue {
	#[must_use]
	pub fn resolve(&self, context: &Context, event: &Event) -> u64 {
		match self {
			Self::Millis(ms) => *ms,
			Self::Expr(f) => f(context, event),
		}
	}
}

/// A future backing a `services.*` promise-style invocation. Resolves to
/// `Ok(data)` (published as `done.invoke.<id>`) or `Err(data)` (published as
/// `error.execution`).
pub type PromiseFuture = Pin<Box<dyn Future<Output = Result<Value, Value>> + Send>>;

/// Cleanup hook returned by a callback or activity; run once on stop.
pub type StopFn = Box<dyn FnOnce() + Send>;

/// What a callback-style invocation is handed so it can talk back to its
/// parent: a function to send events upward, and a registration point for a
/// listener that receives events the parent (or anyone holding this child's
/// actor id) sends down to it.
pub struct CallbackCtx {
	pub send_to_parent: Arc<dyn Fn(Event) + Send + Sync>,
	pub on_receive: Arc<dyn Fn(Arc<dyn Fn(Event) + Send + Sync>) + Send + Sync>,
}

pub type CallbackFn = Arc<dyn Fn(CallbackCtx) -> Option<StopFn> + Send + Sync>;

/// Maps a parent's context/event to the initial context an invoked child
/// machine should start with.
pub type ContextMapper = Arc<dyn Fn(&Context, &Event) -> Context + Send + Sync>;

/// What `services.*` resolves to once called with the invoking context and
/// event — one of the four spawn-able actor shapes, or a reserved string
/// source that the executor treats as a no-op (spec §4.4). A child machine's
/// initial-context mapping, if any, comes from the triggering
/// `Action::Invoke`'s `data` field, not from this return value — see
/// `DESIGN.md`.
pub enum Invocation {
	Promise(PromiseFuture),
	Callback(CallbackFn),
	Machine(Arc<dyn Machine>),
	Reserved(String),
}

pub type ServiceFactory = Arc<dyn Fn(&Context, &Event) -> Invocation + Send + Sync>;
pub type ActivityFn = Arc<dyn Fn(&Context, &ActivityDef) -> Option<StopFn> + Send + Sync>;

/// The configuration table a machine definition carries alongside its pure
/// transition function: named delays, invocable services, and activities.
#[derive(Default, Clone)]
pub struct MachineOptions {
	pub delays: HashMap<String, DelayValue>,
	pub services: HashMap<String, ServiceFactory>,
	pub activities: HashMap<String, ActivityFn>,
	/// When true, an unhandled invocation error stops the service instead of
	/// only emitting a diagnostic (spec §7 class 3).
	pub strict: bool,
}

impl MachineOptions {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn strict(mut self, strict: bool) -> Self {
		self.strict = strict;
		self
	}

	#[must_use]
	pub fn with_delay(mut self, name: impl Into<String>, delay: DelayValue) -> Self {
		self.delays.insert(name.into(), delay);
		self
	}

	#[must_use]
	pub fn with_service(mut self, name: impl Into<String>, factory: ServiceFactory) -> Self {
		self.services.insert(name.into(), factory);
		self
	}

	#[must_use]
	pub fn with_activity(mut self, name: impl Into<String>, activity: ActivityFn) -> Self {
		self.activities.insert(name.into(), activity);
		self
	}
}

/// The pure, compiled machine definition the interpreter drives. Producing
/// one (guards, parallel regions, history resolution, and so on) is out of
/// scope for this crate family — `Machine` is the seam a real compiler would
/// sit behind; `hsm_core::toy` is a minimal, hand-written implementation
/// used only to exercise the interpreter's tests and demo.
pub trait Machine: Send + Sync {
	fn id(&self) -> &str;

	/// The state a fresh service starts in, before the `xstate.init` event
	/// has been folded in by `transition`.
	fn initial_state(&self) -> State;

	/// Given a pure transition, resolve it into the final public state (for
	/// a hierarchical machine this is where entering compound/history states
	/// would be resolved). The default is a pass-through, appropriate for a
	/// flat machine.
	fn resolve_state(&self, state: State) -> State {
		state
	}

	/// The pure reducer: never mutates `state`, never called reentrantly by
	/// the interpreter (spec invariant).
	fn transition(&self, state: &State, event: &Event) -> State;

	fn options(&self) -> &MachineOptions;
}
