use std::sync::Arc;

use crate::event::Event;
use crate::machine::ContextMapper;
use crate::state::Context;

/// How a delay is expressed on a `send`/activity action, before the Timer
/// Registry resolves it to a concrete millisecond count.
#[derive(Clone)]
pub enum DelayRef {
	/// No delay: the event is scheduled on the microtask queue, not a timer.
	None,
	/// Look up `options.delays[name]`. Missing entries are dropped silently
	/// (see `DESIGN.md` Open Question resolutions).
	Named(String),
	/// A literal millisecond count.
	Millis(u64),
	/// Computed from the context and the event that triggered the action.
	Expr(Arc<dyn Fn(&Context, &Event) -> u64 + Send + Sync>),
}

impl std::fmt::Debug for DelayRef {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::None => write!(f, "DelayRef::None"),
			Self::Named(n) => write!(f, "DelayRef::Named({n:?})"),
			Self::Millis(ms) => write!(f, "DelayRef::Millis({ms})"),
			Self::Expr(_) => write!(f, "DelayRef::Expr(..)"),
		}
	}
}

/// Identifies an activity declared by an `Action::Start`/`Action::Stop` pair
/// and looked up in `options.activities`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActivityDef {
	pub id: String,
	pub kind: String,
}

/// A side effect attached to a transition by `Machine::transition`.
///
/// This is the closed sum from the component design for the Action
/// Executor, plus a `Custom` escape hatch for effects that don't fit one of
/// the named kinds.
#[derive(Clone)]
pub enum Action {
	/// Marks the transition as the machine's initial entry; carries no
	/// independent effect beyond what the executor logs.
	Init,
	/// Send an event, optionally to a named child, optionally after a delay.
	/// `send_id` is used for cancellation; if absent the Timer Registry
	/// assigns one internally and it is not externally cancellable by name.
	Send {
		send_id: Option<String>,
		to: Option<String>,
		delay: DelayRef,
		event: Arc<dyn Fn(&Context, &Event) -> Event + Send + Sync>,
	},
	/// Cancel a previously scheduled delayed send by id. A no-op if the
	/// timer already fired or was never scheduled.
	Cancel { send_id: String },
	/// Spawn a child actor from `options.services[src]`, registered under
	/// `id`. The resulting actor's shape (promise, callback, machine, or a
	/// reserved no-op) is decided by what the factory returns, not by this
	/// action. `data`, when the spawned actor turns out to be a child
	/// machine, maps this service's current context and the triggering event
	/// to the child's initial context (`spec.md` §3's `data` context-mapping
	/// field); it has no effect on a promise, callback, or reserved
	/// invocation. `forward`, if the spawned actor turns out to be a child
	/// machine, registers it in `forwardTo` so events this service receives
	/// are also routed down to it (`spec.md` §3's `forward` auto-forward
	/// flag).
	Invoke {
		id: String,
		src: String,
		data: Option<ContextMapper>,
		forward: bool,
	},
	/// Start an activity; a no-op if the named activity is already running.
	Start { activity: ActivityDef },
	/// Stop an activity; a no-op if the named activity isn't running.
	Stop { activity: ActivityDef },
	/// Emit a diagnostic value through the configured `Logger`.
	Log {
		label: Option<String>,
		expr: Arc<dyn Fn(&Context, &Event) -> serde_json::Value + Send + Sync>,
	},
	/// An arbitrary executor supplied by the machine definition, run with no
	/// interpretation by the Action Executor beyond invoking it.
	Custom(Arc<dyn Fn(&Context, &Event) + Send + Sync>),
}

impl std::fmt::Debug for Action {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::Init => write!(f, "Action::Init"),
			Self::Send { send_id, to, delay, .. } => f
				.debug_struct("Action::Send")
				.field("send_id", send_id)
				.field("to", to)
				.field("delay", delay)
				.finish_non_exhaustive(),
			Self::Cancel { send_id } => f.debug_struct("Action::Cancel").field("send_id", send_id).finish(),
			Self::Invoke { id, src, data, forward } => f
				.debug_struct("Action::Invoke")
				.field("id", id)
				.field("src", src)
				.field("data", &data.is_some())
				.field("forward", forward)
				.finish(),
			Self::Start { activity } => f.debug_struct("Action::Start").field("activity", activity).finish(),
			Self::Stop { activity } => f.debug_struct("Action::Stop").field("activity", activity).finish(),
			Self::Log { label, .. } => f.debug_struct("Action::Log").field("label", label).finish_non_exhaustive(),
			Self::Custom(_) => write!(f, "Action::Custom(..)"),
		}
	}
}

impl Action {
	pub fn send(event: impl Into<String>) -> Self {
		let kind = event.into();
		Self::Send {
			send_id: None,
			to: None,
			delay: DelayRef::None,
			event: Arc::new(move |_, _| Event::new(kind.clone())),
		}
	}

	#[must_use]
	pub fn with_delay(mut self, delay: DelayRef) -> Self {
		if let Self::Send { delay: d, .. } = &mut self {
			*d = delay;
		}
		self
	}

	#[must_use]
	pub fn with_send_id(mut self, id: impl Into<String>) -> Self {
		if let Self::Send { send_id, .. } = &mut self {
			*send_id = Some(id.into());
		}
		self
	}

	#[must_use]
	pub fn to(mut self, target: impl Into<String>) -> Self {
		if let Self::Send { to, .. } = &mut self {
			*to = Some(target.into());
		}
		self
	}

	pub fn cancel(send_id: impl Into<String>) -> Self {
		Self::Cancel { send_id: send_id.into() }
	}

	pub fn invoke(id: impl Into<String>, src: impl Into<String>) -> Self {
		Self::Invoke {
			id: id.into(),
			src: src.into(),
			data: None,
			forward: false,
		}
	}

	#[must_use]
	pub fn with_forward(mut self, forward: bool) -> Self {
		if let Self::Invoke { forward: f, .. } = &mut self {
			*f = forward;
		}
		self
	}

	/// Sets the context-mapper consulted when the spawned actor turns out to
	/// be a child machine (`spec.md` §3's `data` field). A no-op for
	/// anything else the service factory returns.
	#[must_use]
	pub fn with_data(mut self, mapper: ContextMapper) -> Self {
		if let Self::Invoke { data, .. } = &mut self {
			*data = Some(mapper);
		}
		self
	}

	pub fn start(id: impl Into<String>, kind: impl Into<String>) -> Self {
		Self::Start {
			activity: ActivityDef { id: id.into(), kind: kind.into() },
		}
	}

	pub fn stop(id: impl Into<String>, kind: impl Into<String>) -> Self {
		Self::Stop {
			activity: ActivityDef { id: id.into(), kind: kind.into() },
		}
	}

	pub fn log(label: Option<String>) -> Self {
		Self::Log {
			label,
			expr: Arc::new(|ctx, _| ctx.clone()),
		}
	}
}
