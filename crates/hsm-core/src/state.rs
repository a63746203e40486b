use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::action::Action;
use crate::event::Event;

/// A state's action list. Most states attach a handful of actions (a send, a
/// cancel, an invoke); inlining up to four avoids a heap allocation for the
/// common case, same role `smallvec` plays wherever the teacher batches a
/// small, usually-short list of per-step effects.
pub type ActionList = SmallVec<[Action; 4]>;

/// The `Context` carried alongside a state. Fixed to a JSON value crate-wide;
/// see `DESIGN.md` "Open Question resolutions" for why.
pub type Context = Value;

/// A function producing the payload a `done.invoke.<id>` event carries,
/// evaluated against the final context and the event that reached the final
/// state.
pub type DoneDataFn = Arc<dyn Fn(&Context, &Event) -> Value + Send + Sync>;

/// The value of a state: a leaf label for a flat machine, or a nested map of
/// region name to child value for a machine with compound states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateValue {
	Atomic(String),
	Compound(HashMap<String, StateValue>),
}

impl StateValue {
	pub fn atomic(label: impl Into<String>) -> Self {
		Self::Atomic(label.into())
	}

	/// True if `other` names the same leaf (or, for compound values, an
	/// identical nested shape). Used by `Service::matches`-style callers.
	#[must_use]
	pub fn matches(&self, other: &str) -> bool {
		match self {
			Self::Atomic(label) => label == other,
			Self::Compound(regions) => regions.values().any(|v| v.matches(other)),
		}
	}
}

impl fmt::Display for StateValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Atomic(label) => write!(f, "{label}"),
			Self::Compound(regions) => {
				let mut parts: Vec<_> = regions.iter().map(|(k, v)| format!("{k}.{v}")).collect();
				parts.sort();
				write!(f, "{}", parts.join(","))
			}
		}
	}
}

/// A snapshot produced by `Machine::transition`/`resolve_state`: the result
/// of folding one or more events against a prior state.
#[derive(Clone)]
pub struct State {
	pub value: StateValue,
	pub context: Context,
	pub event: Event,
	pub actions: ActionList,
	pub activities: HashMap<String, bool>,
	pub history: Option<Box<State>>,
	pub done: bool,
	pub done_data: Option<DoneDataFn>,
	pub next_events: Vec<String>,
}

impl fmt::Debug for State {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("State")
			.field("value", &self.value)
			.field("context", &self.context)
			.field("event", &self.event)
			.field("actions", &self.actions)
			.field("activities", &self.activities)
			.field("done", &self.done)
			.field("next_events", &self.next_events)
			.finish_non_exhaustive()
	}
}

impl State {
	pub fn new(value: StateValue, context: Context, event: Event) -> Self {
		Self {
			value,
			context,
			event,
			actions: ActionList::new(),
			activities: HashMap::new(),
			history: None,
			done: false,
			done_data: None,
			next_events: Vec::new(),
		}
	}

	pub fn with_actions(mut self, actions: impl Into<ActionList>) -> Self {
		self.actions = actions.into();
		self
	}

	pub fn with_next_events(mut self, events: Vec<String>) -> Self {
		self.next_events = events;
		self
	}

	pub fn done(mut self, done_data: Option<DoneDataFn>) -> Self {
		self.done = true;
		self.done_data = done_data;
		self
	}

	#[must_use]
	pub fn matches(&self, value: &str) -> bool {
		self.value.matches(value)
	}

	/// The done-data payload, evaluated lazily against this state's own
	/// context and event. Returns `Value::Null` if the state never declared
	/// a done-data function — mirrors the spec's "absent means null".
	#[must_use]
	pub fn done_data_value(&self) -> Value {
		self.done_data.as_ref().map_or(Value::Null, |f| f(&self.context, &self.event))
	}
}
