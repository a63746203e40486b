use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kind reserved for the implicit transition a machine takes on start.
pub const INIT: &str = "xstate.init";
/// Event kind reserved for the batched-update notification (`Service::update`).
pub const UPDATE: &str = "xstate.update";
/// Event kind reserved for an unhandled invocation failure (`spec.md` §7 class 3).
pub const ERROR_EXECUTION: &str = "error.execution";

/// Prefix for the event an invoked child publishes to its parent on success.
pub const DONE_INVOKE_PREFIX: &str = "done.invoke.";
/// Prefix for the event an activity or invocation publishes on internal completion.
pub const DONE_STATE_PREFIX: &str = "done.state.";

/// An event flowing through the interpreter: a tag plus an arbitrary JSON payload.
///
/// `Context` is fixed crate-wide to `serde_json::Value` (see `DESIGN.md`), so
/// events are likewise untyped at the edges — a `Machine` implementation is
/// free to pattern-match on `kind` and reach into `payload` as it pleases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub kind: String,
	pub payload: Value,
}

impl Event {
	pub fn new(kind: impl Into<String>) -> Self {
		Self {
			kind: kind.into(),
			payload: Value::Null,
		}
	}

	pub fn with_payload(kind: impl Into<String>, payload: Value) -> Self {
		Self { kind: kind.into(), payload }
	}

	pub fn init() -> Self {
		Self::new(INIT)
	}

	pub fn update() -> Self {
		Self::new(UPDATE)
	}

	pub fn done_invoke(child_id: &str, data: Value) -> Self {
		Self::with_payload(format!("{DONE_INVOKE_PREFIX}{child_id}"), data)
	}

	pub fn error_execution(data: Value) -> Self {
		Self::with_payload(ERROR_EXECUTION, data)
	}

	#[must_use]
	pub fn is_done_invoke(&self) -> bool {
		self.kind.starts_with(DONE_INVOKE_PREFIX)
	}
}
