use thiserror::Error;

/// Usage errors (spec §7 class 1): programmer mistakes, surfaced
/// synchronously to the caller. Configuration gaps (class 2) and invocation
/// errors (class 3) are not represented here — they are dev-only warnings or
/// `error.execution` events, per the spec's error taxonomy.
#[derive(Debug, Error)]
pub enum InterpreterError {
	#[error("send called before start (and deferEvents is false)")]
	SendBeforeStart,

	#[error("no child actor registered under id {id:?}")]
	UnknownChild { id: String },

	#[error("forwardTo names unknown child {id:?}")]
	ForwardToMissingChild { id: String },

	/// An `error.execution` event arrived but the current state's
	/// `next_events` doesn't name it — the machine has no handler, so the
	/// error is handed back to the caller synchronously (spec §4.6 step 4)
	/// instead of being silently absorbed by a default no-op transition.
	#[error("unhandled invocation error: {data}")]
	UnhandledInvocationError { data: serde_json::Value },
}

pub type Result<T> = std::result::Result<T, InterpreterError>;
