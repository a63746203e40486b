//! The `Logger` capability: where `Action::Log` and configuration-gap
//! warnings go. Defaults to `tracing`, matching every crate in the teacher's
//! workspace.

use serde_json::Value;

pub trait Logger: Send + Sync {
	fn warn(&self, message: &str);
	fn log(&self, label: Option<&str>, value: &Value);
}

#[derive(Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
	fn warn(&self, message: &str) {
		// Configuration-gap warnings are dev-only (spec §7 class 2); a
		// release build that wants them should enable the crate's
		// "devtools" log target explicitly via its `tracing-subscriber`
		// filter rather than have this crate decide for it.
		tracing::warn!(target: "hsm_interpreter::devtools", "{message}");
	}

	fn log(&self, label: Option<&str>, value: &Value) {
		match label {
			Some(label) => tracing::info!(%label, ?value, "log action"),
			None => tracing::info!(?value, "log action"),
		}
	}
}

/// The `reportUnhandledExceptionOnInvocation` diagnostic (spec §7): logs the
/// original invocation failure alongside the error the interpreter got back
/// trying to route it through a transition, deduplicating the message when
/// they carry the same payload (the common case — a plain rejection with no
/// machine-level handler for `error.execution`).
pub fn report_unhandled_exception_on_invocation(logger: &dyn Logger, child_id: &str, original: &Value, current: &Value) {
	if original == current {
		logger.warn(&format!("unhandled exception from invocation {child_id:?}: {original}"));
	} else {
		logger.warn(&format!("unhandled exception from invocation {child_id:?}: original={original}, current={current}"));
	}
}
