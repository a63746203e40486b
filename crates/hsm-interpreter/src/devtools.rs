//! The dev-tools bridge (`spec.md` §9): a narrow capability so the
//! interpreter core never references a specific external tool. `init` fires
//! once, on `start`; `send` fires on every published update, before
//! application listeners (spec §5 ordering guarantee).

use hsm_core::{Event, State};

pub trait DevTools: Send + Sync {
	fn init(&self, state: &State);
	fn send(&self, event: &Event, state: &State);
}

/// The "devTools: true" convenience from `spec.md` §6 — in the source this
/// means "connect to the well-known browser extension"; there is no
/// equivalent host tool here, so it falls back to structured `tracing`
/// output under a dedicated target.
#[derive(Default, Clone, Copy)]
pub struct TracingDevTools;

impl DevTools for TracingDevTools {
	fn init(&self, state: &State) {
		tracing::debug!(target: "hsm_interpreter::devtools", value = %state.value, "devtools init");
	}

	fn send(&self, event: &Event, state: &State) {
		tracing::debug!(target: "hsm_interpreter::devtools", kind = %event.kind, value = %state.value, "devtools update");
	}
}
