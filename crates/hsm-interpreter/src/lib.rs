//! The runtime interpreter: drives a [`hsm_core::Machine`] against a live
//! event stream. Six cooperating pieces (`spec.md` §2):
//!
//! - [`scheduler`] (C1) — the micro-step scheduler enforcing run-to-completion.
//! - [`clock`] (C2) — the abstract timer source (`RealClock`/`SimulatedClock`).
//! - [`timers`] (C3) — the delayed-event registry, keyed by send-id.
//! - [`actions`] (C4) — the action executor.
//! - [`actors`] (C5) — the actor supervisor (child machines, promises,
//!   callbacks, activities).
//! - [`interpreter`] (C6) — the interpreter core tying the above together
//!   and exposing the `Service` contract.

pub mod actions;
pub mod actors;
pub mod clock;
pub mod devtools;
pub mod error;
pub mod interpreter;
pub mod listeners;
pub mod logger;
pub mod scheduler;
pub mod spawn_context;
pub mod timers;

pub use actors::{ActorHandle, ActorId, ActorSupervisor};
pub use clock::{Clock, ClockError, RealClock, SimulatedClock};
pub use devtools::DevTools;
pub use error::{InterpreterError, Result};
pub use interpreter::{Interpreter, InterpreterOptions};
pub use listeners::ListenerId;
pub use logger::{Logger, TracingLogger};
pub use scheduler::Scheduler;
pub use spawn_context::{spawn, SpawnedChild};
pub use timers::TimerRegistry;
