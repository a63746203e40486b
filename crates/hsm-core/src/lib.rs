//! The pure, compiled half of the statechart contract: the types an
//! interpreter drives (`Machine`, `State`, `Event`, `Action`) with no
//! knowledge of scheduling, timers, or actor supervision. Those live in
//! `hsm-interpreter`.

pub mod action;
pub mod event;
pub mod machine;
pub mod state;
pub mod toy;

pub use action::{Action, ActivityDef, DelayRef};
pub use event::Event;
pub use machine::{CallbackCtx, CallbackFn, ContextMapper, DelayValue, Invocation, Machine, MachineOptions, PromiseFuture, ServiceFactory, StopFn};
pub use state::{ActionList, Context, DoneDataFn, State, StateValue};
