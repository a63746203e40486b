//! The Interpreter Core (C6): the `Service` contract a running statechart
//! exposes, modeled on `StreamOrchestrator` (a `Clone`-able façade over an
//! owned engine) and `OrchestratorEngine::run` (a single owner of mutable
//! state, processing one command to completion before the next). Here the
//! "single owner" discipline comes from the Scheduler (C1) rather than from
//! an actor task, so `Interpreter` can be `Send + Sync` and shared directly
//! with the tokio tasks driving timers and invoked children — see
//! `DESIGN.md`'s Open Question resolutions for why.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use hsm_core::{Action, Context, DelayRef, Event, Invocation, Machine, State};

use crate::actions::execute_action;
use crate::actors::{ActorId, ActorSupervisor, EventSender};
use crate::clock::{Clock, RealClock};
use crate::devtools::{DevTools, TracingDevTools};
use crate::error::{InterpreterError, Result};
use crate::listeners::{ListenerId, ListenerRegistry};
use crate::logger::{Logger, TracingLogger};
use crate::scheduler::Scheduler;
use crate::timers::TimerRegistry;

/// Configuration accepted at construction time.
#[derive(Clone)]
pub struct InterpreterOptions {
	pub execute: bool,
	pub defer_events: bool,
	pub clock: Arc<dyn Clock>,
	pub logger: Arc<dyn Logger>,
	pub dev_tools: Option<Arc<dyn DevTools>>,
}

impl Default for InterpreterOptions {
	fn default() -> Self {
		Self {
			execute: true,
			defer_events: true,
			clock: Arc::new(RealClock::new()),
			logger: Arc::new(TracingLogger),
			dev_tools: None,
		}
	}
}

impl InterpreterOptions {
	#[must_use]
	pub fn with_execute(mut self, execute: bool) -> Self {
		self.execute = execute;
		self
	}

	#[must_use]
	pub fn with_defer_events(mut self, defer: bool) -> Self {
		self.defer_events = defer;
		self
	}

	#[must_use]
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	#[must_use]
	pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
		self.logger = logger;
		self
	}

	/// Enabling dev-tools connects the bundled `tracing`-backed bridge. Pass
	/// a custom `Arc<dyn DevTools>` via [`Self::with_dev_tools_bridge`] for
	/// anything more specific.
	#[must_use]
	pub fn with_dev_tools(mut self, enabled: bool) -> Self {
		self.dev_tools = if enabled { Some(Arc::new(TracingDevTools)) } else { None };
		self
	}

	#[must_use]
	pub fn with_dev_tools_bridge(mut self, bridge: Arc<dyn DevTools>) -> Self {
		self.dev_tools = Some(bridge);
		self
	}
}

/// A non-owning reference to whatever spawned this interpreter as a child,
/// used to forward a `done.invoke.<id>`/`error.execution` event upward when
/// this machine finishes.
#[derive(Clone)]
pub(crate) struct ParentLink {
	pub child_id: String,
	pub notify: EventSender,
}

struct Inner {
	id: String,
	machine: Arc<dyn Machine>,
	state: Mutex<State>,
	scheduler: Scheduler,
	options: InterpreterOptions,
	listeners: ListenerRegistry,
	supervisor: ActorSupervisor,
	timers: TimerRegistry,
	forward_to: Mutex<HashSet<ActorId>>,
	parent: Option<ParentLink>,
	stopped: AtomicBool,
}

/// A `Clone`-able handle over one running (or not-yet-started) statechart
/// service, mirroring `StreamOrchestrator`/`ConnectionHandle`'s cheap-clone
/// façade pattern.
#[derive(Clone)]
pub struct Interpreter {
	inner: Arc<Inner>,
}

impl Interpreter {
	#[must_use]
	pub fn new(machine: Arc<dyn Machine>, options: InterpreterOptions) -> Self {
		Self::new_with_parent(machine, options, None)
	}

	pub(crate) fn new_with_parent(machine: Arc<dyn Machine>, options: InterpreterOptions, parent: Option<ParentLink>) -> Self {
		let initial = machine.initial_state();
		let timers = TimerRegistry::new(Arc::clone(&options.clock));
		Self {
			inner: Arc::new(Inner {
				id: machine.id().to_string(),
				machine,
				state: Mutex::new(initial),
				scheduler: Scheduler::new(),
				options,
				listeners: ListenerRegistry::new(),
				supervisor: ActorSupervisor::new(),
				timers,
				forward_to: Mutex::new(HashSet::new()),
				parent,
				stopped: AtomicBool::new(false),
			}),
		}
	}

	#[must_use]
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	#[must_use]
	pub fn state(&self) -> State {
		self.inner.state.lock().unwrap().clone()
	}

	/// The machine's initial state, resolved but never entered — a pure
	/// read with no side effects and no dependency on whether the service
	/// has started.
	#[must_use]
	pub fn initial_state(&self) -> State {
		self.inner.machine.resolve_state(self.inner.machine.initial_state())
	}

	/// Computes the state `event` would produce from the current state,
	/// without mutating the service or executing any actions.
	#[must_use]
	pub fn next_state(&self, event: &Event) -> State {
		let current = self.state();
		self.inner.machine.resolve_state(self.inner.machine.transition(&current, event))
	}

	/// Curries `send` for a single, fixed event into a
	/// `sender(event) -> () -> State` closure. Calling it sends `event` each
	/// time and returns the service's state
	/// immediately after (which, since `send` only enqueues, may not yet
	/// reflect that send's own effects if something else is mid-transition).
	pub fn sender(&self, event: impl Into<Event>) -> impl Fn() -> State {
		let this = self.clone();
		let event = event.into();
		move || {
			let _ = this.send(event.clone());
			this.state()
		}
	}

	/// Starts the service: runs the initial transition, executes its
	/// actions, and notifies listeners, then flushes any events sent before
	/// this call (when `defer_events` is set). Returns a clone of `self`
	/// for chaining, e.g. `Interpreter::new(m, o).start()`.
	#[must_use]
	pub fn start(&self) -> Self {
		let this = self.clone();
		self.inner.scheduler.initialize(Box::new(move || {
			let initial = this.inner.machine.resolve_state(this.inner.machine.initial_state());
			if let Some(dev_tools) = &this.inner.options.dev_tools {
				dev_tools.init(&initial);
			}
			this.apply(initial);
		}));
		self.clone()
	}

	/// Enqueues `event` for processing. Errs with `SendBeforeStart` if the
	/// service hasn't started and `defer_events` is false; errs with
	/// `UnhandledInvocationError` if `event` is an `error.execution` the
	/// current state's `next_events` doesn't name (spec §4.6 step 4 — the
	/// caller observes the error synchronously rather than it being
	/// silently swallowed by a no-op transition).
	pub fn send(&self, event: impl Into<Event>) -> Result<()> {
		let event = event.into();
		if self.inner.stopped.load(Ordering::SeqCst) {
			return Ok(());
		}
		if !self.inner.scheduler.has_started() && !self.inner.options.defer_events {
			return Err(InterpreterError::SendBeforeStart);
		}
		if event.kind == hsm_core::event::ERROR_EXECUTION {
			let current = self.state();
			if !current.next_events.iter().any(|e| e == hsm_core::event::ERROR_EXECUTION) {
				return Err(InterpreterError::UnhandledInvocationError { data: event.payload });
			}
		}

		let this = self.clone();
		self.inner.scheduler.schedule(Box::new(move || {
			let next = this.inner.machine.transition(&this.state(), &event);
			this.apply(next);
			this.forward_event(&event);
		}));
		Ok(())
	}

	/// Folds every event in `events` through the machine in turn, forwarding
	/// each to auto-forward children as it is folded, but only notifies
	/// listeners once with the final resulting state (spec §8 "batch
	/// notification" scenario).
	///
	/// No sub-transition's actions run mid-fold — `execute`, if enabled, only
	/// runs once the whole batch has been published (spec §4.6's single
	/// `update`). So each step prepends whatever the fold has accumulated so
	/// far onto the next sub-transition's own actions before moving on,
	/// meaning by the time the final state reaches `apply`, its action list
	/// holds every action from every event in the batch, oldest first (spec
	/// §4.6 "carries forward any actions not yet executed by prepending them
	/// to the next state's actions").
	pub fn batch(&self, events: Vec<Event>) -> Result<()> {
		if self.inner.stopped.load(Ordering::SeqCst) {
			return Ok(());
		}
		if !self.inner.scheduler.has_started() && !self.inner.options.defer_events {
			return Err(InterpreterError::SendBeforeStart);
		}

		let this = self.clone();
		self.inner.scheduler.schedule(Box::new(move || {
			let mut state = this.state();
			let mut carried: Vec<Action> = Vec::new();
			for event in &events {
				let next = this.inner.machine.transition(&state, event);
				carried.extend(next.actions.iter().cloned());
				state = next.with_actions(carried.clone());
				this.forward_event(event);
			}
			this.apply(state);
		}));
		Ok(())
	}

	/// Sends `event` to every child registered in `forward_to`. `forwardTo ⊆
	/// children` is an invariant `stop_child` and `forward_to` are
	/// responsible for upholding; a missing entry here means that invariant
	/// has already broken elsewhere, not a recoverable runtime condition
	/// (spec §4.5 "a missing entry is an invariant violation").
	fn forward_event(&self, event: &Event) {
		for child_id in self.inner.forward_to.lock().unwrap().iter() {
			assert!(self.inner.supervisor.contains(child_id), "forwardTo invariant violated: {child_id:?} has no matching child");
			self.inner.supervisor.send_to(child_id, event.clone());
		}
	}

	/// Stops the service: tears down every live timer and child actor, and
	/// notifies `onStop` listeners. Idempotent.
	pub fn stop(&self) {
		if self.inner.stopped.swap(true, Ordering::SeqCst) {
			return;
		}
		self.inner.timers.clear_all();
		self.inner.supervisor.stop_all();
		self.inner.listeners.notify_stop();
	}

	pub fn on_transition(&self, f: impl Fn(&State) + Send + Sync + 'static) -> ListenerId {
		self.inner.listeners.on_transition(f)
	}

	pub fn on_event(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.inner.listeners.on_event(f)
	}

	pub fn on_send(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.inner.listeners.on_send(f)
	}

	/// `f` receives the new context and, second, the context from just
	/// before this transition (`state.history`'s context, or the initial
	/// context if this is the first transition) — spec §4.6's "context
	/// listeners (with previous context from `state.history`)".
	pub fn on_change(&self, f: impl Fn(&Context, &Context) + Send + Sync + 'static) -> ListenerId {
		self.inner.listeners.on_change(f)
	}

	pub fn on_done(&self, f: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
		self.inner.listeners.on_done(f)
	}

	pub fn on_stop(&self, f: impl Fn() + Send + Sync + 'static) -> ListenerId {
		self.inner.listeners.on_stop(f)
	}

	pub fn off(&self, id: ListenerId) {
		self.inner.listeners.off(id);
	}

	/// Marks `child_id` so every event this service itself receives is also
	/// forwarded verbatim to that child, after this service's own
	/// transition for it. Errs if `child_id` names no live child.
	pub fn forward_to(&self, child_id: impl Into<ActorId>) -> Result<()> {
		let child_id = child_id.into();
		if !self.inner.supervisor.contains(&child_id) {
			return Err(InterpreterError::ForwardToMissingChild { id: child_id });
		}
		self.inner.forward_to.lock().unwrap().insert(child_id);
		Ok(())
	}

	pub fn send_to_child(&self, child_id: &str, event: impl Into<Event>) -> Result<()> {
		if self.inner.supervisor.send_to(child_id, event.into()) {
			Ok(())
		} else {
			Err(InterpreterError::UnknownChild { id: child_id.to_string() })
		}
	}

	/// Routes `event` up to whatever spawned this service as a child, if
	/// anything. Returns `false` (a dev-only warning at the call site, not
	/// an error) when this service has no parent — the parent-sentinel
	/// counterpart of [`Self::send_to_child`] (spec §4.5 "Special targets").
	pub(crate) fn send_to_parent(&self, event: Event) -> bool {
		match &self.inner.parent {
			Some(parent) => {
				(parent.notify)(event);
				true
			}
			None => false,
		}
	}

	/// Removes `id` from both `children` and `forwardTo` together,
	/// maintaining `forwardTo ⊆ keys(children)` (spec §4.2 invariant 5: "removing
	/// a child also removes it from `forwardTo`"). Used both by a
	/// declarative `Action::Stop` and by an invocation's own
	/// success/failure completion path.
	pub(crate) fn stop_child(&self, id: &str) {
		self.inner.supervisor.remove(id);
		self.inner.forward_to.lock().unwrap().remove(id);
	}

	pub(crate) fn supervisor(&self) -> &ActorSupervisor {
		&self.inner.supervisor
	}

	pub(crate) fn timers(&self) -> &TimerRegistry {
		&self.inner.timers
	}

	pub(crate) fn logger(&self) -> &dyn Logger {
		self.inner.options.logger.as_ref()
	}

	pub(crate) fn machine_options(&self) -> &hsm_core::MachineOptions {
		self.inner.machine.options()
	}

	pub(crate) fn clock(&self) -> Arc<dyn Clock> {
		Arc::clone(&self.inner.options.clock)
	}

	/// One microstep: resolve the raw transition output, publish it as the
	/// current state, run its actions (if `execute` is on), notify
	/// listeners once, forward to any forwarded children, and propagate a
	/// `done` state to our own parent if we were invoked as a child.
	fn apply(&self, raw: State) {
		let resolved = self.inner.machine.resolve_state(raw);
		let event = resolved.event.clone();
		let actions = resolved.actions.clone();

		*self.inner.state.lock().unwrap() = resolved.clone();

		if self.inner.options.execute {
			for action in &actions {
				execute_action(self, action, &resolved.context, &event);
			}
		}

		// Notification order per spec §4.6: dev-tools, event, transition,
		// context, then (if the state is final) done.
		if let Some(dev_tools) = &self.inner.options.dev_tools {
			dev_tools.send(&event, &resolved);
		}
		self.inner.listeners.notify_event(&event);
		self.inner.listeners.notify_transition(&resolved);
		let previous_context = resolved.history.as_ref().map_or(Context::Null, |h| h.context.clone());
		self.inner.listeners.notify_change(&resolved.context, &previous_context);

		if resolved.done {
			let done_event = Event::done_invoke(&self.inner.id, resolved.done_data_value());
			self.inner.listeners.notify_done(&done_event);
			if let Some(parent) = &self.inner.parent {
				(parent.notify)(Event::done_invoke(&parent.child_id, resolved.done_data_value()));
			}
			self.stop();
		}
	}

	/// Notes that this action produced an outbound send, for `onSend`
	/// listeners (spec §4.6). Called by the Action Executor, not by `send`
	/// itself — `onSend` observes what the machine *initiates*, `onEvent`
	/// observes what it *receives*.
	pub(crate) fn note_send(&self, event: &Event) {
		self.inner.listeners.notify_send(event);
	}

	/// Spawns `src` from the machine's service table under `id`, delegated
	/// to by `Action::Invoke`. Exposed so `spawn_context`-based custom
	/// actions can spawn outside the normal `invoke` action too.
	pub(crate) fn spawn_service(&self, id: &str, invocation: Invocation, mapper: Option<hsm_core::ContextMapper>, subscribe: bool) {
		crate::actions::spawn_invocation(self, id, invocation, mapper, subscribe);
	}

	/// Overrides the not-yet-started initial context, used when invoking a
	/// child machine with a mapped initial context (`Action::Invoke`'s
	/// `data` field). No-op once the service has started.
	pub(crate) fn seed_context(&self, context: Context) {
		if self.inner.scheduler.is_active() {
			return;
		}
		self.inner.state.lock().unwrap().context = context;
	}

	pub(crate) fn parent_link(&self, child_id: impl Into<String>) -> ParentLink {
		let this = self.clone();
		ParentLink {
			child_id: child_id.into(),
			notify: Arc::new(move |event: Event| {
				let _ = this.send(event);
			}),
		}
	}
}

/// Resolves a `DelayRef` against this interpreter's machine options.
pub(crate) fn resolve_delay(interp: &Interpreter, delay: &DelayRef, context: &Context, event: &Event) -> Option<u64> {
	TimerRegistry::resolve_delay(delay, interp.machine_options(), context, event)
}
