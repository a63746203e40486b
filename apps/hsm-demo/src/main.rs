//! Runnable walkthrough of the interpreter driving `hsm_core::toy::FetchMachine`
//! through deferred sends, a cancellable delayed send, batched notification,
//! and both ends of the promise-invocation contract.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hsm_core::toy::FetchMachine;
use hsm_core::{Event, Machine};
use hsm_interpreter::{Interpreter, InterpreterOptions, SimulatedClock};
use tracing::Level;

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::fmt().with_max_level(Level::INFO).with_target(false).init();

	println!("\nHSM interpreter walkthrough\n");

	demo_deferred_send().await?;
	demo_delayed_send_cancelled_by_a_resolved_promise().await?;
	demo_batched_notification().await?;
	demo_promise_success().await?;
	demo_promise_failure_handled_by_the_machine().await?;
	demo_unhandled_error_execution_is_rejected_synchronously().await?;

	println!("\nAll demos completed\n");
	Ok(())
}

fn fetch_machine(succeed: bool, timeout_ms: u64) -> Arc<dyn Machine> {
	Arc::new(FetchMachine::new(succeed, timeout_ms))
}

/// Sending before `start()` queues the event; it replays once the service
/// starts instead of being dropped or erroring.
async fn demo_deferred_send() -> Result<()> {
	println!("Demo: send before start is deferred");

	let interp = Interpreter::new(fetch_machine(true, 5_000), InterpreterOptions::default());
	interp.send(Event::new("FETCH"))?;
	println!("  queued FETCH, state is still {}", interp.state().value);

	interp.start();
	tokio::time::sleep(Duration::from_millis(20)).await;
	println!("  after start(): state is {}", interp.state().value);
	Ok(())
}

/// `loading` arms a delayed `TIMEOUT` send and invokes a promise in the same
/// microstep; whichever answers first cancels the other via `Action::Cancel`.
async fn demo_delayed_send_cancelled_by_a_resolved_promise() -> Result<()> {
	println!("Demo: delayed send cancelled by the invoked promise");

	let clock = Arc::new(SimulatedClock::new());
	let options = InterpreterOptions::default().with_clock(clock.clone());
	let interp = Interpreter::new(fetch_machine(true, 1_000), options).start();

	interp.send(Event::new("FETCH"))?;
	tokio::time::sleep(Duration::from_millis(10)).await;
	println!("  after the promise resolves: state is {}", interp.state().value);

	clock.set(10_000)?;
	println!("  after advancing the clock past the timeout: state is still {}", interp.state().value);
	Ok(())
}

/// `batch` folds every event through the machine but publishes exactly one
/// transition notification for the whole run.
async fn demo_batched_notification() -> Result<()> {
	println!("Demo: batched send publishes a single notification");

	let interp = Interpreter::new(fetch_machine(true, 5_000), InterpreterOptions::default()).start();
	let notifications = Arc::new(AtomicUsize::new(0));
	let counter = Arc::clone(&notifications);
	interp.on_transition(move |state| {
		counter.fetch_add(1, Ordering::SeqCst);
		println!("    transition -> {}", state.value);
	});

	interp.batch(vec![Event::new("FETCH"), Event::done_invoke("fetch", serde_json::json!({ "items": 7 }))])?;

	println!("  transition listener fired {} time(s) for a 2-event batch", notifications.load(Ordering::SeqCst));
	Ok(())
}

/// A resolved promise invocation reaches `done.invoke.<id>` on its own,
/// without the machine ever sending it explicitly.
async fn demo_promise_success() -> Result<()> {
	println!("Demo: promise invocation resolves");

	let interp = Interpreter::new(fetch_machine(true, 5_000), InterpreterOptions::default()).start();
	interp.on_done(|event| println!("    done: {} {}", event.kind, event.payload));
	interp.send(Event::new("FETCH"))?;
	tokio::time::sleep(Duration::from_millis(20)).await;

	println!("  state after the promise resolves: {}", interp.state().value);
	Ok(())
}

/// A rejected promise invocation becomes an `error.execution` event. Since
/// `FetchMachine` declares a handler for it while `loading`, no diagnostic
/// fires and the service keeps running.
async fn demo_promise_failure_handled_by_the_machine() -> Result<()> {
	println!("Demo: promise invocation rejects, the machine handles it");

	let interp = Interpreter::new(fetch_machine(false, 5_000), InterpreterOptions::default()).start();
	let stop_count = Arc::new(AtomicUsize::new(0));
	let s = Arc::clone(&stop_count);
	interp.on_stop(move || {
		s.fetch_add(1, Ordering::SeqCst);
	});

	interp.send(Event::new("FETCH"))?;
	tokio::time::sleep(Duration::from_millis(20)).await;

	println!("  state after the rejection: {}", interp.state().value);
	println!("  service stopped: {}", stop_count.load(Ordering::SeqCst) > 0);
	Ok(())
}

/// `send` hands an `error.execution` the current state doesn't declare in
/// its `next_events` straight back to the caller instead of silently
/// no-opping it. This is the trigger the `reportUnhandledExceptionOnInvocation`
/// diagnostic rides on when the sender is an invocation instead of this demo.
async fn demo_unhandled_error_execution_is_rejected_synchronously() -> Result<()> {
	println!("Demo: an unhandled error.execution comes back synchronously");

	let interp = Interpreter::new(fetch_machine(true, 5_000), InterpreterOptions::default()).start();
	interp.send(Event::new("FETCH"))?;
	tokio::time::sleep(Duration::from_millis(20)).await;
	println!("  state: {} (next_events: {:?})", interp.state().value, interp.state().next_events);

	match interp.send(Event::error_execution(serde_json::json!({ "reason": "late arrival" }))) {
		Ok(()) => println!("  unexpected: the send was accepted"),
		Err(err) => println!("  send rejected as expected: {err}"),
	}
	Ok(())
}
