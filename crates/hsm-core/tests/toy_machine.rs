use hsm_core::toy::FetchMachine;
use hsm_core::{Action, Event, Machine, StateValue};

fn fixture(succeed: bool) -> FetchMachine {
	FetchMachine::new(succeed, 5_000)
}

#[test]
fn initial_state_is_idle_with_zero_retries() {
	let machine = fixture(true);
	let state = machine.initial_state();
	assert_eq!(state.value, StateValue::atomic("idle"));
	assert_eq!(state.context["retries"], 0);
	assert_eq!(state.next_events, vec!["FETCH".to_string()]);
}

#[test]
fn fetch_from_idle_enters_loading_and_invokes() {
	let machine = fixture(true);
	let idle = machine.initial_state();
	let loading = machine.transition(&idle, &Event::new("FETCH"));

	assert_eq!(loading.value, StateValue::atomic("loading"));
	assert!(matches!(loading.actions.as_slice(), [Action::Invoke { id, src, .. }, Action::Send { .. }] if id == "fetch" && src == "fetch"));
}

#[test]
fn done_invoke_from_loading_reaches_success_and_cancels_timeout() {
	let machine = fixture(true);
	let idle = machine.initial_state();
	let loading = machine.transition(&idle, &Event::new("FETCH"));
	let success = machine.transition(&loading, &Event::done_invoke("fetch", serde_json::json!({"items":3})));

	assert_eq!(success.value, StateValue::atomic("success"));
	assert!(matches!(success.actions.as_slice(), [Action::Cancel { send_id }] if send_id == "timeout"));
}

#[test]
fn error_execution_from_loading_reaches_failure_and_increments_retries() {
	let machine = fixture(false);
	let idle = machine.initial_state();
	let loading = machine.transition(&idle, &Event::new("FETCH"));
	let failure = machine.transition(&loading, &Event::error_execution(serde_json::json!({"reason":"network"})));

	assert_eq!(failure.value, StateValue::atomic("failure"));
	assert_eq!(failure.context["retries"], 1);
	assert_eq!(failure.next_events, vec!["RETRY".to_string()]);
}

#[test]
fn retry_from_failure_re_enters_loading() {
	let machine = fixture(false);
	let idle = machine.initial_state();
	let loading = machine.transition(&idle, &Event::new("FETCH"));
	let failure = machine.transition(&loading, &Event::error_execution(serde_json::json!(null)));
	let retried = machine.transition(&failure, &Event::new("RETRY"));

	assert_eq!(retried.value, StateValue::atomic("loading"));
	assert_eq!(retried.context["retries"], 1);
}

#[test]
fn transition_is_pure_and_does_not_mutate_the_input_state() {
	let machine = fixture(true);
	let idle = machine.initial_state();
	let before = idle.context.clone();
	let _ = machine.transition(&idle, &Event::new("FETCH"));
	assert_eq!(idle.context, before);
}

#[test]
fn unknown_event_in_idle_is_a_no_op() {
	let machine = fixture(true);
	let idle = machine.initial_state();
	let still_idle = machine.transition(&idle, &Event::new("BOGUS"));
	assert_eq!(still_idle.value, StateValue::atomic("idle"));
}
