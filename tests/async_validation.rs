use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use calmform::{
    FieldBindings, FormController, FormOptions, FormState, SubmitOutcome, Trigger, Validator,
};
use futures::executor::ThreadPool;
use futures_timer::Delay;

const NAME: &str = "e-mail";

fn controller() -> FormController {
    let pool = ThreadPool::new().expect("thread pool");
    FormController::new(FormOptions::default(), pool)
}

fn type_into(controller: &FormController, text: &str, keystroke: Duration) {
    for end in 1..=text.len() {
        controller
            .handle_trigger(NAME, &text[..end], Trigger::Change)
            .expect("keystroke");
        thread::sleep(keystroke);
    }
}

fn wait_until_settled(controller: &FormController) -> FormState {
    for _ in 0..200 {
        if !controller.snapshot().expect("snapshot").is_validating {
            thread::sleep(Duration::from_millis(20));
            return controller.snapshot().expect("snapshot");
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("validations never settled");
}

#[test]
fn slow_stale_rejection_cannot_overwrite_fast_success() {
    let controller = controller();
    controller
        .register_field(
            NAME,
            "",
            FieldBindings::new().on_change(Validator::deferred(|value: String| async move {
                if value == "pizza@gmail.co" {
                    Delay::new(Duration::from_millis(200)).await;
                    Err(format!("{value} failed"))
                } else {
                    Delay::new(Duration::from_millis(1)).await;
                    Ok(String::new())
                }
            })),
        )
        .expect("register");

    controller
        .handle_trigger(NAME, "pizza@gmail.co", Trigger::Change)
        .expect("first change");
    controller
        .handle_trigger(NAME, "pizza@gmail.co.uk", Trigger::Change)
        .expect("second change");
    thread::sleep(Duration::from_millis(300));

    let state = wait_until_settled(&controller);
    assert_eq!(state.error(NAME), None);
    assert_eq!(state.value(NAME), Some("pizza@gmail.co.uk"));
    assert_eq!(controller.field(NAME).expect("field").pending_count, 0);
}

#[test]
fn typing_past_a_taken_address_never_reports_it() {
    let controller = controller();
    controller
        .register_field(
            NAME,
            "",
            FieldBindings::new().on_change(
                Validator::deferred(|value: String| async move {
                    if value == "pizza@gmail.co" {
                        Delay::new(Duration::from_millis(130)).await;
                        Err(format!("{value} failed"))
                    } else {
                        Delay::new(Duration::from_millis(1)).await;
                        Ok(String::new())
                    }
                })
                .on_rejection(|_failure| "ERROR".to_owned()),
            ),
        )
        .expect("register");
    let failed = Arc::new(AtomicBool::new(false));
    let logger = failed.clone();
    controller
        .subscribe(move |state| {
            if state.error(NAME).is_some() {
                logger.store(true, Ordering::SeqCst);
            }
        })
        .expect("subscribe");

    type_into(&controller, "pizza@gmail.co.uk", Duration::from_millis(12));
    thread::sleep(Duration::from_millis(200));

    let state = wait_until_settled(&controller);
    assert_eq!(state.error(NAME), None);
    assert!(!failed.load(Ordering::SeqCst));
}

#[test]
fn rejected_address_is_reported_after_typing() {
    let controller = controller();
    controller
        .register_field(
            NAME,
            "",
            FieldBindings::new().on_change(
                Validator::deferred(|value: String| async move {
                    Delay::new(Duration::from_millis(1)).await;
                    if value == "pizza@gmail.com" {
                        Err(value)
                    } else {
                        Ok(String::new())
                    }
                })
                .on_rejection(|_failure| "EMAIL IS NOT VALID".to_owned()),
            ),
        )
        .expect("register");
    let logged = Arc::new(Mutex::new(Vec::new()));
    let logger = logged.clone();
    controller
        .subscribe(move |state| {
            if let Some(error) = state.error(NAME) {
                logger.lock().expect("logged").push(error.to_owned());
            }
        })
        .expect("subscribe");

    type_into(&controller, "pizza@gmail.com", Duration::from_millis(12));
    let state = wait_until_settled(&controller);

    assert_eq!(state.error(NAME), Some("EMAIL IS NOT VALID"));
    assert!(
        logged
            .lock()
            .expect("logged")
            .iter()
            .any(|error| error == "EMAIL IS NOT VALID")
    );
}

#[test]
fn is_validating_spans_the_pending_validation() {
    let controller = controller();
    controller
        .register_field(
            NAME,
            "",
            FieldBindings::new().on_change(Validator::deferred(|_value: String| async move {
                Delay::new(Duration::from_millis(150)).await;
                Ok::<_, String>(String::new())
            })),
        )
        .expect("register");
    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    controller
        .subscribe(move |state| sink.lock().expect("observed").push(state.is_validating))
        .expect("subscribe");

    assert!(!controller.snapshot().expect("snapshot").is_validating);
    controller
        .handle_trigger(NAME, "pizza@email.com", Trigger::Change)
        .expect("change");

    thread::sleep(Duration::from_millis(10));
    assert!(controller.snapshot().expect("snapshot").is_validating);

    thread::sleep(Duration::from_millis(250));
    assert!(!controller.snapshot().expect("snapshot").is_validating);
    assert_eq!(*observed.lock().expect("observed"), vec![true, false]);
}

#[test]
fn submit_after_validation_settles_delivers_values() {
    let controller = controller();
    controller
        .register_field(
            NAME,
            "",
            FieldBindings::new().on_change(Validator::deferred(|_value: String| async move {
                Delay::new(Duration::from_millis(20)).await;
                Ok::<_, String>(String::new())
            })),
        )
        .expect("register");

    controller
        .handle_trigger(NAME, "pizza@email.com", Trigger::Change)
        .expect("change");
    let blocked = controller.submit(|_state| Ok(())).expect("early submit");
    assert!(matches!(blocked, SubmitOutcome::Blocked(_)));

    wait_until_settled(&controller);
    let outcome = controller.submit(|_state| Ok(())).expect("retry submit");
    let SubmitOutcome::Submitted(state) = outcome else {
        panic!("settled form must submit");
    };
    assert_eq!(state.value(NAME), Some("pizza@email.com"));
    assert!(state.errors.is_empty());
}

#[test]
fn slow_listener_on_another_thread_cannot_deliver_a_stale_snapshot() {
    let controller = controller();
    controller
        .register_field("a", "", FieldBindings::new())
        .expect("register");
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = delivered.clone();
    controller
        .subscribe(move |state| {
            if state.value("a") == Some("first") {
                thread::sleep(Duration::from_millis(100));
            }
            sink.lock()
                .expect("delivered")
                .push((state.revision, state.value("a").map(str::to_owned)));
        })
        .expect("subscribe");

    let writer = controller.clone();
    let first = thread::spawn(move || {
        writer
            .handle_trigger("a", "first", Trigger::Change)
            .expect("first change");
    });
    thread::sleep(Duration::from_millis(20));
    controller
        .handle_trigger("a", "second", Trigger::Change)
        .expect("second change");
    first.join().expect("writer thread");

    let delivered = delivered.lock().expect("delivered").clone();
    let current = controller.snapshot().expect("snapshot");
    assert!(delivered.windows(2).all(|pair| pair[0].0 < pair[1].0));
    let last = delivered.last().expect("deliveries");
    assert_eq!(last.0, current.revision);
    assert_eq!(last.1.as_deref(), Some("second"));
}
