//! Dispatch-order and cancellation contracts of the event scheduler.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use proptest::prelude::*;
use stingray_core::{Scheduler, StingrayError};

#[test]
fn equal_fire_times_keep_enqueue_order_across_interleaved_delays() {
    let mut sched = Scheduler::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    // Three batches at the same instant, interleaved with other fire-times.
    for (tag, delay_ms) in [(0u32, 100u64), (1, 50), (2, 100), (3, 200), (4, 100)] {
        let log = log.clone();
        sched
            .schedule_in(
                Duration::from_millis(delay_ms),
                Box::new(move |_| {
                    log.borrow_mut().push(tag);
                    Ok(())
                }),
            )
            .unwrap();
    }

    sched.run_until(Duration::from_secs(1)).unwrap();
    assert_eq!(*log.borrow(), vec![1, 0, 2, 4, 3]);
}

proptest! {
    /// For all sequences of schedule calls, dispatch order is
    /// non-decreasing in fire-time with FIFO among equal fire-times.
    #[test]
    fn dispatch_order_is_a_stable_sort_by_fire_time(delays_ms in prop::collection::vec(0u64..500, 1..64)) {
        let mut sched = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        for (index, delay_ms) in delays_ms.iter().enumerate() {
            let log = log.clone();
            sched
                .schedule_in(
                    Duration::from_millis(*delay_ms),
                    Box::new(move |_| {
                        log.borrow_mut().push(index);
                        Ok(())
                    }),
                )
                .unwrap();
        }
        sched.run_until(Duration::from_secs(1)).unwrap();

        let mut expected: Vec<usize> = (0..delays_ms.len()).collect();
        expected.sort_by_key(|index| delays_ms[*index]); // stable: ties keep enqueue order
        prop_assert_eq!(&*log.borrow(), &expected);
    }
}

#[test]
fn cancellation_before_and_after_dispatch() {
    let mut sched = Scheduler::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut handles = Vec::new();

    for tag in 0..5u32 {
        let log = log.clone();
        let handle = sched
            .schedule_in(
                Duration::from_millis(100 * (tag as u64 + 1)),
                Box::new(move |_| {
                    log.borrow_mut().push(tag);
                    Ok(())
                }),
            )
            .unwrap();
        handles.push(handle);
    }

    // Cancel events 1 and 3 before anything fires.
    sched.cancel(handles[1]);
    sched.cancel(handles[3]);
    sched.run_until(Duration::from_secs(1)).unwrap();
    assert_eq!(*log.borrow(), vec![0, 2, 4]);

    // Cancelling already-fired handles is a no-op, not an error.
    for handle in handles {
        sched.cancel(handle);
    }
    sched.run_until(Duration::from_secs(2)).unwrap();
    assert_eq!(*log.borrow(), vec![0, 2, 4]);
}

#[test]
fn a_periodic_task_can_cancel_itself_via_its_pending_handle() {
    // The self-rescheduling pattern: each firing schedules the next and
    // publishes its handle, which an outside party can cancel.
    struct Periodic {
        fired: u32,
        pending: Option<stingray_core::EventHandle>,
    }

    fn tick(task: &Rc<RefCell<Periodic>>, sched: &mut Scheduler) -> stingray_core::Result<()> {
        let mut task_ref = task.borrow_mut();
        task_ref.fired += 1;
        let again = task.clone();
        let handle =
            sched.schedule_in(Duration::from_secs(1), Box::new(move |s| tick(&again, s)))?;
        task_ref.pending = Some(handle);
        Ok(())
    }

    let mut sched = Scheduler::new();
    let task = Rc::new(RefCell::new(Periodic {
        fired: 0,
        pending: None,
    }));
    let first = task.clone();
    sched
        .schedule_in(Duration::from_secs(1), Box::new(move |s| tick(&first, s)))
        .unwrap();

    sched.run_until(Duration::from_millis(3500)).unwrap();
    assert_eq!(task.borrow().fired, 3);

    let pending = task.borrow_mut().pending.take().unwrap();
    sched.cancel(pending);
    sched.run_until(Duration::from_secs(60)).unwrap();
    assert_eq!(task.borrow().fired, 3);
}

#[test]
fn callback_failure_surfaces_with_the_fire_time() {
    let mut sched = Scheduler::new();
    sched
        .schedule_in(
            Duration::from_millis(1500),
            Box::new(|_| {
                Err(StingrayError::Scenario {
                    reason: "injected".to_string(),
                })
            }),
        )
        .unwrap();

    let result = sched.run_until(Duration::from_secs(10));
    match result {
        Err(StingrayError::CallbackFailure { at, source }) => {
            assert_eq!(at, Duration::from_millis(1500));
            assert!(matches!(*source, StingrayError::Scenario { .. }));
        }
        other => panic!("expected CallbackFailure, got {other:?}"),
    }
}
