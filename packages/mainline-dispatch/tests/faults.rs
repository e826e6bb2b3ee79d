use mainline_dispatch::{FailureSink, Fault, ManualClock, ManualTickSource, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    faults: Mutex<Vec<Fault>>,
}

impl RecordingSink {
    fn faults(&self) -> Vec<Fault> {
        self.faults.lock().unwrap().clone()
    }
}

impl FailureSink for RecordingSink {
    fn report(&self, fault: &Fault) {
        self.faults.lock().unwrap().push(fault.clone());
    }
}

fn scheduler_with_sink() -> (Arc<RecordingSink>, Arc<ManualTickSource>, Arc<Scheduler>) {
    let sink = Arc::new(RecordingSink::default());
    let ticks = Arc::new(ManualTickSource::new());
    let scheduler = Scheduler::builder()
        .tick_source(ticks.clone())
        .failure_sink(sink.clone())
        .build();
    (sink, ticks, scheduler)
}

#[test]
fn test_faulting_job_does_not_block_the_queue() {
    let (sink, ticks, scheduler) = scheduler_with_sink();
    let log = Arc::new(Mutex::new(Vec::new()));

    {
        let log = log.clone();
        scheduler.run_with(move || log.lock().unwrap().push("before"), false);
    }
    scheduler.run_with(|| panic!("job exploded"), false);
    {
        let log = log.clone();
        scheduler.run_with(move || log.lock().unwrap().push("after"), false);
    }

    ticks.tick();

    assert_eq!(*log.lock().unwrap(), vec!["before", "after"]);
    assert_eq!(
        sink.faults(),
        vec![Fault::Job {
            message: "job exploded".into()
        }]
    );

    let metrics = scheduler.metrics();
    assert_eq!(metrics.jobs_executed, 2);
    assert_eq!(metrics.job_faults, 1);
    assert_eq!(metrics.queued_jobs, 0);

    // A later tick keeps working.
    {
        let log = log.clone();
        scheduler.run_with(move || log.lock().unwrap().push("next"), false);
    }
    ticks.tick();
    assert_eq!(log.lock().unwrap().last(), Some(&"next"));
}

#[test]
fn test_faulting_predicate_is_removed() {
    let (sink, ticks, scheduler) = scheduler_with_sink();
    let polls = Arc::new(AtomicUsize::new(0));

    scheduler.poll_until_complete(|| -> bool { panic!("predicate exploded") });
    {
        let polls = polls.clone();
        scheduler.poll_until_complete(move || polls.fetch_add(1, Ordering::SeqCst) + 1 >= 2);
    }

    ticks.tick();
    ticks.tick();
    ticks.tick();

    assert_eq!(polls.load(Ordering::SeqCst), 2);
    assert_eq!(
        sink.faults(),
        vec![Fault::Predicate {
            message: "predicate exploded".into()
        }]
    );
    assert_eq!(scheduler.metrics().predicate_faults, 1);
    assert!(scheduler.is_idle());
}

#[test]
fn test_faulting_delayed_job_reports_job_fault() {
    let sink = Arc::new(RecordingSink::default());
    let clock = Arc::new(ManualClock::new());
    let scheduler = Scheduler::builder()
        .clock(clock.clone())
        .failure_sink(sink.clone())
        .build();
    let hits = Arc::new(AtomicUsize::new(0));

    scheduler.schedule(|| panic!("delayed job exploded"), Duration::from_millis(1));
    {
        let hits = hits.clone();
        scheduler.schedule(
            move || {
                hits.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(1),
        );
    }

    clock.advance(Duration::from_millis(1));
    scheduler.execute_all();

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(matches!(sink.faults().as_slice(), [Fault::Job { .. }]));
    assert!(scheduler.is_idle());
}

#[test]
fn test_execute_all_off_main_thread_is_rejected() {
    let (sink, _ticks, scheduler) = scheduler_with_sink();
    let hits = Arc::new(AtomicUsize::new(0));

    {
        let hits = hits.clone();
        scheduler.run_with(
            move || {
                hits.fetch_add(1, Ordering::SeqCst);
            },
            false,
        );
    }

    {
        let scheduler = scheduler.clone();
        thread::spawn(move || scheduler.execute_all())
            .join()
            .unwrap();
    }

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(matches!(
        sink.faults().as_slice(),
        [Fault::WrongThread {
            operation: "execute_all",
            ..
        }]
    ));

    scheduler.execute_all();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_unknown_id_is_silent() {
    let (sink, _ticks, scheduler) = scheduler_with_sink();
    let unknown = mainline_dispatch::JobId::new(4242).unwrap();
    assert!(!scheduler.cancel(unknown));
    assert!(sink.faults().is_empty());
}
