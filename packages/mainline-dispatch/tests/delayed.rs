use mainline_dispatch::{ManualClock, ManualTickSource, Scheduler};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    clock: Arc<ManualClock>,
    ticks: Arc<ManualTickSource>,
    scheduler: Arc<Scheduler>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(ManualClock::new());
        let ticks = Arc::new(ManualTickSource::new());
        let scheduler = Scheduler::builder()
            .clock(clock.clone())
            .tick_source(ticks.clone())
            .build();
        Self {
            clock,
            ticks,
            scheduler,
        }
    }

    fn advance_and_tick(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
        self.ticks.tick();
    }
}

fn counter(hits: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let hits = hits.clone();
    move || {
        hits.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_shorter_delay_fires_first() {
    let h = Harness::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    for (name, ms) in [("a", 50), ("b", 10)] {
        let log = log.clone();
        h.scheduler
            .schedule(move || log.lock().unwrap().push(name), Duration::from_millis(ms));
    }

    h.advance_and_tick(10);
    assert_eq!(*log.lock().unwrap(), vec!["b"]);

    h.advance_and_tick(40);
    assert_eq!(*log.lock().unwrap(), vec!["b", "a"]);
}

#[test]
fn test_never_fires_early_and_fires_once() {
    let h = Harness::new();
    let hits = Arc::new(AtomicUsize::new(0));

    for delay in [0u64, 1, 7, 30] {
        hits.store(0, Ordering::SeqCst);
        h.scheduler
            .schedule(counter(&hits), Duration::from_millis(delay));

        for _ in 0..delay {
            // Tick without time passing first; nothing is due before `delay`.
            h.ticks.tick();
            assert_eq!(hits.load(Ordering::SeqCst), 0, "delay {delay}ms fired early");
            h.clock.advance(Duration::from_millis(1));
        }

        h.ticks.tick();
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        h.advance_and_tick(100);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn test_zero_delay_runs_on_next_tick_not_inline() {
    let h = Harness::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let id = h.scheduler.schedule(counter(&hits), Duration::ZERO);
    assert!(id.get() != 0);
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    h.ticks.tick();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    h.ticks.tick();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_before_due() {
    let h = Harness::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let id = h
        .scheduler
        .schedule(counter(&hits), Duration::from_millis(20));
    h.advance_and_tick(5);
    assert!(h.scheduler.cancel(id));

    h.advance_and_tick(50);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(h.scheduler.is_idle());
}

#[test]
fn test_cancel_after_fire_and_twice_is_noop() {
    let h = Harness::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let id = h
        .scheduler
        .schedule(counter(&hits), Duration::from_millis(5));
    h.advance_and_tick(5);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    assert!(!h.scheduler.cancel(id));
    assert!(!h.scheduler.cancel(id));
    assert_eq!(h.scheduler.metrics().job_faults, 0);
}

#[test]
fn test_jobs_may_schedule_and_cancel_from_inside() {
    let h = Harness::new();
    let hits = Arc::new(AtomicUsize::new(0));

    let victim = h
        .scheduler
        .schedule(counter(&hits), Duration::from_millis(10));

    {
        let sch = h.scheduler.clone();
        let hits = hits.clone();
        h.scheduler.schedule(
            move || {
                sch.cancel(victim);
                sch.schedule(counter(&hits), Duration::ZERO);
            },
            Duration::from_millis(5),
        );
    }

    h.advance_and_tick(5);
    // The follow-up was appended past the cursor and ran in the same pass, after the canceller returned.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(h.scheduler.metrics().delayed_jobs, 0);

    h.advance_and_tick(5);
    // The victim was cancelled; only the follow-up ran.
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert!(h.scheduler.is_idle());
}
