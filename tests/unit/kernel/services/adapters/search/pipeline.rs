use super::*;
use std::sync::atomic::AtomicUsize;
use std::sync::Mutex;
use std::time::Duration;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn test_signal_ids_are_unique() {
    let a = CancelSignal::new();
    let b = CancelSignal::new();
    assert_ne!(a.id(), b.id());
}

#[test]
fn test_cancel_is_shared_between_clones() {
    let signal = CancelSignal::new();
    let clone = signal.clone();
    assert!(!clone.is_cancelled());
    signal.cancel();
    assert!(clone.is_cancelled());
    assert_eq!(signal.id(), clone.id());
}

#[test]
fn test_concurrency_is_clamped() {
    assert_eq!(ScanPipeline::new(0).concurrency(), 1);
    assert_eq!(ScanPipeline::default().concurrency(), 4);
}

#[test]
fn test_runs_every_item() {
    let rt = create_runtime();
    let pipeline = ScanPipeline::new(3);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let signal = CancelSignal::new();

    let seen_for_op = seen.clone();
    let outcome = rt.block_on(pipeline.run(
        (0..20).collect::<Vec<usize>>(),
        move |i| {
            let seen = seen_for_op.clone();
            async move {
                seen.lock().unwrap().push(i);
            }
        },
        &signal,
        || async {},
    ));

    assert_eq!(outcome, PipelineOutcome::Completed);
    let mut seen = seen.lock().unwrap().clone();
    seen.sort_unstable();
    assert_eq!(seen, (0..20).collect::<Vec<_>>());
}

#[test]
fn test_in_flight_never_exceeds_bound() {
    let rt = create_runtime();
    let pipeline = ScanPipeline::new(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let signal = CancelSignal::new();

    let (active_op, peak_op) = (active.clone(), peak.clone());
    rt.block_on(pipeline.run(
        vec![(); 12],
        move |_| {
            let active = active_op.clone();
            let peak = peak_op.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        },
        &signal,
        || async {},
    ));

    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[test]
fn test_before_each_runs_before_every_item() {
    let rt = create_runtime();
    let pipeline = ScanPipeline::new(1);
    let hooks = Arc::new(AtomicUsize::new(0));
    let signal = CancelSignal::new();

    let hooks_for_hook = hooks.clone();
    rt.block_on(pipeline.run(
        vec![1, 2, 3, 4],
        |_| async {},
        &signal,
        move || {
            let hooks = hooks_for_hook.clone();
            async move {
                hooks.fetch_add(1, Ordering::SeqCst);
            }
        },
    ));

    assert_eq!(hooks.load(Ordering::SeqCst), 4);
}

#[test]
fn test_cancel_stops_scheduling() {
    let rt = create_runtime();
    let pipeline = ScanPipeline::new(1);
    let started = Arc::new(AtomicUsize::new(0));
    let signal = CancelSignal::new();

    let started_op = started.clone();
    let signal_op = signal.clone();
    let outcome = rt.block_on(pipeline.run(
        (0..10).collect::<Vec<usize>>(),
        move |i| {
            let started = started_op.clone();
            let signal = signal_op.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                if i == 2 {
                    signal.cancel();
                }
            }
        },
        &signal,
        || async {},
    ));

    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(started.load(Ordering::SeqCst), 3);
}

#[test]
fn test_cancelled_before_start_runs_nothing() {
    let rt = create_runtime();
    let pipeline = ScanPipeline::new(4);
    let started = Arc::new(AtomicUsize::new(0));
    let signal = CancelSignal::new();
    signal.cancel();

    let started_op = started.clone();
    let outcome = rt.block_on(pipeline.run(
        vec![1, 2, 3],
        move |_| {
            let started = started_op.clone();
            async move {
                started.fetch_add(1, Ordering::SeqCst);
            }
        },
        &signal,
        || async {},
    ));

    assert_eq!(outcome, PipelineOutcome::Cancelled);
    assert_eq!(started.load(Ordering::SeqCst), 0);
}

#[test]
fn test_empty_input_completes() {
    let rt = create_runtime();
    let signal = CancelSignal::new();
    let outcome = rt.block_on(ScanPipeline::new(4).run(
        Vec::<u8>::new(),
        |_| async {},
        &signal,
        || async {},
    ));
    assert_eq!(outcome, PipelineOutcome::Completed);
}
