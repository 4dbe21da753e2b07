//! GC orchestration integration tests.
//!
//! These drive the stop-the-world protocol with real OS threads: coordinator
//! election, safepoint opt-in, work stealing from blocked threads, and the
//! barrier bookkeeping around a run.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering::SeqCst};
use std::sync::{mpsc, Arc};
use std::thread;

use common::VmFixture;
use rook_core::{GcStatus, PermRoots};

#[test]
fn single_thread_collection_runs_and_retires() {
    let fixture = VmFixture::new();
    let instance = &fixture.instance;
    let tc = instance.main_thread();

    instance.enter_from_allocator(&tc);

    assert_eq!(instance.gc_seq_number(), 1);
    assert_eq!(fixture.collector.collections(), vec![(0, PermRoots::Process)]);
    assert_eq!(fixture.collector.frees_for(0), 1);
    assert_eq!(instance.starting_gc_count(), 0);
    assert_eq!(instance.expected_gc_thread_count(), 0);
    assert_eq!(tc.gc_status(), GcStatus::None);
}

#[test]
fn safepoint_without_interrupt_is_a_noop() {
    let fixture = VmFixture::new();
    let tc = fixture.instance.main_thread();

    fixture.instance.safepoint(&tc);

    assert_eq!(fixture.instance.gc_seq_number(), 0);
    assert!(fixture.collector.collections().is_empty());
}

#[test]
fn repeated_collections_advance_the_sequence_number() {
    let fixture = VmFixture::new();
    let tc = fixture.instance.main_thread();

    for expected in 1..=3 {
        fixture.instance.enter_from_allocator(&tc);
        assert_eq!(fixture.instance.gc_seq_number(), expected);
    }
    assert_eq!(fixture.collector.collections_for(0), 3);
}

#[test]
fn blocked_then_unblocked_round_trip() {
    let fixture = VmFixture::new();
    let instance = Arc::clone(&fixture.instance);
    let tc = instance.attach_thread();

    let worker_instance = Arc::clone(&instance);
    let worker_tc = Arc::clone(&tc);
    let (blocked_tx, blocked_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        worker_instance.mark_thread_blocked(&worker_tc);
        blocked_tx.send(()).unwrap();
        resume_rx.recv().unwrap();
        worker_instance.mark_thread_unblocked(&worker_tc);
    });

    blocked_rx.recv().unwrap();
    assert_eq!(tc.gc_status(), GcStatus::Unable);

    resume_tx.send(()).unwrap();
    worker.join().unwrap();
    assert_eq!(tc.gc_status(), GcStatus::None);
}

/// The full three-thread choreography: A is blocked in a "syscall", B runs
/// out of nursery and coordinates, C (the main thread) opts in from a
/// safepoint. The coordinator steals A's work, runs it, and hands A back to
/// its blocked state; A resumes only afterwards.
#[test]
fn blocked_thread_work_is_stolen() {
    let fixture = VmFixture::new();
    let instance = Arc::clone(&fixture.instance);
    let main_tc = instance.main_thread();
    let tc_a = instance.attach_thread();
    let tc_b = instance.attach_thread();

    // A: block, report, wait for the test to let it resume.
    let (blocked_tx, blocked_rx) = mpsc::channel();
    let (resume_tx, resume_rx) = mpsc::channel();
    let a_instance = Arc::clone(&instance);
    let a_tc = Arc::clone(&tc_a);
    let a = thread::spawn(move || {
        a_instance.mark_thread_blocked(&a_tc);
        blocked_tx.send(()).unwrap();
        resume_rx.recv().unwrap();
        a_instance.mark_thread_unblocked(&a_tc);
    });

    blocked_rx.recv().unwrap();
    assert_eq!(tc_a.gc_status(), GcStatus::Unable);

    // B: exhaust the nursery budget and trigger the run.
    let b_instance = Arc::clone(&instance);
    let b_tc = Arc::clone(&tc_b);
    let b = thread::spawn(move || b_instance.enter_from_allocator(&b_tc));

    // C: poll safepoints until we have taken part in the run.
    while fixture.collector.collections_for(main_tc.thread_id()) == 0 {
        instance.safepoint(&main_tc);
        thread::yield_now();
    }
    b.join().unwrap();

    // Exactly one collection happened.
    assert_eq!(instance.gc_seq_number(), 1);

    // Every nursery was collected exactly once; only the coordinator
    // processed perm roots.
    let collections = fixture.collector.collections();
    assert_eq!(collections.len(), 3);
    assert!(collections.contains(&(tc_b.thread_id(), PermRoots::Process)));
    assert!(collections.contains(&(main_tc.thread_id(), PermRoots::Skip)));
    assert!(collections.contains(&(tc_a.thread_id(), PermRoots::Skip)));
    assert_eq!(fixture.collector.frees_for(tc_a.thread_id()), 1);

    // A was handed back to its blocked state; the barrier was retired.
    assert_eq!(tc_a.gc_status(), GcStatus::Unable);
    assert_eq!(main_tc.gc_status(), GcStatus::None);
    assert_eq!(tc_b.gc_status(), GcStatus::None);
    assert_eq!(instance.starting_gc_count(), 0);
    assert_eq!(instance.expected_gc_thread_count(), 0);

    // Only now may A resume.
    resume_tx.send(()).unwrap();
    a.join().unwrap();
    assert_eq!(tc_a.gc_status(), GcStatus::None);
}

/// Several threads hammering the allocator entry point at once: elections
/// coalesce, every entry is satisfied, and the counters come back to rest.
#[test]
fn elections_coalesce_under_contention() {
    const WORKERS: usize = 4;
    const RUNS_PER_WORKER: usize = 3;

    let fixture = VmFixture::new();
    let instance = Arc::clone(&fixture.instance);
    let main_tc = instance.main_thread();
    let finished = Arc::new(AtomicUsize::new(0));

    let mut workers = Vec::new();
    for _ in 0..WORKERS {
        let tc = instance.attach_thread();
        let worker_instance = Arc::clone(&instance);
        let worker_finished = Arc::clone(&finished);
        workers.push(thread::spawn(move || {
            for _ in 0..RUNS_PER_WORKER {
                worker_instance.enter_from_allocator(&tc);
            }
            // Leave mutator-land so later runs can steal our work instead
            // of waiting on us.
            worker_instance.mark_thread_blocked(&tc);
            worker_finished.fetch_add(1, SeqCst);
        }));
    }

    // The main thread keeps its end of the contract: it polls safepoints
    // while the workers churn.
    while finished.load(SeqCst) < WORKERS {
        instance.safepoint(&main_tc);
        thread::yield_now();
    }
    for worker in workers {
        worker.join().unwrap();
    }

    // Entries coalesce into shared runs, but never below one run per
    // per-worker round, and the bookkeeping must be back at rest.
    assert!(instance.gc_seq_number() >= RUNS_PER_WORKER as u64);
    assert_eq!(instance.starting_gc_count(), 0);
    assert_eq!(instance.expected_gc_thread_count(), 0);
    assert_eq!(main_tc.gc_status(), GcStatus::None);
}
