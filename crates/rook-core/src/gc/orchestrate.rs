//! The stop-the-world orchestration protocol.
//!
//! A collection starts when some thread exhausts its nursery budget and
//! calls [`Instance::enter_from_allocator`]. With the thread set frozen
//! under its mutex, exactly one such thread wins a CAS on
//! `expected_gc_threads` and becomes the coordinator; it signals every
//! other thread, waits for all of them to opt in on the `starting_gc`
//! barrier, and runs the collection. Threads blocked in syscalls cannot
//! opt themselves in, so the coordinator claims their work: it marks them
//! `Stolen`, increments the barrier on their behalf, collects their
//! nurseries after its own, and restores them to `Unable` before retiring
//! the run.
//!
//! `starting_gc` is incremented exactly once per expected participant -
//! either by the thread itself (the `None`/`Interrupt` paths) or by the
//! coordinator for it (the `Unable`/`Stolen` path). `expected_gc_threads`
//! is frozen before any signalling begins, so no thread can join the set
//! after the count is taken.
//!
//! There are no timeouts. A mutator that never reaches a safepoint hangs
//! the collection; that is the contract, and the bug is in the mutator.

use std::sync::atomic::Ordering::SeqCst;
use std::sync::Arc;
use std::thread;

use crossbeam_utils::Backoff;
use rook_util::fatal::exitcode;
use rook_util::vm_panic;

use crate::gc::{GcStatus, PermRoots};
use crate::instance::{Instance, ThreadContext};

impl Instance {
    /// The polling safepoint check. Mutators call this at safepoint
    /// locations; if a coordinator has asked for a collection, the thread
    /// opts in here and returns once the run is over.
    pub fn safepoint(&self, tc: &ThreadContext) {
        if tc.gc_status() == GcStatus::Interrupt {
            self.enter_from_interrupt(tc);
        }
    }

    /// Entry point from the allocator slow path: the nursery is exhausted
    /// and a collection must happen. Whoever gets here first coordinates;
    /// everyone else enlists.
    pub fn enter_from_allocator(&self, tc: &ThreadContext) {
        loop {
            // Freeze the thread set while the run starts, so the expected
            // participant count is exact and stable before any signalling.
            let threads = self.threads.lock();
            let num_gc_threads = threads.len() as u32;

            if self
                .expected_gc_threads
                .compare_exchange(0, num_gc_threads, SeqCst, SeqCst)
                .is_ok()
            {
                // Won the starting race: coordinate the run.
                let seq = self.gc_seq_number.fetch_add(1, SeqCst) + 1;
                log::debug!(
                    "gc: thread {} elected coordinator for run {} ({} threads)",
                    tc.thread_id(),
                    seq,
                    num_gc_threads
                );

                // Count ourselves in, then signal everyone else.
                self.starting_gc.fetch_add(1, SeqCst);
                let others: Vec<Arc<ThreadContext>> = threads
                    .iter()
                    .filter(|other| other.thread_id() != tc.thread_id())
                    .cloned()
                    .collect();
                for target in &others {
                    self.signal_one_thread(target);
                }
                drop(threads);

                self.wait_for_all_threads();
                self.run_gc(tc, PermRoots::Process);
                self.finish_stolen_work(&others);

                // Retire the run. `starting_gc` goes first; the zero write
                // to `expected_gc_threads` is what opens the next election.
                self.starting_gc.store(0, SeqCst);
                self.expected_gc_threads.store(0, SeqCst);
                log::debug!("gc: run {} complete", seq);
                return;
            }
            drop(threads);

            // Lost the starting race. If we were in the set when the winner
            // froze it, its interrupt is on the way (or already here);
            // enlist once it lands. If we attached after the freeze, the
            // run finishes without us and we retry our own election.
            let backoff = Backoff::new();
            loop {
                if tc.gc_status() == GcStatus::Interrupt {
                    self.enter_from_interrupt(tc);
                    return;
                }
                if self.expected_gc_threads.load(SeqCst) == 0 {
                    break;
                }
                backoff.snooze();
            }
        }
    }

    /// Entry point from a safepoint interrupt: another thread is starting a
    /// collection, so just enlist in it.
    pub fn enter_from_interrupt(&self, tc: &ThreadContext) {
        // Consume the interrupt. Anything else here means the state machine
        // has a hole.
        if let Err(actual) = tc.cas_gc_status(GcStatus::Interrupt, GcStatus::None) {
            vm_panic!(
                exitcode::GCORCH,
                "thread {} entered collection with status {:?}; aborting",
                tc.thread_id(),
                actual
            );
        }
        log::debug!("gc: thread {} entered from interrupt", tc.thread_id());

        // Count us in to the GC run, wait for the barrier, do our share.
        self.starting_gc.fetch_add(1, SeqCst);
        self.wait_for_all_threads();
        self.run_gc(tc, PermRoots::Skip);
    }

    /// Marks the calling thread as about to block in a syscall, so that a
    /// coordinator knows it cannot run its own collection work.
    pub fn mark_thread_blocked(&self, tc: &ThreadContext) {
        loop {
            match tc.cas_gc_status(GcStatus::None, GcStatus::Unable) {
                Ok(()) => return,
                // The only legal way the CAS fails: we were just opted into
                // a collection. Join it, then mark blocked again.
                Err(GcStatus::Interrupt) => self.enter_from_interrupt(tc),
                Err(actual) => vm_panic!(
                    exitcode::GCORCH,
                    "invalid GC status {:?} while blocking thread {}; aborting",
                    actual,
                    tc.thread_id()
                ),
            }
        }
    }

    /// Marks the calling thread as returned from a blocking syscall. If a
    /// collection stole this thread's work, the thread waits here until the
    /// coordinator is done with it.
    pub fn mark_thread_unblocked(&self, tc: &ThreadContext) {
        loop {
            match tc.cas_gc_status(GcStatus::Unable, GcStatus::None) {
                Ok(()) => return,
                Err(GcStatus::Stolen) => thread::yield_now(),
                Err(actual) => vm_panic!(
                    exitcode::GCORCH,
                    "invalid GC status {:?} while unblocking thread {}; aborting",
                    actual,
                    tc.thread_id()
                ),
            }
        }
    }

    /// Notifies one other thread that a run is starting. Loops because the
    /// target may be moving between states while we try.
    pub(crate) fn signal_one_thread(&self, target: &ThreadContext) {
        loop {
            // Running → interrupted is the common case; the target notices
            // at its next safepoint and opts itself in.
            if target
                .cas_gc_status(GcStatus::None, GcStatus::Interrupt)
                .is_ok()
            {
                return;
            }

            // Otherwise it is blocked: steal its work. That opts it in, so
            // the barrier count is incremented on its behalf.
            if target
                .cas_gc_status(GcStatus::Unable, GcStatus::Stolen)
                .is_ok()
            {
                self.starting_gc.fetch_add(1, SeqCst);
                log::debug!("gc: stole work of blocked thread {}", target.thread_id());
                return;
            }
        }
    }

    /// Spins until every expected participant has opted in.
    fn wait_for_all_threads(&self) {
        log::trace!("gc: waiting for all threads");
        let backoff = Backoff::new();
        while self.starting_gc.load(SeqCst) != self.expected_gc_threads.load(SeqCst) {
            backoff.snooze();
        }
        log::trace!("gc: all threads registered for the run");
    }

    /// One thread's share of a collection: collect its nursery, then free
    /// what was not copied out of it.
    fn run_gc(&self, tc: &ThreadContext, perms: PermRoots) {
        // The current nursery allocation pointer bounds the later sweep.
        let limit = tc.nursery_alloc();
        self.collector.nursery_collect(tc, perms);
        self.collector.nursery_free_uncopied(tc, limit);
    }

    /// Coordinator only: run the collection of every stolen thread on its
    /// behalf, then hand each back to its blocked state.
    fn finish_stolen_work(&self, others: &[Arc<ThreadContext>]) {
        for target in others {
            if target.gc_status() == GcStatus::Stolen {
                log::debug!(
                    "gc: collecting on behalf of blocked thread {}",
                    target.thread_id()
                );
                self.run_gc(target, PermRoots::Skip);
                if let Err(actual) = target.cas_gc_status(GcStatus::Stolen, GcStatus::Unable) {
                    vm_panic!(
                        exitcode::GCORCH,
                        "stolen thread {} changed status to {:?} mid-collection; aborting",
                        target.thread_id(),
                        actual
                    );
                }
            }
        }
    }
}
