//! VM instance and thread contexts.
//!
//! An [`Instance`] is the process-wide state of one VM: the live thread
//! set, the GC coordination counters, the callsite interner with its seeded
//! common-callsite table, and the collector hook. All of it is initialised
//! explicitly at construction and torn down deterministically when the
//! instance drops, thread contexts first, in attach order.

use std::sync::atomic::Ordering::SeqCst;
use std::sync::atomic::{AtomicPtr, AtomicU32, AtomicU64};
use std::sync::Arc;

use parking_lot::Mutex;
use rook_util::vm_oops;

use crate::callsite::{self, Callsite, CallsiteInterner, CommonCallsiteId};
use crate::config::VmConfig;
use crate::error::Result;
use crate::gc::{Collector, GcStatus, NullCollector};

/// Per-thread VM state the core needs: identity, GC participation status,
/// and the nursery allocation pointer the external allocator maintains.
pub struct ThreadContext {
    thread_id: u32,
    /// One of [`GcStatus`]; mutated only by compare-and-swap.
    gc_status: AtomicU32,
    /// Current nursery allocation pointer, owned by the external allocator.
    nursery_alloc: AtomicPtr<u8>,
}

impl ThreadContext {
    fn new(thread_id: u32) -> Self {
        ThreadContext {
            thread_id,
            gc_status: AtomicU32::new(GcStatus::None as u32),
            nursery_alloc: AtomicPtr::new(std::ptr::null_mut()),
        }
    }

    pub fn thread_id(&self) -> u32 {
        self.thread_id
    }

    pub fn gc_status(&self) -> GcStatus {
        GcStatus::from_raw(self.gc_status.load(SeqCst))
    }

    pub(crate) fn cas_gc_status(&self, current: GcStatus, new: GcStatus) -> std::result::Result<(), GcStatus> {
        self.gc_status
            .compare_exchange(current as u32, new as u32, SeqCst, SeqCst)
            .map(|_| ())
            .map_err(GcStatus::from_raw)
    }

    pub fn nursery_alloc(&self) -> *mut u8 {
        self.nursery_alloc.load(SeqCst)
    }

    pub fn set_nursery_alloc(&self, ptr: *mut u8) {
        self.nursery_alloc.store(ptr, SeqCst);
    }
}

/// A VM instance.
///
/// Constructed with [`Instance::new`] (or [`Instance::with_collector`] to
/// wire in a real nursery collector), which validates the configuration,
/// builds the interner, seeds the common callsites, and attaches the main
/// thread as thread 0.
pub struct Instance {
    config: VmConfig,
    /// Live mutator threads, in attach order; index 0 is the main thread.
    /// The mutex doubles as the freeze point for GC elections.
    pub(crate) threads: Mutex<Vec<Arc<ThreadContext>>>,
    next_thread_id: AtomicU32,

    /// Number of threads the in-progress collection expects; 0 when no
    /// collection is starting. The election CAS target.
    pub(crate) expected_gc_threads: AtomicU32,
    /// Threads opted in to the in-progress collection so far.
    pub(crate) starting_gc: AtomicU32,
    /// Collections started over the life of the instance.
    pub(crate) gc_seq_number: AtomicU64,

    interner: CallsiteInterner,
    common: [Arc<Callsite>; CommonCallsiteId::COUNT],
    pub(crate) collector: Arc<dyn Collector>,
}

impl Instance {
    /// Creates an instance with no real collector wired in.
    pub fn new(config: VmConfig) -> Result<Arc<Instance>> {
        Instance::with_collector(config, Arc::new(NullCollector))
    }

    /// Creates an instance that drives `collector` during GC runs.
    pub fn with_collector(config: VmConfig, collector: Arc<dyn Collector>) -> Result<Arc<Instance>> {
        config.validate()?;

        let interner = CallsiteInterner::with_name_capacity(config.interned_name_capacity);
        let common = callsite::initialize_common(&interner);
        log::debug!("instance: interned {} common callsites", common.len());

        let thread_capacity = config.thread_capacity;
        let instance = Arc::new(Instance {
            config,
            threads: Mutex::new(Vec::with_capacity(thread_capacity)),
            next_thread_id: AtomicU32::new(0),
            expected_gc_threads: AtomicU32::new(0),
            starting_gc: AtomicU32::new(0),
            gc_seq_number: AtomicU64::new(0),
            interner,
            common,
            collector,
        });

        // The main (current) thread gets a context.
        instance.attach_thread();
        Ok(instance)
    }

    /// Registers a new mutator thread with the instance. Must be called
    /// from a thread that is not part of an in-progress collection.
    pub fn attach_thread(&self) -> Arc<ThreadContext> {
        let mut threads = self.threads.lock();
        let tc = Arc::new(ThreadContext::new(self.next_thread_id.fetch_add(1, SeqCst)));
        threads.push(Arc::clone(&tc));
        log::debug!("instance: attached thread {}", tc.thread_id());
        tc
    }

    /// The main thread's context (thread 0).
    pub fn main_thread(&self) -> Arc<ThreadContext> {
        Arc::clone(&self.threads.lock()[0])
    }

    pub fn thread_count(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Collections started so far.
    pub fn gc_seq_number(&self) -> u64 {
        self.gc_seq_number.load(SeqCst)
    }

    /// Threads opted in to the current collection; 0 when idle.
    pub fn starting_gc_count(&self) -> u32 {
        self.starting_gc.load(SeqCst)
    }

    /// Expected participant count of the current collection; 0 when idle.
    pub fn expected_gc_thread_count(&self) -> u32 {
        self.expected_gc_threads.load(SeqCst)
    }

    pub fn interner(&self) -> &CallsiteInterner {
        &self.interner
    }

    /// The shared descriptor for a common callsite ID.
    pub fn get_common(&self, id: CommonCallsiteId) -> Arc<Callsite> {
        Arc::clone(&self.common[id as usize])
    }

    /// Decodes a raw common-callsite ID byte from bytecode and resolves it.
    /// Unknown IDs abort the VM.
    pub fn common_from_raw(&self, raw: u8) -> Arc<Callsite> {
        match CommonCallsiteId::from_raw(raw) {
            Some(id) => self.get_common(id),
            None => vm_oops!("get_common_callsite: id {} unknown", raw),
        }
    }

    /// Whether `cs` is one of the common callsite descriptors, by pointer
    /// identity.
    pub fn is_common(&self, cs: &Arc<Callsite>) -> bool {
        self.common.iter().any(|common| Arc::ptr_eq(common, cs))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        // Thread contexts go first, in attach order; the interner and its
        // descriptors follow with the rest of the fields.
        let threads = self.threads.get_mut();
        log::debug!("instance: tearing down {} thread contexts", threads.len());
        threads.drain(..).for_each(drop);
    }
}
