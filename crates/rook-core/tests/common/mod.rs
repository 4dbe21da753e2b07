//! Shared fixtures for the orchestration integration tests.

use std::sync::{Arc, Mutex};

use rook_core::gc::{Collector, PermRoots};
use rook_core::{Instance, ThreadContext, VmConfig};

/// A collector that records every call the orchestrator drives through it,
/// so tests can assert who collected, for whom, and with which perm-root
/// setting.
pub struct RecordingCollector {
    collections: Mutex<Vec<(u32, PermRoots)>>,
    frees: Mutex<Vec<u32>>,
}

impl RecordingCollector {
    pub fn new() -> Arc<RecordingCollector> {
        Arc::new(RecordingCollector {
            collections: Mutex::new(Vec::new()),
            frees: Mutex::new(Vec::new()),
        })
    }

    /// Every `(thread_id, perms)` collection recorded so far.
    pub fn collections(&self) -> Vec<(u32, PermRoots)> {
        self.collections.lock().unwrap().clone()
    }

    /// How many collections have run for the given thread's nursery.
    pub fn collections_for(&self, thread_id: u32) -> usize {
        self.collections
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == thread_id)
            .count()
    }

    /// How many uncopied-sweep calls have run for the given thread.
    pub fn frees_for(&self, thread_id: u32) -> usize {
        self.frees
            .lock()
            .unwrap()
            .iter()
            .filter(|id| **id == thread_id)
            .count()
    }
}

impl Collector for RecordingCollector {
    fn nursery_collect(&self, tc: &ThreadContext, perms: PermRoots) {
        self.collections
            .lock()
            .unwrap()
            .push((tc.thread_id(), perms));
    }

    fn nursery_free_uncopied(&self, tc: &ThreadContext, _limit: *mut u8) {
        self.frees.lock().unwrap().push(tc.thread_id());
    }
}

/// An instance wired to a [`RecordingCollector`].
pub struct VmFixture {
    pub instance: Arc<Instance>,
    pub collector: Arc<RecordingCollector>,
}

impl VmFixture {
    pub fn new() -> VmFixture {
        let collector = RecordingCollector::new();
        let instance = Instance::with_collector(VmConfig::default(), collector.clone())
            .expect("default config must bootstrap");
        VmFixture {
            instance,
            collector,
        }
    }
}
