//! Bounded pool of rendering surfaces
//!
//! Keyed by message id so a list view can recycle its rows without reloading
//! ad content. Least recently obtained entries are evicted past capacity, and
//! each evicted handle is destroyed exactly once.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::DEFAULT_SURFACE_POOL_SIZE;

/// Native side of a rendering surface.
pub trait SurfaceBackend: Send + Sync {
    type Handle: Clone + Send;

    fn create(&self, key: &str) -> Self::Handle;
    /// Detach from whatever container currently holds the surface.
    fn detach(&self, handle: &Self::Handle);
    /// Release the native resource. Never called twice for one handle.
    fn destroy(&self, handle: Self::Handle);
    /// Deliver one encoded protocol message to the content in the surface.
    fn post_message(&self, handle: &Self::Handle, message: &str);
}

#[derive(Debug)]
struct PoolEntry<H> {
    handle: H,
    last_height: u32,
}

#[derive(Debug)]
struct PoolState<H> {
    entries: HashMap<String, PoolEntry<H>>,
    /// Front = least recently used
    order: VecDeque<String>,
}

impl<H> PoolState<H> {
    fn touch(&mut self, key: &str) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            if let Some(k) = self.order.remove(pos) {
                self.order.push_back(k);
            }
        }
    }
}

pub struct SurfacePool<B: SurfaceBackend> {
    backend: B,
    capacity: usize,
    state: Mutex<PoolState<B::Handle>>,
}

impl<B: SurfaceBackend> SurfacePool<B> {
    pub fn new(backend: B, capacity: usize) -> Self {
        Self {
            backend,
            capacity: capacity.max(1),
            state: Mutex::new(PoolState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn with_default_capacity(backend: B) -> Self {
        Self::new(backend, DEFAULT_SURFACE_POOL_SIZE)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<B::Handle>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Handle for `key`: the pooled one, detached from its old container, or
    /// a freshly created one.
    pub fn obtain(&self, key: &str) -> B::Handle {
        let mut evicted = Vec::new();
        let handle = {
            let mut state = self.lock();
            if let Some(entry) = state.entries.get(key) {
                let handle = entry.handle.clone();
                state.touch(key);
                drop(state);
                self.backend.detach(&handle);
                return handle;
            }

            let handle = self.backend.create(key);
            state.entries.insert(
                key.to_string(),
                PoolEntry {
                    handle: handle.clone(),
                    last_height: 0,
                },
            );
            state.order.push_back(key.to_string());

            while state.order.len() > self.capacity {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                if let Some(entry) = state.entries.remove(&oldest) {
                    evicted.push((oldest, entry.handle));
                }
            }
            handle
        };

        for (key, handle) in evicted {
            tracing::debug!(key = %key, "Evicting pooled surface");
            self.backend.detach(&handle);
            self.backend.destroy(handle);
        }
        handle
    }

    pub fn update_height(&self, key: &str, height: u32) {
        if let Some(entry) = self.lock().entries.get_mut(key) {
            entry.last_height = height;
        }
    }

    /// Last reported height, 0 when unknown.
    pub fn last_height(&self, key: &str) -> u32 {
        self.lock()
            .entries
            .get(key)
            .map(|e| e.last_height)
            .unwrap_or(0)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Destroy every pooled surface.
    pub fn clear_all(&self) {
        let drained: Vec<_> = {
            let mut state = self.lock();
            state.order.clear();
            state.entries.drain().collect()
        };
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Clearing surface pool");
        }
        for (_, entry) in drained {
            self.backend.detach(&entry.handle);
            self.backend.destroy(entry.handle);
        }
    }
}
