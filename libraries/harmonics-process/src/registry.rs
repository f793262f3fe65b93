//! Lifecycle registry
//!
//! The one place that knows which decoder processes and stream tasks are alive
//! and how to tear them down. It is an ordinary value passed around behind an
//! `Arc`; there is no global instance.

use crate::error::Result;
use crate::subprocess::ProcessHandle;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Registry key. Issued in increasing order and never reused.
pub type ResourceId = u64;

/// A background task that can be shut down from any thread
pub trait Closeable: Send + Sync {
    fn close(&self) -> Result<()>;

    fn describe(&self) -> String;
}

/// Something the registry can tear down
pub enum Resource {
    Process(ProcessHandle),
    Task(Arc<dyn Closeable>),
}

impl Resource {
    fn describe(&self) -> String {
        match self {
            Resource::Process(handle) => handle.describe(),
            Resource::Task(task) => task.describe(),
        }
    }

    fn teardown(self) -> Result<()> {
        match self {
            Resource::Process(handle) => handle.terminate(),
            Resource::Task(task) => task.close(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Outcome of [`LifecycleRegistry::shutdown_all`]
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub destroyed: usize,
    pub failures: Vec<(ResourceId, String)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct LifecycleRegistry {
    next_id: AtomicU64,
    resources: Mutex<HashMap<ResourceId, Resource>>,
}

impl LifecycleRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            resources: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ResourceId, Resource>> {
        lock(&self.resources)
    }

    pub fn register(&self, resource: Resource) -> ResourceId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let label = resource.describe();
        let mut entries = self.entries();
        entries.insert(id, resource);
        info!(id, resource = %label, active = entries.len(), "Registered resource");
        id
    }

    /// Tear down one resource. Returns `Ok(false)` if the id is unknown or
    /// was already destroyed.
    pub fn destroy(&self, id: ResourceId) -> Result<bool> {
        let (resource, remaining) = {
            let mut entries = self.entries();
            let resource = entries.remove(&id);
            (resource, entries.len())
        };

        let Some(resource) = resource else {
            return Ok(false);
        };

        // Teardown may block for the kill grace period; the lock is released
        let label = resource.describe();
        resource.teardown()?;
        info!(id, resource = %label, remaining, "Destroyed resource");
        Ok(true)
    }

    /// Destroy everything still registered, continuing past failures
    pub fn shutdown_all(&self) -> ShutdownReport {
        let drained: Vec<(ResourceId, Resource)> = self.entries().drain().collect();
        if drained.is_empty() {
            return ShutdownReport::default();
        }

        info!(count = drained.len(), "Shutting down all resources");
        let mut report = ShutdownReport::default();
        for (id, resource) in drained {
            let label = resource.describe();
            match resource.teardown() {
                Ok(()) => report.destroyed += 1,
                Err(e) => {
                    warn!(id, resource = %label, "Failed to destroy resource: {}", e);
                    report.failures.push((id, e.to_string()));
                }
            }
        }
        info!(
            destroyed = report.destroyed,
            failed = report.failures.len(),
            "Shutdown complete"
        );
        report
    }

    pub fn contains(&self, id: ResourceId) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Default for LifecycleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LifecycleRegistry {
    fn drop(&mut self) {
        if !self.is_empty() {
            warn!(active = self.len(), "Registry dropped with live resources");
            self.shutdown_all();
        }
    }
}

impl fmt::Debug for LifecycleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleRegistry")
            .field("active", &self.len())
            .finish()
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
