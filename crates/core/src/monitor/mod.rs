//! Monitor hooks, statistics, and tracers.
//!
//! Caches and the memory leaf expose three non-functional observation points
//! (read, write, manage) plus a keyed magic side-channel. This module
//! provides:
//! 1. **`Monitor`:** The observer trait with lifecycle control.
//! 2. **`MonitorContainer`:** The per-cache dispatcher that fans hooks out to
//!    attached monitors and the delay estimator.
//! 3. **Implementations:** Access counters and a tracing-based access log.
//! 4. **Delay models:** Latency contributions per access class.

/// Delay estimation models.
pub mod delay;

pub use delay::{DelayCoherentCache, DelayL1, DelayMemory, DelayModel};

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::cache::meta::Meta;
use crate::common::DataBlock;

/// One observed cache access, as passed to monitors.
#[derive(Clone, Copy, Debug)]
pub struct AccessEvent {
    /// Unique id of the observed cache.
    pub cache_id: u32,
    /// Block address.
    pub addr: u64,
    /// Partition index, or -1 when the access bypassed the arrays.
    pub ai: i32,
    /// Set index, or -1.
    pub s: i32,
    /// Way index, or -1.
    pub w: i32,
    /// Eviction rank reported by the replacement policy, or -1.
    pub rank: i32,
    /// Whether the access hit.
    pub hit: bool,
    /// Snapshot of the line metadata, when a line was involved.
    pub meta: Option<Meta>,
    /// Snapshot of the line data, when the cache carries data.
    pub data: Option<DataBlock>,
}

/// Observer attached to one or more caches.
///
/// All methods take `&self`; implementations keep interior counters so a
/// single monitor can serve several caches driven from several threads.
pub trait Monitor: Send + Sync {
    /// Decides whether to attach to the cache with this id.
    fn attach(&self, cache_id: u32) -> bool {
        let _unused = cache_id;
        true
    }

    /// Called on every read-class access.
    fn on_read(&self, ev: &AccessEvent);

    /// Called on every write-class access.
    fn on_write(&self, ev: &AccessEvent);

    /// Called when a valid line is evicted or invalidated.
    fn on_invalid(&self, ev: &AccessEvent);

    /// Keyed side-channel for non-standard probes (e.g. remap triggers).
    ///
    /// Returns `true` when this monitor consumed the message.
    fn magic(&self, cache_id: u32, addr: u64, magic_id: u64, payload: &mut dyn Any) -> bool {
        let _unused = (cache_id, addr, magic_id, payload);
        false
    }

    /// Starts the monitor, assuming it was just initialized.
    fn start(&self);
    /// Stops the monitor, assuming it will soon be dropped.
    fn stop(&self);
    /// Pauses the monitor, assuming it will resume later.
    fn pause(&self);
    /// Resumes a paused monitor.
    fn resume(&self);
    /// Resets all internal statistics.
    fn reset(&self);
}

/// Per-cache hook dispatcher.
///
/// Owns the set of attached monitors and the optional delay estimator; every
/// cache and the memory leaf hold exactly one container.
pub struct MonitorContainer {
    id: u32,
    monitors: RwLock<Vec<Arc<dyn Monitor>>>,
    delay: Option<Box<dyn DelayModel>>,
}

impl MonitorContainer {
    /// Creates a container for the cache with `id` and an optional delay
    /// model.
    pub fn new(id: u32, delay: Option<Box<dyn DelayModel>>) -> Self {
        Self {
            id,
            monitors: RwLock::new(Vec::new()),
            delay,
        }
    }

    /// Attaches a monitor if it accepts this cache.
    pub fn attach(&self, monitor: &Arc<dyn Monitor>) {
        if monitor.attach(self.id) {
            self.write_monitors().push(Arc::clone(monitor));
        }
    }

    /// Detaches every monitor.
    pub fn detach_all(&self) {
        self.write_monitors().clear();
    }

    /// Read-class hook: monitors plus delay.
    pub fn hook_read(&self, ev: &AccessEvent, delay: &mut u64) {
        for m in self.read_monitors().iter() {
            m.on_read(ev);
        }
        if let Some(d) = &self.delay {
            d.read(ev.addr, ev.hit, delay);
        }
    }

    /// Write-class hook: monitors plus delay.
    pub fn hook_write(&self, ev: &AccessEvent, delay: &mut u64) {
        for m in self.read_monitors().iter() {
            m.on_write(ev);
        }
        if let Some(d) = &self.delay {
            d.write(ev.addr, ev.hit, delay);
        }
    }

    /// Manage-class hook (probe, invalidate, writeback): fires `on_invalid`
    /// when a valid line is being dropped, plus delay.
    pub fn hook_manage(&self, ev: &AccessEvent, evict: bool, writeback: bool, delay: &mut u64) {
        if ev.hit && evict {
            for m in self.read_monitors().iter() {
                m.on_invalid(ev);
            }
        }
        if let Some(d) = &self.delay {
            d.manage(ev.addr, ev.hit, evict, writeback, delay);
        }
    }

    /// Forwards a magic message until one monitor consumes it.
    pub fn magic(&self, addr: u64, magic_id: u64, payload: &mut dyn Any) {
        for m in self.read_monitors().iter() {
            if m.magic(self.id, addr, magic_id, payload) {
                return;
            }
        }
    }

    /// Pauses every attached monitor.
    pub fn pause(&self) {
        for m in self.read_monitors().iter() {
            m.pause();
        }
    }

    /// Resumes every attached monitor.
    pub fn resume(&self) {
        for m in self.read_monitors().iter() {
            m.resume();
        }
    }

    fn read_monitors(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<dyn Monitor>>> {
        self.monitors
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn write_monitors(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Arc<dyn Monitor>>> {
        self.monitors
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl fmt::Debug for MonitorContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorContainer")
            .field("id", &self.id)
            .field("monitors", &self.read_monitors().len())
            .finish()
    }
}

/// Simple access-count monitor.
#[derive(Debug, Default)]
pub struct SimpleAccMonitor {
    cnt_access: AtomicU64,
    cnt_miss: AtomicU64,
    cnt_write: AtomicU64,
    cnt_write_miss: AtomicU64,
    cnt_invalid: AtomicU64,
    active: AtomicBool,
}

impl SimpleAccMonitor {
    /// Creates a counter monitor, optionally active from the start.
    pub fn new(active: bool) -> Self {
        let m = Self::default();
        m.active.store(active, Ordering::Relaxed);
        m
    }

    /// Total accesses observed.
    pub fn accesses(&self) -> u64 {
        self.cnt_access.load(Ordering::Relaxed)
    }

    /// Total misses observed.
    pub fn misses(&self) -> u64 {
        self.cnt_miss.load(Ordering::Relaxed)
    }

    /// Total write-class accesses observed.
    pub fn writes(&self) -> u64 {
        self.cnt_write.load(Ordering::Relaxed)
    }

    /// Total write-class misses observed.
    pub fn write_misses(&self) -> u64 {
        self.cnt_write_miss.load(Ordering::Relaxed)
    }

    /// Total invalidations observed.
    pub fn invalidations(&self) -> u64 {
        self.cnt_invalid.load(Ordering::Relaxed)
    }
}

impl Monitor for SimpleAccMonitor {
    fn on_read(&self, ev: &AccessEvent) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }
        self.cnt_access.fetch_add(1, Ordering::Relaxed);
        if !ev.hit {
            self.cnt_miss.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_write(&self, ev: &AccessEvent) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }
        self.cnt_access.fetch_add(1, Ordering::Relaxed);
        self.cnt_write.fetch_add(1, Ordering::Relaxed);
        if !ev.hit {
            self.cnt_miss.fetch_add(1, Ordering::Relaxed);
            self.cnt_write_miss.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn on_invalid(&self, _ev: &AccessEvent) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }
        self.cnt_invalid.fetch_add(1, Ordering::Relaxed);
    }

    fn start(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.cnt_access.store(0, Ordering::Relaxed);
        self.cnt_miss.store(0, Ordering::Relaxed);
        self.cnt_write.store(0, Ordering::Relaxed);
        self.cnt_write_miss.store(0, Ordering::Relaxed);
        self.cnt_invalid.store(0, Ordering::Relaxed);
        self.active.store(false, Ordering::Relaxed);
    }
}

/// Tracing-based access log.
///
/// Emits one `tracing` event per hook; `verbose` includes the data block.
#[derive(Debug, Default)]
pub struct SimpleTracer {
    verbose: bool,
    active: AtomicBool,
}

impl SimpleTracer {
    /// Creates a tracer; `verbose` adds data payloads to each line.
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            active: AtomicBool::new(false),
        }
    }

    fn line(&self, kind: &str, ev: &AccessEvent) {
        if !self.active.load(Ordering::Relaxed) {
            return;
        }
        let meta = ev.meta.map(|m| m.to_string()).unwrap_or_default();
        if self.verbose {
            tracing::info!(
                target: "cohsim::trace",
                "{kind} cache {:#x} addr {:#011x} ({},{},{}) {} {meta} {:?}",
                ev.cache_id, ev.addr, ev.ai, ev.s, ev.w,
                if ev.hit { "hit" } else { "miss" },
                ev.data
            );
        } else {
            tracing::info!(
                target: "cohsim::trace",
                "{kind} cache {:#x} addr {:#011x} ({},{},{}) {} {meta}",
                ev.cache_id, ev.addr, ev.ai, ev.s, ev.w,
                if ev.hit { "hit" } else { "miss" }
            );
        }
    }
}

impl Monitor for SimpleTracer {
    fn on_read(&self, ev: &AccessEvent) {
        self.line("R", ev);
    }

    fn on_write(&self, ev: &AccessEvent) {
        self.line("W", ev);
    }

    fn on_invalid(&self, ev: &AccessEvent) {
        self.line("I", ev);
    }

    fn start(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn stop(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn pause(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.active.store(false, Ordering::Relaxed);
    }
}
