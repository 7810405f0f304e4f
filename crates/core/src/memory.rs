//! The terminal memory node.
//!
//! Memory is a leaf obeying the same inner-port contract as a cache: it
//! serves acquires (granting Modified — there is nothing above to ask) and
//! absorbs writebacks. Backing storage is a hash map of 4 KiB pages
//! allocated on demand with anonymous `mmap`, zero-filled by the kernel.
//! Page-map access is shared-read / exclusive-write.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::cache::meta::{CohState, MetaSlot};
use crate::cache::next_cache_id;
use crate::coherence::cmd::{self, CohCmd};
use crate::coherence::policy::{CohPolicy, MiPolicy};
use crate::coherence::{CohClient, CohMaster};
use crate::common::addr::{BLOCK_BYTES, BLOCK_WORDS};
use crate::common::error::BuildError;
use crate::common::{DataBlock, DataSlot};
use crate::config::DelayConfig;
use crate::monitor::{AccessEvent, Monitor, MonitorContainer};

const PAGE_SIZE: usize = 4096;
const PAGE_SHIFT: u32 = 12;

/// One mmap-backed page.
struct Page {
    ptr: *mut u8,
}

// SAFETY: the raw page pointer is only dereferenced while holding the page
// map's RwLock (shared for reads, exclusive for writes), which serializes all
// access to the mapping.
unsafe impl Send for Page {}
unsafe impl Sync for Page {}

impl Page {
    fn new() -> Self {
        // SAFETY: anonymous private mapping with no file descriptor; the
        // kernel returns a zero-filled page or MAP_FAILED, which we check.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                PAGE_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert!(
            !std::ptr::eq(ptr, libc::MAP_FAILED),
            "memory: mmap of a backing page failed"
        );
        Self { ptr: ptr.cast() }
    }

    fn read_block(&self, offset: usize) -> DataBlock {
        let mut words = [0u64; BLOCK_WORDS];
        // SAFETY: offset is block-aligned and below PAGE_SIZE; the mapping is
        // PAGE_SIZE bytes and lives as long as `self`.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.add(offset),
                words.as_mut_ptr().cast::<u8>(),
                BLOCK_BYTES,
            );
        }
        DataBlock::from_words(words)
    }

    fn write_block(&self, offset: usize, block: &DataBlock) {
        // SAFETY: as in `read_block`; exclusivity is provided by the page
        // map's write lock.
        unsafe {
            std::ptr::copy_nonoverlapping(
                block.words().as_ptr().cast::<u8>(),
                self.ptr.add(offset),
                BLOCK_BYTES,
            );
        }
    }
}

impl Drop for Page {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from a successful PAGE_SIZE mmap and is unmapped
        // exactly once.
        unsafe {
            let _unused = libc::munmap(self.ptr.cast(), PAGE_SIZE);
        }
    }
}

/// The memory leaf.
pub struct SimpleMemory {
    name: String,
    id: u32,
    policy: Arc<dyn CohPolicy>,
    pages: RwLock<HashMap<u64, Page>>,
    monitors: MonitorContainer,
}

impl SimpleMemory {
    /// Creates a memory node with an optional delay model.
    pub fn new(name: &str, delay: DelayConfig) -> Self {
        let id = next_cache_id();
        Self {
            name: name.to_string(),
            id,
            policy: Arc::new(MiPolicy::new(false, true)),
            pages: RwLock::new(HashMap::new()),
            monitors: MonitorContainer::new(id, crate::monitor::delay::from_config(delay)),
        }
    }

    /// Attaches a monitor.
    pub fn attach_monitor(&self, monitor: &Arc<dyn Monitor>) {
        self.monitors.attach(monitor);
    }

    /// Directly reads the block containing `addr`; test and verification
    /// hook (a block never touched reads as zero).
    pub fn peek_block(&self, addr: u64) -> DataBlock {
        let ppn = addr >> PAGE_SHIFT;
        let offset = (addr as usize) & (PAGE_SIZE - 1) & !(BLOCK_BYTES - 1);
        let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
        pages
            .get(&ppn)
            .map_or_else(DataBlock::new, |p| p.read_block(offset))
    }

    fn event(&self, addr: u64, hit: bool) -> AccessEvent {
        AccessEvent {
            cache_id: self.id,
            addr,
            ai: -1,
            s: -1,
            w: -1,
            rank: -1,
            hit,
            meta: None,
            data: None,
        }
    }
}

impl CohMaster for SimpleMemory {
    fn connect(
        &self,
        _client: Arc<dyn CohClient>,
        _uncached: bool,
    ) -> Result<(i16, Arc<dyn CohPolicy>), BuildError> {
        // Memory never probes; every child is an uncached client to it.
        Ok((-1, Arc::clone(&self.policy)))
    }

    fn acquire_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        meta_inner: Option<&MetaSlot>,
        _cmd: CohCmd,
        delay: &mut u64,
    ) {
        if let Some(di) = data_inner {
            let ppn = addr >> PAGE_SHIFT;
            let offset = (addr as usize) & (PAGE_SIZE - 1);
            let block = {
                let pages = self.pages.read().unwrap_or_else(PoisonError::into_inner);
                pages.get(&ppn).map(|p| p.read_block(offset))
            };
            let block = block.unwrap_or_else(|| {
                let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
                pages.entry(ppn).or_insert_with(Page::new).read_block(offset)
            });
            di.set(&block);
        }
        if let Some(mi) = meta_inner {
            mi.grant(CohState::Modified);
        }
        self.monitors.hook_read(&self.event(addr, true), delay);
    }

    fn writeback_resp(
        &self,
        addr: u64,
        data_inner: Option<&DataSlot>,
        _meta_inner: Option<&MetaSlot>,
        wcmd: CohCmd,
        delay: &mut u64,
    ) {
        assert!(
            !cmd::is_flush(wcmd),
            "memory `{}`: flush for {addr:#x} escaped the hierarchy",
            self.name
        );
        if let Some(di) = data_inner {
            let ppn = addr >> PAGE_SHIFT;
            let offset = (addr as usize) & (PAGE_SIZE - 1);
            let mut pages = self.pages.write().unwrap_or_else(PoisonError::into_inner);
            pages
                .entry(ppn)
                .or_insert_with(Page::new)
                .write_block(offset, &di.get());
        }
        self.monitors.hook_write(&self.event(addr, true), delay);
    }

    fn finish_resp(&self, _addr: u64, _cmd: CohCmd) {}
}

impl std::fmt::Debug for SimpleMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleMemory")
            .field("name", &self.name)
            .field(
                "pages",
                &self
                    .pages
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .len(),
            )
            .finish()
    }
}
