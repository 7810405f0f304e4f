//! The per-core driver interface.
//!
//! The core talks to its L1 through four operations — `read`, `write`,
//! `flush`, `writeback` — plus the whole-cache `flush_cache`. The interface
//! is the L1's inner port driven as an uncached requester: lines unlock
//! inline instead of waiting for a finish, and a finish is forwarded outward
//! whenever the access fetched from the parent.

use std::sync::Arc;

use crate::cache::meta::Meta;
use crate::coherence::cmd;
use crate::coherence::inner::InnerPort;
use crate::common::addr::block_align;
use crate::common::DataBlock;
use crate::sync::XactPrio;

/// Core-facing handle on an L1 cache.
#[derive(Debug)]
pub struct CoreInterface {
    port: Arc<InnerPort>,
}

impl CoreInterface {
    /// Wraps an L1 inner port.
    pub fn new(port: Arc<InnerPort>) -> Self {
        Self { port }
    }

    /// Reads the 64-byte block containing `addr`.
    pub fn read(&self, addr: u64, delay: Option<&mut u64>) -> DataBlock {
        let mut scratch = 0u64;
        let delay = delay.unwrap_or(&mut scratch);
        let addr = block_align(addr);
        let ctx = self.port.ctx();
        let out = self
            .port
            .flavor()
            .access_line(ctx, addr, cmd::cmd_for_read(), XactPrio::Read, delay);
        let value = out.data_snapshot().unwrap_or_default();
        if let Some(loc) = out.loc {
            ctx.cache().replace_read(loc, false);
        }
        ctx.cache()
            .hook_read(addr, out.loc, out.hit, Some(out.meta.get()), out.data_snapshot(), delay);
        let (hit, loc) = (out.hit, out.loc);
        drop(out);
        if !hit {
            ctx.outer().finish_req(addr);
        }
        if let Some(loc) = loc {
            ctx.cache().meta(loc).unlock();
            ctx.cache().gate_reset(loc.0, loc.1, XactPrio::Read);
        }
        #[cfg(feature = "lock-check")]
        crate::sync::lockcheck::check_clear();
        value
    }

    /// Writes the 64-byte block containing `addr`.
    pub fn write(&self, addr: u64, data: &DataBlock, delay: Option<&mut u64>) {
        let mut scratch = 0u64;
        let delay = delay.unwrap_or(&mut scratch);
        let addr = block_align(addr);
        let ctx = self.port.ctx();
        let out = self
            .port
            .flavor()
            .access_line(ctx, addr, cmd::cmd_for_write(), XactPrio::Read, delay);
        out.meta.to_dirty();
        if let Some(d) = out.data.as_deref() {
            d.set(data);
        }
        if let Some(loc) = out.loc {
            ctx.cache().replace_write(loc, true);
        }
        ctx.cache()
            .hook_write(addr, out.loc, out.hit, Some(out.meta.get()), out.data_snapshot(), delay);
        let (hit, loc) = (out.hit, out.loc);
        drop(out);
        if !hit {
            ctx.outer().finish_req(addr);
        }
        if let Some(loc) = loc {
            ctx.cache().meta(loc).unlock();
            ctx.cache().gate_reset(loc.0, loc.1, XactPrio::Read);
        }
        #[cfg(feature = "lock-check")]
        crate::sync::lockcheck::check_clear();
    }

    /// Drops the block containing `addr` from the whole hierarchy, writing
    /// dirty data back to memory first (clflush-like).
    pub fn flush(&self, addr: u64, delay: Option<&mut u64>) {
        let mut scratch = 0u64;
        let delay = delay.unwrap_or(&mut scratch);
        let addr = block_align(addr);
        self.port
            .flavor()
            .flush_line(self.port.ctx(), addr, cmd::cmd_for_flush(), delay);
    }

    /// Writes the block containing `addr` back if dirty while keeping it
    /// cached shared (clwb-like).
    pub fn writeback(&self, addr: u64, delay: Option<&mut u64>) {
        let mut scratch = 0u64;
        let delay = delay.unwrap_or(&mut scratch);
        let addr = block_align(addr);
        self.port
            .flavor()
            .flush_line(self.port.ctx(), addr, cmd::cmd_for_writeback(), delay);
    }

    /// Writeback-and-invalidate of every dirty block (wbinvd-like).
    ///
    /// Not implemented at any cache level; aborts when invoked.
    pub fn writeback_invalidate(&self, _delay: Option<&mut u64>) {
        panic!(
            "cache `{}`: writeback_invalidate is not implemented at this level",
            self.port.ctx().name()
        );
    }

    /// Flushes every valid line of this L1 out of the hierarchy.
    pub fn flush_cache(&self, delay: Option<&mut u64>) {
        let mut scratch = 0u64;
        let delay = delay.unwrap_or(&mut scratch);
        let ctx = self.port.ctx();
        let (partitions, sets, ways) = ctx.cache().geometry();
        for ai in 0..partitions {
            for s in 0..sets {
                for w in 0..ways {
                    let meta = ctx.cache().meta((ai, s, w));
                    if meta.is_valid() {
                        let addr = meta.addr();
                        self.port
                            .flavor()
                            .flush_line(ctx, addr, cmd::cmd_for_flush(), delay);
                    }
                }
            }
        }
    }

    /// Snapshot of the L1 line holding `addr`, if any; test hook.
    pub fn peek_line(&self, addr: u64) -> Option<Meta> {
        let ctx = self.port.ctx();
        ctx.cache()
            .hit(block_align(addr), None)
            .map(|loc| ctx.cache().meta(loc).get())
    }
}
