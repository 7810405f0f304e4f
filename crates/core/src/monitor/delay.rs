//! Delay estimation models.
//!
//! Each cache (and the memory leaf) may carry a delay model that adds latency
//! contributions to the driver's running `delay_out` counter. Models are
//! deliberately coarse; the simulator's timing fidelity target is relative,
//! not silicon-exact.

use crate::config::DelayConfig;

/// Builds the configured delay model, if any.
pub fn from_config(cfg: DelayConfig) -> Option<Box<dyn DelayModel>> {
    match cfg {
        DelayConfig::None => None,
        DelayConfig::L1 { hit, replay, tran } => Some(Box::new(DelayL1 { hit, replay, tran })),
        DelayConfig::Coherent { hit, up, down } => {
            Some(Box::new(DelayCoherentCache { hit, up, down }))
        }
        DelayConfig::Memory { tran } => Some(Box::new(DelayMemory { tran })),
    }
}

/// Latency contributions per access class.
pub trait DelayModel: Send + Sync {
    /// Contribution of a read-class access.
    fn read(&self, addr: u64, hit: bool, delay: &mut u64);
    /// Contribution of a write-class access.
    fn write(&self, addr: u64, hit: bool, delay: &mut u64);
    /// Contribution of a manage-class access (probe, invalidate, writeback).
    fn manage(&self, addr: u64, hit: bool, evict: bool, writeback: bool, delay: &mut u64);
}

/// L1 delay estimation.
#[derive(Clone, Copy, Debug)]
pub struct DelayL1 {
    /// Latency of a hit.
    pub hit: u64,
    /// Additional latency of a miss replay.
    pub replay: u64,
    /// Block transfer latency between L1 and its parent.
    pub tran: u64,
}

impl DelayModel for DelayL1 {
    fn read(&self, _addr: u64, hit: bool, delay: &mut u64) {
        *delay += if hit { self.hit } else { self.hit + self.replay };
    }

    fn write(&self, _addr: u64, hit: bool, delay: &mut u64) {
        *delay += if hit { self.hit } else { self.hit + self.replay };
    }

    fn manage(&self, _addr: u64, hit: bool, _evict: bool, writeback: bool, delay: &mut u64) {
        *delay += if hit && writeback {
            self.hit + self.tran
        } else {
            self.hit
        };
    }
}

/// Mid-level coherent cache delay estimation.
#[derive(Clone, Copy, Debug)]
pub struct DelayCoherentCache {
    /// Latency of a hit.
    pub hit: u64,
    /// Block transfer latency toward the inner level.
    pub up: u64,
    /// Block transfer latency toward the outer level.
    pub down: u64,
}

impl DelayModel for DelayCoherentCache {
    fn read(&self, _addr: u64, _hit: bool, delay: &mut u64) {
        *delay += self.hit + self.up;
    }

    // Write delay is hidden behind the inner level's store path.
    fn write(&self, _addr: u64, _hit: bool, _delay: &mut u64) {}

    fn manage(&self, _addr: u64, hit: bool, _evict: bool, writeback: bool, delay: &mut u64) {
        *delay += if hit && writeback {
            self.hit + self.down
        } else {
            self.hit
        };
    }
}

/// Memory delay estimation.
#[derive(Clone, Copy, Debug)]
pub struct DelayMemory {
    /// Block transfer latency to/from memory.
    pub tran: u64,
}

impl DelayModel for DelayMemory {
    fn read(&self, _addr: u64, _hit: bool, delay: &mut u64) {
        *delay += self.tran;
    }

    // Writes are posted; their delay is hidden.
    fn write(&self, _addr: u64, _hit: bool, _delay: &mut u64) {}

    fn manage(&self, _addr: u64, _hit: bool, _evict: bool, _writeback: bool, _delay: &mut u64) {}
}
