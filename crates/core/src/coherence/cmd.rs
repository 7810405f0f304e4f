//! Coherence message encoding.
//!
//! Every message between cache levels is a 3-tuple `(requester id, message
//! kind, action)`. Up to 63 coherent children per level are addressable; the
//! id `-1` stands for "nobody" (an uncached requester). Constructors and
//! predicates are free functions so call sites read like the protocol.

/// A coherence command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CohCmd {
    /// Requester identifier; -1 for nobody/uncached.
    pub id: i16,
    /// Message kind.
    pub msg: u8,
    /// Action qualifier.
    pub act: u8,
}

/// Message kinds.
pub mod msg {
    /// Request a line with a given permission.
    pub const ACQUIRE: u8 = 1;
    /// Give up (possibly dirty) permission.
    pub const RELEASE: u8 = 2;
    /// Downgrade or evict a line in the inner hierarchy.
    pub const PROBE: u8 = 3;
    /// Flush a line out of the hierarchy.
    pub const FLUSH: u8 = 4;
    /// Close an acquire transaction.
    pub const FINISH: u8 = 5;
}

/// Action qualifiers.
pub mod act {
    /// Fetch for reading.
    pub const FETCH_READ: u8 = 0;
    /// Fetch for writing.
    pub const FETCH_WRITE: u8 = 1;
    /// Evict (invalidate).
    pub const EVICT: u8 = 2;
    /// Write dirty data back.
    pub const WRITEBACK: u8 = 3;
    /// Downgrade to a shared copy.
    pub const DOWNGRADE: u8 = 4;
    /// Prefetch fill.
    pub const PREFETCH: u8 = 5;
}

// ── predicates ──────────────────────────────────────────────

/// Whether `cmd` is an acquire.
#[inline(always)]
pub const fn is_acquire(cmd: CohCmd) -> bool {
    cmd.msg == msg::ACQUIRE
}

/// Whether `cmd` is a release.
#[inline(always)]
pub const fn is_release(cmd: CohCmd) -> bool {
    cmd.msg == msg::RELEASE
}

/// Whether `cmd` is a probe.
#[inline(always)]
pub const fn is_probe(cmd: CohCmd) -> bool {
    cmd.msg == msg::PROBE
}

/// Whether `cmd` is a flush.
#[inline(always)]
pub const fn is_flush(cmd: CohCmd) -> bool {
    cmd.msg == msg::FLUSH
}

/// Whether `cmd` is a finish.
#[inline(always)]
pub const fn is_finish(cmd: CohCmd) -> bool {
    cmd.msg == msg::FINISH
}

/// Whether `cmd` fetches for reading.
#[inline(always)]
pub const fn is_fetch_read(cmd: CohCmd) -> bool {
    cmd.act == act::FETCH_READ
}

/// Whether `cmd` fetches for writing.
#[inline(always)]
pub const fn is_fetch_write(cmd: CohCmd) -> bool {
    cmd.act == act::FETCH_WRITE
}

/// Whether `cmd` evicts.
#[inline(always)]
pub const fn is_evict(cmd: CohCmd) -> bool {
    cmd.act == act::EVICT
}

/// Whether `cmd` writes back.
#[inline(always)]
pub const fn is_writeback(cmd: CohCmd) -> bool {
    cmd.act == act::WRITEBACK
}

/// Whether `cmd` downgrades.
#[inline(always)]
pub const fn is_downgrade(cmd: CohCmd) -> bool {
    cmd.act == act::DOWNGRADE
}

/// Whether `cmd` implies write intent (fetch-write, evict, or writeback).
#[inline(always)]
pub const fn is_write(cmd: CohCmd) -> bool {
    cmd.act == act::FETCH_WRITE || cmd.act == act::EVICT || cmd.act == act::WRITEBACK
}

/// Whether `cmd` is a prefetch.
#[inline(always)]
pub const fn is_prefetch(cmd: CohCmd) -> bool {
    cmd.act == act::PREFETCH
}

// ── constructors ────────────────────────────────────────────

/// Acquire for reading.
#[inline(always)]
pub const fn cmd_for_read() -> CohCmd {
    CohCmd { id: -1, msg: msg::ACQUIRE, act: act::FETCH_READ }
}

/// Acquire for writing.
#[inline(always)]
pub const fn cmd_for_write() -> CohCmd {
    CohCmd { id: -1, msg: msg::ACQUIRE, act: act::FETCH_WRITE }
}

/// Acquire as a prefetch.
#[inline(always)]
pub const fn cmd_for_prefetch() -> CohCmd {
    CohCmd { id: -1, msg: msg::ACQUIRE, act: act::PREFETCH }
}

/// Flush (evict from the whole hierarchy).
#[inline(always)]
pub const fn cmd_for_flush() -> CohCmd {
    CohCmd { id: -1, msg: msg::FLUSH, act: act::EVICT }
}

/// Flush variant that writes back but keeps the line shared.
#[inline(always)]
pub const fn cmd_for_writeback() -> CohCmd {
    CohCmd { id: -1, msg: msg::FLUSH, act: act::WRITEBACK }
}

/// Release after a clean eviction.
#[inline(always)]
pub const fn cmd_for_release() -> CohCmd {
    CohCmd { id: -1, msg: msg::RELEASE, act: act::EVICT }
}

/// Release carrying dirty data.
#[inline(always)]
pub const fn cmd_for_release_writeback() -> CohCmd {
    CohCmd { id: -1, msg: msg::RELEASE, act: act::WRITEBACK }
}

/// The null command.
#[inline(always)]
pub const fn cmd_for_null() -> CohCmd {
    CohCmd { id: -1, msg: 0, act: 0 }
}

/// Probe demanding dirty data (downgrades the holder to Shared).
#[inline(always)]
pub const fn cmd_for_probe_writeback(id: i16) -> CohCmd {
    CohCmd { id, msg: msg::PROBE, act: act::WRITEBACK }
}

/// Probe demanding eviction.
#[inline(always)]
pub const fn cmd_for_probe_release(id: i16) -> CohCmd {
    CohCmd { id, msg: msg::PROBE, act: act::EVICT }
}

/// Probe demanding a downgrade to Shared.
#[inline(always)]
pub const fn cmd_for_probe_downgrade(id: i16) -> CohCmd {
    CohCmd { id, msg: msg::PROBE, act: act::DOWNGRADE }
}

/// Finish closing the acquire issued by `id`.
#[inline(always)]
pub const fn cmd_for_finish(id: i16) -> CohCmd {
    CohCmd { id, msg: msg::FINISH, act: 0 }
}
