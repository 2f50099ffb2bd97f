//! Per-session statistics: the shared cell workers publish into and the
//! snapshot rows handed to callers.
//!
//! Each session has exactly one writer (the worker owning its ingress
//! port), so the cell uses relaxed atomics. Readers copy field by field;
//! the offset/delay pair may momentarily disagree with the cycle counter,
//! which snapshot consumers are expected to tolerate.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};

use crate::session::SessionState;

/// Lock-free statistics cell shared between a session and the snapshot
/// surface.
#[derive(Debug)]
pub struct SessionStatsCell {
    state: AtomicU8,
    offset_ns: AtomicI64,
    delay_ns: AtomicI64,
    sync_rx: AtomicU64,
    delay_req_tx: AtomicU64,
    delay_resp_rx: AtomicU64,
    sync_timeouts: AtomicU64,
    sync_errors: AtomicU64,
    completed_cycles: AtomicU64,
    is_synced: AtomicBool,
}

impl SessionStatsCell {
    /// Fresh cell in the `Init` state with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SessionState::Init as u8),
            offset_ns: AtomicI64::new(0),
            delay_ns: AtomicI64::new(0),
            sync_rx: AtomicU64::new(0),
            delay_req_tx: AtomicU64::new(0),
            delay_resp_rx: AtomicU64::new(0),
            sync_timeouts: AtomicU64::new(0),
            sync_errors: AtomicU64::new(0),
            completed_cycles: AtomicU64::new(0),
            is_synced: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(crate) fn set_offset_delay(&self, offset_ns: i64, delay_ns: i64) {
        self.offset_ns.store(offset_ns, Ordering::Relaxed);
        self.delay_ns.store(delay_ns, Ordering::Relaxed);
    }

    pub(crate) fn set_synced(&self, synced: bool) {
        self.is_synced.store(synced, Ordering::Relaxed);
    }

    pub(crate) fn bump_sync_rx(&self) {
        self.sync_rx.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_delay_req_tx(&self) {
        self.delay_req_tx.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_delay_resp_rx(&self) {
        self.delay_resp_rx.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_sync_timeouts(&self) {
        self.sync_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_sync_errors(&self) {
        self.sync_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn bump_completed_cycles(&self) {
        self.completed_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Current state as published by the worker.
    #[must_use]
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    /// Sync messages received since the last reset.
    #[must_use]
    pub fn sync_rx(&self) -> u64 {
        self.sync_rx.load(Ordering::Relaxed)
    }

    /// `Delay_Req` messages transmitted since the last reset.
    #[must_use]
    pub fn delay_req_tx(&self) -> u64 {
        self.delay_req_tx.load(Ordering::Relaxed)
    }

    /// Accepted `Delay_Resp` messages since the last reset.
    #[must_use]
    pub fn delay_resp_rx(&self) -> u64 {
        self.delay_resp_rx.load(Ordering::Relaxed)
    }

    /// Timeout transitions since the last reset.
    #[must_use]
    pub fn sync_timeouts(&self) -> u64 {
        self.sync_timeouts.load(Ordering::Relaxed)
    }

    /// TX failures since the last reset.
    #[must_use]
    pub fn sync_errors(&self) -> u64 {
        self.sync_errors.load(Ordering::Relaxed)
    }

    /// Completed offset/delay cycles since the last reset.
    #[must_use]
    pub fn completed_cycles(&self) -> u64 {
        self.completed_cycles.load(Ordering::Relaxed)
    }

    /// Latest published offset in nanoseconds.
    #[must_use]
    pub fn offset_ns(&self) -> i64 {
        self.offset_ns.load(Ordering::Relaxed)
    }

    /// Latest published one-way delay in nanoseconds.
    #[must_use]
    pub fn delay_ns(&self) -> i64 {
        self.delay_ns.load(Ordering::Relaxed)
    }

    /// Whether the session currently holds a completed cycle.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.is_synced.load(Ordering::Relaxed)
    }

    /// Zero the counters. State, offset/delay and the in-flight cycle are
    /// untouched.
    pub fn reset_counters(&self) {
        self.sync_rx.store(0, Ordering::Relaxed);
        self.delay_req_tx.store(0, Ordering::Relaxed);
        self.delay_resp_rx.store(0, Ordering::Relaxed);
        self.sync_timeouts.store(0, Ordering::Relaxed);
        self.sync_errors.store(0, Ordering::Relaxed);
        self.completed_cycles.store(0, Ordering::Relaxed);
    }
}

impl Default for SessionStatsCell {
    fn default() -> Self {
        Self::new()
    }
}

/// One row of a statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Ingress port of the session.
    pub port_id: u16,
    /// RX VLAN of the session.
    pub vlan_id: u16,
    /// Human-readable state name.
    pub state_name: &'static str,
    /// Latest clock offset (slave minus master) in nanoseconds.
    pub offset_ns: i64,
    /// Latest one-way delay in nanoseconds.
    pub delay_ns: i64,
    /// Sync messages received.
    pub sync_rx: u64,
    /// `Delay_Req` messages sent.
    pub delay_req_tx: u64,
    /// `Delay_Resp` messages accepted.
    pub delay_resp_rx: u64,
    /// Whether the session holds a completed cycle.
    pub is_synced: bool,
}

impl SessionStats {
    /// Fill a row from a session's config identity and its stats cell.
    #[must_use]
    pub fn from_cell(port_id: u16, vlan_id: u16, cell: &SessionStatsCell) -> Self {
        Self {
            port_id,
            vlan_id,
            state_name: cell.state().name(),
            offset_ns: cell.offset_ns(),
            delay_ns: cell.delay_ns(),
            sync_rx: cell.sync_rx(),
            delay_req_tx: cell.delay_req_tx(),
            delay_resp_rx: cell.delay_resp_rx(),
            is_synced: cell.is_synced(),
        }
    }
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            port_id: 0,
            vlan_id: 0,
            state_name: SessionState::Init.name(),
            offset_ns: 0,
            delay_ns: 0,
            sync_rx: 0,
            delay_req_tx: 0,
            delay_resp_rx: 0,
            is_synced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_counters_accumulate() {
        let cell = SessionStatsCell::new();
        cell.bump_sync_rx();
        cell.bump_sync_rx();
        cell.bump_delay_req_tx();
        assert_eq!(cell.sync_rx(), 2);
        assert_eq!(cell.delay_req_tx(), 1);
    }

    #[test]
    fn test_reset_preserves_state_and_offsets() {
        let cell = SessionStatsCell::new();
        cell.set_state(SessionState::Synced);
        cell.set_offset_delay(-42, 17);
        cell.set_synced(true);
        cell.bump_sync_rx();
        cell.bump_sync_timeouts();

        cell.reset_counters();

        assert_eq!(cell.sync_rx(), 0);
        assert_eq!(cell.sync_timeouts(), 0);
        assert_eq!(cell.state(), SessionState::Synced);
        assert_eq!(cell.offset_ns(), -42);
        assert_eq!(cell.delay_ns(), 17);
        assert!(cell.is_synced());
    }

    #[test]
    fn test_snapshot_row_from_cell() {
        let cell = SessionStatsCell::new();
        cell.set_state(SessionState::Listening);
        cell.set_offset_delay(5, 6);
        cell.bump_sync_rx();

        let row = SessionStats::from_cell(5, 225, &cell);
        assert_eq!(row.port_id, 5);
        assert_eq!(row.vlan_id, 225);
        assert_eq!(row.state_name, "LISTENING");
        assert_eq!(row.offset_ns, 5);
        assert_eq!(row.delay_ns, 6);
        assert_eq!(row.sync_rx, 1);
        assert!(!row.is_synced);
    }
}
