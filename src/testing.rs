//! Test support: a scriptable NIC and a manually driven clock.
//!
//! These stand in for the appliance's poll-mode driver and time sources in
//! unit and integration tests. [`FakeNic`] records every transmit and
//! flow-rule operation and serves receive queues that tests fill frame by
//! frame; [`ManualClock`] only moves when the test says so, which makes
//! timeout and pacing behavior deterministic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::clock::Clock;
use crate::net::{FlowAction, FlowHandle, FlowPattern, NicError, PtpNic};

/// A frame recorded by [`FakeNic::tx_burst`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxFrame {
    /// Port the frame was transmitted on.
    pub port_id: u16,
    /// Queue the frame was handed to.
    pub queue_id: u16,
    /// Full frame bytes.
    pub data: Vec<u8>,
}

/// A flow rule held by the fake device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRule {
    /// Port the rule is installed on.
    pub port_id: u16,
    /// Handle returned at install time.
    pub handle: FlowHandle,
    /// Pattern the rule matches.
    pub pattern: FlowPattern,
    /// Action the rule applies.
    pub action: FlowAction,
}

/// Scriptable in-memory NIC.
///
/// Receive queues are keyed by `(port, queue)` and drained in FIFO order.
/// Transmits append to a log unless transmit acceptance is switched off.
/// Flow-rule installation succeeds unless the exact pattern was marked
/// rejected for that port, mirroring how real classifiers refuse patterns
/// they cannot validate.
#[derive(Debug, Default)]
pub struct FakeNic {
    rx_queues: Mutex<HashMap<(u16, u16), Vec<Bytes>>>,
    tx_log: Mutex<Vec<TxFrame>>,
    tx_accept: AtomicBool,
    rejected: Mutex<Vec<(u16, FlowPattern)>>,
    installed: Mutex<Vec<InstalledRule>>,
    destroyed: Mutex<Vec<InstalledRule>>,
    next_handle: AtomicU64,
}

impl FakeNic {
    /// Create a NIC with empty queues that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tx_accept: AtomicBool::new(true),
            next_handle: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Queue a frame for a later `rx_burst` on `(port_id, queue_id)`.
    pub fn push_rx(&self, port_id: u16, queue_id: u16, frame: impl Into<Bytes>) {
        self.rx_queues
            .lock()
            .unwrap()
            .entry((port_id, queue_id))
            .or_default()
            .push(frame.into());
    }

    /// All frames transmitted so far.
    #[must_use]
    pub fn sent(&self) -> Vec<TxFrame> {
        self.tx_log.lock().unwrap().clone()
    }

    /// Make every subsequent `tx_burst` accept (`true`) or reject
    /// (`false`) frames.
    pub fn set_tx_accept(&self, accept: bool) {
        self.tx_accept.store(accept, Ordering::Relaxed);
    }

    /// Mark one pattern as unsupported on one port.
    pub fn reject_pattern(&self, port_id: u16, pattern: FlowPattern) {
        self.rejected.lock().unwrap().push((port_id, pattern));
    }

    /// Rules currently installed.
    #[must_use]
    pub fn installed_rules(&self) -> Vec<InstalledRule> {
        self.installed.lock().unwrap().clone()
    }

    /// Rules that have been destroyed.
    #[must_use]
    pub fn destroyed_rules(&self) -> Vec<InstalledRule> {
        self.destroyed.lock().unwrap().clone()
    }
}

impl PtpNic for FakeNic {
    fn rx_burst(&self, port_id: u16, queue_id: u16, out: &mut Vec<Bytes>, max: usize) -> usize {
        let mut queues = self.rx_queues.lock().unwrap();
        let Some(queue) = queues.get_mut(&(port_id, queue_id)) else {
            return 0;
        };
        let n = queue.len().min(max);
        out.extend(queue.drain(..n));
        n
    }

    fn tx_burst(&self, port_id: u16, queue_id: u16, frames: &[&[u8]]) -> usize {
        if !self.tx_accept.load(Ordering::Relaxed) {
            return 0;
        }
        let mut log = self.tx_log.lock().unwrap();
        for frame in frames {
            log.push(TxFrame {
                port_id,
                queue_id,
                data: frame.to_vec(),
            });
        }
        frames.len()
    }

    fn create_rule(
        &self,
        port_id: u16,
        pattern: &FlowPattern,
        action: FlowAction,
    ) -> Result<FlowHandle, NicError> {
        if self
            .rejected
            .lock()
            .unwrap()
            .iter()
            .any(|(p, pat)| *p == port_id && pat == pattern)
        {
            return Err(NicError::RuleUnsupported {
                port_id,
                reason: "pattern not supported by classifier".to_string(),
            });
        }
        let handle = FlowHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.installed.lock().unwrap().push(InstalledRule {
            port_id,
            handle,
            pattern: *pattern,
            action,
        });
        Ok(handle)
    }

    fn destroy_rule(&self, port_id: u16, handle: FlowHandle) -> Result<(), NicError> {
        let mut installed = self.installed.lock().unwrap();
        let Some(pos) = installed
            .iter()
            .position(|r| r.port_id == port_id && r.handle == handle)
        else {
            return Err(NicError::UnknownRule { port_id });
        };
        let rule = installed.remove(pos);
        self.destroyed.lock().unwrap().push(rule);
        Ok(())
    }

    fn port_mac(&self, port_id: u16) -> [u8; 6] {
        #[allow(
            clippy::cast_possible_truncation,
            reason = "test MACs only encode the low port byte"
        )]
        let low = port_id as u8;
        [0x02, 0x00, 0x00, 0x00, 0x10, low]
    }
}

/// A clock that advances only when told to.
///
/// The wall arm and the tick arm move independently so tests can pin the
/// wall-clock values entering the offset math while stepping monotonic
/// time across pacing and timeout windows.
#[derive(Debug)]
pub struct ManualClock {
    wall_ns: AtomicU64,
    ticks: AtomicU64,
    tick_hz: u64,
}

impl ManualClock {
    /// Create a clock at wall zero, tick zero.
    #[must_use]
    pub fn new(tick_hz: u64) -> Self {
        Self {
            wall_ns: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            tick_hz,
        }
    }

    /// Set the wall-clock arm.
    pub fn set_wall_ns(&self, wall_ns: u64) {
        self.wall_ns.store(wall_ns, Ordering::Relaxed);
    }

    /// Set the tick arm.
    pub fn set_ticks(&self, ticks: u64) {
        self.ticks.store(ticks, Ordering::Relaxed);
    }

    /// Advance the tick arm.
    pub fn advance_ticks(&self, delta: u64) {
        self.ticks.fetch_add(delta, Ordering::Relaxed);
    }

    /// Advance both arms by `ns` nanoseconds.
    pub fn advance_ns(&self, ns: u64) {
        self.wall_ns.fetch_add(ns, Ordering::Relaxed);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "tick deltas in tests are far below u64::MAX"
        )]
        let ticks = (u128::from(ns) * u128::from(self.tick_hz) / 1_000_000_000) as u64;
        self.ticks.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn wall_ns(&self) -> u64 {
        self.wall_ns.load(Ordering::Relaxed)
    }

    fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    fn tick_hz(&self) -> u64 {
        self.tick_hz
    }
}
