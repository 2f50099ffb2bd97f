//! Engine control surface: initialization, session configuration, worker
//! lifecycle, and statistics snapshots.
//!
//! [`PtpEngine`] is the single owning value behind the whole subsystem:
//! it owns the session table, hands each enabled port's sessions to that
//! port's worker thread at `start()`, and takes them back at `stop()`.
//! Statistics flow through shared atomic cells, so snapshots never touch
//! the worker threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::clock::{Clock, Timeouts};
use crate::config::SessionConfig;
use crate::error::{PtpError, Result};
use crate::flow;
use crate::net::PtpNic;
use crate::stats::SessionStats;
use crate::table::SessionTable;
use crate::worker;

/// The PTP slave engine.
pub struct PtpEngine {
    nic: Arc<dyn PtpNic>,
    clock: Arc<dyn Clock>,
    table: SessionTable,
    stop: Arc<AtomicBool>,
    timeouts: Timeouts,
    local_mac: [u8; 6],
    initialized: bool,
    running: bool,
}

impl PtpEngine {
    /// Create an engine over the given NIC and clock collaborators.
    #[must_use]
    pub fn new(nic: Arc<dyn PtpNic>, clock: Arc<dyn Clock>) -> Self {
        Self {
            nic,
            clock,
            table: SessionTable::new(),
            stop: Arc::new(AtomicBool::new(false)),
            timeouts: Timeouts::from_hz(1_000_000_000),
            local_mac: [0; 6],
            initialized: false,
            running: false,
        }
    }

    /// One-shot initialization: captures the clock's tick frequency and
    /// the port-0 MAC used for reporting.
    ///
    /// # Errors
    /// [`PtpError::AlreadyRunning`] if workers are active.
    pub fn init(&mut self) -> Result<()> {
        if self.running {
            return Err(PtpError::AlreadyRunning);
        }
        self.timeouts = Timeouts::from_hz(self.clock.tick_hz());
        self.local_mac = self.nic.port_mac(0);
        self.initialized = true;
        tracing::info!(
            tick_hz = self.timeouts.tick_hz,
            local_mac = ?self.local_mac,
            "PTP engine initialized"
        );
        Ok(())
    }

    /// Register a set of sessions.
    ///
    /// Sessions are grouped by ingress port; each ingress port may carry
    /// at most four sessions with distinct RX VLANs. Already-registered
    /// sessions stay in place when a later entry fails validation.
    ///
    /// # Errors
    /// [`PtpError::NotInitialized`], [`PtpError::AlreadyRunning`], or a
    /// configuration error for the offending entry.
    pub fn configure(&mut self, sessions: &[SessionConfig]) -> Result<()> {
        if !self.initialized {
            return Err(PtpError::NotInitialized);
        }
        if self.running {
            return Err(PtpError::AlreadyRunning);
        }
        for config in sessions {
            self.table.register(*config)?;
        }
        tracing::info!(
            registered = sessions.len(),
            total = self.table.session_count(),
            "sessions configured"
        );
        Ok(())
    }

    /// Bind a CPU id to a port's future worker thread.
    ///
    /// The binding is reflected in the thread name; actual affinity is a
    /// deployment concern.
    ///
    /// # Errors
    /// [`PtpError::InvalidPort`] or [`PtpError::PortNotConfigured`].
    pub fn assign_worker_core(&mut self, port_id: u16, core_id: usize) -> Result<()> {
        let slot = self.table.port_mut(port_id)?;
        if !slot.enabled {
            return Err(PtpError::PortNotConfigured { port_id });
        }
        slot.core_id = Some(core_id);
        Ok(())
    }

    /// Install flow rules and launch one worker per enabled port.
    ///
    /// A port whose whole flow-rule cascade is rejected still starts; its
    /// PTP traffic is assumed to share the default RX queue and the worker
    /// filters defensively.
    ///
    /// # Errors
    /// [`PtpError::NotInitialized`], [`PtpError::NoSessions`],
    /// [`PtpError::AlreadyRunning`], or [`PtpError::WorkerSpawn`].
    pub fn start(&mut self) -> Result<()> {
        if !self.initialized {
            return Err(PtpError::NotInitialized);
        }
        if self.running {
            return Err(PtpError::AlreadyRunning);
        }
        if self.table.session_count() == 0 {
            return Err(PtpError::NoSessions);
        }

        for (port_id, slot) in self.table.enabled_ports_mut() {
            slot.flow = flow::install_port_rule(self.nic.as_ref(), port_id);
        }

        self.stop.store(false, Ordering::Relaxed);
        let mut spawn_error = None;
        for (port_id, slot) in self.table.enabled_ports_mut() {
            let sessions = std::mem::take(&mut slot.sessions);
            let nic = Arc::clone(&self.nic);
            let clock = Arc::clone(&self.clock);
            let pool = slot.pool.clone().expect("enabled port always has a pool");
            let stop = Arc::clone(&self.stop);
            let timeouts = self.timeouts;

            let name = match slot.core_id {
                Some(core) => format!("ptp-rx-p{port_id}c{core}"),
                None => format!("ptp-rx-p{port_id}"),
            };
            match thread::Builder::new().name(name).spawn(move || {
                worker::worker_main(port_id, sessions, &nic, &clock, &pool, timeouts, &stop)
            }) {
                Ok(handle) => slot.worker = Some(handle),
                Err(source) => {
                    // The moved sessions died with the unspawned closure;
                    // rebuild fresh ones over the surviving stats cells.
                    slot.sessions = slot
                        .configs
                        .iter()
                        .zip(&slot.stats)
                        .enumerate()
                        .map(|(idx, (config, stats))| {
                            #[allow(
                                clippy::cast_possible_truncation,
                                reason = "slot index is bounded by SESSIONS_PER_PORT"
                            )]
                            crate::session::Session::new(*config, idx as u8, Arc::clone(stats))
                        })
                        .collect();
                    spawn_error = Some(PtpError::WorkerSpawn { port_id, source });
                    break;
                }
            }
        }

        if let Some(err) = spawn_error {
            // Unwind whatever came up before the failure.
            self.stop.store(true, Ordering::Relaxed);
            self.join_workers();
            self.remove_flow_rules();
            return Err(err);
        }

        self.running = true;
        tracing::info!(
            ports = self.table.enabled_ports().count(),
            sessions = self.table.session_count(),
            "PTP engine started"
        );
        Ok(())
    }

    /// Raise the stop flag, join all workers, and tear down flow rules.
    ///
    /// Safe to call when not running.
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        tracing::info!("PTP engine stopping");
        self.stop.store(true, Ordering::Relaxed);
        self.join_workers();
        self.remove_flow_rules();
        self.running = false;
    }

    /// Stop if needed and release everything, returning the engine to its
    /// pre-`init()` state. The session table is cleared.
    pub fn cleanup(&mut self) {
        self.stop();
        self.table = SessionTable::new();
        self.initialized = false;
        tracing::info!("PTP engine cleaned up");
    }

    fn join_workers(&mut self) {
        for (port_id, slot) in self.table.enabled_ports_mut() {
            if let Some(handle) = slot.worker.take() {
                match handle.join() {
                    Ok(sessions) => slot.sessions = sessions,
                    Err(_) => {
                        tracing::error!(port_id, "PTP worker panicked; sessions lost");
                    }
                }
            }
        }
    }

    fn remove_flow_rules(&mut self) {
        let nic = Arc::clone(&self.nic);
        for (port_id, slot) in self.table.enabled_ports_mut() {
            if let Some(handle) = slot.flow.take() {
                flow::remove_port_rule(nic.as_ref(), port_id, handle);
            }
        }
    }

    /// Fill `out` with one row per session, engine-wide. Returns the
    /// number of rows written.
    ///
    /// Rows are copied field by field from lock-free cells; counters are
    /// monotonically non-decreasing between resets, and the offset/delay
    /// pair may momentarily lag the cycle it belongs to.
    pub fn snapshot_stats(&self, out: &mut [SessionStats]) -> usize {
        let mut written = 0;
        for (port_id, slot) in self.table.enabled_ports() {
            for (config, cell) in slot.configs.iter().zip(&slot.stats) {
                if written == out.len() {
                    return written;
                }
                out[written] = SessionStats::from_cell(port_id, config.rx_vlan, cell);
                written += 1;
            }
        }
        written
    }

    /// Fill `out` with rows for one port only. Returns the number of rows
    /// written; 0 for unknown or unconfigured ports.
    pub fn snapshot_port_stats(&self, port_id: u16, out: &mut [SessionStats]) -> usize {
        let mut written = 0;
        for (id, slot) in self.table.enabled_ports() {
            if id != port_id {
                continue;
            }
            for (config, cell) in slot.configs.iter().zip(&slot.stats) {
                if written == out.len() {
                    return written;
                }
                out[written] = SessionStats::from_cell(port_id, config.rx_vlan, cell);
                written += 1;
            }
        }
        written
    }

    /// Zero every session's counters. States, offsets and in-flight
    /// cycles are untouched.
    pub fn reset_stats(&self) {
        for (_, slot) in self.table.enabled_ports() {
            for cell in &slot.stats {
                cell.reset_counters();
            }
        }
    }

    /// Whether `init()` has completed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Whether workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// MAC captured at `init()` for reporting.
    #[must_use]
    pub fn local_mac(&self) -> [u8; 6] {
        self.local_mac
    }
}

impl Drop for PtpEngine {
    fn drop(&mut self) {
        if self.running {
            self.stop();
        }
    }
}
