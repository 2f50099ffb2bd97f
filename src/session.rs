//! Per-session PTP slave state machine and timestamp arithmetic.
//!
//! A session is one `(ingress port, RX VLAN)` endpoint of a master
//! relationship. All mutation happens on the worker thread owning the
//! session's ingress port; observers read the session's shared
//! [`SessionStatsCell`] instead.
//!
//! State flow:
//!
//! ```text
//!   INIT → LISTENING → SYNC_RECV → DELAY_SENT → SYNCED
//!               ↑                                  |
//!               └──────────────(timeouts)──────────┘
//! ```
//!
//! One quirk is deliberate: an accepted Sync refreshes the pacing timer,
//! so a `Delay_Req` follows ~100 ms after every adopted Sync even if the
//! previous cycle's `Delay_Resp` is still outstanding. On a slow fabric
//! cycles can therefore overlap; the sequence-id binding keeps them apart.

use std::sync::Arc;

use crate::clock::{Clock, Timeouts};
use crate::config::{SessionConfig, PTP_TX_QUEUE};
use crate::error::PtpError;
use crate::net::{FramePool, PtpNic};
use crate::stats::SessionStatsCell;
use crate::wire::frame;
use crate::wire::message::{PortIdentity, PtpHeader};
use crate::wire::timestamp::PtpTimestamp;

/// Observable session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created, not yet ticked.
    Init = 0,
    /// Waiting for a Sync from the master.
    Listening = 1,
    /// Sync adopted; T1/T2 valid, `Delay_Req` pending its pacing gap.
    SyncReceived = 2,
    /// `Delay_Req` in flight; additionally T3 and the bound sequence id
    /// are valid.
    DelayReqSent = 3,
    /// Cycle complete; T1..T4 and offset/delay are from the same cycle.
    Synced = 4,
    /// Transmit failed; decays back to listening.
    Error = 5,
}

impl SessionState {
    /// Human-readable name, as shown in statistics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Listening => "LISTENING",
            Self::SyncReceived => "SYNC_RECV",
            Self::DelayReqSent => "DELAY_SENT",
            Self::Synced => "SYNCED",
            Self::Error => "ERROR",
        }
    }

    /// Inverse of the `as u8` discriminant, for stats cells.
    #[must_use]
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Listening,
            2 => Self::SyncReceived,
            3 => Self::DelayReqSent,
            4 => Self::Synced,
            5 => Self::Error,
            _ => Self::Init,
        }
    }
}

/// Transmit-side collaborators a session needs while ticking.
pub(crate) struct TxPath<'a> {
    /// NIC surface for `tx_burst`.
    pub nic: &'a dyn PtpNic,
    /// TX buffer pool of the session's ingress port.
    pub pool: &'a FramePool,
    /// Clock for the T3 samples.
    pub clock: &'a dyn Clock,
}

/// Runtime state of one PTP slave session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    session_idx: u8,
    state: SessionState,

    our_identity: PortIdentity,
    master_identity: PortIdentity,
    master_domain: u8,

    sync_seq_id: u16,
    delay_req_seq_id: u16,
    last_delay_req_seq_id: u16,

    // All wall-clock values are Unix-epoch nanoseconds; tick values are
    // monotonic and only ever compared against other ticks.
    t1_ns: u64,
    t2_wall_ns: u64,
    t2_ticks: u64,
    t3_wall_ns: u64,
    t3_ticks: u64,
    t4_ns: u64,

    offset_ns: i64,
    delay_ns: i64,
    is_synced: bool,

    last_sync_ticks: u64,
    last_transition: u64,

    stats: Arc<SessionStatsCell>,
}

impl Session {
    /// Create a session in the `Init` state.
    pub(crate) fn new(config: SessionConfig, session_idx: u8, stats: Arc<SessionStatsCell>) -> Self {
        tracing::info!(
            rx_port = config.rx_port_id,
            rx_vlan = config.rx_vlan,
            tx_port = config.tx_port_id,
            tx_vlan = config.tx_vlan,
            tx_vl_idx = config.tx_vl_idx,
            "session registered"
        );
        Self {
            config,
            session_idx,
            state: SessionState::Init,
            our_identity: PortIdentity::SLAVE_FIXED,
            master_identity: PortIdentity::default(),
            master_domain: 0,
            sync_seq_id: 0,
            delay_req_seq_id: 0,
            last_delay_req_seq_id: 0,
            t1_ns: 0,
            t2_wall_ns: 0,
            t2_ticks: 0,
            t3_wall_ns: 0,
            t3_ticks: 0,
            t4_ns: 0,
            offset_ns: 0,
            delay_ns: 0,
            is_synced: false,
            last_sync_ticks: 0,
            last_transition: 0,
            stats,
        }
    }

    /// Session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Slot index within the ingress port.
    #[must_use]
    pub fn session_idx(&self) -> u8 {
        self.session_idx
    }

    /// Current FSM state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Latest computed offset (slave minus master) in nanoseconds.
    #[must_use]
    pub fn offset_ns(&self) -> i64 {
        self.offset_ns
    }

    /// Latest computed one-way delay in nanoseconds.
    #[must_use]
    pub fn delay_ns(&self) -> i64 {
        self.delay_ns
    }

    /// Whether the latest cycle completed.
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.is_synced
    }

    /// Identity of the master learned from the most recent Sync.
    #[must_use]
    pub fn master_identity(&self) -> PortIdentity {
        self.master_identity
    }

    fn set_state(&mut self, state: SessionState, now_ticks: u64) {
        tracing::trace!(
            rx_port = self.config.rx_port_id,
            rx_vlan = self.config.rx_vlan,
            from = self.state.name(),
            to = state.name(),
            "state transition"
        );
        self.state = state;
        self.last_transition = now_ticks;
        self.stats.set_state(state);
    }

    fn set_synced(&mut self, synced: bool) {
        self.is_synced = synced;
        self.stats.set_synced(synced);
    }

    /// Handle a received Sync.
    ///
    /// Master identity, domain, sequence and the staleness reference are
    /// refreshed unconditionally. The T1/T2 pair and the state only move
    /// when no cycle is in flight: a Sync landing in `SyncReceived` or
    /// `DelayReqSent` must not tear the timestamps bound to that cycle.
    pub(crate) fn handle_sync(
        &mut self,
        header: &PtpHeader,
        origin: PtpTimestamp,
        t2_wall_ns: u64,
        t2_ticks: u64,
    ) {
        self.stats.bump_sync_rx();
        self.master_identity = header.source_port_identity;
        self.master_domain = header.domain_number;
        self.sync_seq_id = header.sequence_id;
        self.last_sync_ticks = t2_ticks;

        if matches!(
            self.state,
            SessionState::Listening | SessionState::Synced | SessionState::Error
        ) {
            self.t1_ns = origin.to_ns();
            self.t2_wall_ns = t2_wall_ns;
            self.t2_ticks = t2_ticks;
            self.set_state(SessionState::SyncReceived, t2_ticks);
        }
    }

    /// Handle a received `Delay_Resp`.
    ///
    /// The sequence id must match the in-flight `Delay_Req`; anything else
    /// is stale or belongs to another slave and is dropped silently. The
    /// echoed requesting identity is deliberately not checked: this master
    /// returns zeros or unrelated bytes, VLAN + sequence id are
    /// authoritative.
    pub(crate) fn handle_delay_resp(
        &mut self,
        header: &PtpHeader,
        receive_timestamp: PtpTimestamp,
        _requesting: PortIdentity,
        now_ticks: u64,
    ) {
        if header.sequence_id != self.last_delay_req_seq_id {
            tracing::trace!(
                rx_vlan = self.config.rx_vlan,
                got = header.sequence_id,
                want = self.last_delay_req_seq_id,
                "stale Delay_Resp dropped"
            );
            return;
        }
        self.stats.bump_delay_resp_rx();
        self.t4_ns = receive_timestamp.to_ns();

        if self.state == SessionState::DelayReqSent {
            self.compute_offset_delay();
            self.set_state(SessionState::Synced, now_ticks);
            self.set_synced(true);
            self.stats.bump_completed_cycles();
            tracing::debug!(
                rx_port = self.config.rx_port_id,
                rx_vlan = self.config.rx_vlan,
                offset_ns = self.offset_ns,
                delay_ns = self.delay_ns,
                "cycle complete"
            );
        }
    }

    /// Offset and delay from the completed T1..T4 set.
    ///
    /// `offset = ((t2-t1) - (t4-t3)) / 2`, `delay = ((t2-t1) + (t4-t3)) / 2`,
    /// signed. A zero T4 means the master omitted its receive timestamp:
    /// the cycle still completes at the protocol level, but no clock
    /// relationship can be claimed, so both results publish as zero.
    #[allow(
        clippy::cast_possible_wrap,
        reason = "epoch nanoseconds stay below i64::MAX until 2262"
    )]
    fn compute_offset_delay(&mut self) {
        if self.t4_ns == 0 {
            self.offset_ns = 0;
            self.delay_ns = 0;
        } else {
            let fwd = self.t2_wall_ns as i64 - self.t1_ns as i64;
            let rev = self.t4_ns as i64 - self.t3_wall_ns as i64;
            self.offset_ns = (fwd - rev) / 2;
            self.delay_ns = (fwd + rev) / 2;
        }
        self.stats.set_offset_delay(self.offset_ns, self.delay_ns);
    }

    /// Run one state-machine step at monotonic time `now`.
    pub(crate) fn tick(&mut self, now: u64, timeouts: &Timeouts, tx: &TxPath<'_>) {
        match self.state {
            SessionState::Init => {
                self.set_state(SessionState::Listening, now);
            }
            SessionState::Listening => {
                if self.last_sync_ticks != 0
                    && now.saturating_sub(self.last_sync_ticks) > timeouts.sync_timeout
                {
                    self.stats.bump_sync_timeouts();
                    // Re-arm so the counter rises once per window, not per
                    // poll.
                    self.last_sync_ticks = now;
                }
            }
            SessionState::SyncReceived => {
                if now.saturating_sub(self.last_transition) >= timeouts.delay_req_interval {
                    match self.send_delay_req(tx) {
                        Ok(()) => self.set_state(SessionState::DelayReqSent, now),
                        Err(err) => {
                            tracing::warn!(
                                rx_port = self.config.rx_port_id,
                                rx_vlan = self.config.rx_vlan,
                                %err,
                                "Delay_Req transmit failed"
                            );
                            self.stats.bump_sync_errors();
                            self.set_state(SessionState::Error, now);
                        }
                    }
                }
            }
            SessionState::DelayReqSent => {
                if now.saturating_sub(self.last_transition) > timeouts.delay_resp_timeout {
                    self.stats.bump_sync_timeouts();
                    self.set_state(SessionState::Listening, now);
                }
            }
            SessionState::Synced => {
                if now.saturating_sub(self.last_sync_ticks) > timeouts.sync_timeout {
                    self.stats.bump_sync_timeouts();
                    self.set_synced(false);
                    self.set_state(SessionState::Listening, now);
                    self.last_sync_ticks = now;
                }
            }
            SessionState::Error => {
                if now.saturating_sub(self.last_transition) > timeouts.sync_timeout {
                    self.set_state(SessionState::Listening, now);
                }
            }
        }
    }

    /// Build and transmit one `Delay_Req`, sampling T3 around the send.
    fn send_delay_req(&mut self, tx: &TxPath<'_>) -> Result<(), PtpError> {
        let tx_port = self.config.tx_port_id;
        let mut buf = tx.pool.acquire().ok_or(PtpError::BufferExhausted {
            port_id: tx_port,
        })?;
        frame::build_delay_req(&mut buf, &self.config, self.our_identity, self.delay_req_seq_id);

        let ticks_before = tx.clock.ticks();
        let accepted = tx.nic.tx_burst(tx_port, PTP_TX_QUEUE, &[buf.as_ref()]);
        let ticks_after = tx.clock.ticks();
        tx.pool.release(buf);

        if accepted == 0 {
            return Err(PtpError::TxFailed { port_id: tx_port });
        }

        self.t3_ticks = ticks_before + (ticks_after - ticks_before) / 2;
        self.t3_wall_ns = tx.clock.wall_ns();
        self.last_delay_req_seq_id = self.delay_req_seq_id;
        self.delay_req_seq_id = self.delay_req_seq_id.wrapping_add(1);
        self.stats.bump_delay_req_tx();

        tracing::trace!(
            tx_port,
            tx_vlan = self.config.tx_vlan,
            seq = self.last_delay_req_seq_id,
            "Delay_Req sent"
        );
        Ok(())
    }
}
