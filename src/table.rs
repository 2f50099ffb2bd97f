//! Fixed-capacity two-level session table: up to 8 ingress ports, up to 4
//! sessions each, keyed by RX VLAN within a port.
//!
//! Slots are created at configure time and live until shutdown. While the
//! engine runs, each enabled port's sessions are moved into its worker
//! thread and only the parallel config/stats vectors stay behind for the
//! snapshot surface.

use std::sync::Arc;
use std::thread::JoinHandle;

use crate::config::{SessionConfig, MAX_PORTS, SESSIONS_PER_PORT, TX_POOL_CAPACITY};
use crate::error::{PtpError, Result};
use crate::net::{FlowHandle, FramePool};
use crate::session::Session;
use crate::stats::SessionStatsCell;
use crate::wire::frame::DELAY_REQ_FRAME_LEN;

/// One ingress port's slot in the table.
pub(crate) struct PortSlot {
    /// True once the port owns at least one session.
    pub enabled: bool,
    /// CPU id requested for this port's worker, if any.
    pub core_id: Option<usize>,
    /// Sessions owned by this port. Empty while the worker runs.
    pub sessions: Vec<Session>,
    /// Config copies, parallel to `stats`, for the snapshot surface.
    pub configs: Vec<SessionConfig>,
    /// Stats cells, parallel to `configs`.
    pub stats: Vec<Arc<SessionStatsCell>>,
    /// TX buffer pool shared by this port's sessions.
    pub pool: Option<Arc<FramePool>>,
    /// Installed flow rule, if the cascade succeeded.
    pub flow: Option<FlowHandle>,
    /// Running worker, if started.
    pub worker: Option<JoinHandle<Vec<Session>>>,
}

impl PortSlot {
    fn empty() -> Self {
        Self {
            enabled: false,
            core_id: None,
            sessions: Vec::new(),
            configs: Vec::new(),
            stats: Vec::new(),
            pool: None,
            flow: None,
            worker: None,
        }
    }
}

/// The engine's session table.
pub(crate) struct SessionTable {
    ports: Vec<PortSlot>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self {
            ports: (0..MAX_PORTS).map(|_| PortSlot::empty()).collect(),
        }
    }

    /// Register one session, enabling its ingress port if needed.
    ///
    /// Validation order matches the failure contract: port range first,
    /// then per-port capacity, then VLAN uniqueness. Nothing is mutated on
    /// failure.
    pub fn register(&mut self, config: SessionConfig) -> Result<()> {
        if config.rx_port_id >= MAX_PORTS {
            return Err(PtpError::InvalidPort {
                port_id: config.rx_port_id,
            });
        }
        if config.tx_port_id >= MAX_PORTS {
            return Err(PtpError::InvalidPort {
                port_id: config.tx_port_id,
            });
        }

        let slot = &mut self.ports[usize::from(config.rx_port_id)];
        if slot.configs.len() >= SESSIONS_PER_PORT {
            return Err(PtpError::PortSessionsExhausted {
                port_id: config.rx_port_id,
            });
        }
        if slot.configs.iter().any(|c| c.rx_vlan == config.rx_vlan) {
            return Err(PtpError::DuplicateRxVlan {
                port_id: config.rx_port_id,
                vlan: config.rx_vlan,
            });
        }

        if slot.pool.is_none() {
            slot.pool = Some(Arc::new(FramePool::new(
                TX_POOL_CAPACITY,
                DELAY_REQ_FRAME_LEN,
            )));
        }

        #[allow(
            clippy::cast_possible_truncation,
            reason = "slot index is bounded by SESSIONS_PER_PORT"
        )]
        let session_idx = slot.configs.len() as u8;
        let stats = Arc::new(SessionStatsCell::new());
        slot.sessions
            .push(Session::new(config, session_idx, Arc::clone(&stats)));
        slot.configs.push(config);
        slot.stats.push(stats);
        slot.enabled = true;
        Ok(())
    }

    /// Total registered sessions.
    pub fn session_count(&self) -> usize {
        self.ports.iter().map(|p| p.configs.len()).sum()
    }

    /// Mutable access to one port slot, range-checked.
    pub fn port_mut(&mut self, port_id: u16) -> Result<&mut PortSlot> {
        if port_id >= MAX_PORTS {
            return Err(PtpError::InvalidPort { port_id });
        }
        Ok(&mut self.ports[usize::from(port_id)])
    }

    /// Iterate enabled ports with their ids.
    pub fn enabled_ports(&self) -> impl Iterator<Item = (u16, &PortSlot)> {
        self.ports.iter().enumerate().filter_map(|(id, slot)| {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "port ids are bounded by MAX_PORTS"
            )]
            let id = id as u16;
            slot.enabled.then_some((id, slot))
        })
    }

    /// Iterate enabled ports mutably with their ids.
    pub fn enabled_ports_mut(&mut self) -> impl Iterator<Item = (u16, &mut PortSlot)> {
        self.ports.iter_mut().enumerate().filter_map(|(id, slot)| {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "port ids are bounded by MAX_PORTS"
            )]
            let id = id as u16;
            slot.enabled.then_some((id, slot))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(rx_port_id: u16, rx_vlan: u16) -> SessionConfig {
        SessionConfig {
            rx_port_id,
            rx_vlan,
            tx_port_id: 0,
            tx_vlan: 100,
            tx_vl_idx: 4500,
        }
    }

    #[test]
    fn test_register_enables_port_and_creates_pool() {
        let mut table = SessionTable::new();
        table.register(cfg(5, 225)).unwrap();
        assert_eq!(table.session_count(), 1);

        let slot = table.port_mut(5).unwrap();
        assert!(slot.enabled);
        assert!(slot.pool.is_some());
        assert_eq!(slot.sessions.len(), 1);
        assert_eq!(slot.sessions[0].session_idx(), 0);
    }

    #[test]
    fn test_register_rejects_out_of_range_ports() {
        let mut table = SessionTable::new();
        assert!(matches!(
            table.register(cfg(8, 225)),
            Err(PtpError::InvalidPort { port_id: 8 })
        ));
        let mut bad_tx = cfg(0, 225);
        bad_tx.tx_port_id = 9;
        assert!(matches!(
            table.register(bad_tx),
            Err(PtpError::InvalidPort { port_id: 9 })
        ));
        assert_eq!(table.session_count(), 0);
    }

    #[test]
    fn test_register_enforces_sessions_per_port() {
        let mut table = SessionTable::new();
        for vlan in 225..229 {
            table.register(cfg(3, vlan)).unwrap();
        }
        assert!(matches!(
            table.register(cfg(3, 300)),
            Err(PtpError::PortSessionsExhausted { port_id: 3 })
        ));
        assert_eq!(table.session_count(), 4);
    }

    #[test]
    fn test_register_rejects_duplicate_vlan_on_same_port() {
        let mut table = SessionTable::new();
        table.register(cfg(1, 225)).unwrap();
        assert!(matches!(
            table.register(cfg(1, 225)),
            Err(PtpError::DuplicateRxVlan {
                port_id: 1,
                vlan: 225
            })
        ));
        // Same VLAN on another port is fine.
        table.register(cfg(2, 225)).unwrap();
    }

    #[test]
    fn test_full_reference_plan_registers() {
        let mut table = SessionTable::new();
        for config in crate::config::reference_sessions() {
            table.register(config).unwrap();
        }
        assert_eq!(table.session_count(), 32);
        assert_eq!(table.enabled_ports().count(), 8);
    }
}
