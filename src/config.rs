//! Deployment constants and static session configuration.
//!
//! The values here mirror the fabric deployment this slave interoperates
//! with: a single PTP domain, one dedicated RX/TX queue pair per port, and
//! a fixed session plan of up to 8 ingress ports with 4 VLAN sessions each.

use std::time::Duration;

/// Maximum number of NIC ports the engine manages.
pub const MAX_PORTS: u16 = 8;

/// Maximum sessions per ingress port.
pub const SESSIONS_PER_PORT: usize = 4;

/// Maximum sessions across the whole engine.
pub const MAX_SESSIONS: usize = MAX_PORTS as usize * SESSIONS_PER_PORT;

/// Dedicated RX queue for PTP traffic.
pub const PTP_RX_QUEUE: u16 = 5;

/// Dedicated TX queue for PTP traffic.
pub const PTP_TX_QUEUE: u16 = 5;

/// The single PTP domain used by the fabric grandmaster.
pub const PTP_DOMAIN: u8 = 10;

/// Maximum frames pulled from the RX queue per poll.
pub const RX_BURST_SIZE: usize = 32;

/// TX buffer pool capacity per ingress port.
pub const TX_POOL_CAPACITY: usize = 1024;

/// No Sync within this window drops a session back to listening.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(3);

/// No `Delay_Resp` within this window abandons the in-flight cycle.
pub const DELAY_RESP_TIMEOUT: Duration = Duration::from_secs(2);

/// Gap between an adopted Sync and the `Delay_Req` it triggers.
///
/// Spreads the request away from the Sync burst on the fabric and matches
/// the master's advertised log interval of -1 (0.5 s nominal).
pub const DELAY_REQ_INTERVAL: Duration = Duration::from_millis(100);

/// One PTP session endpoint: where Sync arrives and where `Delay_Req`
/// leaves.
///
/// Immutable once registered. RX and TX may use different physical ports
/// (asymmetric routing of the two PTP legs through the fabric).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Ingress port: Sync and `Delay_Resp` arrive here, the session's
    /// worker runs here.
    pub rx_port_id: u16,
    /// VLAN carrying Sync / `Delay_Resp` for this session.
    pub rx_vlan: u16,
    /// Egress port for `Delay_Req`.
    pub tx_port_id: u16,
    /// VLAN written into the outgoing `Delay_Req` tag.
    pub tx_vlan: u16,
    /// Fabric VL-index embedded in the `Delay_Req` destination MAC.
    pub tx_vl_idx: u16,
}

/// The reference 32-session plan of the original deployment.
///
/// Eight ingress ports with four VLAN sessions each; every session
/// transmits its `Delay_Req` through the mirror-image egress port.
/// Operators normally register their own plan; this one is kept for
/// integration tests and as documentation of the wiring.
#[must_use]
pub fn reference_sessions() -> Vec<SessionConfig> {
    const PLAN: [(u16, u16, u16, u16, u16); MAX_SESSIONS] = [
        (5, 225, 2, 97, 4420),
        (5, 226, 2, 98, 4422),
        (5, 227, 2, 99, 4424),
        (5, 228, 2, 100, 4426),
        (4, 229, 3, 101, 4428),
        (4, 230, 3, 102, 4430),
        (4, 231, 3, 103, 4432),
        (4, 232, 3, 104, 4434),
        (7, 233, 0, 105, 4436),
        (7, 234, 0, 106, 4438),
        (7, 235, 0, 107, 4440),
        (7, 236, 0, 108, 4442),
        (6, 237, 1, 109, 4444),
        (6, 238, 1, 110, 4446),
        (6, 239, 1, 111, 4448),
        (6, 240, 1, 112, 4450),
        (3, 241, 4, 113, 4452),
        (3, 242, 4, 114, 4454),
        (3, 243, 4, 115, 4456),
        (3, 244, 4, 116, 4458),
        (2, 245, 5, 117, 4460),
        (2, 246, 5, 118, 4462),
        (2, 247, 5, 119, 4464),
        (2, 248, 5, 120, 4466),
        (1, 249, 6, 121, 4468),
        (1, 250, 6, 122, 4470),
        (1, 251, 6, 123, 4472),
        (1, 252, 6, 124, 4474),
        (0, 253, 7, 125, 4476),
        (0, 254, 7, 126, 4478),
        (0, 255, 7, 127, 4480),
        (0, 256, 7, 128, 4482),
    ];
    PLAN.iter()
        .map(|&(rx_port_id, rx_vlan, tx_port_id, tx_vlan, tx_vl_idx)| SessionConfig {
            rx_port_id,
            rx_vlan,
            tx_port_id,
            tx_vlan,
            tx_vl_idx,
        })
        .collect()
}
