use thiserror::Error;

use crate::net::NicError;
use crate::wire::message::PtpParseError;

/// Errors from the PTP slave engine.
#[derive(Debug, Error)]
pub enum PtpError {
    // ===== Lifecycle =====
    /// `init()` has not been called yet.
    #[error("engine not initialized")]
    NotInitialized,

    /// Operation is not valid while workers are running.
    #[error("engine already running")]
    AlreadyRunning,

    /// `start()` was called with an empty session table.
    #[error("no sessions configured")]
    NoSessions,

    /// Spawning a worker thread failed.
    #[error("failed to spawn worker for port {port_id}")]
    WorkerSpawn {
        /// The ingress port whose worker could not be started.
        port_id: u16,
        /// The underlying source of the error.
        #[source]
        source: std::io::Error,
    },

    // ===== Configuration =====
    /// Port id outside `[0, MAX_PORTS)`.
    #[error("invalid port id {port_id}")]
    InvalidPort {
        /// The offending port id.
        port_id: u16,
    },

    /// Port exists but has no sessions registered.
    #[error("port {port_id} not configured")]
    PortNotConfigured {
        /// The offending port id.
        port_id: u16,
    },

    /// An ingress port already holds its maximum number of sessions.
    #[error("port {port_id} already has the maximum number of sessions")]
    PortSessionsExhausted {
        /// The ingress port that is full.
        port_id: u16,
    },

    /// Two sessions on one ingress port share an RX VLAN.
    #[error("duplicate RX VLAN {vlan} on port {port_id}")]
    DuplicateRxVlan {
        /// The ingress port.
        port_id: u16,
        /// The duplicated VLAN id.
        vlan: u16,
    },

    // ===== Transmit =====
    /// The per-port TX buffer pool is empty.
    #[error("TX buffer pool exhausted on port {port_id}")]
    BufferExhausted {
        /// The egress port whose pool ran dry.
        port_id: u16,
    },

    /// The NIC accepted zero frames from a transmit burst.
    #[error("transmit failed on port {port_id}")]
    TxFailed {
        /// The egress port that rejected the frame.
        port_id: u16,
    },

    // ===== Wrapped =====
    /// Wire-format parse error.
    #[error("parse error: {0}")]
    Parse(#[from] PtpParseError),

    /// Collaborator NIC error.
    #[error("NIC error: {0}")]
    Nic(#[from] NicError),
}

impl PtpError {
    /// Whether this error came from the configuration surface.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPort { .. }
                | Self::PortNotConfigured { .. }
                | Self::PortSessionsExhausted { .. }
                | Self::DuplicateRxVlan { .. }
        )
    }

    /// Whether this error moves a session into the `Error` state.
    #[must_use]
    pub fn is_tx_error(&self) -> bool {
        matches!(self, Self::BufferExhausted { .. } | Self::TxFailed { .. })
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, PtpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PtpError::DuplicateRxVlan {
            port_id: 5,
            vlan: 225,
        };
        assert_eq!(err.to_string(), "duplicate RX VLAN 225 on port 5");
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(PtpError::InvalidPort { port_id: 9 }.is_config_error());
        assert!(!PtpError::NoSessions.is_config_error());
    }

    #[test]
    fn test_error_is_tx_error() {
        assert!(PtpError::TxFailed { port_id: 2 }.is_tx_error());
        assert!(PtpError::BufferExhausted { port_id: 2 }.is_tx_error());
        assert!(!PtpError::AlreadyRunning.is_tx_error());
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PtpError>();
    }
}
