//! Collaborator device surfaces consumed by the engine.
//!
//! The engine never talks to hardware directly: it polls and transmits
//! through [`PtpNic`] and draws TX buffers from a [`FramePool`]. Production
//! wires these to the appliance's poll-mode driver; tests use the
//! scriptable fakes in [`crate::testing`].

use std::sync::Mutex;

use bytes::{Bytes, BytesMut};
use thiserror::Error;

/// Opaque handle for an installed flow rule, valid per port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowHandle(pub u64);

/// Classification pattern for a flow rule.
///
/// `None` fields are wildcards. A `vlan_inner_type` of `Some(t)` requires a
/// 802.1Q tag whose inner EtherType equals `t`, with the TCI unmatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowPattern {
    /// Required outer EtherType, or match-any.
    pub outer_ether_type: Option<u16>,
    /// Required VLAN inner EtherType, or no VLAN item at all.
    pub vlan_inner_type: Option<u16>,
}

/// Action applied to frames matching a flow rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    /// Steer matching frames to the given RX queue.
    Queue(u16),
}

/// Errors surfaced by the NIC collaborator.
#[derive(Debug, Error)]
pub enum NicError {
    /// The port's classifier cannot express the requested pattern.
    #[error("flow pattern not supported on port {port_id}: {reason}")]
    RuleUnsupported {
        /// Port the rule was attempted on.
        port_id: u16,
        /// Device-reported reason.
        reason: String,
    },

    /// The handle does not name an installed rule on this port.
    #[error("unknown flow rule handle on port {port_id}")]
    UnknownRule {
        /// Port the destroy was attempted on.
        port_id: u16,
    },
}

/// Multi-queue NIC surface: burst RX/TX, flow rules, port metadata.
///
/// Implementations must be callable from multiple worker threads; each
/// queue is only ever driven by one thread at a time.
pub trait PtpNic: Send + Sync {
    /// Pull up to `max` frames from `(port_id, queue_id)` into `out`.
    ///
    /// Non-blocking; returns the number of frames appended.
    fn rx_burst(&self, port_id: u16, queue_id: u16, out: &mut Vec<Bytes>, max: usize) -> usize;

    /// Hand `frames` to `(port_id, queue_id)` for transmission.
    ///
    /// Returns how many frames the device accepted (0 on a full queue).
    fn tx_burst(&self, port_id: u16, queue_id: u16, frames: &[&[u8]]) -> usize;

    /// Install a classification rule; the returned handle is used for
    /// teardown.
    ///
    /// # Errors
    /// [`NicError::RuleUnsupported`] when the port cannot validate or
    /// create the pattern.
    fn create_rule(
        &self,
        port_id: u16,
        pattern: &FlowPattern,
        action: FlowAction,
    ) -> Result<FlowHandle, NicError>;

    /// Remove a previously installed rule.
    ///
    /// # Errors
    /// [`NicError::UnknownRule`] when the handle is not installed.
    fn destroy_rule(&self, port_id: u16, handle: FlowHandle) -> Result<(), NicError>;

    /// MAC address of a port, used for reporting only.
    fn port_mac(&self, port_id: u16) -> [u8; 6];
}

/// Fixed-capacity pool of TX frame buffers.
///
/// One pool per ingress port, shared between that port's worker and any
/// session transmitting through it. Acquisition is the only allocation on
/// the hot path; a drained pool surfaces as a TX failure, not a block.
#[derive(Debug)]
pub struct FramePool {
    free: Mutex<Vec<BytesMut>>,
    capacity: usize,
    buf_size: usize,
}

impl FramePool {
    /// Create a pool of `capacity` buffers of `buf_size` bytes each.
    #[must_use]
    pub fn new(capacity: usize, buf_size: usize) -> Self {
        let free = (0..capacity)
            .map(|_| BytesMut::with_capacity(buf_size))
            .collect();
        Self {
            free: Mutex::new(free),
            capacity,
            buf_size,
        }
    }

    /// Take a cleared buffer from the pool, or `None` when drained.
    #[must_use]
    pub fn acquire(&self) -> Option<BytesMut> {
        self.free.lock().ok()?.pop()
    }

    /// Return a buffer to the pool.
    pub fn release(&self, mut buf: BytesMut) {
        buf.clear();
        if let Ok(mut free) = self.free.lock() {
            if free.len() < self.capacity {
                free.push(buf);
            }
        }
    }

    /// Number of buffers currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.free.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Buffer size this pool hands out.
    #[must_use]
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }
}
