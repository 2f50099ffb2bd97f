//! # fabric-ptp
//!
//! IEEE 1588v2 (PTP) one-step **slave** engine for a high-throughput
//! packet-forwarding appliance. The upstream grandmaster is reached through
//! a proprietary Layer-2 switch fabric; a single host runs up to 32
//! independent PTP sessions, each bound to an (ingress port, VLAN) pair,
//! with the `Delay_Req` leg optionally routed through a different egress
//! port.
//!
//! ## Architecture
//!
//! ```text
//!   NIC ──filter──> PTP RX queue ──poll──> RX worker ──vlan──> Session
//!                                               │                │
//!                                               │                ├─> state machine tick
//!   NIC <──send──< Delay_Req builder <───── FSM(SYNC_RECV) ──────┘
//! ```
//!
//! One busy-poll worker thread per enabled ingress port owns that port's
//! sessions exclusively; the control surface ([`PtpEngine`]) configures the
//! session table, installs NIC flow rules, and exposes lock-free statistics
//! snapshots.
//!
//! The NIC and the clock are collaborator traits ([`net::PtpNic`],
//! [`clock::Clock`]); the [`testing`] module ships scriptable fakes for
//! both.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fabric_ptp::{PtpEngine, SessionConfig, SessionStats};
//! use fabric_ptp::clock::SystemClock;
//! use fabric_ptp::testing::FakeNic;
//!
//! # fn example() -> fabric_ptp::Result<()> {
//! let nic = Arc::new(FakeNic::new());
//! let mut engine = PtpEngine::new(nic, Arc::new(SystemClock::new()));
//! engine.init()?;
//! engine.configure(&[SessionConfig {
//!     rx_port_id: 5,
//!     rx_vlan: 225,
//!     tx_port_id: 2,
//!     tx_vlan: 97,
//!     tx_vl_idx: 4420,
//! }])?;
//! engine.start()?;
//!
//! let mut stats = [SessionStats::default(); 32];
//! let n = engine.snapshot_stats(&mut stats);
//! for row in &stats[..n] {
//!     println!("{row:?}");
//! }
//! engine.stop();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Clock sources (wall clock + monotonic tick counter).
pub mod clock;
/// Deployment constants and session configuration.
pub mod config;
/// Control surface.
pub mod engine;
/// Error types.
pub mod error;
/// Flow-steering rule cascade.
pub mod flow;
/// Collaborator device surfaces (NIC, buffer pool).
pub mod net;
/// Per-session state machine and timestamp math.
pub mod session;
/// Statistics snapshot types.
pub mod stats;
/// Test support: scriptable NIC and manual clock.
pub mod testing;
/// Wire codec for PTP over Ethernet + 802.1Q.
pub mod wire;

mod table;
mod worker;

pub use config::SessionConfig;
pub use engine::PtpEngine;
pub use error::{PtpError, Result};
pub use session::SessionState;
pub use stats::SessionStats;
