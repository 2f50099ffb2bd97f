//! Wire codec for PTP over Ethernet + 802.1Q.
//!
//! Bit-exact encoders and decoders for the IEEE 1588v2 common header, the
//! Sync / `Delay_Req` / `Delay_Resp` bodies, and the enclosing Ethernet
//! framing, including the non-standard habits of the fabric grandmaster:
//! a 32-bit effective seconds field and a 106-octet padded `Delay_Req`.
//!
//! All multi-byte fields are big-endian on the wire. Decoding works over
//! plain byte slices with explicit offsets; no packed structs, no
//! alignment assumptions.

pub mod frame;
pub mod message;
pub mod timestamp;


pub use frame::{PtpFrame, ETHERTYPE_PTP, ETHERTYPE_VLAN};
pub use message::{PortIdentity, PtpHeader, PtpMessage, PtpMessageBody, PtpMessageType, PtpParseError};
pub use timestamp::PtpTimestamp;
