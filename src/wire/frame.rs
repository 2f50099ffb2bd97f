//! Ethernet + 802.1Q framing around PTP messages.
//!
//! Decoding classifies frames as PTP (untagged EtherType 0x88F7 or
//! VLAN-tagged with inner 0x88F7) and exposes the VLAN id and the PTP
//! payload. Encoding builds the one outgoing frame this slave produces:
//! the master-compat padded `Delay_Req`.

use bytes::{BufMut, BytesMut};

use crate::config::{SessionConfig, PTP_DOMAIN};

use super::message::{PortIdentity, PtpHeader, PtpMessageType};

/// PTP over Ethernet EtherType.
pub const ETHERTYPE_PTP: u16 = 0x88F7;

/// 802.1Q tag EtherType.
pub const ETHERTYPE_VLAN: u16 = 0x8100;

/// Ethernet header length.
pub const ETHER_HDR_LEN: usize = 14;

/// 802.1Q tag length (TCI + inner EtherType).
pub const VLAN_HDR_LEN: usize = 4;

/// Declared PTP length of the outgoing `Delay_Req`.
///
/// The standard minimum is 44 octets; this master parses a trailing
/// zero-padded region and expects 106. The padding after the 44 semantic
/// octets stays zero.
pub const DELAY_REQ_PADDED_LEN: usize = 106;

/// Total outgoing `Delay_Req` frame length:
/// Ethernet + VLAN tag + padded PTP body.
pub const DELAY_REQ_FRAME_LEN: usize = ETHER_HDR_LEN + VLAN_HDR_LEN + DELAY_REQ_PADDED_LEN;

/// Flags carried by the outgoing `Delay_Req` (what the master expects).
pub const DELAY_REQ_FLAGS: u16 = 0x0102;

/// Log message interval of the outgoing `Delay_Req` (2^-1 = 0.5 s).
pub const DELAY_REQ_LOG_INTERVAL: i8 = -1;

/// Source MAC of every frame this slave emits.
pub const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x20];

/// A PTP frame located inside an Ethernet frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpFrame<'a> {
    /// VLAN id from the 802.1Q tag, 0 for untagged frames.
    pub vlan_id: u16,
    /// The PTP message bytes (common header onward).
    pub payload: &'a [u8],
}

/// Classify a frame and locate its PTP payload.
///
/// Returns `None` for anything that is not PTP: wrong outer EtherType,
/// VLAN tag without inner 0x88F7, or a frame too short to carry the
/// headers it declares.
#[must_use]
pub fn parse_ptp_frame(frame: &[u8]) -> Option<PtpFrame<'_>> {
    if frame.len() < ETHER_HDR_LEN {
        return None;
    }
    let outer = u16::from_be_bytes([frame[12], frame[13]]);
    if outer == ETHERTYPE_PTP {
        return Some(PtpFrame {
            vlan_id: 0,
            payload: &frame[ETHER_HDR_LEN..],
        });
    }
    if outer == ETHERTYPE_VLAN {
        if frame.len() < ETHER_HDR_LEN + VLAN_HDR_LEN {
            return None;
        }
        let tci = u16::from_be_bytes([frame[14], frame[15]]);
        let inner = u16::from_be_bytes([frame[16], frame[17]]);
        if inner != ETHERTYPE_PTP {
            return None;
        }
        return Some(PtpFrame {
            vlan_id: tci & 0x0FFF,
            payload: &frame[ETHER_HDR_LEN + VLAN_HDR_LEN..],
        });
    }
    None
}

/// Build the outgoing `Delay_Req` frame into `buf`.
///
/// Layout: Ethernet (dst `03:00:00:00:H:L` with H,L = `tx_vl_idx`
/// big-endian, src [`SRC_MAC`], type 0x8100) + VLAN TCI (`tx_vlan`, other
/// bits zero) + inner 0x88F7 + 106-octet padded PTP `Delay_Req`. The
/// origin timestamp stays zero: wire-encoded TX times are not trusted,
/// T3 is sampled around the transmit call instead.
pub fn build_delay_req(
    buf: &mut BytesMut,
    config: &SessionConfig,
    source: PortIdentity,
    sequence_id: u16,
) {
    buf.clear();
    buf.reserve(DELAY_REQ_FRAME_LEN);

    // Ethernet: the fabric routes on the VL-index in the last two dst
    // octets.
    let [vl_hi, vl_lo] = config.tx_vl_idx.to_be_bytes();
    buf.put_slice(&[0x03, 0x00, 0x00, 0x00, vl_hi, vl_lo]);
    buf.put_slice(&SRC_MAC);
    buf.put_u16(ETHERTYPE_VLAN);

    // 802.1Q tag: priority/CFI zero, VLAN id only.
    buf.put_u16(config.tx_vlan & 0x0FFF);
    buf.put_u16(ETHERTYPE_PTP);

    // PTP header, declared length 106.
    let mut header = PtpHeader::new(PtpMessageType::DelayReq, source, sequence_id);
    header.domain_number = PTP_DOMAIN;
    header.flags = DELAY_REQ_FLAGS;
    header.log_message_interval = DELAY_REQ_LOG_INTERVAL;
    buf.put_slice(&header.encode(DELAY_REQ_PADDED_LEN - PtpHeader::SIZE));

    // Zero origin timestamp + zero padding out to the declared length.
    buf.put_bytes(0, DELAY_REQ_PADDED_LEN - PtpHeader::SIZE);

    debug_assert_eq!(buf.len(), DELAY_REQ_FRAME_LEN);
}
