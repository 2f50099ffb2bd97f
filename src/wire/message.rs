//! PTP message types, parsing, and encoding.
//!
//! Implements the IEEE 1588v2 common header (34 octets) and the bodies the
//! slave cares about. Sync and `Delay_Resp` drive state; `Follow_Up` and
//! Announce decode to inert variants and are dropped by the caller.

use super::timestamp::PtpTimestamp;

/// PTP message type identifiers (low nibble of the first header octet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PtpMessageType {
    /// Sync (master → slave), carries T1 in one-step mode.
    Sync = 0x00,
    /// Delay request (slave → master), sent at T3.
    DelayReq = 0x01,
    /// Follow-up (master → slave). Two-step only; accepted and ignored.
    FollowUp = 0x08,
    /// Delay response (master → slave), carries T4.
    DelayResp = 0x09,
    /// Announce (master → slave). No BMCA here; accepted and ignored.
    Announce = 0x0B,
}

impl PtpMessageType {
    /// Parse from the lower 4 bits of a byte.
    ///
    /// # Errors
    /// [`PtpParseError::UnknownMessageType`] for nibbles outside the
    /// recognized set; callers drop those frames without counting an error.
    pub fn from_nibble(value: u8) -> Result<Self, PtpParseError> {
        match value & 0x0F {
            0x00 => Ok(Self::Sync),
            0x01 => Ok(Self::DelayReq),
            0x08 => Ok(Self::FollowUp),
            0x09 => Ok(Self::DelayResp),
            0x0B => Ok(Self::Announce),
            other => Err(PtpParseError::UnknownMessageType(other)),
        }
    }

    /// The v1-compat control field value for this type.
    #[must_use]
    pub fn control_field(self) -> u8 {
        match self {
            Self::Sync => 0x00,
            Self::DelayReq => 0x01,
            Self::FollowUp => 0x02,
            Self::DelayResp => 0x03,
            Self::Announce => 0x05,
        }
    }
}

impl std::fmt::Display for PtpMessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sync => write!(f, "Sync"),
            Self::DelayReq => write!(f, "Delay_Req"),
            Self::FollowUp => write!(f, "Follow_Up"),
            Self::DelayResp => write!(f, "Delay_Resp"),
            Self::Announce => write!(f, "Announce"),
        }
    }
}

/// PTP port identity: 8-byte clock identity + 2-byte port number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortIdentity {
    /// 64-bit clock identity.
    pub clock_identity: u64,
    /// Port number.
    pub port_number: u16,
}

impl PortIdentity {
    /// Wire size in octets.
    pub const SIZE: usize = 10;

    /// The identity this slave transmits: `2C:1A:00:00:00:00:00:00`,
    /// port 0.
    ///
    /// The master echoes the requesting identity verbatim in `Delay_Resp`
    /// and expects this exact value (it appears to originate from an
    /// intermediate switch, not the NIC). A MAC-derived identity breaks
    /// correlation on this fabric.
    pub const SLAVE_FIXED: Self = Self {
        clock_identity: 0x2C1A_0000_0000_0000,
        port_number: 0,
    };

    /// Create a new port identity.
    #[must_use]
    pub fn new(clock_identity: u64, port_number: u16) -> Self {
        Self {
            clock_identity,
            port_number,
        }
    }

    /// Encode as 10 octets (8-byte clock id + 2-byte port number, BE).
    #[must_use]
    pub fn encode(self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.clock_identity.to_be_bytes());
        buf[8..10].copy_from_slice(&self.port_number.to_be_bytes());
        buf
    }

    /// Decode from 10 octets. Returns `None` if the slice is too short.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE {
            return None;
        }
        Some(Self {
            clock_identity: u64::from_be_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]),
            port_number: u16::from_be_bytes([data[8], data[9]]),
        })
    }
}

/// IEEE 1588v2 common message header (34 octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtpHeader {
    /// Transport-specific nibble (upper 4 bits of octet 0).
    pub transport_specific: u8,
    /// Message type (lower 4 bits of octet 0).
    pub message_type: PtpMessageType,
    /// PTP version (2).
    pub version: u8,
    /// Declared total message length, header included.
    pub message_length: u16,
    /// Domain number.
    pub domain_number: u8,
    /// Flags field.
    pub flags: u16,
    /// Correction field, units of 1/65536 ns, signed.
    pub correction_field: i64,
    /// Source port identity.
    pub source_port_identity: PortIdentity,
    /// Sequence id.
    pub sequence_id: u16,
    /// Control field (deprecated in v2 but still emitted).
    pub control_field: u8,
    /// Log message interval.
    pub log_message_interval: i8,
}

impl PtpHeader {
    /// Header size in octets.
    pub const SIZE: usize = 34;

    /// PTP protocol version emitted by this slave.
    pub const VERSION_2: u8 = 2;

    /// Create a header with per-type control field and version 2 defaults.
    #[must_use]
    pub fn new(message_type: PtpMessageType, source: PortIdentity, sequence_id: u16) -> Self {
        Self {
            transport_specific: 0,
            message_type,
            version: Self::VERSION_2,
            message_length: 0, // filled in on encode
            domain_number: 0,
            flags: 0,
            correction_field: 0,
            source_port_identity: source,
            sequence_id,
            control_field: message_type.control_field(),
            log_message_interval: 0,
        }
    }

    /// Encode to 34 octets; the length field becomes
    /// `SIZE + body_length`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        reason = "PTP message lengths are bounded far below u16::MAX"
    )]
    pub fn encode(&self, body_length: usize) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = (self.transport_specific << 4) | (self.message_type as u8 & 0x0F);
        buf[1] = self.version & 0x0F;
        let total_len = (Self::SIZE + body_length) as u16;
        buf[2..4].copy_from_slice(&total_len.to_be_bytes());
        buf[4] = self.domain_number;
        // buf[5] reserved
        buf[6..8].copy_from_slice(&self.flags.to_be_bytes());
        buf[8..16].copy_from_slice(&self.correction_field.to_be_bytes());
        // buf[16..20] reserved
        buf[20..30].copy_from_slice(&self.source_port_identity.encode());
        buf[30..32].copy_from_slice(&self.sequence_id.to_be_bytes());
        buf[32] = self.control_field;
        buf[33] = self.log_message_interval as u8;
        buf
    }

    /// Decode from bytes.
    ///
    /// # Errors
    /// [`PtpParseError::TooShort`] below 34 octets,
    /// [`PtpParseError::UnknownMessageType`] for unrecognized nibbles.
    pub fn decode(data: &[u8]) -> Result<Self, PtpParseError> {
        if data.len() < Self::SIZE {
            return Err(PtpParseError::TooShort {
                needed: Self::SIZE,
                have: data.len(),
            });
        }
        let message_type = PtpMessageType::from_nibble(data[0])?;
        let source_port_identity =
            PortIdentity::decode(&data[20..30]).ok_or(PtpParseError::TooShort {
                needed: 30,
                have: data.len(),
            })?;
        Ok(Self {
            transport_specific: data[0] >> 4,
            message_type,
            version: data[1] & 0x0F,
            message_length: u16::from_be_bytes([data[2], data[3]]),
            domain_number: data[4],
            flags: u16::from_be_bytes([data[6], data[7]]),
            correction_field: i64::from_be_bytes([
                data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
            ]),
            source_port_identity,
            sequence_id: u16::from_be_bytes([data[30], data[31]]),
            control_field: data[32],
            log_message_interval: data[33] as i8,
        })
    }
}

/// A parsed PTP message with header and typed body.
#[derive(Debug, Clone)]
pub struct PtpMessage {
    /// Message header.
    pub header: PtpHeader,
    /// Message body.
    pub body: PtpMessageBody,
}

/// PTP message body variants.
#[derive(Debug, Clone)]
pub enum PtpMessageBody {
    /// Sync: origin timestamp (T1 in one-step mode).
    Sync {
        /// Master's TX timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Delay request: origin timestamp (zero on our own transmissions).
    DelayReq {
        /// Origin timestamp.
        origin_timestamp: PtpTimestamp,
    },
    /// Follow-up. Decoded for completeness, dropped by the slave.
    FollowUp {
        /// Precise origin timestamp.
        precise_origin_timestamp: PtpTimestamp,
    },
    /// Delay response: receive timestamp (T4) and requesting identity.
    DelayResp {
        /// When the master received our `Delay_Req`; all-zero when the
        /// master omits it.
        receive_timestamp: PtpTimestamp,
        /// Echo of the requester. Unreliable on this fabric; never used
        /// for acceptance.
        requesting_port_identity: PortIdentity,
    },
    /// Announce. No BMCA: the body is not interpreted.
    Announce,
}

impl PtpMessage {
    /// Body size for Sync / `Follow_Up` / `Delay_Req`.
    pub const TIMESTAMP_BODY_SIZE: usize = PtpTimestamp::SIZE;
    /// Body size for `Delay_Resp`.
    pub const DELAY_RESP_BODY_SIZE: usize = PtpTimestamp::SIZE + PortIdentity::SIZE;

    /// Parse a complete PTP message.
    ///
    /// # Errors
    /// [`PtpParseError`] when the header is malformed or the declared body
    /// does not fit in `data`.
    pub fn decode(data: &[u8]) -> Result<Self, PtpParseError> {
        let header = PtpHeader::decode(data)?;
        let body_data = &data[PtpHeader::SIZE..];

        let body = match header.message_type {
            PtpMessageType::Sync => PtpMessageBody::Sync {
                origin_timestamp: Self::body_timestamp(body_data, data.len())?,
            },
            PtpMessageType::DelayReq => PtpMessageBody::DelayReq {
                origin_timestamp: Self::body_timestamp(body_data, data.len())?,
            },
            PtpMessageType::FollowUp => PtpMessageBody::FollowUp {
                precise_origin_timestamp: Self::body_timestamp(body_data, data.len())?,
            },
            PtpMessageType::DelayResp => {
                if body_data.len() < Self::DELAY_RESP_BODY_SIZE {
                    return Err(PtpParseError::TooShort {
                        needed: PtpHeader::SIZE + Self::DELAY_RESP_BODY_SIZE,
                        have: data.len(),
                    });
                }
                let receive_timestamp =
                    Self::body_timestamp(body_data, data.len())?;
                let requesting_port_identity =
                    PortIdentity::decode(&body_data[PtpTimestamp::SIZE..])
                        .ok_or(PtpParseError::TooShort {
                            needed: PtpHeader::SIZE + Self::DELAY_RESP_BODY_SIZE,
                            have: data.len(),
                        })?;
                PtpMessageBody::DelayResp {
                    receive_timestamp,
                    requesting_port_identity,
                }
            }
            PtpMessageType::Announce => PtpMessageBody::Announce,
        };

        Ok(Self { header, body })
    }

    fn body_timestamp(body_data: &[u8], frame_len: usize) -> Result<PtpTimestamp, PtpParseError> {
        PtpTimestamp::decode(body_data).ok_or(PtpParseError::TooShort {
            needed: PtpHeader::SIZE + Self::TIMESTAMP_BODY_SIZE,
            have: frame_len,
        })
    }

    /// Encode header + body.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let body = self.encode_body();
        let header = self.header.encode(body.len());
        let mut buf = Vec::with_capacity(PtpHeader::SIZE + body.len());
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&body);
        buf
    }

    fn encode_body(&self) -> Vec<u8> {
        match &self.body {
            PtpMessageBody::Sync { origin_timestamp }
            | PtpMessageBody::DelayReq { origin_timestamp }
            | PtpMessageBody::FollowUp {
                precise_origin_timestamp: origin_timestamp,
            } => origin_timestamp.encode().to_vec(),
            PtpMessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity,
            } => {
                let mut buf = Vec::with_capacity(Self::DELAY_RESP_BODY_SIZE);
                buf.extend_from_slice(&receive_timestamp.encode());
                buf.extend_from_slice(&requesting_port_identity.encode());
                buf
            }
            PtpMessageBody::Announce => Vec::new(),
        }
    }

    /// Create a Sync message (used by tests standing in for the master).
    #[must_use]
    pub fn sync(source: PortIdentity, sequence_id: u16, timestamp: PtpTimestamp) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::Sync, source, sequence_id),
            body: PtpMessageBody::Sync {
                origin_timestamp: timestamp,
            },
        }
    }

    /// Create a `Delay_Resp` message (used by tests standing in for the
    /// master).
    #[must_use]
    pub fn delay_resp(
        source: PortIdentity,
        sequence_id: u16,
        receive_timestamp: PtpTimestamp,
        requesting_port: PortIdentity,
    ) -> Self {
        Self {
            header: PtpHeader::new(PtpMessageType::DelayResp, source, sequence_id),
            body: PtpMessageBody::DelayResp {
                receive_timestamp,
                requesting_port_identity: requesting_port,
            },
        }
    }
}

/// Errors from PTP message parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PtpParseError {
    /// Frame shorter than its declared body.
    #[error("frame too short: need {needed} bytes, have {have}")]
    TooShort {
        /// Minimum bytes needed.
        needed: usize,
        /// Bytes actually available.
        have: usize,
    },
    /// Message-type nibble outside the recognized set.
    #[error("unknown PTP message type: 0x{0:02X}")]
    UnknownMessageType(u8),
}
