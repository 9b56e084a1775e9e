//! CAN Frame Codec
//!
//! Converts between the driver-native frame/timestamp structures and the
//! transport-facing [`CanFrame`], normalizing classic and FD length fields
//! and both timestamp layouts into one microsecond-resolution value.

use bitflags::bitflags;

use crate::device::{RawFrame, RawFrameFd, RawTimestamp};
use crate::error::{Error, Result};

/// Maximum payload of a classic CAN frame.
pub const CLASSIC_MAX_DATA: usize = 8;
/// Maximum payload of a CAN-FD frame.
pub const FD_MAX_DATA: usize = 64;
/// Largest 11-bit (standard) identifier.
pub const STANDARD_ID_MAX: u32 = 0x7FF;
/// Largest 29-bit (extended) identifier.
pub const EXTENDED_ID_MAX: u32 = 0x1FFF_FFFF;

bitflags! {
    /// PCAN message type flag word (`TPCANMessageType`).
    ///
    /// A standard data frame is the empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MsgType: u8 {
        const RTR = 0x01;
        const EXTENDED = 0x02;
        const FD = 0x04;
        const BRS = 0x08;
        const ESI = 0x10;
        const ERRFRAME = 0x40;
        const STATUS = 0x80;
    }
}

/// Transport-facing CAN frame.
///
/// The payload length is always `data.len()`; there is no separate length
/// field to fall out of sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanFrame {
    pub id: u32,
    pub msg_type: MsgType,
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Build a frame from caller-supplied parts.
    ///
    /// The id is parsed as case-insensitive hex without a `0x` prefix and
    /// checked against the 11-bit or 29-bit range for the addressing mode.
    /// The payload is capped at 8 bytes (classic) or 64 bytes (FD).
    pub fn from_request(
        id_hex: &str,
        data: Vec<u8>,
        extended: bool,
        rtr: bool,
        fd_mode: bool,
    ) -> Result<Self> {
        let id = u32::from_str_radix(id_hex.trim(), 16).map_err(|_| {
            Error::InvalidFormat(format!("invalid CAN id {id_hex:?}: expected hex digits"))
        })?;

        let id_max = if extended {
            EXTENDED_ID_MAX
        } else {
            STANDARD_ID_MAX
        };
        if id > id_max {
            return Err(Error::InvalidFormat(format!(
                "CAN id {id:X}h exceeds the {}-bit maximum",
                if extended { 29 } else { 11 }
            )));
        }

        let data_max = if fd_mode { FD_MAX_DATA } else { CLASSIC_MAX_DATA };
        if data.len() > data_max {
            return Err(Error::InvalidFormat(format!(
                "payload of {} bytes exceeds the {data_max}-byte frame limit",
                data.len()
            )));
        }

        let mut msg_type = MsgType::empty();
        if extended {
            msg_type |= MsgType::EXTENDED;
        }
        if rtr {
            msg_type |= MsgType::RTR;
        }

        Ok(Self { id, msg_type, data })
    }

    pub fn is_extended(&self) -> bool {
        self.msg_type.contains(MsgType::EXTENDED)
    }

    pub fn is_rtr(&self) -> bool {
        self.msg_type.contains(MsgType::RTR)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Identifier as uppercase hex, no padding, no prefix.
    pub fn id_hex(&self) -> String {
        format!("{:X}", self.id)
    }

    /// Convert to the driver-native classic layout.
    pub fn to_raw(&self) -> RawFrame {
        let mut raw = RawFrame {
            id: self.id,
            msg_type: self.msg_type.bits(),
            len: self.data.len() as u8,
            data: [0; 8],
        };
        raw.data[..self.data.len()].copy_from_slice(&self.data);
        raw
    }

    /// Convert to the driver-native FD layout.
    ///
    /// The DLC is the smallest code covering the payload; the buffer pads
    /// with zeros up to the DLC size, as the bus itself would.
    pub fn to_raw_fd(&self) -> RawFrameFd {
        let mut raw = RawFrameFd {
            id: self.id,
            msg_type: (self.msg_type | MsgType::FD).bits(),
            dlc: len_to_dlc(self.data.len()),
            data: [0; 64],
        };
        raw.data[..self.data.len()].copy_from_slice(&self.data);
        raw
    }
}

/// Decode a classic frame and its split timestamp.
///
/// Well-formed driver output never carries a length above 8; a larger value
/// is clamped to the buffer rather than trusted.
pub fn decode_classic(raw: &RawFrame, ts: &RawTimestamp) -> (CanFrame, u64) {
    let len = (raw.len as usize).min(CLASSIC_MAX_DATA);
    let frame = CanFrame {
        id: raw.id,
        msg_type: MsgType::from_bits_truncate(raw.msg_type),
        data: raw.data[..len].to_vec(),
    };
    (frame, classic_timestamp_us(ts))
}

/// Decode an FD frame; its timestamp is already a microsecond counter.
pub fn decode_fd(raw: &RawFrameFd, timestamp_us: u64) -> (CanFrame, u64) {
    let len = dlc_to_len(raw.dlc).min(FD_MAX_DATA);
    let frame = CanFrame {
        id: raw.id,
        msg_type: MsgType::from_bits_truncate(raw.msg_type),
        data: raw.data[..len].to_vec(),
    };
    (frame, timestamp_us)
}

/// Reassemble the split classic timestamp into microseconds:
/// `micros + 1000*millis + 2^32*1000*millis_overflow`.
pub fn classic_timestamp_us(ts: &RawTimestamp) -> u64 {
    ts.micros as u64 + 1_000 * ts.millis as u64 + (1_000u64 << 32) * ts.millis_overflow as u64
}

/// CAN-FD DLC code to payload length. Non-linear above 8.
pub const fn dlc_to_len(dlc: u8) -> usize {
    match dlc {
        0..=8 => dlc as usize,
        9 => 12,
        10 => 16,
        11 => 20,
        12 => 24,
        13 => 32,
        14 => 48,
        _ => 64,
    }
}

/// Smallest CAN-FD DLC code covering a payload length.
pub const fn len_to_dlc(len: usize) -> u8 {
    match len {
        0..=8 => len as u8,
        9..=12 => 9,
        13..=16 => 10,
        17..=20 => 11,
        21..=24 => 12,
        25..=32 => 13,
        33..=48 => 14,
        _ => 15,
    }
}
