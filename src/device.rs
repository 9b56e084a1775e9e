//! PCAN Device Capability Layer
//!
//! Defines the small capability interface the bridge needs from a PCAN-style
//! driver (initialize, uninitialize, get-status, read, write, error-text
//! lookup) together with the driver-native frame and timestamp structures.
//! A software loopback implementation backs the daemon when no hardware
//! driver is linked in, and doubles as the test double.

use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info};

/// Driver status word returned by every device operation.
///
/// Values follow the PCAN-Basic `TPCANStatus` encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u32);

impl Status {
    pub const OK: Status = Status(0x00000);
    /// Transmit buffer in the controller is full.
    pub const XMT_FULL: Status = Status(0x00001);
    /// CAN controller was read too late.
    pub const OVERRUN: Status = Status(0x00002);
    /// Bus error: error counter reached the light limit.
    pub const BUS_LIGHT: Status = Status(0x00004);
    /// Bus error: error counter reached the heavy limit.
    pub const BUS_HEAVY: Status = Status(0x00008);
    /// Bus error: the controller is in bus-off state.
    pub const BUS_OFF: Status = Status(0x00010);
    /// Receive queue is empty.
    pub const QRCV_EMPTY: Status = Status(0x00020);
    /// Receive queue overrun.
    pub const QOVERRUN: Status = Status(0x00040);
    /// Transmit queue is full.
    pub const QXMT_FULL: Status = Status(0x00080);
    /// No driver available.
    pub const NO_DRIVER: Status = Status(0x00200);
    /// Hardware already in use by another session.
    pub const HW_IN_USE: Status = Status(0x00400);
    /// Invalid hardware handle.
    pub const ILL_HW: Status = Status(0x01400);
    /// Resource (FIFO, client, timeout) cannot be created.
    pub const RESOURCE: Status = Status(0x02000);
    /// Invalid parameter value.
    pub const ILL_PARAM_VAL: Status = Status(0x08000);
    /// Channel is not initialized.
    pub const INITIALIZE: Status = Status(0x40000);
    /// Invalid operation for the current state.
    pub const ILL_OPERATION: Status = Status(0x80000);

    pub fn is_ok(self) -> bool {
        self == Status::OK
    }

    pub fn is_queue_empty(self) -> bool {
        self == Status::QRCV_EMPTY
    }

    /// Decoded text for the known status codes.
    ///
    /// Unknown codes render the same way the driver's own lookup failure
    /// does: `Unknown error code: XXXXXh`.
    pub fn describe(self) -> String {
        let text = match self {
            Status::OK => "No error",
            Status::XMT_FULL => "Transmit buffer in CAN controller is full",
            Status::OVERRUN => "CAN controller was read too late",
            Status::BUS_LIGHT => "Bus error: an error counter reached the 'light' limit",
            Status::BUS_HEAVY => "Bus error: an error counter reached the 'heavy' limit",
            Status::BUS_OFF => "Bus error: the CAN controller is in bus-off state",
            Status::QRCV_EMPTY => "Receive queue is empty",
            Status::QOVERRUN => "Receive queue was read too late",
            Status::QXMT_FULL => "Transmit queue is full",
            Status::NO_DRIVER => "The driver is not loaded",
            Status::HW_IN_USE => "Hardware already in use by a network",
            Status::ILL_HW => "Hardware handle is invalid",
            Status::RESOURCE => "Resource (FIFO, client, timeout) cannot be created",
            Status::ILL_PARAM_VAL => "Invalid parameter value",
            Status::INITIALIZE => "Channel is not initialized",
            Status::ILL_OPERATION => "Invalid operation",
            Status(code) => return format!("Unknown error code: {code:05X}h"),
        };
        text.to_string()
    }
}

/// Driver-native classic CAN frame (`TPCANMsg` layout).
#[derive(Debug, Clone, Copy, Default)]
pub struct RawFrame {
    pub id: u32,
    pub msg_type: u8,
    pub len: u8,
    pub data: [u8; 8],
}

/// Driver-native CAN-FD frame (`TPCANMsgFD` layout).
///
/// `dlc` is the length code, not a byte count.
#[derive(Debug, Clone, Copy)]
pub struct RawFrameFd {
    pub id: u32,
    pub msg_type: u8,
    pub dlc: u8,
    pub data: [u8; 64],
}

impl Default for RawFrameFd {
    fn default() -> Self {
        Self {
            id: 0,
            msg_type: 0,
            dlc: 0,
            data: [0; 64],
        }
    }
}

/// Driver-native classic timestamp (`TPCANTimestamp` layout).
///
/// The microsecond value is split across three fields; `millis` wraps into
/// `millis_overflow` every 2^32 milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawTimestamp {
    pub millis: u32,
    pub millis_overflow: u16,
    pub micros: u16,
}

/// Capability interface for a PCAN-style channel driver.
///
/// Operations return the raw driver status word; callers translate codes to
/// text through [`Device::error_text`]. FD reads carry their timestamp as a
/// plain microsecond counter instead of the split classic layout.
pub trait Device: Send {
    fn initialize(&mut self, channel: u16, bitrate: u16) -> Status;

    fn uninitialize(&mut self, channel: u16) -> Status;

    fn get_status(&mut self, channel: u16) -> Status;

    fn read(&mut self, channel: u16) -> (Status, RawFrame, RawTimestamp);

    fn read_fd(&mut self, channel: u16) -> (Status, RawFrameFd, u64);

    fn write(&mut self, channel: u16, frame: &RawFrame) -> Status;

    fn write_fd(&mut self, channel: u16, frame: &RawFrameFd) -> Status;

    /// Decode a status word into display text.
    fn error_text(&self, status: Status) -> String {
        status.describe()
    }
}

/// Software CAN channel: frames written to it loop back into its receive
/// queue, stamped with the elapsed time since the device was created.
///
/// Stands in for the vendor driver so the daemon runs end-to-end without
/// hardware attached; a PCAN-Basic FFI backend would implement [`Device`]
/// over the real driver instead.
pub struct LoopbackDevice {
    initialized: Option<u16>,
    rx: VecDeque<(RawFrame, RawTimestamp)>,
    rx_fd: VecDeque<(RawFrameFd, u64)>,
    epoch: Instant,
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self {
            initialized: None,
            rx: VecDeque::new(),
            rx_fd: VecDeque::new(),
            epoch: Instant::now(),
        }
    }

    fn now_us(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn classic_timestamp(&self) -> RawTimestamp {
        let us = self.now_us();
        let total_millis = us / 1_000;
        RawTimestamp {
            millis: total_millis as u32,
            millis_overflow: (total_millis >> 32) as u16,
            micros: (us % 1_000) as u16,
        }
    }

    fn check_channel(&self, channel: u16) -> Status {
        match self.initialized {
            Some(active) if active == channel => Status::OK,
            _ => Status::INITIALIZE,
        }
    }
}

impl Default for LoopbackDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for LoopbackDevice {
    fn initialize(&mut self, channel: u16, bitrate: u16) -> Status {
        if self.initialized.is_some() {
            return Status::ILL_OPERATION;
        }
        info!(
            "loopback channel {:02X}h up at bitrate code {:04X}h",
            channel, bitrate
        );
        self.initialized = Some(channel);
        Status::OK
    }

    fn uninitialize(&mut self, channel: u16) -> Status {
        // Idempotent, like the real driver's Uninitialize.
        if self.initialized.take().is_some() {
            info!("loopback channel {:02X}h down", channel);
            self.rx.clear();
            self.rx_fd.clear();
        }
        Status::OK
    }

    fn get_status(&mut self, channel: u16) -> Status {
        self.check_channel(channel)
    }

    fn read(&mut self, channel: u16) -> (Status, RawFrame, RawTimestamp) {
        let status = self.check_channel(channel);
        if !status.is_ok() {
            return (status, RawFrame::default(), RawTimestamp::default());
        }
        match self.rx.pop_front() {
            Some((frame, ts)) => {
                debug!("RX: id={:X} len={}", frame.id, frame.len);
                (Status::OK, frame, ts)
            }
            None => (Status::QRCV_EMPTY, RawFrame::default(), RawTimestamp::default()),
        }
    }

    fn read_fd(&mut self, channel: u16) -> (Status, RawFrameFd, u64) {
        let status = self.check_channel(channel);
        if !status.is_ok() {
            return (status, RawFrameFd::default(), 0);
        }
        match self.rx_fd.pop_front() {
            Some((frame, ts)) => (Status::OK, frame, ts),
            None => (Status::QRCV_EMPTY, RawFrameFd::default(), 0),
        }
    }

    fn write(&mut self, channel: u16, frame: &RawFrame) -> Status {
        let status = self.check_channel(channel);
        if !status.is_ok() {
            return status;
        }
        debug!("TX: id={:X} len={}", frame.id, frame.len);
        let ts = self.classic_timestamp();
        self.rx.push_back((*frame, ts));
        Status::OK
    }

    fn write_fd(&mut self, channel: u16, frame: &RawFrameFd) -> Status {
        let status = self.check_channel(channel);
        if !status.is_ok() {
            return status;
        }
        let ts = self.now_us();
        self.rx_fd.push_back((*frame, ts));
        Status::OK
    }
}
