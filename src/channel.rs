//! CAN Channel Manager
//!
//! Owns the device handle and the connection state machine, translating
//! symbolic channel/bitrate names into driver values and guarding every
//! read/write against an uninitialized channel.

use tracing::{info, warn};

use crate::device::{Device, Status};
use crate::error::{Error, Result};
use crate::frame::{self, CanFrame};

/// Fallback channel for unrecognized or absent names: `PCAN_USBBUS1`.
pub const DEFAULT_CHANNEL: u16 = 0x51;
/// Fallback bitrate for unrecognized or absent names: `PCAN_BAUD_500K`.
pub const DEFAULT_BITRATE: u16 = 0x001C;

/// Resolve a symbolic channel name to its driver handle value.
///
/// Closed table: only the names listed here resolve, nothing is looked up
/// dynamically from caller input.
pub fn resolve_channel(name: &str) -> Option<u16> {
    let value = match name {
        "PCAN_USBBUS1" => 0x51,
        "PCAN_USBBUS2" => 0x52,
        "PCAN_USBBUS3" => 0x53,
        "PCAN_USBBUS4" => 0x54,
        "PCAN_USBBUS5" => 0x55,
        "PCAN_USBBUS6" => 0x56,
        "PCAN_USBBUS7" => 0x57,
        "PCAN_USBBUS8" => 0x58,
        "PCAN_PCIBUS1" => 0x41,
        "PCAN_PCIBUS2" => 0x42,
        "PCAN_PCIBUS3" => 0x43,
        "PCAN_PCIBUS4" => 0x44,
        _ => return None,
    };
    Some(value)
}

/// Resolve a symbolic bitrate name to its driver BTR register value.
pub fn resolve_bitrate(name: &str) -> Option<u16> {
    let value = match name {
        "PCAN_BAUD_1M" => 0x0014,
        "PCAN_BAUD_800K" => 0x0016,
        "PCAN_BAUD_500K" => 0x001C,
        "PCAN_BAUD_250K" => 0x011C,
        "PCAN_BAUD_125K" => 0x031C,
        "PCAN_BAUD_100K" => 0x432F,
        "PCAN_BAUD_50K" => 0x472F,
        "PCAN_BAUD_20K" => 0x532F,
        "PCAN_BAUD_10K" => 0x672F,
        "PCAN_BAUD_5K" => 0x7F7F,
        _ => return None,
    };
    Some(value)
}

/// Applied channel configuration. Immutable once Ready; re-initializing
/// replaces it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: u16,
    pub bitrate: u16,
    pub is_fd: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL,
            bitrate: DEFAULT_BITRATE,
            is_fd: false,
        }
    }
}

/// Connection state of the single adapter channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Uninitialized,
    Ready,
}

/// Snapshot returned by the status query.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Raw status word, fixed-width hex: `XXXXXh`.
    pub code: String,
    pub text: String,
    /// Decoded text of the most recent failed operation, if any.
    pub last_error: Option<String>,
}

/// Channel session: device handle plus connection state.
///
/// One session exists per process. Callers serialize access through a
/// single lock; no operation here blocks, reads against an empty queue
/// return immediately.
pub struct ChannelManager {
    device: Box<dyn Device>,
    config: ChannelConfig,
    state: ChannelState,
    last_error: Option<Status>,
}

impl ChannelManager {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            device,
            config: ChannelConfig::default(),
            state: ChannelState::Uninitialized,
            last_error: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ChannelState::Ready
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    pub fn last_error(&self) -> Option<Status> {
        self.last_error
    }

    /// Initialize the channel from symbolic names.
    ///
    /// Unrecognized or absent names fall back to `PCAN_USBBUS1` /
    /// `PCAN_BAUD_500K`. A Ready channel is released before the new
    /// configuration is applied, so the prior driver session cannot leak.
    /// FD mode is rejected before any device call: this bridge does not
    /// construct the FD bit-rate string the driver would need.
    pub fn initialize(
        &mut self,
        channel: Option<&str>,
        baudrate: Option<&str>,
        is_fd: bool,
    ) -> Result<String> {
        if is_fd {
            return Err(Error::NotImplemented);
        }

        let channel = match channel {
            Some(name) => resolve_channel(name).unwrap_or_else(|| {
                warn!("unknown channel name {name:?}, using PCAN_USBBUS1");
                DEFAULT_CHANNEL
            }),
            None => DEFAULT_CHANNEL,
        };
        let bitrate = match baudrate {
            Some(name) => resolve_bitrate(name).unwrap_or_else(|| {
                warn!("unknown baudrate name {name:?}, using PCAN_BAUD_500K");
                DEFAULT_BITRATE
            }),
            None => DEFAULT_BITRATE,
        };

        if self.state == ChannelState::Ready {
            info!(
                "re-initialize over ready channel {:02X}h, releasing first",
                self.config.channel
            );
            self.release()?;
        }

        info!(
            "initializing channel {:02X}h at bitrate code {:04X}h",
            channel, bitrate
        );
        let status = self.device.initialize(channel, bitrate);
        if status.is_ok() {
            self.config = ChannelConfig {
                channel,
                bitrate,
                is_fd: false,
            };
            self.state = ChannelState::Ready;
            self.last_error = None;
            Ok(format!(
                "Channel {channel:02X}h initialized successfully at the specified baudrate."
            ))
        } else {
            self.state = ChannelState::Uninitialized;
            self.fail(status)
        }
    }

    /// Release the channel.
    ///
    /// Always forwarded to the device; with an idempotent driver
    /// uninitialize this succeeds no matter how often it is called.
    pub fn release(&mut self) -> Result<()> {
        let status = self.device.uninitialize(self.config.channel);
        if status.is_ok() {
            if self.state == ChannelState::Ready {
                info!("channel {:02X}h released", self.config.channel);
            }
            self.state = ChannelState::Uninitialized;
            Ok(())
        } else {
            self.fail(status)
        }
    }

    /// Query the driver status. Pure read, no state transition.
    pub fn status_report(&mut self) -> StatusReport {
        let status = self.device.get_status(self.config.channel);
        StatusReport {
            code: format!("{:05X}h", status.0),
            text: self.device.error_text(status),
            last_error: self.last_error.map(|s| self.device.error_text(s)),
        }
    }

    /// Poll the receive queue.
    ///
    /// `Ok(None)` when the queue is empty; never blocks. Rejected outright
    /// while the channel is uninitialized, the device is not touched.
    pub fn read(&mut self) -> Result<Option<(CanFrame, u64)>> {
        if self.state != ChannelState::Ready {
            return Err(Error::NotInitialized);
        }

        if self.config.is_fd {
            let (status, raw, timestamp_us) = self.device.read_fd(self.config.channel);
            if status.is_queue_empty() {
                return Ok(None);
            }
            if !status.is_ok() {
                return self.fail(status);
            }
            Ok(Some(frame::decode_fd(&raw, timestamp_us)))
        } else {
            let (status, raw, ts) = self.device.read(self.config.channel);
            if status.is_queue_empty() {
                return Ok(None);
            }
            if !status.is_ok() {
                return self.fail(status);
            }
            Ok(Some(frame::decode_classic(&raw, &ts)))
        }
    }

    /// Transmit a frame in the channel's framing mode.
    pub fn write(&mut self, frame: &CanFrame) -> Result<()> {
        if self.state != ChannelState::Ready {
            return Err(Error::NotInitialized);
        }

        let status = if self.config.is_fd {
            self.device.write_fd(self.config.channel, &frame.to_raw_fd())
        } else {
            self.device.write(self.config.channel, &frame.to_raw())
        };
        if status.is_ok() {
            Ok(())
        } else {
            self.fail(status)
        }
    }

    fn fail<T>(&mut self, status: Status) -> Result<T> {
        self.last_error = Some(status);
        Err(Error::Device(self.device.error_text(status)))
    }
}

impl Drop for ChannelManager {
    fn drop(&mut self) {
        if self.state == ChannelState::Ready {
            info!(
                "releasing channel {:02X}h on shutdown",
                self.config.channel
            );
            let _ = self.device.uninitialize(self.config.channel);
        }
    }
}
