//! PCAN HTTP Bridge
//!
//! Exposes a PCAN CAN-bus adapter over an HTTP JSON API: channel lifecycle
//! (initialize / release / status), raw frame relay in both directions, and
//! decoding of the TPMS tire-sensor telemetry carried inside CAN payloads.
//!
//! The vendor driver is consumed through the small [`device::Device`]
//! capability trait; [`device::LoopbackDevice`] provides a software channel
//! so the daemon and test suite run without hardware.

pub mod channel;
pub mod device;
pub mod error;
pub mod frame;
pub mod server;
pub mod tpms;

pub use channel::{ChannelConfig, ChannelManager, ChannelState, StatusReport};
pub use device::{Device, LoopbackDevice, RawFrame, RawFrameFd, RawTimestamp, Status};
pub use error::{Error, Result};
pub use frame::{CanFrame, MsgType};
pub use server::{create_router, AppState, SharedState};
pub use tpms::{parse_sensor_data, CollectionSession, TpmsReading};
