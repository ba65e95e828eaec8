//! BNO055 register addresses and UART frame constants.
//!
//! Only the registers needed for mode selection and orientation readout are
//! listed here. Addresses refer to register page 0, which is the page the
//! device comes up on after power-on.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// First byte of every request frame sent to the device
pub const START_BYTE: u8 = 0xAA;

/// Request opcode for a register write
pub const OP_WRITE: u8 = 0x00;

/// Request opcode for a register read
pub const OP_READ: u8 = 0x01;

/// First byte of a write acknowledgement (and of a failed read response)
pub const WRITE_ACK: u8 = 0xEE;

/// First byte of a successful read response
pub const READ_ACK: u8 = 0xBB;

/// Status byte reported by the device for a successful write
pub const STATUS_WRITE_SUCCESS: u8 = 0x01;

/// Length of the request header (start, opcode, register, length)
pub const REQUEST_HEADER_LEN: usize = 4;

/// Length of every response header
pub const RESPONSE_HEADER_LEN: usize = 2;

/// Largest payload a single frame can carry (the length field is one byte)
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Euler angle block: heading, roll, pitch as little-endian i16
pub const EUL_DATA: u8 = 0x1A;

/// Size of the Euler block in bytes
pub const EUL_DATA_LEN: u8 = 6;

/// Quaternion block: w, x, y, z as little-endian i16
pub const QUA_DATA: u8 = 0x20;

/// Size of the quaternion block in bytes
pub const QUA_DATA_LEN: u8 = 8;

/// Unit selection register
pub const UNIT_SEL: u8 = 0x3B;

/// Operating mode register
pub const OPR_MODE: u8 = 0x3D;

/// UNIT_SEL value: m/s², dps, radians for Euler output, Celsius, Windows orientation
pub const UNIT_SEL_EULER_RADIANS: u8 = 0x04;

/// Euler LSB per radian when UNIT_SEL selects radians
pub const EULER_COUNTS_PER_RADIAN: f32 = 900.0;

/// Quaternion LSB per unit (2^14)
pub const QUATERNION_COUNTS_PER_UNIT: f32 = 16384.0;

/// Operating modes written to [`OPR_MODE`].
///
/// Fusion modes (`Imu` and above) are the ones that populate the Euler and
/// quaternion blocks. Register writes other than `OPR_MODE` itself are only
/// accepted by the device in `Config` mode.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum OperatingMode {
    /// Configuration mode, all sensors idle
    Config,
    /// Relative orientation from accelerometer and gyroscope
    #[default]
    Imu,
    /// Heading from accelerometer and magnetometer
    Compass,
    /// Magnet-for-gyroscope fusion, accelerometer and magnetometer only
    M4g,
    /// Nine degrees of freedom without fast magnetometer calibration
    NdofFmcOff,
    /// Nine degrees of freedom absolute orientation
    Ndof,
}

impl OperatingMode {
    /// Register value for this mode
    pub fn register_value(self) -> u8 {
        match self {
            OperatingMode::Config => 0x00,
            OperatingMode::Imu => 0x08,
            OperatingMode::Compass => 0x09,
            OperatingMode::M4g => 0x0A,
            OperatingMode::NdofFmcOff => 0x0B,
            OperatingMode::Ndof => 0x0C,
        }
    }

    /// Whether the mode produces fused orientation output
    pub fn is_fusion(self) -> bool {
        !matches!(self, OperatingMode::Config)
    }
}
