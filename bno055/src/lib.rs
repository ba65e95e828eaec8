//! UART driver for the Bosch BNO055 absolute orientation sensor.
//!
//! The BNO055 fuses accelerometer, gyroscope and magnetometer data on-chip and
//! exposes the result as Euler angles and a unit quaternion. This crate talks
//! to it over the UART register protocol, configures it for fused output with
//! Euler angles in radians, and lets callers zero both outputs at the current
//! orientation.
//!
//! # Layers
//!
//! - [`frame`] / [`codec`] - request/response frames and register transactions
//! - [`driver`] - [`Bno055`]: `init`, `update`, reference zeroing
//! - [`orientation`] - Euler normalization and quaternion zeroing math
//! - [`poller`] - background polling thread with a sample channel
//! - [`sim`] - in-memory device for tests and offline development
//!
//! # Features
//!
//! - `serial` (default) - [`SerialPortTransport`] over host serial ports and
//!   the `bno055_tool` binary

pub mod clock;
pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod orientation;
pub mod poller;
pub mod registers;
pub mod sim;
pub mod transport;

pub use clock::{MonotonicClock, SystemClock};
pub use codec::RegisterCodec;
pub use config::DriverConfig;
pub use driver::{Bno055, DEFAULT_TRANSACTION_TIMEOUT};
pub use error::{Bno055Error, Bno055Result};
pub use orientation::{normalize_angle, EulerAngles, Orientation, OrientationState};
pub use poller::{DataReadyNotifier, OrientationSample, Poller, PollerConfig};
pub use registers::OperatingMode;
pub use transport::SerialTransport;

#[cfg(feature = "serial")]
pub use transport::{SerialPortTransport, DEFAULT_BAUD_RATE};
