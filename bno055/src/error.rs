//! Error type shared by the codec, driver and poller.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while talking to a BNO055.
///
/// The device protocol itself only distinguishes "the exchange completed and
/// the device agreed" from everything else. The variants here keep the two
/// failure classes apart (the bytes never arrived vs. the bytes were wrong)
/// so logs can tell a dead link from a confused device.
#[derive(Error, Debug)]
pub enum Bno055Error {
    /// Timeout or short transfer on the serial link.
    #[error("transport failure: {0}")]
    Transport(#[from] std::io::Error),

    /// The device answered, but not with the expected marker/status/length.
    ///
    /// For writes `expected` is `[0xEE, 0x01]`; for reads it is
    /// `[0xBB, length]`. A read response starting with `0xEE` carries the
    /// device's error status in its second byte.
    #[error(
        "unexpected response for register {register:#04x}: expected {expected:02X?}, got {received:02X?}"
    )]
    ProtocolMismatch {
        /// Register addressed by the failed request
        register: u8,
        /// Response header that would have meant success
        expected: [u8; 2],
        /// Response header actually received
        received: [u8; 2],
    },

    /// The configuration sequence never completed within the time budget.
    #[error("initialization did not complete within {timeout:?} ({attempts} attempts)")]
    InitTimeout {
        /// Budget passed to `init`
        timeout: Duration,
        /// Number of attempts started before the budget ran out
        attempts: u32,
    },

    /// The polling thread has exited and no longer accepts commands.
    #[error("poller is no longer running")]
    PollerStopped,
}

/// Result type for BNO055 operations.
pub type Bno055Result<T> = Result<T, Bno055Error>;

impl Bno055Error {
    /// True for failures caused by the link rather than by the device's answer
    pub fn is_transport(&self) -> bool {
        matches!(self, Bno055Error::Transport(_))
    }
}
