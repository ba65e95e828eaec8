//! BNO055 driver: initialization, polling and reference zeroing.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use bno055::{Bno055, SerialPortTransport};
//!
//! let transport = SerialPortTransport::open("/dev/ttyUSB0", 115_200)?;
//! let mut imu = Bno055::new(transport);
//! imu.init(Duration::from_millis(500))?;
//!
//! loop {
//!     if imu.update().is_ok() {
//!         let e = imu.euler();
//!         println!("{:.3} {:.3} {:.3}", e.x, e.y, e.z);
//!     }
//!     std::thread::sleep(Duration::from_millis(10));
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Duration;

use nalgebra::Quaternion;
use tracing::{debug, info};

use crate::clock::{MonotonicClock, SystemClock};
use crate::codec::RegisterCodec;
use crate::error::{Bno055Error, Bno055Result};
use crate::frame::decode_i16_le;
use crate::orientation::{EulerAngles, Orientation, OrientationState};
use crate::registers::{
    OperatingMode, EUL_DATA, EUL_DATA_LEN, OPR_MODE, QUA_DATA, QUA_DATA_LEN, UNIT_SEL,
    UNIT_SEL_EULER_RADIANS,
};
use crate::transport::SerialTransport;

/// Default timeout for each individual transmit/receive call.
pub const DEFAULT_TRANSACTION_TIMEOUT: Duration = Duration::from_millis(20);

/// BNO055 absolute orientation sensor on a UART link.
///
/// The driver holds the last good reading. A failed [`update`](Self::update)
/// never changes what the accessors return, so callers always see either the
/// previous complete reading or the new one.
///
/// All methods take `&mut self`; the driver has a single owner and does no
/// locking of its own. To poll from a background thread see
/// [`crate::poller`].
pub struct Bno055<T, C = SystemClock> {
    codec: RegisterCodec<T>,
    clock: C,
    transaction_timeout: Duration,
    fusion_mode: OperatingMode,
    state: OrientationState,
}

impl<T: SerialTransport> Bno055<T, SystemClock> {
    /// Create a driver using the system clock to bound [`init`](Self::init)
    pub fn new(transport: T) -> Self {
        Self::with_clock(transport, SystemClock::new())
    }
}

impl<T: SerialTransport, C: MonotonicClock> Bno055<T, C> {
    /// Create a driver with a custom monotonic clock
    pub fn with_clock(transport: T, clock: C) -> Self {
        Self {
            codec: RegisterCodec::new(transport),
            clock,
            transaction_timeout: DEFAULT_TRANSACTION_TIMEOUT,
            fusion_mode: OperatingMode::default(),
            state: OrientationState::new(),
        }
    }

    /// Set the timeout applied to every transmit and receive call.
    ///
    /// An [`update`](Self::update) makes four receive and two transmit calls,
    /// so it can block for up to six times this value.
    pub fn set_transaction_timeout(&mut self, timeout: Duration) {
        self.transaction_timeout = timeout;
    }

    pub fn transaction_timeout(&self) -> Duration {
        self.transaction_timeout
    }

    /// Choose the fusion mode entered at the end of [`init`](Self::init).
    ///
    /// # Panics
    ///
    /// Panics if `mode` is [`OperatingMode::Config`], which never produces
    /// orientation output.
    pub fn set_fusion_mode(&mut self, mode: OperatingMode) {
        assert!(mode.is_fusion(), "{mode} is not a fusion mode");
        self.fusion_mode = mode;
    }

    pub fn fusion_mode(&self) -> OperatingMode {
        self.fusion_mode
    }

    /// Configure the device for orientation output.
    ///
    /// Runs the sequence config mode → Euler units in radians → fusion mode.
    /// If any step fails the whole sequence starts over from config mode,
    /// since the device state after a partial sequence is unknown. Gives up
    /// once `timeout` has elapsed on the driver's clock.
    pub fn init(&mut self, timeout: Duration) -> Bno055Result<()> {
        let start = self.clock.now();
        let mut attempts = 0u32;

        while self.clock.now().saturating_sub(start) < timeout {
            attempts += 1;
            match self.configure() {
                Ok(()) => {
                    info!(
                        "BNO055 initialized in {} mode after {} attempt(s)",
                        self.fusion_mode, attempts
                    );
                    return Ok(());
                }
                Err(e) => debug!("BNO055 init attempt {} failed: {}", attempts, e),
            }
        }

        Err(Bno055Error::InitTimeout { timeout, attempts })
    }

    /// One pass of the configuration sequence
    fn configure(&mut self) -> Bno055Result<()> {
        let timeout = self.transaction_timeout;
        self.codec.write_register(
            OPR_MODE,
            &[OperatingMode::Config.register_value()],
            timeout,
        )?;
        self.codec
            .write_register(UNIT_SEL, &[UNIT_SEL_EULER_RADIANS], timeout)?;
        self.codec
            .write_register(OPR_MODE, &[self.fusion_mode.register_value()], timeout)?;
        Ok(())
    }

    /// Read the Euler and quaternion blocks and recompute the corrected
    /// orientation.
    ///
    /// Both blocks must be read successfully before anything is stored. On
    /// error all raw, offset and corrected values keep their previous state.
    pub fn update(&mut self) -> Bno055Result<()> {
        let timeout = self.transaction_timeout;

        let mut euler_bytes = [0u8; EUL_DATA_LEN as usize];
        self.codec
            .read_register(EUL_DATA, &mut euler_bytes, timeout)?;

        let mut quat_bytes = [0u8; QUA_DATA_LEN as usize];
        self.codec.read_register(QUA_DATA, &mut quat_bytes, timeout)?;

        self.state.apply_counts(
            decode_i16_le::<3>(&euler_bytes),
            decode_i16_le::<4>(&quat_bytes),
        );
        Ok(())
    }

    /// Make the current Euler reading the zero reference.
    ///
    /// Takes effect from the next [`update`](Self::update). Does no I/O.
    pub fn reset_euler_reference(&mut self) {
        self.state.reset_euler_reference();
    }

    /// Make the current quaternion reading the zero reference.
    ///
    /// Takes effect from the next [`update`](Self::update). Does no I/O.
    pub fn reset_quaternion_reference(&mut self) {
        self.state.reset_quaternion_reference();
    }

    /// Corrected Euler angles in radians, each in `[0, 2π)`
    pub fn euler(&self) -> EulerAngles {
        self.state.euler()
    }

    /// Corrected quaternion `(w, x, y, z)`
    pub fn quaternion(&self) -> Quaternion<f32> {
        self.state.quaternion()
    }

    /// Last Euler angles read from the device, without the reference applied
    pub fn raw_euler(&self) -> EulerAngles {
        self.state.raw_euler()
    }

    /// Last quaternion read from the device, without the reference applied
    pub fn raw_quaternion(&self) -> Quaternion<f32> {
        self.state.raw_quaternion()
    }

    pub fn orientation(&self) -> Orientation {
        self.state.orientation()
    }

    /// Full orientation state, including the offsets
    pub fn state(&self) -> &OrientationState {
        &self.state
    }

    /// Direct register access for anything the driver does not wrap
    pub fn codec_mut(&mut self) -> &mut RegisterCodec<T> {
        &mut self.codec
    }

    pub fn transport(&self) -> &T {
        self.codec.transport()
    }

    /// Returns previously consumed transport.
    pub fn free(self) -> T {
        self.codec.into_inner()
    }
}
