//! Byte transport used by the register codec.
//!
//! The BNO055 UART protocol needs exactly three things from the link: send a
//! buffer completely, receive an exact number of bytes, and discard whatever
//! unread input is sitting in the receive buffer. Every call carries its own
//! timeout so a dead sensor can never hang the caller for longer than the
//! budget it asked for.
//!
//! [`SerialPortTransport`] implements this over a host serial port (USB-UART
//! adapter). [`crate::sim::SimulatedBno055`] implements it in memory for tests.

use std::io;
use std::time::Duration;

/// Blocking byte transport with per-call timeouts.
pub trait SerialTransport {
    /// Send all of `data` within `timeout`.
    ///
    /// A partial write is an error; implementations should report it as
    /// [`io::ErrorKind::WriteZero`] or [`io::ErrorKind::TimedOut`].
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> io::Result<()>;

    /// Fill `buf` completely within `timeout`.
    ///
    /// A short read is an error ([`io::ErrorKind::TimedOut`] or
    /// [`io::ErrorKind::UnexpectedEof`]). The contents of `buf` are
    /// unspecified on error.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<()>;

    /// Discard any received bytes that have not been read yet.
    fn flush(&mut self);
}

impl<T: SerialTransport + ?Sized> SerialTransport for &mut T {
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
        (**self).transmit(data, timeout)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<()> {
        (**self).receive(buf, timeout)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn transmit(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
        (**self).transmit(data, timeout)
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<()> {
        (**self).receive(buf, timeout)
    }

    fn flush(&mut self) {
        (**self).flush()
    }
}

#[cfg(feature = "serial")]
pub use self::serial::{SerialPortTransport, DEFAULT_BAUD_RATE};

#[cfg(feature = "serial")]
mod serial {
    use std::io::{self, Read, Write};
    use std::time::{Duration, Instant};

    use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
    use tracing::{debug, trace, warn};

    use super::SerialTransport;

    /// Baud rate the BNO055 UART interface runs at out of reset
    pub const DEFAULT_BAUD_RATE: u32 = 115_200;

    /// [`SerialTransport`] over a host serial port.
    ///
    /// The port is configured 8N1 without flow control, which is the only
    /// framing the BNO055 supports.
    pub struct SerialPortTransport {
        port: Box<dyn SerialPort>,
    }

    impl SerialPortTransport {
        /// Open `path` (e.g. `/dev/ttyUSB0` or `COM3`) at `baud_rate`.
        pub fn open(path: &str, baud_rate: u32) -> io::Result<Self> {
            let port = serialport::new(path, baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(100))
                .open()
                .map_err(io::Error::from)?;

            debug!("Opened {} at {} baud", path, baud_rate);
            Ok(Self { port })
        }

        /// Wrap an already configured port
        pub fn from_port(port: Box<dyn SerialPort>) -> Self {
            Self { port }
        }

        fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
            self.port.set_timeout(timeout).map_err(io::Error::from)
        }
    }

    /// Time left before `deadline`, or a timeout error once it has passed
    fn remaining(deadline: Instant, done: usize, total: usize) -> io::Result<Duration> {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("transferred {done} of {total} bytes before timeout"),
            ));
        }
        Ok(left)
    }

    impl SerialTransport for SerialPortTransport {
        fn transmit(&mut self, data: &[u8], timeout: Duration) -> io::Result<()> {
            let deadline = Instant::now() + timeout;
            trace!("UART tx: {:02X?}", data);

            let mut sent = 0;
            while sent < data.len() {
                self.set_timeout(remaining(deadline, sent, data.len())?)?;
                match self.port.write(&data[sent..]) {
                    Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                    Ok(n) => sent += n,
                    Err(e) if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
                    ) => {}
                    Err(e) => return Err(e),
                }
            }
            self.port.flush()
        }

        fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<()> {
            let deadline = Instant::now() + timeout;

            // Each read gets only what is left of the budget, so a device
            // trickling bytes cannot stretch the call past `timeout`
            let mut received = 0;
            while received < buf.len() {
                self.set_timeout(remaining(deadline, received, buf.len())?)?;
                match self.port.read(&mut buf[received..]) {
                    Ok(n) => received += n,
                    Err(e) if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted | io::ErrorKind::TimedOut
                    ) => {}
                    Err(e) => return Err(e),
                }
            }
            trace!("UART rx: {:02X?}", buf);
            Ok(())
        }

        fn flush(&mut self) {
            if let Err(e) = self.port.clear(ClearBuffer::Input) {
                warn!("Failed to clear UART input buffer: {}", e);
            }
        }
    }

}
