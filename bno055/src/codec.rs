//! Register read/write transactions over the BNO055 UART protocol.
//!
//! Each transaction is a single request/response round trip:
//!
//! 1. Flush stale input left behind by an earlier, possibly aborted exchange
//! 2. Send the request frame
//! 3. Read and validate the 2-byte response header
//! 4. For reads, pull the payload straight into the caller's buffer
//!
//! A transaction either fully succeeds or returns an error; there are no
//! retries at this level.
//!
//! A read whose response header does not match the request is rejected before
//! the payload is touched. Whatever payload bytes the device still sends stay
//! in the receive buffer until the flush at the start of the next transaction.

use std::time::Duration;

use tracing::{debug, trace};

use crate::error::{Bno055Error, Bno055Result};
use crate::frame::{encode_read, encode_write, ResponseHeader};
use crate::registers::{MAX_PAYLOAD_LEN, RESPONSE_HEADER_LEN};
use crate::transport::SerialTransport;

/// Register-level access to a BNO055 over a [`SerialTransport`].
pub struct RegisterCodec<T> {
    transport: T,
}

impl<T: SerialTransport> RegisterCodec<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Write `data` starting at `register`.
    ///
    /// Succeeds only if the device acknowledges with exactly `EE 01`.
    ///
    /// # Panics
    ///
    /// Panics if `data` is longer than 255 bytes.
    pub fn write_register(
        &mut self,
        register: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Bno055Result<()> {
        let frame = encode_write(register, data);

        self.transport.flush();
        trace!("BNO055 write {:#04x}: {:02X?}", register, data);
        self.transport.transmit(&frame, timeout)?;

        let mut response = [0u8; RESPONSE_HEADER_LEN];
        self.transport.receive(&mut response, timeout)?;

        let header = ResponseHeader::from(response);
        if header != ResponseHeader::WRITE_SUCCESS {
            debug!(
                "BNO055 write {:#04x} rejected: {:02X?}",
                register, response
            );
            return Err(Bno055Error::ProtocolMismatch {
                register,
                expected: ResponseHeader::WRITE_SUCCESS.to_bytes(),
                received: response,
            });
        }
        Ok(())
    }

    /// Read `dest.len()` bytes starting at `register` into `dest`.
    ///
    /// `dest` is left untouched unless the device echoes the requested
    /// length in a `BB <len>` header.
    ///
    /// # Panics
    ///
    /// Panics if `dest` is longer than 255 bytes.
    pub fn read_register(
        &mut self,
        register: u8,
        dest: &mut [u8],
        timeout: Duration,
    ) -> Bno055Result<()> {
        assert!(
            dest.len() <= MAX_PAYLOAD_LEN,
            "read of {} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit",
            dest.len()
        );
        let length = dest.len() as u8;
        let frame = encode_read(register, length);

        self.transport.flush();
        self.transport.transmit(&frame, timeout)?;

        let mut response = [0u8; RESPONSE_HEADER_LEN];
        self.transport.receive(&mut response, timeout)?;

        let expected = ResponseHeader::read_ok(length);
        if ResponseHeader::from(response) != expected {
            debug!(
                "BNO055 read {:#04x} ({} bytes) rejected: {:02X?}",
                register, length, response
            );
            return Err(Bno055Error::ProtocolMismatch {
                register,
                expected: expected.to_bytes(),
                received: response,
            });
        }

        self.transport.receive(dest, timeout)?;
        trace!("BNO055 read {:#04x}: {:02X?}", register, dest);
        Ok(())
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the underlying transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Give back the underlying transport
    pub fn into_inner(self) -> T {
        self.transport
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{Fault, SimulatedBno055};

    const TIMEOUT: Duration = Duration::from_millis(5);

    #[test]
    fn test_write_sends_exact_frame() {
        let mut codec = RegisterCodec::new(SimulatedBno055::new());
        codec.write_register(0x3B, &[0x04], TIMEOUT).unwrap();

        assert_eq!(
            codec.transport().requests(),
            &[vec![0xAA, 0x00, 0x3B, 0x01, 0x04]]
        );
        assert_eq!(codec.transport().register(0x3B), 0x04);
    }

    #[test]
    fn test_write_failure_status_is_rejected() {
        let mut sim = SimulatedBno055::new();
        sim.inject(Fault::WriteStatus(0x00));
        let mut codec = RegisterCodec::new(sim);

        let err = codec.write_register(0x3D, &[0x00], TIMEOUT).unwrap_err();
        match err {
            Bno055Error::ProtocolMismatch {
                register,
                expected,
                received,
            } => {
                assert_eq!(register, 0x3D);
                assert_eq!(expected, [0xEE, 0x01]);
                assert_eq!(received, [0xEE, 0x00]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_write_rejects_any_response_but_ack_success() {
        for response in [[0xEE, 0x00], [0xEE, 0x03], [0xBB, 0x01], [0x00, 0x01]] {
            let mut sim = SimulatedBno055::new();
            sim.inject(Fault::RawResponse(response.to_vec()));
            let mut codec = RegisterCodec::new(sim);
            assert!(
                codec.write_register(0x3D, &[0x08], TIMEOUT).is_err(),
                "accepted {response:02X?}"
            );
        }
    }

    #[test]
    fn test_write_without_response_is_transport_failure() {
        let mut sim = SimulatedBno055::new();
        sim.inject(Fault::Silent);
        let mut codec = RegisterCodec::new(sim);

        let err = codec.write_register(0x3D, &[0x00], TIMEOUT).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_read_returns_register_contents() {
        let mut sim = SimulatedBno055::new();
        sim.set_registers(0x1A, &[0x84, 0x03, 0x08, 0x07, 0x7C, 0xFC]);
        let mut codec = RegisterCodec::new(sim);

        let mut buf = [0u8; 6];
        codec.read_register(0x1A, &mut buf, TIMEOUT).unwrap();
        assert_eq!(buf, [0x84, 0x03, 0x08, 0x07, 0x7C, 0xFC]);
        assert_eq!(codec.transport().requests(), &[vec![0xAA, 0x01, 0x1A, 0x06]]);
    }

    #[test]
    fn test_read_length_mismatch_leaves_destination_untouched() {
        let mut sim = SimulatedBno055::new();
        sim.set_registers(0x20, &[1, 2, 3, 4, 5, 6, 7, 8]);
        sim.inject(Fault::ReadLength(4));
        let mut codec = RegisterCodec::new(sim);

        let mut buf = [0xA5u8; 8];
        let err = codec.read_register(0x20, &mut buf, TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            Bno055Error::ProtocolMismatch {
                received: [0xBB, 0x04],
                ..
            }
        ));
        assert_eq!(buf, [0xA5; 8]);
    }

    #[test]
    fn test_read_error_status_is_rejected() {
        let mut sim = SimulatedBno055::new();
        sim.inject(Fault::ReadError(0x02));
        let mut codec = RegisterCodec::new(sim);

        let mut buf = [0u8; 6];
        let err = codec.read_register(0x1A, &mut buf, TIMEOUT).unwrap_err();
        assert!(matches!(
            err,
            Bno055Error::ProtocolMismatch {
                received: [0xEE, 0x02],
                ..
            }
        ));
    }

    #[test]
    fn test_next_transaction_flushes_stale_payload() {
        let mut sim = SimulatedBno055::new();
        sim.set_registers(0x1A, &[9, 9, 9, 9, 9, 9]);
        sim.inject(Fault::ReadLength(2));
        let mut codec = RegisterCodec::new(sim);

        let mut buf = [0u8; 6];
        assert!(codec.read_register(0x1A, &mut buf, TIMEOUT).is_err());
        assert!(codec.transport().pending_rx() > 0);

        codec.read_register(0x1A, &mut buf, TIMEOUT).unwrap();
        assert_eq!(buf, [9; 6]);
        assert_eq!(codec.transport().pending_rx(), 0);
    }

    #[test]
    fn test_truncated_payload_is_transport_failure() {
        let mut sim = SimulatedBno055::new();
        sim.inject(Fault::TruncatedPayload(3));
        let mut codec = RegisterCodec::new(sim);

        let mut buf = [0u8; 8];
        let err = codec.read_register(0x20, &mut buf, TIMEOUT).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn test_transmit_failure_is_transport_failure() {
        let mut sim = SimulatedBno055::new();
        sim.inject(Fault::TransmitFailure);
        let mut codec = RegisterCodec::new(sim);

        let err = codec.write_register(0x3D, &[0x00], TIMEOUT).unwrap_err();
        assert!(err.is_transport());
        assert!(codec.transport().requests().is_empty());
    }
}
