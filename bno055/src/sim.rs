//! In-memory BNO055 that speaks the UART register protocol.
//!
//! [`SimulatedBno055`] implements [`SerialTransport`] by decoding request
//! frames and answering them from a 256-byte register file, the way the real
//! device does on register page 0. Faults can be scripted per request to
//! exercise the failure paths of the codec and driver without hardware.
//!
//! Clones share state, so a test can keep one handle to change readings or
//! script faults while the driver owns another.
//!
//! ```
//! use bno055::sim::{Fault, SimulatedBno055};
//! use bno055::Bno055;
//!
//! let sim = SimulatedBno055::new();
//! sim.set_euler_counts([900, 0, 0]);
//! sim.set_quaternion_counts([16384, 0, 0, 0]);
//!
//! let mut imu = Bno055::new(sim.clone());
//! imu.update()?;
//! assert!((imu.euler().x - 1.0).abs() < 1e-6);
//!
//! sim.inject(Fault::Silent);
//! assert!(imu.update().is_err());
//! # Ok::<(), bno055::Bno055Error>(())
//! ```

use std::cell::Cell;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::MonotonicClock;
use crate::frame::RequestHeader;
use crate::registers::{
    EUL_DATA, OPR_MODE, QUA_DATA, READ_ACK, REQUEST_HEADER_LEN, START_BYTE, WRITE_ACK,
};
use crate::transport::SerialTransport;

/// Device status: write succeeded
pub const STATUS_WRITE_SUCCESS: u8 = 0x01;
/// Device status: register map address out of range
pub const STATUS_INVALID_ADDRESS: u8 = 0x04;
/// Device status: register not writable in the current mode
pub const STATUS_WRITE_DISABLED: u8 = 0x05;
/// Device status: first byte of the request was not 0xAA
pub const STATUS_WRONG_START_BYTE: u8 = 0x06;

/// Scripted misbehaviour for a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Answer with `EE <status>` regardless of the request type
    WriteStatus(u8),
    /// Answer a read with `EE <status>` (device-side read error)
    ReadError(u8),
    /// Answer a read with `BB <len>` using the wrong length, followed by the
    /// full requested payload
    ReadLength(u8),
    /// Answer a read with a correct header but only this many payload bytes
    TruncatedPayload(usize),
    /// Send nothing back
    Silent,
    /// Fail the transmit call itself; the request never reaches the device
    TransmitFailure,
    /// Send these exact bytes back
    RawResponse(Vec<u8>),
}

#[derive(Debug)]
struct SimState {
    registers: [u8; 256],
    rx: VecDeque<u8>,
    tx_pending: Vec<u8>,
    requests: Vec<Vec<u8>>,
    script: VecDeque<Option<Fault>>,
    flushes: usize,
}

impl SimState {
    fn new() -> Self {
        Self {
            registers: [0; 256],
            rx: VecDeque::new(),
            tx_pending: Vec::new(),
            requests: Vec::new(),
            script: VecDeque::new(),
            flushes: 0,
        }
    }

    /// Take the complete frame at the front of `tx_pending`, if there is one
    fn take_frame(&mut self) -> Option<Vec<u8>> {
        if self.tx_pending.is_empty() {
            return None;
        }
        if self.tx_pending[0] != START_BYTE {
            // Device answers a bad start byte immediately and drops the input
            self.tx_pending.clear();
            self.rx.extend([WRITE_ACK, STATUS_WRONG_START_BYTE]);
            return None;
        }
        let header = RequestHeader::parse(&self.tx_pending)?;
        let frame_len = if header.is_write() {
            REQUEST_HEADER_LEN + header.length as usize
        } else {
            REQUEST_HEADER_LEN
        };
        if self.tx_pending.len() < frame_len {
            return None;
        }
        Some(self.tx_pending.drain(..frame_len).collect())
    }

    fn handle_frame(&mut self, frame: Vec<u8>) {
        let Some(header) = RequestHeader::parse(&frame) else {
            return;
        };
        let fault = self.script.pop_front().flatten();
        self.requests.push(frame.clone());

        let register = header.register as usize;
        let length = header.length as usize;

        match fault {
            Some(Fault::WriteStatus(status)) | Some(Fault::ReadError(status)) => {
                self.rx.extend([WRITE_ACK, status]);
            }
            Some(Fault::Silent) => {}
            Some(Fault::RawResponse(bytes)) => self.rx.extend(bytes),
            Some(Fault::ReadLength(wrong)) => {
                self.rx.extend([READ_ACK, wrong]);
                let end = (register + length).min(self.registers.len());
                self.rx.extend(self.registers[register..end].iter().copied());
            }
            Some(Fault::TruncatedPayload(count)) => {
                self.rx.extend([READ_ACK, header.length]);
                let end = (register + count.min(length)).min(self.registers.len());
                self.rx.extend(self.registers[register..end].iter().copied());
            }
            Some(Fault::TransmitFailure) | None => {
                if header.is_write() {
                    let status = self.apply_write(register, &frame[REQUEST_HEADER_LEN..]);
                    self.rx.extend([WRITE_ACK, status]);
                } else if register + length > self.registers.len() {
                    self.rx.extend([WRITE_ACK, STATUS_INVALID_ADDRESS]);
                } else {
                    self.rx.extend([READ_ACK, header.length]);
                    self.rx
                        .extend(self.registers[register..register + length].iter().copied());
                }
            }
        }
    }

    fn apply_write(&mut self, register: usize, payload: &[u8]) -> u8 {
        if register + payload.len() > self.registers.len() {
            return STATUS_INVALID_ADDRESS;
        }
        let in_config_mode = self.registers[OPR_MODE as usize] == 0x00;
        if register != OPR_MODE as usize && !in_config_mode {
            return STATUS_WRITE_DISABLED;
        }
        self.registers[register..register + payload.len()].copy_from_slice(payload);
        STATUS_WRITE_SUCCESS
    }
}

/// Simulated BNO055 reachable through [`SerialTransport`].
#[derive(Debug, Clone)]
pub struct SimulatedBno055 {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedBno055 {
    /// A device in config mode with an all-zero register file
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap()
    }

    /// Script `fault` for the next request that has no fault scripted yet.
    pub fn inject(&self, fault: Fault) {
        self.state().script.push_back(Some(fault));
    }

    /// Let `skip` requests through normally, then apply `fault`.
    pub fn inject_after(&self, skip: usize, fault: Fault) {
        let mut state = self.state();
        state.script.extend(std::iter::repeat_n(None, skip));
        state.script.push_back(Some(fault));
    }

    /// Set register contents directly, bypassing mode checks
    pub fn set_registers(&self, register: u8, bytes: &[u8]) {
        let start = register as usize;
        self.state().registers[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Current value of a single register
    pub fn register(&self, register: u8) -> u8 {
        self.state().registers[register as usize]
    }

    /// Load the Euler block with raw counts (heading, roll, pitch)
    pub fn set_euler_counts(&self, counts: [i16; 3]) {
        let mut bytes = [0u8; 6];
        for (chunk, count) in bytes.chunks_exact_mut(2).zip(counts) {
            chunk.copy_from_slice(&count.to_le_bytes());
        }
        self.set_registers(EUL_DATA, &bytes);
    }

    /// Load the quaternion block with raw counts (w, x, y, z)
    pub fn set_quaternion_counts(&self, counts: [i16; 4]) {
        let mut bytes = [0u8; 8];
        for (chunk, count) in bytes.chunks_exact_mut(2).zip(counts) {
            chunk.copy_from_slice(&count.to_le_bytes());
        }
        self.set_registers(QUA_DATA, &bytes);
    }

    /// Every complete request frame received so far, in order
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.state().requests.clone()
    }

    /// Forget the request log
    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    /// Bytes queued for the host that have not been read yet
    pub fn pending_rx(&self) -> usize {
        self.state().rx.len()
    }

    /// Number of `flush` calls seen
    pub fn flush_count(&self) -> usize {
        self.state().flushes
    }
}

impl Default for SimulatedBno055 {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialTransport for SimulatedBno055 {
    fn transmit(&mut self, data: &[u8], _timeout: Duration) -> io::Result<()> {
        let mut state = self.state();

        if state.tx_pending.is_empty()
            && matches!(state.script.front(), Some(Some(Fault::TransmitFailure)))
        {
            state.script.pop_front();
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "simulated transmit timeout",
            ));
        }

        state.tx_pending.extend_from_slice(data);
        while let Some(frame) = state.take_frame() {
            state.handle_frame(frame);
        }
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8], _timeout: Duration) -> io::Result<()> {
        let mut state = self.state();
        let available = state.rx.len().min(buf.len());
        for (dst, src) in buf.iter_mut().zip(state.rx.drain(..available)) {
            *dst = src;
        }
        if available < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("received {available} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }

    fn flush(&mut self) {
        let mut state = self.state();
        state.rx.clear();
        state.flushes += 1;
    }
}

/// Clock that advances by a fixed step every time it is read.
///
/// Makes retry loops bounded by wall-clock time deterministic in tests.
#[derive(Debug)]
pub struct SteppingClock {
    now: Cell<Duration>,
    step: Duration,
}

impl SteppingClock {
    pub fn new(step: Duration) -> Self {
        Self {
            now: Cell::new(Duration::ZERO),
            step,
        }
    }
}

impl MonotonicClock for SteppingClock {
    fn now(&self) -> Duration {
        let now = self.now.get();
        self.now.set(now + self.step);
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_millis(1);

    #[test]
    fn test_mode_gates_register_writes() {
        let mut sim = SimulatedBno055::new();
        let mut ack = [0u8; 2];

        // Leave config mode, then try to change units
        sim.transmit(&[0xAA, 0x00, 0x3D, 0x01, 0x08], T).unwrap();
        sim.receive(&mut ack, T).unwrap();
        assert_eq!(ack, [0xEE, 0x01]);

        sim.transmit(&[0xAA, 0x00, 0x3B, 0x01, 0x04], T).unwrap();
        sim.receive(&mut ack, T).unwrap();
        assert_eq!(ack, [0xEE, STATUS_WRITE_DISABLED]);
        assert_eq!(sim.register(0x3B), 0x00);
    }

    #[test]
    fn test_frame_split_across_transmits() {
        let mut sim = SimulatedBno055::new();
        sim.transmit(&[0xAA, 0x00, 0x3B, 0x01], T).unwrap();
        assert!(sim.requests().is_empty());
        sim.transmit(&[0x04], T).unwrap();
        assert_eq!(sim.requests().len(), 1);
        assert_eq!(sim.register(0x3B), 0x04);
    }

    #[test]
    fn test_wrong_start_byte() {
        let mut sim = SimulatedBno055::new();
        sim.transmit(&[0x55, 0x01, 0x1A, 0x06], T).unwrap();
        let mut ack = [0u8; 2];
        sim.receive(&mut ack, T).unwrap();
        assert_eq!(ack, [0xEE, STATUS_WRONG_START_BYTE]);
    }

    #[test]
    fn test_short_receive_times_out() {
        let mut sim = SimulatedBno055::new();
        let mut buf = [0u8; 2];
        let err = sim.receive(&mut buf, T).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn test_inject_after_skips_requests() {
        let mut sim = SimulatedBno055::new();
        sim.inject_after(1, Fault::WriteStatus(0x00));
        let mut ack = [0u8; 2];

        sim.transmit(&[0xAA, 0x00, 0x3D, 0x01, 0x00], T).unwrap();
        sim.receive(&mut ack, T).unwrap();
        assert_eq!(ack, [0xEE, 0x01]);

        sim.transmit(&[0xAA, 0x00, 0x3D, 0x01, 0x00], T).unwrap();
        sim.receive(&mut ack, T).unwrap();
        assert_eq!(ack, [0xEE, 0x00]);
    }

    #[test]
    fn test_clones_share_state() {
        let sim = SimulatedBno055::new();
        let other = sim.clone();
        sim.set_euler_counts([1, 2, 3]);
        assert_eq!(other.register(EUL_DATA), 1);
        assert_eq!(other.register(EUL_DATA + 2), 2);
    }

    #[test]
    fn test_stepping_clock() {
        let clock = SteppingClock::new(Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::ZERO);
        assert_eq!(clock.now(), Duration::from_millis(10));
        assert_eq!(clock.now(), Duration::from_millis(20));
    }
}
