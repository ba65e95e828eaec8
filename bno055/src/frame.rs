//! UART frame layout for the BNO055 register protocol
//!
//! Requests are a 4-byte header, optionally followed by payload:
//!
//! ```text
//! write:  AA 00 <reg> <len> <payload...>   ->  EE <status>
//! read:   AA 01 <reg> <len>                ->  BB <len> <payload...>
//! ```
//!
//! Both header types are `Pod` so they can be moved to and from the wire
//! with `bytemuck` without any manual packing.

use bytemuck::{bytes_of, Pod, Zeroable};

use crate::registers::{
    MAX_PAYLOAD_LEN, OP_READ, OP_WRITE, READ_ACK, REQUEST_HEADER_LEN, START_BYTE,
    STATUS_WRITE_SUCCESS, WRITE_ACK,
};

/// Request header sent ahead of every register access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct RequestHeader {
    /// Always [`START_BYTE`]
    pub start: u8,
    /// [`OP_WRITE`] or [`OP_READ`]
    pub op: u8,
    /// Register address on page 0
    pub register: u8,
    /// Number of payload bytes written or requested
    pub length: u8,
}

impl RequestHeader {
    /// Header for a write of `length` bytes to `register`
    pub fn write(register: u8, length: u8) -> Self {
        Self {
            start: START_BYTE,
            op: OP_WRITE,
            register,
            length,
        }
    }

    /// Header for a read of `length` bytes from `register`
    pub fn read(register: u8, length: u8) -> Self {
        Self {
            start: START_BYTE,
            op: OP_READ,
            register,
            length,
        }
    }

    /// Parse a header from the first four bytes of `bytes`.
    ///
    /// Returns `None` if fewer than four bytes are available or the start
    /// byte is wrong.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let header: Self = bytemuck::try_pod_read_unaligned(bytes.get(..REQUEST_HEADER_LEN)?).ok()?;
        (header.start == START_BYTE).then_some(header)
    }

    /// Whether this header announces a write
    pub fn is_write(&self) -> bool {
        self.op == OP_WRITE
    }
}

/// Two-byte response header returned by the device.
///
/// `marker` is [`WRITE_ACK`] for write acknowledgements (and read errors),
/// [`READ_ACK`] ahead of read payloads. `value` is the status or the
/// payload length respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct ResponseHeader {
    /// Acknowledgement marker, `0xEE` or `0xBB`
    pub marker: u8,
    /// Status code or payload length
    pub value: u8,
}

impl ResponseHeader {
    /// The only acknowledgement that means a write took effect
    pub const WRITE_SUCCESS: Self = Self {
        marker: WRITE_ACK,
        value: STATUS_WRITE_SUCCESS,
    };

    /// Header that must precede a `length`-byte read payload
    pub fn read_ok(length: u8) -> Self {
        Self {
            marker: READ_ACK,
            value: length,
        }
    }

    /// Raw wire bytes
    pub fn to_bytes(self) -> [u8; 2] {
        [self.marker, self.value]
    }
}

impl From<[u8; 2]> for ResponseHeader {
    fn from(bytes: [u8; 2]) -> Self {
        Self {
            marker: bytes[0],
            value: bytes[1],
        }
    }
}

/// Encode a complete write request (header followed by payload).
///
/// # Panics
///
/// Panics if `payload` is longer than [`MAX_PAYLOAD_LEN`]. The length field
/// is a single byte; an oversized payload is a caller bug and is never
/// silently truncated.
pub fn encode_write(register: u8, payload: &[u8]) -> Vec<u8> {
    assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes exceeds the {MAX_PAYLOAD_LEN}-byte frame limit",
        payload.len()
    );

    let header = RequestHeader::write(register, payload.len() as u8);
    let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + payload.len());
    frame.extend_from_slice(bytes_of(&header));
    frame.extend_from_slice(payload);
    frame
}

/// Encode a read request for `length` bytes starting at `register`.
pub fn encode_read(register: u8, length: u8) -> [u8; REQUEST_HEADER_LEN] {
    let mut frame = [0u8; REQUEST_HEADER_LEN];
    frame.copy_from_slice(bytes_of(&RequestHeader::read(register, length)));
    frame
}

/// Decode consecutive little-endian `i16` words.
///
/// `N` must equal `bytes.len() / 2`; any trailing odd byte is ignored.
pub fn decode_i16_le<const N: usize>(bytes: &[u8]) -> [i16; N] {
    debug_assert!(bytes.len() >= N * 2, "need {} bytes, got {}", N * 2, bytes.len());

    let mut words = [0i16; N];
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(2)) {
        *word = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
    words
}
