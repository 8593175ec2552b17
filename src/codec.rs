//! The binary ADB packet format: six little-endian `u32` header fields
//! followed by a variable-length payload. Pure functions only — I/O lives
//! in `frame.rs`.

use crate::error::CodecError;

/// Hard ceiling on payload size, independent of whatever max-payload the
/// transport has negotiated. Keeps a hostile or buggy peer from making us
/// allocate an unbounded buffer while parsing a header.
pub const MAX_PAYLOAD: usize = 1024 * 1024;

pub const HEADER_SIZE: usize = 24;

macro_rules! command_tags {
    ($($name:ident = $tag:expr),* $(,)?) => {
        $(pub const $name: u32 = command_tag($tag);)*

        pub fn command_name(command: u32) -> &'static str {
            match command {
                $($name => stringify!($name),)*
                _ => "UNKNOWN",
            }
        }
    };
}

const fn command_tag(tag: [u8; 4]) -> u32 {
    u32::from_le_bytes(tag)
}

command_tags! {
    CNXN = *b"CNXN",
    AUTH = *b"AUTH",
    OPEN = *b"OPEN",
    OKAY = *b"OKAY",
    CLSE = *b"CLSE",
    WRTE = *b"WRTE",
    SYNC = *b"SYNC",
}

/// A single decoded ADB packet: header fields plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: u32,
    pub arg0: u32,
    pub arg1: u32,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: u32, arg0: u32, arg1: u32, payload: impl Into<Vec<u8>>) -> Self {
        Self { command, arg0, arg1, payload: payload.into() }
    }

    /// Encodes this packet to its 24-byte header plus payload.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(CodecError::PayloadTooLarge(self.payload.len()));
        }
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&self.command.to_le_bytes());
        out.extend_from_slice(&self.arg0.to_le_bytes());
        out.extend_from_slice(&self.arg1.to_le_bytes());
        out.extend_from_slice(&(self.payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&checksum(&self.payload).to_le_bytes());
        out.extend_from_slice(&magic(self.command).to_le_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Decodes a packet from an already-assembled 24-byte header and its
    /// `length`-byte payload. The reader (`frame.rs`) is responsible for
    /// pulling exactly that many bytes off the wire before calling this.
    pub fn decode(header: &[u8; HEADER_SIZE], payload: Vec<u8>) -> Result<Self, CodecError> {
        let command = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let arg0 = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let arg1 = u32::from_le_bytes(header[8..12].try_into().unwrap());
        let length = u32::from_le_bytes(header[12..16].try_into().unwrap());
        let claimed_checksum = u32::from_le_bytes(header[16..20].try_into().unwrap());
        let claimed_magic = u32::from_le_bytes(header[20..24].try_into().unwrap());

        if claimed_magic != magic(command) {
            return Err(CodecError::BadMagic { command, magic: claimed_magic });
        }
        if length as usize != payload.len() {
            return Err(CodecError::LengthMismatch { declared: length as usize, actual: payload.len() });
        }
        let actual_checksum = checksum(&payload);
        if actual_checksum != claimed_checksum {
            return Err(CodecError::BadChecksum { expected: actual_checksum, actual: claimed_checksum });
        }

        Ok(Self { command, arg0, arg1, payload })
    }
}

/// `magic = command XOR 0xFFFFFFFF`.
pub fn magic(command: u32) -> u32 {
    command ^ 0xFFFF_FFFF
}

/// Arithmetic sum of payload bytes, mod 2^32 (wrapping `u32` addition).
pub fn checksum(payload: &[u8]) -> u32 {
    payload.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}
