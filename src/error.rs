//! Error taxonomy: codec errors are fatal to a transport session,
//! protocol violations and backend errors are contained to the stream or
//! request that triggered them.

use thiserror::Error;

/// Failures decoding a packet header or verifying its integrity. Every
/// variant is fatal to the transport session that produced it.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("payload of {0} bytes exceeds the {} byte ceiling", crate::codec::MAX_PAYLOAD)]
    PayloadTooLarge(usize),

    #[error("bad magic for command 0x{command:08x}: got 0x{magic:08x}")]
    BadMagic { command: u32, magic: u32 },

    #[error("declared payload length {declared} does not match {actual} bytes read")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload checksum mismatch: expected 0x{expected:08x}, got 0x{actual:08x}")]
    BadChecksum { expected: u32, actual: u32 },

    #[error("truncated header: got {0} of {} bytes", crate::codec::HEADER_SIZE)]
    TruncatedHeader(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures from the simulated device backend (filesystem, shell,
/// property store). Surfaced through whichever layer invoked the backend:
/// a sync `FAIL`, shell stderr + non-zero exit code, or a host-text `FAIL`.
#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("path not found: {0}")]
    NotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("not a file: {0}")]
    NotAFile(String),

    #[error("path already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("parent directory does not exist: {0}")]
    MissingParent(String),

    #[error("dangling symlink: {0}")]
    DanglingSymlink(String),

    #[error("{0}")]
    Other(String),
}

/// Errors from the pre-transport host text protocol. Always reported as a
/// `FAIL` reply; the connection continues.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("invalid request length header")]
    BadLengthHeader,

    #[error("unsupported request: {0}")]
    Unsupported(String),

    #[error("unknown serial {0}")]
    UnknownSerial(String),

    #[error("malformed forward spec")]
    MalformedForward,

    #[error("forward-remove: not found")]
    ForwardNotFound,
}
