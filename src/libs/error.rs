#![allow(dead_code)]

use std::fmt;
use std::io;

/// Errors produced anywhere in the RSP client / transfer state machine.
///
/// Every public operation in `libs::transport`, `libs::codec`,
/// `libs::session`, `libs::mem_io`, `libs::executor`, and
/// `libs::target_control` returns one of these kinds rather than panicking
/// on data that came from the wire or from the target.
#[derive(Debug)]
pub enum RspError {
    /// No response was assembled before a per-request timeout elapsed.
    RecvTimeout,
    /// A send could not complete before the write timeout elapsed.
    SendTimeout,
    /// Fewer bytes were written than requested, and no further progress
    /// was possible.
    PartialSend,
    /// The underlying socket returned an unexpected I/O error.
    SocketError(String),
    /// The peer closed the connection (a `read` returned zero bytes).
    ConnectionClosed,
    /// A byte sequence was not valid hex, or a frame was structurally
    /// malformed.
    BadFormat,
    /// A received frame's trailing checksum did not match the payload.
    BadChecksum,
    /// The peer used run-length encoding (`*`) and RLE decoding is
    /// disabled for this decoder.
    RunLengthNotImplemented,
    /// A reply was well-formed RSP but not of the shape the caller
    /// expected (e.g. neither `OK` nor `E...` where one was required).
    BadResponse,
    /// The caller passed a value the API rejects outright (empty command,
    /// zero-length buffer, oversized request).
    BadInput,
    /// The GDB server reported an error packet (`$Exx#` or `$E.text#`).
    GdbReported(String),
    /// The server's `qSupported` reply did not include
    /// `QStartNoAckMode+`.
    UnsupportedServer,
    /// The target header failed the structural checks in
    /// `target_control::validate_header`.
    InvalidHeader,
    /// The computed total structure size fell outside `[MIN, MAX]`.
    SizeOutOfRange,
    /// A file could not be opened, read, or written.
    IoError(String),
}

impl fmt::Display for RspError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RspError::RecvTimeout => write!(f, "timed out waiting for a reply"),
            RspError::SendTimeout => write!(f, "timed out sending request"),
            RspError::PartialSend => write!(f, "short write to socket"),
            RspError::SocketError(msg) => write!(f, "socket error: {}", msg),
            RspError::ConnectionClosed => write!(f, "connection closed by peer"),
            RspError::BadFormat => write!(f, "malformed RSP data"),
            RspError::BadChecksum => write!(f, "checksum mismatch"),
            RspError::RunLengthNotImplemented => write!(f, "run-length encoding not implemented"),
            RspError::BadResponse => write!(f, "unexpected response shape"),
            RspError::BadInput => write!(f, "invalid argument"),
            RspError::GdbReported(code) => write!(f, "GDB server reported error: {}", code),
            RspError::UnsupportedServer => {
                write!(f, "server does not support QStartNoAckMode")
            }
            RspError::InvalidHeader => write!(f, "target header failed validation"),
            RspError::SizeOutOfRange => write!(f, "structure size out of range"),
            RspError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for RspError {}

impl From<io::Error> for RspError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => RspError::RecvTimeout,
            io::ErrorKind::UnexpectedEof => RspError::ConnectionClosed,
            _ => RspError::SocketError(e.to_string()),
        }
    }
}

/// The result type returned by every RSP client operation.
pub type RspResult<T> = Result<T, RspError>;
