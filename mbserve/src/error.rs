use std::net::SocketAddr;

use crate::exception::ExceptionCode;
use crate::store::Table;

/// Errors returned by the register store
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A table was requested with more entries than the 16-bit address space allows
    Allocation {
        /// table that could not be allocated
        table: Table,
        /// requested number of entries
        size: usize,
    },
    /// The requested range does not fit within the table
    OutOfRange {
        /// table that was accessed
        table: Table,
        /// first address of the access
        start: u16,
        /// number of entries in the access
        count: usize,
        /// capacity of the table
        capacity: usize,
    },
    /// The table cannot be written by a Modbus client
    ReadOnly(Table),
}

impl std::error::Error for StoreError {}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StoreError::Allocation { table, size } => write!(
                f,
                "{table} size of {size} exceeds the maximum of {}",
                crate::constants::MAX_TABLE_SIZE
            ),
            StoreError::OutOfRange {
                table,
                start,
                count,
                capacity,
            } => write!(
                f,
                "start {start} and count {count} exceed the {table} capacity of {capacity}"
            ),
            StoreError::ReadOnly(table) => write!(f, "{table} are read-only"),
        }
    }
}

impl From<StoreError> for ExceptionCode {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Allocation { .. } => ExceptionCode::ServerDeviceFailure,
            StoreError::OutOfRange { .. } => ExceptionCode::IllegalDataAddress,
            StoreError::ReadOnly(_) => ExceptionCode::IllegalFunction,
        }
    }
}

/// Errors that prevent the server from listening or accepting connections
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// The listening socket could not be bound
    Bind(SocketAddr, std::io::ErrorKind),
    /// Accepting an incoming connection failed
    Accept(std::io::ErrorKind),
}

impl std::error::Error for ServerError {}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ServerError::Bind(addr, kind) => write!(f, "unable to bind {addr}: {kind}"),
            ServerError::Accept(kind) => write!(f, "error accepting connection: {kind}"),
        }
    }
}

/// Reasons a session with a client stops processing requests
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// I/O error on the connection, including the peer closing it
    Io(std::io::ErrorKind),
    /// A frame could not be parsed from the stream
    BadFrame(FrameParseError),
    /// A request contained an invalid address range
    BadRange(InvalidRange),
    /// A request PDU was malformed
    BadPdu(AduParseError),
    /// An internal error occurred while formatting a response
    Internal(InternalError),
    /// The server was shut down
    Shutdown,
}

impl RequestError {
    /// The exception to return to the client when a request fails to parse, if any.
    ///
    /// Errors that are not caused by the content of a request return `None`.
    pub(crate) fn as_exception(&self) -> Option<ExceptionCode> {
        match self {
            RequestError::BadRange(InvalidRange::AddressOverflow(_, _)) => {
                Some(ExceptionCode::IllegalDataAddress)
            }
            RequestError::BadRange(_) => Some(ExceptionCode::IllegalDataValue),
            RequestError::BadPdu(_) => Some(ExceptionCode::IllegalDataValue),
            _ => None,
        }
    }
}

impl std::error::Error for RequestError {}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RequestError::Io(kind) => write!(f, "i/o error: {kind}"),
            RequestError::BadFrame(err) => write!(f, "bad frame: {err}"),
            RequestError::BadRange(err) => write!(f, "bad range: {err}"),
            RequestError::BadPdu(err) => write!(f, "bad request: {err}"),
            RequestError::Internal(err) => write!(f, "internal error: {err}"),
            RequestError::Shutdown => f.write_str("server shutdown"),
        }
    }
}

impl From<std::io::Error> for RequestError {
    fn from(err: std::io::Error) -> Self {
        RequestError::Io(err.kind())
    }
}

impl From<FrameParseError> for RequestError {
    fn from(err: FrameParseError) -> Self {
        RequestError::BadFrame(err)
    }
}

impl From<InvalidRange> for RequestError {
    fn from(err: InvalidRange) -> Self {
        RequestError::BadRange(err)
    }
}

impl From<AduParseError> for RequestError {
    fn from(err: AduParseError) -> Self {
        RequestError::BadPdu(err)
    }
}

impl From<InternalError> for RequestError {
    fn from(err: InternalError) -> Self {
        RequestError::Internal(err)
    }
}

impl From<scursor::ReadError> for RequestError {
    fn from(err: scursor::ReadError) -> Self {
        RequestError::BadPdu(err.into())
    }
}

impl From<scursor::TrailingBytes> for RequestError {
    fn from(err: scursor::TrailingBytes) -> Self {
        RequestError::BadPdu(err.into())
    }
}

/// Errors that occur while parsing an MBAP frame off a stream
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameParseError {
    /// Received a frame with the length field set to zero
    MbapLengthZero,
    /// Received a frame whose length field exceeds the maximum (actual, maximum)
    MbapLengthTooBig(usize, usize),
    /// Received a frame with a non-Modbus protocol id
    UnknownProtocolId(u16),
}

impl std::error::Error for FrameParseError {}

impl std::fmt::Display for FrameParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            FrameParseError::MbapLengthZero => {
                f.write_str("received TCP frame with the length field set to zero")
            }
            FrameParseError::MbapLengthTooBig(size, max) => write!(
                f,
                "received TCP frame with length ({size}) that exceeds max allowed size ({max})"
            ),
            FrameParseError::UnknownProtocolId(id) => {
                write!(f, "received TCP frame with non-Modbus protocol id: {id}")
            }
        }
    }
}

/// Errors that occur while parsing the body of a request
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AduParseError {
    /// request is too short to be valid
    InsufficientBytes,
    /// byte count does not match the quantity of the request (expected, actual)
    ByteCountMismatch(usize, usize),
    /// request contains extra trailing bytes
    TrailingBytes(usize),
    /// value for a coil state was neither ON nor OFF
    UnknownCoilState(u16),
}

impl std::error::Error for AduParseError {}

impl std::fmt::Display for AduParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AduParseError::InsufficientBytes => f.write_str("request is too short to be valid"),
            AduParseError::ByteCountMismatch(expected, actual) => write!(
                f,
                "byte count ({actual}) doesn't match the quantity of the request ({expected} bytes)"
            ),
            AduParseError::TrailingBytes(count) => {
                write!(f, "request contains {count} extra trailing bytes")
            }
            AduParseError::UnknownCoilState(value) => {
                write!(f, "received coil state with unspecified value: {value:#06X}")
            }
        }
    }
}

impl From<scursor::ReadError> for AduParseError {
    fn from(_: scursor::ReadError) -> Self {
        AduParseError::InsufficientBytes
    }
}

impl From<scursor::TrailingBytes> for AduParseError {
    fn from(err: scursor::TrailingBytes) -> Self {
        AduParseError::TrailingBytes(err.count.get())
    }
}

/// Errors in an address range
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InvalidRange {
    /// the count is zero
    CountOfZero,
    /// start and count overflow the 16-bit address space (start, count)
    AddressOverflow(u16, u16),
    /// count exceeds the limit of the function (count, limit)
    CountTooLargeForType(u16, u16),
}

impl std::error::Error for InvalidRange {}

impl std::fmt::Display for InvalidRange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InvalidRange::CountOfZero => f.write_str("range contains a count of zero"),
            InvalidRange::AddressOverflow(start, count) => write!(
                f,
                "start == {start} and count == {count} would overflow the representation of u16"
            ),
            InvalidRange::CountTooLargeForType(count, limit) => write!(
                f,
                "count of {count} exceeds the maximum allowed count of {limit} for this function"
            ),
        }
    }
}

/// Errors that indicate a bug while writing a response to a buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// attempted to write more bytes than available (requested, remaining)
    InsufficientWriteSpace(usize, usize),
    /// attempted to read more bytes than present (requested, remaining)
    InsufficientBytesForRead(usize, usize),
    /// cursor seek went outside the underlying buffer
    BadSeekOperation,
    /// byte count does not fit in a u8
    BadByteCount(usize),
    /// the PDU is larger than the MBAP length field allows
    AduTooBig(usize),
}

impl std::error::Error for InternalError {}

impl std::fmt::Display for InternalError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            InternalError::InsufficientWriteSpace(size, remaining) => write!(
                f,
                "attempted to write {size} bytes with {remaining} bytes remaining"
            ),
            InternalError::InsufficientBytesForRead(size, remaining) => write!(
                f,
                "attempted to read {size} bytes with only {remaining} remaining"
            ),
            InternalError::BadSeekOperation => {
                f.write_str("cursor seek operation exceeded the bounds of the underlying buffer")
            }
            InternalError::BadByteCount(count) => {
                write!(f, "byte count would exceed maximum size of u8: {count}")
            }
            InternalError::AduTooBig(size) => {
                write!(f, "ADU length of {size} exceeds the maximum allowed length")
            }
        }
    }
}
