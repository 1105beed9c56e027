use std::io;
use std::net;

/// Result alias used throughout the wire/network layers. Mirrors
/// `flux::shared::NetworkResult` — `Wait` is not an error in the usual
/// sense, it means "try again once more data/capacity is available" and is
/// handled inline by callers rather than surfaced to the application.
pub type NetworkResult<T> = Result<T, NetworkError>;

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum NetworkError {
    Wait,
    Fatal(ErrorType),
}

#[derive(Debug, Eq, PartialEq, Clone, Copy)]
pub enum ErrorType {
    PayloadTooLarge,
    EmptyFrame,
    UnexpectedEnd,
    InvalidString,
    UnknownMessageType,
    UnknownInitTag,
    VersionMismatch,
    AddrParse,
    Io(io::ErrorKind),
}

impl From<io::Error> for NetworkError {
    #[inline]
    fn from(io_error: io::Error) -> Self {
        match io_error.kind() {
            io::ErrorKind::WouldBlock => NetworkError::Wait,
            kind => NetworkError::Fatal(ErrorType::Io(kind)),
        }
    }
}

impl From<net::AddrParseError> for NetworkError {
    #[inline]
    fn from(_: net::AddrParseError) -> Self {
        NetworkError::Fatal(ErrorType::AddrParse)
    }
}

/// Convenience used the same way as `flux::shared::ErrorUtils`: collapses a
/// `NetworkResult` down to "did this fail in a way that should tear down
/// the connection".
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for NetworkResult<T> {
    #[inline]
    fn has_failed(&self) -> bool {
        !matches!(self, Ok(_) | Err(NetworkError::Wait))
    }
}
