use std::error;
use std::fmt;
use std::io;

/**
 * Error to represent failures outside the stencil kernel: message transport,
 * snapshot output, and run configuration.
 */
#[derive(Debug)]
pub enum Error {
    Disconnected(usize),
    Io(io::Error),
    Wire(String),
    Snapshot(String),
    RowLength { expected: usize, found: usize },
    InvalidConfig(String),
    PartitionPanicked(usize),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> std::result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Disconnected(rank) => write!(fmt, "peer {} disconnected", rank),
            Io(e) => write!(fmt, "i/o error: {}", e),
            Wire(msg) => write!(fmt, "bad message on the wire: {}", msg),
            Snapshot(msg) => write!(fmt, "failed to write snapshot: {}", msg),
            RowLength { expected, found } => write!(
                fmt,
                "halo row has {} values, expected {}",
                found, expected
            ),
            InvalidConfig(msg) => write!(fmt, "invalid configuration: {}", msg),
            PartitionPanicked(rank) => write!(fmt, "partition {} panicked", rank),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Wire(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Wire(e.to_string())
    }
}
