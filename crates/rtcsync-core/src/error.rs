use std::fmt;

use thiserror::Error;

/// Failures reported by a bus bridge.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("serial port: {0}")]
    Serial(#[from] serialport::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("bridge did not answer in time")]
    Timeout,
    #[error("bridge did not enter {mode} mode (reply {reply:02x?})")]
    Handshake { mode: &'static str, reply: Vec<u8> },
    #[error("bridge rejected command 0x{command:02x} (reply 0x{reply:02x})")]
    Rejected { command: u8, reply: u8 },
    #[error("{0} is not available in {1} mode")]
    Unsupported(&'static str, &'static str),
    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead { wanted: usize, got: usize },
    #[error("bus is closed")]
    Closed,
}

/// Write leg of an addressed transaction that can go unacknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionLeg {
    /// Address, pointer and register block of a programming write.
    Program,
    /// Address and register pointer ahead of a read.
    WritePointer,
    /// Read address after the repeated start.
    ReadAddress,
}

impl fmt::Display for TransactionLeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransactionLeg::Program => "time write",
            TransactionLeg::WritePointer => "read pointer write",
            TransactionLeg::ReadAddress => "read command",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to open bus bridge: {0}")]
    BusOpen(#[source] BusError),
    #[error("{leg} was not acknowledged by device 0x{address:02x}: {detail}")]
    TransactionAck {
        leg: TransactionLeg,
        address: u8,
        detail: String,
    },
    #[error("{got} frame cannot be written to a {expected} device")]
    FrameMismatch {
        expected: &'static str,
        got: &'static str,
    },
    #[error(transparent)]
    Bus(#[from] BusError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
