//! Error types for fwlink.

use std::io;
use thiserror::Error;

/// Result type for fwlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for fwlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The encoded payload exceeds the maximum YMODEM block size (1024 bytes).
    #[error("payload too large: {len} bytes (max 1024)")]
    PayloadTooLarge {
        /// Length of the offending payload.
        len: usize,
    },

    /// A received frame failed header, sequence, or CRC validation.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A wait for a byte or response exceeded its bound.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The peer sent two consecutive CAN bytes, cancelling the transfer.
    #[error("transfer cancelled by peer")]
    PeerCancelled,

    /// The transport suffered a permanent, unrecoverable failure.
    #[error("transport error: {0}")]
    Transport(String),
}
