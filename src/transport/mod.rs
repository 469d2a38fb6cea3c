//! Transport abstraction (C3): a uniform byte-oriented link over which the
//! YMODEM sender and receiver exchange frames.
//!
//! Concrete implementations exist for stream sockets ([`tcp`]) and, on
//! Linux with the `can` feature, for SocketCAN ([`can`]). Both adapt their
//! underlying medium to the same non-blocking-`poll_byte` contract so the
//! protocol layer never needs to know which one it's talking to.

#[cfg(feature = "can")]
pub mod can;
pub mod tcp;

use std::time::{Duration, Instant};

use crate::error::Result;

/// Approximate internal polling granularity for [`Transport::wait_byte`]
/// and [`Transport::wait_for`].
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// A byte-oriented, non-blocking-pollable transport.
///
/// Implementors provide [`send`](Transport::send) and
/// [`poll_byte`](Transport::poll_byte); the timed waits are derived from
/// `poll_byte` via default methods so every transport gets the same
/// timeout semantics for free.
pub trait Transport: Send {
    /// Send all of `data`. Must not reorder or drop bytes on success.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Return the next buffered byte in `[0, 255]`, or `-1` if none is
    /// available right now. Must not block beyond brief internal polling
    /// (at most ~1 ms).
    fn poll_byte(&mut self) -> i32;

    /// Poll until a byte arrives or `timeout` elapses.
    fn wait_byte(&mut self, timeout: Duration) -> i32 {
        let start = Instant::now();
        loop {
            let byte = self.poll_byte();
            if byte != -1 {
                return byte;
            }
            if start.elapsed() >= timeout {
                return -1;
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    /// Consume and discard bytes until `b` is seen (`true`) or `timeout`
    /// elapses (`false`).
    fn wait_for(&mut self, b: u8, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            match self.poll_byte() {
                byte if byte == i32::from(b) => return true,
                -1 => {
                    if start.elapsed() >= timeout {
                        return false;
                    }
                    std::thread::sleep(POLL_INTERVAL);
                },
                _ => {
                    if start.elapsed() >= timeout {
                        return false;
                    }
                },
            }
        }
    }

    /// Trigger a transport-specific out-of-band "enter bootloader" signal.
    /// A no-op on stream transports.
    fn initiate_ota(&mut self) -> Result<()> {
        Ok(())
    }

    /// Block until the transport-specific OTA acknowledgement is observed,
    /// or `timeout` elapses. Always `true` on transports without an OTA
    /// side channel.
    fn wait_for_ota(&mut self, _timeout: Duration) -> bool {
        true
    }
}
