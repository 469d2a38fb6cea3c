//! YMODEM sender state machine (C6): drives a [`Transport`] through the
//! rendezvous/initial-packet/data-stream/finalize sequence described in
//! `protocol::frame`.

use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::frame::{self, control};
use crate::transport::Transport;

const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(1);
const SERVE_PACKET_TIMEOUT: Duration = Duration::from_secs(5);
const DATA_GO_TIMEOUT: Duration = Duration::from_secs(5);
const CANCEL_PEEK_TIMEOUT: Duration = Duration::from_millis(100);

/// Drives the sender side of a YMODEM/CRC transfer over a [`Transport`].
pub struct YmodemSender<'a, T: Transport> {
    transport: &'a mut T,
    retransmission_count: u32,
}

impl<'a, T: Transport> YmodemSender<'a, T> {
    /// Wrap `transport` for a single transfer.
    pub fn new(transport: &'a mut T) -> Self {
        Self {
            transport,
            retransmission_count: 0,
        }
    }

    /// Number of `NAK` responses seen across the whole transfer so far.
    #[must_use]
    pub fn retransmission_count(&self) -> u32 {
        self.retransmission_count
    }

    /// Run the full sender state sequence for `data`, named `filename`.
    ///
    /// Returns `Ok(true)` once the receiver has ACKed `EOT`, or `Ok(false)`
    /// if any ordinary wait (rendezvous, data-go handshake, or an
    /// individual Serve-Packet) exceeds its bound — an unremarkable failed
    /// transfer the caller may retry. A `CAN`/`CAN` pair from the receiver
    /// surfaces as [`Error::PeerCancelled`]; a permanent transport failure
    /// surfaces as [`Error::Transport`]/[`Error::Io`].
    pub fn send(&mut self, filename: &str, data: &[u8]) -> Result<bool> {
        self.retransmission_count = 0;
        debug!("ymodem sender: starting transfer of {filename} ({} bytes)", data.len());

        if !self.transport.wait_for(control::C, RENDEZVOUS_TIMEOUT) {
            warn!("ymodem sender: no rendezvous 'C' from receiver");
            return Ok(false);
        }

        let initial = frame::encode_initial(filename, data.len())?;
        if !self.serve_packet(&initial, SERVE_PACKET_TIMEOUT)? {
            return Ok(false);
        }

        if !self.transport.wait_for(control::C, DATA_GO_TIMEOUT) {
            warn!("ymodem sender: no second 'C' before data stream");
            return Ok(false);
        }

        let num_blocks = data.len().div_ceil(frame::STX_BLOCK_SIZE);
        for k in 0..num_blocks {
            let start = k * frame::STX_BLOCK_SIZE;
            let end = (start + frame::STX_BLOCK_SIZE).min(data.len());
            let seq = ((k + 1) % 256) as u8;
            let packet = frame::encode(seq, &data[start..end])?;
            if !self.serve_packet(&packet, SERVE_PACKET_TIMEOUT)? {
                return Ok(false);
            }
            trace!("ymodem sender: block {k} ({} bytes) acked", end - start);
        }

        if !self.serve_packet(&[control::EOT], SERVE_PACKET_TIMEOUT)? {
            return Ok(false);
        }
        debug!("ymodem sender: transfer of {filename} complete, {} retransmissions", self.retransmission_count);
        Ok(true)
    }

    /// Retransmission loop shared by the initial packet, every data block,
    /// and `EOT`: drain stale input, send, then interpret the response.
    ///
    /// Returns `Ok(true)` on `ACK`, `Ok(false)` if `timeout` elapses with no
    /// usable response (an ordinary per-packet failure), or `Err` for a
    /// double-`CAN` cancellation or a hard transport failure.
    fn serve_packet(&mut self, packet: &[u8], timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        loop {
            if start.elapsed() >= timeout {
                return Ok(false);
            }

            while self.transport.poll_byte() != -1 {}

            self.transport.send(packet)?;

            let remaining = timeout.saturating_sub(start.elapsed());
            match self.transport.wait_byte(remaining) {
                x if x == i32::from(control::ACK) => return Ok(true),
                x if x == i32::from(control::NAK) => {
                    self.retransmission_count += 1;
                    warn!("ymodem sender: NAK received, retransmitting");
                },
                x if x == i32::from(control::CAN) => {
                    if self.transport.wait_byte(CANCEL_PEEK_TIMEOUT) == i32::from(control::CAN) {
                        return Err(Error::PeerCancelled);
                    }
                },
                -1 => return Ok(false),
                other => {
                    trace!("ymodem sender: ignoring unexpected byte 0x{other:02X}");
                },
            }
        }
    }
}
