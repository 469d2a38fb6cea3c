//! YMODEM receiver state machine (C7): the mirror image of
//! [`crate::protocol::sender::YmodemSender`].

use std::time::Duration;

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::frame::{self, control};
use crate::transport::Transport;

const INITIAL_PACKET_TIMEOUT: Duration = Duration::from_secs(1);
const RETRY_SLEEP: Duration = Duration::from_secs(1);
const DATA_PACKET_TIMEOUT: Duration = Duration::from_millis(200);
const INTER_BYTE_TIMEOUT: Duration = Duration::from_millis(10);
const CANCEL_PEEK_TIMEOUT: Duration = Duration::from_millis(100);

/// Drives the receiver side of a YMODEM/CRC transfer over a [`Transport`].
///
/// Expected sequence numbers for data blocks start at `1` (the block
/// following the zeroth filename/size packet), counting up mod 256.
pub struct YmodemReceiver<'a, T: Transport> {
    transport: &'a mut T,
}

impl<'a, T: Transport> YmodemReceiver<'a, T> {
    /// Wrap `transport` for a single transfer.
    pub fn new(transport: &'a mut T) -> Self {
        Self { transport }
    }

    /// Announce readiness and obtain the sender's filename/size packet.
    ///
    /// Sends `C` and retries indefinitely (`NAK`, sleep 1s) until a valid
    /// initial packet is received.
    pub fn initiate_recv(&mut self) -> Result<(String, usize)> {
        self.transport.send(&[control::C])?;

        let initial = loop {
            match self.try_recv_packet(INITIAL_PACKET_TIMEOUT) {
                Some(packet) if frame::block_size_for(packet[0]).is_some() => break packet,
                _ => {
                    warn!("ymodem receiver: failed to receive the initial packet, retrying");
                    self.transport.send(&[control::NAK])?;
                    std::thread::sleep(RETRY_SLEEP);
                },
            }
        };

        self.transport.send(&[control::ACK])?;

        let block_size = frame::block_size_for(initial[0]).expect("checked above");
        let payload = &initial[3..3 + block_size];
        frame::parse_initial_payload(payload)
    }

    /// Receive `size` bytes of file data following a prior
    /// [`initiate_recv`](Self::initiate_recv) call.
    pub fn recv(&mut self, size: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(size);
        let mut expected_seq: u8 = 1;

        self.transport.send(&[control::C])?;

        loop {
            let Some(packet) = self.try_recv_packet(DATA_PACKET_TIMEOUT) else {
                self.transport.send(&[control::NAK])?;
                continue;
            };

            match packet[0] {
                control::EOT => {
                    self.transport.send(&[control::ACK])?;
                    break;
                },
                control::CAN => {
                    if self.transport.wait_byte(CANCEL_PEEK_TIMEOUT) == i32::from(control::CAN) {
                        return Err(Error::PeerCancelled);
                    }
                },
                header if frame::block_size_for(header).is_some() => {
                    let block_size = frame::block_size_for(header).expect("checked above");
                    if packet[1] != expected_seq {
                        trace!(
                            "ymodem receiver: expected seq {expected_seq}, got {}, NAK",
                            packet[1]
                        );
                        self.transport.send(&[control::NAK])?;
                        continue;
                    }

                    data.extend_from_slice(&packet[3..3 + block_size]);
                    self.transport.send(&[control::ACK])?;
                    expected_seq = expected_seq.wrapping_add(1);
                },
                other => {
                    trace!("ymodem receiver: unexpected control byte 0x{other:02X}, ignoring");
                },
            }
        }

        data.truncate(size);
        debug!("ymodem receiver: transfer complete, {} bytes", data.len());
        Ok(data)
    }

    /// Send the two-`CAN` cancellation sequence in a single write.
    pub fn cancel_transfer(&mut self) -> Result<()> {
        self.transport.send(&[control::CAN, control::CAN])
    }

    /// Read one frame: a single control byte, or a full data block.
    ///
    /// Unknown header bytes purge `128 + NON_DATA_LEN` bytes from the
    /// stream (treating the bogus header as if it were a 128-byte block)
    /// before reporting failure, so a desynchronized stream can resync.
    fn try_recv_packet(&mut self, timeout: Duration) -> Option<Vec<u8>> {
        let header = self.transport.wait_byte(timeout);
        if header == -1 {
            return None;
        }
        let header = header as u8;

        if control::SINGLE_BYTE.contains(&header) {
            return Some(vec![header]);
        }

        let Some(block_size) = frame::block_size_for(header) else {
            trace!("ymodem receiver: invalid header 0x{header:02X}, purging stream");
            let purge = frame::SOH_BLOCK_SIZE + control::NON_DATA_LEN - 1;
            for _ in 0..purge {
                if self.transport.wait_byte(INTER_BYTE_TIMEOUT) == -1 {
                    break;
                }
            }
            return None;
        };

        let mut packet = Vec::with_capacity(3 + block_size + 2);
        packet.push(header);
        for _ in 0..(block_size + control::NON_DATA_LEN - 1) {
            let byte = self.transport.wait_byte(INTER_BYTE_TIMEOUT);
            if byte == -1 {
                return None;
            }
            packet.push(byte as u8);
        }

        if frame::validate(&packet) {
            Some(packet)
        } else {
            None
        }
    }
}
