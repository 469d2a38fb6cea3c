//! CAN bus transport (C5): tunnels an opaque byte stream over 8-byte
//! SocketCAN frames, addressed by a 6-bit `motor_id`.
//!
//! Linux-only; requires the `can` feature, which pulls in the `socketcan`
//! crate.

use std::collections::VecDeque;
use std::time::Duration;

use embedded_can::{Frame as _, StandardId};
use log::{debug, trace};
use socketcan::{CanFrame, CanSocket, Socket};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Function code used for the data-tunneling arbitration ID.
const DATA_FUNCTION_CODE: u16 = 0x1F;

/// Function code used for the OTA-trigger arbitration ID.
const OTA_FUNCTION_CODE: u16 = 0x14;

/// Maximum CAN data-frame payload length.
const CAN_FRAME_LEN: usize = 8;

/// Read timeout used while draining `poll_byte`'s single-frame lookahead.
const POLL_TIMEOUT: Duration = Duration::from_millis(1);

/// Read timeout used while blocking in [`CanTransport::wait_for_ota`].
const OTA_WAIT_TIMEOUT: Duration = Duration::from_millis(300);

fn arbitration_id(motor_id: u16, function_code: u16) -> u16 {
    (motor_id << 6) | (function_code << 1) | 1
}

fn standard_frame(id: u16, data: &[u8]) -> Result<CanFrame> {
    let id = StandardId::new(id)
        .ok_or_else(|| Error::Transport(format!("arbitration id 0x{id:03X} out of range")))?;
    CanFrame::new(id, data)
        .ok_or_else(|| Error::Transport("CAN data frame construction failed".into()))
}

/// A SocketCAN-backed transport tunneling bytes to/from a single
/// `motor_id` over 8-byte frames.
pub struct CanTransport {
    socket: CanSocket,
    motor_id: u16,
    fifo: VecDeque<u8>,
}

impl CanTransport {
    /// Open the named SocketCAN interface (e.g. `"can0"`) and bind it to
    /// `motor_id`.
    pub fn open(interface: &str, motor_id: u16) -> Result<Self> {
        let socket =
            CanSocket::open(interface).map_err(|e| Error::Transport(format!("open {interface}: {e}")))?;
        socket
            .set_read_timeout(POLL_TIMEOUT)
            .map_err(|e| Error::Transport(format!("set_read_timeout: {e}")))?;

        debug!("CAN transport open on {interface} for motor_id={motor_id}");
        Ok(Self {
            socket,
            motor_id,
            fifo: VecDeque::new(),
        })
    }

    /// Read at most one frame off the bus (bounded by the socket's read
    /// timeout) and, if it is addressed to `motor_id`, append its data
    /// bytes to the FIFO.
    fn poll_bus_once(&mut self) {
        match self.socket.read_frame() {
            Ok(socketcan::CanFrame::Data(frame)) => {
                let id = match frame.id() {
                    embedded_can::Id::Standard(id) => u16::from(id.as_raw()),
                    embedded_can::Id::Extended(id) => (id.as_raw() & 0xFFFF) as u16,
                };
                if (id >> 6) == self.motor_id {
                    trace!("CAN rx frame for motor {}: {} bytes", self.motor_id, frame.data().len());
                    self.fifo.extend(frame.data().iter().copied());
                }
            },
            Ok(_) => {},
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) => {},
            Err(e) => {
                trace!("CAN read_frame error (ignoring): {e}");
            },
        }
    }
}

impl Transport for CanTransport {
    fn send(&mut self, data: &[u8]) -> Result<()> {
        for chunk in data.chunks(CAN_FRAME_LEN) {
            let id = arbitration_id(self.motor_id, DATA_FUNCTION_CODE);
            let frame = standard_frame(id, chunk)?;
            self.socket
                .write_frame(&frame)
                .map_err(|e| Error::Transport(format!("write_frame: {e}")))?;
        }
        Ok(())
    }

    fn poll_byte(&mut self) -> i32 {
        if let Some(byte) = self.fifo.pop_front() {
            return i32::from(byte);
        }

        self.poll_bus_once();
        self.fifo.pop_front().map_or(-1, i32::from)
    }

    fn initiate_ota(&mut self) -> Result<()> {
        let id = arbitration_id(self.motor_id, OTA_FUNCTION_CODE);
        let frame = standard_frame(id, &[0x00])?;
        self.socket
            .write_frame(&frame)
            .map_err(|e| Error::Transport(format!("write_frame: {e}")))?;
        debug!("CAN OTA trigger sent to motor {}", self.motor_id);
        Ok(())
    }

    fn wait_for_ota(&mut self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            match self.socket.read_frame() {
                Ok(socketcan::CanFrame::Data(frame)) => {
                    let id = match frame.id() {
                        embedded_can::Id::Standard(id) => u16::from(id.as_raw()),
                        embedded_can::Id::Extended(id) => (id.as_raw() & 0xFFFF) as u16,
                    };
                    if (id >> 6) == self.motor_id && ((id >> 1) & 0xFF) == OTA_FUNCTION_CODE {
                        return true;
                    }
                },
                Ok(_) => {},
                Err(_) => {
                    std::thread::sleep(OTA_WAIT_TIMEOUT);
                },
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbitration_id_encoding_matches_spec() {
        // motor_id = 3, data function code 0x1F
        let id = arbitration_id(3, DATA_FUNCTION_CODE);
        assert_eq!(id, (3 << 6) | (0x1F << 1) | 1);
        assert_eq!(id >> 6, 3);
    }

    #[test]
    fn ota_arbitration_id_encoding_matches_spec() {
        let id = arbitration_id(7, OTA_FUNCTION_CODE);
        assert_eq!(id, (7 << 6) | (0x14 << 1) | 1);
        assert_eq!((id >> 1) & 0xFF, 0x14);
    }

    #[test]
    fn chunking_uses_ceiling_division() {
        // Frame count must be ceil(len / 8), not a floor division.
        for len in [0usize, 1, 7, 8, 9, 15, 16, 17, 100] {
            let data = vec![0u8; len];
            let expected = len.div_ceil(CAN_FRAME_LEN);
            let got = data.chunks(CAN_FRAME_LEN).count();
            assert_eq!(got, expected, "len={len}");
        }
    }
}
