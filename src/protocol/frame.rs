//! YMODEM/CRC frame encoding and validation.
//!
//! ```text
//! Data frame layout:
//! +------+-----+------+---------------+--------+
//! | SOH/ | SEQ | ~SEQ |  DATA (L)     | CRC16  |
//! | STX  |     |      |               |        |
//! +------+-----+------+---------------+--------+
//! |  1   |  1  |  1   |  128 or 1024  |   2    |
//! +------+-----+------+---------------+--------+
//! ```

use crate::crc::cal_crc;
use crate::error::{Error, Result};

/// YMODEM control characters.
pub mod control {
    /// Start of Header (128-byte block).
    pub const SOH: u8 = 0x01;
    /// Start of Text (1024-byte block).
    pub const STX: u8 = 0x02;
    /// End of Transmission.
    pub const EOT: u8 = 0x04;
    /// Acknowledge.
    pub const ACK: u8 = 0x06;
    /// Not Acknowledge.
    pub const NAK: u8 = 0x15;
    /// Cancel.
    pub const CAN: u8 = 0x18;
    /// CRC mode request character.
    pub const C: u8 = b'C';

    /// Non-header bytes in a data frame: seq, ~seq, crc_hi, crc_lo.
    pub const NON_DATA_LEN: usize = 5;

    /// Single-byte control codes recognized outside of a data frame.
    pub const SINGLE_BYTE: [u8; 5] = [EOT, ACK, NAK, CAN, C];
}

/// Block size for SOH packets.
pub const SOH_BLOCK_SIZE: usize = 128;

/// Block size for STX packets.
pub const STX_BLOCK_SIZE: usize = 1024;

/// The padding byte used for data block filler (SUB).
pub const DATA_PAD_BYTE: u8 = 0x1A;

/// Data-block length associated with a header byte, if it is one.
#[must_use]
pub fn block_size_for(header: u8) -> Option<usize> {
    match header {
        control::SOH => Some(SOH_BLOCK_SIZE),
        control::STX => Some(STX_BLOCK_SIZE),
        _ => None,
    }
}

/// Build a YMODEM data frame.
///
/// `payload` is padded with [`DATA_PAD_BYTE`] to 128 bytes (SOH) if it is
/// no larger than 128 bytes, otherwise to 1024 bytes (STX). Fails with
/// [`Error::PayloadTooLarge`] if `payload` exceeds 1024 bytes.
pub fn encode(seq: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > STX_BLOCK_SIZE {
        return Err(Error::PayloadTooLarge { len: payload.len() });
    }

    let (header, block_size) = if payload.len() <= SOH_BLOCK_SIZE {
        (control::SOH, SOH_BLOCK_SIZE)
    } else {
        (control::STX, STX_BLOCK_SIZE)
    };

    encode_padded(header, block_size, seq, payload, DATA_PAD_BYTE)
}

/// Build the YMODEM "block 0" initial packet containing `filename\0size\0`,
/// zero-padded (not [`DATA_PAD_BYTE`]-padded) to 128 bytes.
pub fn encode_initial(filename: &str, size: usize) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(SOH_BLOCK_SIZE);
    data.extend_from_slice(filename.as_bytes());
    data.push(0x00);
    data.extend_from_slice(size.to_string().as_bytes());
    data.push(0x00);

    if data.len() > SOH_BLOCK_SIZE {
        return Err(Error::PayloadTooLarge { len: data.len() });
    }

    encode_padded(control::SOH, SOH_BLOCK_SIZE, 0, &data, 0x00)
}

fn encode_padded(header: u8, block_size: usize, seq: u8, data: &[u8], pad: u8) -> Result<Vec<u8>> {
    let mut frame = Vec::with_capacity(3 + block_size + 2);
    frame.push(header);
    frame.push(seq);
    frame.push(!seq);
    frame.extend_from_slice(data);
    frame.resize(3 + block_size, pad);

    let crc = cal_crc(&frame[3..3 + block_size]);
    frame.push((crc >> 8) as u8);
    frame.push((crc & 0xFF) as u8);

    Ok(frame)
}

/// Validate a complete frame (control byte or data block).
///
/// Single-byte control frames are accepted without further checks. Data
/// frames are rejected if their length doesn't match their header, the
/// sequence byte and its one's complement don't sum to `0xFF`, or the
/// trailing CRC doesn't match the payload.
#[must_use]
pub fn validate(frame: &[u8]) -> bool {
    let Some(&header) = frame.first() else {
        return false;
    };

    let Some(block_size) = block_size_for(header) else {
        return control::SINGLE_BYTE.contains(&header) && frame.len() == 1;
    };

    if frame.len() != block_size + control::NON_DATA_LEN {
        return false;
    }

    let seq = frame[1];
    let seq_complement = frame[2];
    if seq.wrapping_add(seq_complement) != 0xFF {
        return false;
    }

    let payload = &frame[3..3 + block_size];
    let expected_crc = cal_crc(payload);
    let actual_crc = (u16::from(frame[3 + block_size]) << 8) | u16::from(frame[4 + block_size]);

    expected_crc == actual_crc
}

/// Parse the `filename\0size\0` payload of a validated initial packet.
///
/// The payload is the full 128-byte data region of the block (i.e.
/// `frame[3..3 + 128]`).
pub fn parse_initial_payload(payload: &[u8]) -> Result<(String, usize)> {
    let first_nul = payload
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::InvalidFrame("initial packet missing filename terminator".into()))?;
    let filename = std::str::from_utf8(&payload[..first_nul])
        .map_err(|e| Error::InvalidFrame(format!("filename is not valid ASCII/UTF-8: {e}")))?
        .to_string();

    let rest = &payload[first_nul + 1..];
    let second_nul = rest
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| Error::InvalidFrame("initial packet missing size terminator".into()))?;
    let size_str = std::str::from_utf8(&rest[..second_nul])
        .map_err(|e| Error::InvalidFrame(format!("size is not valid ASCII/UTF-8: {e}")))?;
    let size = size_str
        .parse::<usize>()
        .map_err(|e| Error::InvalidFrame(format!("size is not a valid integer: {e}")))?;

    Ok((filename, size))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_small_payload_uses_soh() {
        let frame = encode(1, &[0x01, 0x02, 0x03]).unwrap();
        assert_eq!(frame[0], control::SOH);
        assert_eq!(frame[1], 1);
        assert_eq!(frame[2], 0xFE);
        assert_eq!(frame.len(), SOH_BLOCK_SIZE + control::NON_DATA_LEN);
        assert_eq!(&frame[3..6], &[0x01, 0x02, 0x03]);
        assert!(frame[6..3 + SOH_BLOCK_SIZE].iter().all(|&b| b == DATA_PAD_BYTE));
    }

    #[test]
    fn encode_large_payload_uses_stx() {
        let data = vec![0xAAu8; STX_BLOCK_SIZE];
        let frame = encode(5, &data).unwrap();
        assert_eq!(frame[0], control::STX);
        assert_eq!(frame[1], 5);
        assert_eq!(frame[2], 0xFA);
        assert_eq!(frame.len(), STX_BLOCK_SIZE + control::NON_DATA_LEN);
    }

    #[test]
    fn encode_rejects_oversized_payload() {
        let data = vec![0u8; STX_BLOCK_SIZE + 1];
        let err = encode(0, &data).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { len } if len == STX_BLOCK_SIZE + 1));
    }

    #[test]
    fn encode_then_validate_round_trips() {
        for &len in &[0usize, 1, 127, 128, 129, 1023, 1024] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let frame = encode(42, &payload).unwrap();
            assert!(validate(&frame), "frame of payload len {len} should validate");

            let block_size = block_size_for(frame[0]).unwrap();
            let decoded = &frame[3..3 + block_size];
            assert_eq!(&decoded[..len], payload.as_slice());
        }
    }

    #[test]
    fn validate_rejects_bad_seq_complement() {
        let mut frame = encode(1, &[1, 2, 3]).unwrap();
        frame[2] = 0x00;
        assert!(!validate(&frame));
    }

    #[test]
    fn validate_rejects_bad_crc() {
        let mut frame = encode(1, &[1, 2, 3]).unwrap();
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert!(!validate(&frame));
    }

    #[test]
    fn validate_accepts_control_bytes() {
        for &b in &control::SINGLE_BYTE {
            assert!(validate(&[b]));
        }
    }

    #[test]
    fn validate_rejects_wrong_length_data_frame() {
        let mut frame = encode(1, &[1, 2, 3]).unwrap();
        frame.pop();
        assert!(!validate(&frame));
    }

    #[test]
    fn initial_packet_round_trips() {
        let frame = encode_initial("firmware.bin", 4096).unwrap();
        assert!(validate(&frame));
        let payload = &frame[3..3 + SOH_BLOCK_SIZE];
        let (name, size) = parse_initial_payload(payload).unwrap();
        assert_eq!(name, "firmware.bin");
        assert_eq!(size, 4096);
    }

    #[test]
    fn initial_packet_tail_is_zero_padded() {
        let frame = encode_initial("a.bin", 3).unwrap();
        // "a.bin\0" + "3\0" = 8 bytes of payload, rest must be 0x00, not 0x1A.
        let payload = &frame[3..3 + SOH_BLOCK_SIZE];
        assert!(payload[8..].iter().all(|&b| b == 0x00));
    }

    #[test]
    fn s5_initial_packet_literal_parses() {
        let mut payload = Vec::with_capacity(SOH_BLOCK_SIZE);
        payload.extend_from_slice(b"firmware.bin");
        payload.push(0x00);
        payload.extend_from_slice(b"4096");
        payload.push(0x00);
        payload.resize(SOH_BLOCK_SIZE, 0x00);

        let (name, size) = parse_initial_payload(&payload).unwrap();
        assert_eq!(name, "firmware.bin");
        assert_eq!(size, 4096);
    }
}
