//! RFC 1350 packets and their datagram codec.

use crate::error::{TftpError, TftpResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Payload size of a full DATA block
pub const BLOCK_SIZE: usize = 512;

/// The only transfer mode served
pub const OCTET_MODE: &str = "octet";

const OPCODE_RRQ: u16 = 1;
const OPCODE_WRQ: u16 = 2;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;

/// Standard ERROR packet codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TftpErrorCode {
    NotDefined,
    FileNotFound,
    AccessViolation,
    DiskFull,
    IllegalOperation,
    UnknownTransferId,
    FileExists,
    NoSuchUser,
}

impl TftpErrorCode {
    /// Wire value
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::NotDefined => 0,
            Self::FileNotFound => 1,
            Self::AccessViolation => 2,
            Self::DiskFull => 3,
            Self::IllegalOperation => 4,
            Self::UnknownTransferId => 5,
            Self::FileExists => 6,
            Self::NoSuchUser => 7,
        }
    }
}

/// Decoded TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Rrq { file_name: String, mode: String },
    Wrq { file_name: String, mode: String },
    Data { block: u16, data: Bytes },
    Ack { block: u16 },
    Error { code: u16, message: String },
}

impl Packet {
    /// Octet mode RRQ
    #[must_use]
    pub fn read_request(file_name: impl Into<String>) -> Self {
        Self::Rrq {
            file_name: file_name.into(),
            mode: OCTET_MODE.to_string(),
        }
    }

    /// Octet mode WRQ
    #[must_use]
    pub fn write_request(file_name: impl Into<String>) -> Self {
        Self::Wrq {
            file_name: file_name.into(),
            mode: OCTET_MODE.to_string(),
        }
    }

    /// ERROR packet with a standard code
    #[must_use]
    pub fn error(code: TftpErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.code(),
            message: message.into(),
        }
    }

    /// Packet name used in logs and errors
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Rrq { .. } => "RRQ",
            Self::Wrq { .. } => "WRQ",
            Self::Data { .. } => "DATA",
            Self::Ack { .. } => "ACK",
            Self::Error { .. } => "ERROR",
        }
    }
}

/// One datagram in, one packet out
#[derive(Debug, Clone, Copy, Default)]
pub struct TftpCodec;

/// Accept only octet mode, compared case-insensitively
pub fn ensure_octet_mode(mode: &str) -> TftpResult<()> {
    if mode.eq_ignore_ascii_case(OCTET_MODE) {
        Ok(())
    } else {
        Err(TftpError::UnsupportedMode(mode.to_string()))
    }
}

fn take_cstring(buf: &mut Bytes) -> Option<String> {
    let end = buf.iter().position(|b| *b == 0)?;
    let text = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.advance(end + 1);
    Some(text)
}

fn decode_request(mut body: Bytes, kind: &'static str) -> TftpResult<(String, String)> {
    let file_name = take_cstring(&mut body).ok_or(TftpError::Malformed(kind))?;
    let mode = take_cstring(&mut body).ok_or(TftpError::Malformed(kind))?;
    if file_name.is_empty() {
        return Err(TftpError::Malformed(kind));
    }
    Ok((file_name, mode))
}

impl Decoder for TftpCodec {
    type Item = Packet;
    type Error = TftpError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // the datagram is consumed whole, even when it fails to parse
        let mut datagram = src.split().freeze();
        if datagram.len() < 2 {
            return Err(TftpError::ShortPacket(datagram.len()));
        }

        let packet = match datagram.get_u16() {
            OPCODE_RRQ => {
                let (file_name, mode) = decode_request(datagram, "RRQ")?;
                Packet::Rrq { file_name, mode }
            }
            OPCODE_WRQ => {
                let (file_name, mode) = decode_request(datagram, "WRQ")?;
                Packet::Wrq { file_name, mode }
            }
            OPCODE_DATA => {
                if datagram.len() < 2 {
                    return Err(TftpError::Malformed("DATA"));
                }
                let block = datagram.get_u16();
                if datagram.len() > BLOCK_SIZE {
                    return Err(TftpError::Malformed("DATA"));
                }
                Packet::Data {
                    block,
                    data: datagram,
                }
            }
            OPCODE_ACK => {
                if datagram.len() < 2 {
                    return Err(TftpError::Malformed("ACK"));
                }
                Packet::Ack {
                    block: datagram.get_u16(),
                }
            }
            OPCODE_ERROR => {
                if datagram.len() < 2 {
                    return Err(TftpError::Malformed("ERROR"));
                }
                let code = datagram.get_u16();
                // tolerate peers that omit the terminator
                let message = take_cstring(&mut datagram)
                    .unwrap_or_else(|| String::from_utf8_lossy(&datagram).into_owned());
                Packet::Error { code, message }
            }
            other => return Err(TftpError::UnknownOpcode(other)),
        };
        Ok(Some(packet))
    }
}

impl Encoder<Packet> for TftpCodec {
    type Error = TftpError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Packet::Rrq { file_name, mode } => encode_request(dst, OPCODE_RRQ, &file_name, &mode),
            Packet::Wrq { file_name, mode } => encode_request(dst, OPCODE_WRQ, &file_name, &mode),
            Packet::Data { block, data } => {
                if data.len() > BLOCK_SIZE {
                    return Err(TftpError::Malformed("DATA"));
                }
                dst.reserve(4 + data.len());
                dst.put_u16(OPCODE_DATA);
                dst.put_u16(block);
                dst.put_slice(&data);
            }
            Packet::Ack { block } => {
                dst.reserve(4);
                dst.put_u16(OPCODE_ACK);
                dst.put_u16(block);
            }
            Packet::Error { code, message } => {
                dst.reserve(5 + message.len());
                dst.put_u16(OPCODE_ERROR);
                dst.put_u16(code);
                dst.put_slice(message.as_bytes());
                dst.put_u8(0);
            }
        }
        Ok(())
    }
}

fn encode_request(dst: &mut BytesMut, opcode: u16, file_name: &str, mode: &str) {
    dst.reserve(4 + file_name.len() + mode.len());
    dst.put_u16(opcode);
    dst.put_slice(file_name.as_bytes());
    dst.put_u8(0);
    dst.put_slice(mode.as_bytes());
    dst.put_u8(0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn encode(packet: Packet) -> BytesMut {
        let mut buf = BytesMut::new();
        TftpCodec.encode(packet, &mut buf).unwrap();
        buf
    }

    #[test]
    fn read_request_layout() {
        let buf = encode(Packet::read_request("TH_1.LAI"));
        assert_eq!(&buf[..], b"\x00\x01TH_1.LAI\x00octet\x00");
    }

    #[test]
    fn error_packet_layout() {
        let buf = encode(Packet::error(TftpErrorCode::NotDefined, "WAIT:3"));
        assert_eq!(&buf[..], b"\x00\x05\x00\x00WAIT:3\x00");
    }

    #[rstest]
    #[case(Packet::write_request("TH_1.LAR"))]
    #[case(Packet::Data { block: 7, data: Bytes::from_static(b"payload") })]
    #[case(Packet::Ack { block: 65535 })]
    #[case(Packet::error(TftpErrorCode::FileNotFound, "missing"))]
    fn decode_reverses_encode(#[case] packet: Packet) {
        let mut buf = encode(packet.clone());
        assert_eq!(TftpCodec.decode(&mut buf).unwrap(), Some(packet));
        assert!(buf.is_empty());
    }

    #[rstest]
    #[case(&[0x00][..])]
    #[case(&[0x00, 0x09, 0x00][..])]
    #[case(&b"\x00\x01file-without-mode"[..])]
    #[case(&[0x00, 0x04, 0x01][..])]
    fn malformed_datagrams_are_consumed(#[case] bytes: &[u8]) {
        let mut buf = BytesMut::from(bytes);
        assert!(TftpCodec.decode(&mut buf).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn error_without_terminator_is_tolerated() {
        let mut buf = BytesMut::from(&b"\x00\x05\x00\x00ABORT:1005"[..]);
        assert_eq!(
            TftpCodec.decode(&mut buf).unwrap(),
            Some(Packet::Error {
                code: 0,
                message: "ABORT:1005".to_string()
            })
        );
    }

    #[rstest]
    #[case("octet", true)]
    #[case("OCTET", true)]
    #[case("netascii", false)]
    #[case("mail", false)]
    fn only_octet_mode_is_supported(#[case] mode: &str, #[case] supported: bool) {
        match ensure_octet_mode(mode) {
            Ok(()) => assert!(supported),
            Err(TftpError::UnsupportedMode(rejected)) => {
                assert!(!supported);
                assert_eq!(rejected, mode);
            }
            Err(other) => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn oversized_data_block_is_rejected() {
        let packet = Packet::Data {
            block: 1,
            data: Bytes::from(vec![0u8; BLOCK_SIZE + 1]),
        };
        let mut buf = BytesMut::new();
        assert!(TftpCodec.encode(packet, &mut buf).is_err());
    }
}
