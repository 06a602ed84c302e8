//! Pull decoder for the NXTCP frame format: `u32 BE length | u8 type | body`.

use bytes::{Buf, BytesMut};

use crate::error::CodecError;

use super::defines::*;

/// Frames above this size are rejected outright rather than buffered.
const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundPacket {
    Login {
        name: Vec<u8>,
        enforce: bool,
        standby: bool,
        persist: bool,
    },
    Logout {
        name: Vec<u8>,
    },
    Request {
        name: Vec<u8>,
        unidirectional: bool,
        messageref: u32,
        timeout: f64,
        payload: Vec<u8>,
    },
    Post {
        postref: u32,
        payload: Vec<u8>,
    },
    Subscribe {
        messageref: u32,
        name: Vec<u8>,
        topic: Vec<u8>,
    },
    Unsubscribe {
        name: Vec<u8>,
        topic: Vec<u8>,
    },
    Pong {
        payload: Vec<u8>,
    },
    Quit,
}

#[derive(Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pulls the next complete packet out of the buffer, if a full frame is
    /// present; leaves a partial frame buffered for the next call.
    pub fn decode_next(&mut self) -> Result<Option<InboundPacket>, CodecError> {
        if self.buf.len() < 5 {
            return Ok(None);
        }
        let length = u32::from_be_bytes(self.buf[0..4].try_into().unwrap()) as usize;
        if length > MAX_FRAME_LEN {
            return Err(CodecError::FieldTooLarge {
                field: "frame",
                size: length,
                limit: MAX_FRAME_LEN,
            });
        }
        if self.buf.len() < 5 + length {
            return Ok(None);
        }
        let packet_type = self.buf[4];
        self.buf.advance(5);
        let frame = self.buf.split_to(length);
        Self::parse(packet_type, &frame).map(Some)
    }

    fn parse(packet_type: u8, frame: &[u8]) -> Result<InboundPacket, CodecError> {
        let mut r = FrameReader::new(frame);
        match packet_type {
            PACKET_LOGIN => {
                let flags = r.uint8()?;
                let name = r.string()?;
                Ok(InboundPacket::Login {
                    name,
                    persist: flags & (1 << 0) != 0,
                    standby: flags & (1 << 1) != 0,
                    enforce: flags & (1 << 2) != 0,
                })
            }
            PACKET_LOGOUT => Ok(InboundPacket::Logout { name: r.string()? }),
            PACKET_REQUEST => {
                let name = r.string()?;
                let flags = r.uint8()?;
                let unidirectional = flags & (1 << 0) != 0;
                // Always reserved on the wire, even when unidirectional.
                let messageref_field = r.uint32()?;
                let messageref = if unidirectional { 0 } else { messageref_field };
                let timeout_ms = r.uint32()?;
                let payload = r.blob()?;
                Ok(InboundPacket::Request {
                    name,
                    unidirectional,
                    messageref,
                    timeout: timeout_ms as f64 / 1000.0,
                    payload,
                })
            }
            PACKET_POST => Ok(InboundPacket::Post {
                postref: r.uint32()?,
                payload: r.blob()?,
            }),
            PACKET_SUBSCRIBE => {
                let messageref = r.uint32()?;
                let name = r.string()?;
                let topic = r.blob()?;
                Ok(InboundPacket::Subscribe { messageref, name, topic })
            }
            PACKET_UNSUBSCRIBE => {
                let name = r.string()?;
                let topic = r.blob()?;
                Ok(InboundPacket::Unsubscribe { name, topic })
            }
            PACKET_PONG => Ok(InboundPacket::Pong { payload: r.blob()? }),
            PACKET_QUIT => Ok(InboundPacket::Quit),
            other => Err(CodecError::UnknownPacketType(other)),
        }
    }
}

/// Cursor over a single frame's body, replacing the source's
/// `get_uint8(offset)`-style absolute addressing with sequential reads.
struct FrameReader<'a> {
    frame: &'a [u8],
    pos: usize,
}

impl<'a> FrameReader<'a> {
    fn new(frame: &'a [u8]) -> Self {
        FrameReader { frame, pos: 0 }
    }

    fn uint8(&mut self) -> Result<u8, CodecError> {
        let b = *self.frame.get(self.pos).ok_or(CodecError::FieldTooLarge {
            field: "uint8",
            size: self.pos + 1,
            limit: self.frame.len(),
        })?;
        self.pos += 1;
        Ok(b)
    }

    fn uint32(&mut self) -> Result<u32, CodecError> {
        let end = self.pos + 4;
        let bytes = self.frame.get(self.pos..end).ok_or(CodecError::FieldTooLarge {
            field: "uint32",
            size: end,
            limit: self.frame.len(),
        })?;
        self.pos = end;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    fn string(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.uint8()? as usize;
        let end = self.pos + len;
        let bytes = self.frame.get(self.pos..end).ok_or(CodecError::FieldTooLarge {
            field: "string",
            size: end,
            limit: self.frame.len(),
        })?;
        self.pos = end;
        Ok(bytes.to_vec())
    }

    fn blob(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.uint32()? as usize;
        let end = self.pos + len;
        let bytes = self.frame.get(self.pos..end).ok_or(CodecError::FieldTooLarge {
            field: "blob",
            size: end,
            limit: self.frame.len(),
        })?;
        self.pos = end;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(packet_type: u8, body: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&(body.len() as u32).to_be_bytes());
        out.push(packet_type);
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn decodes_welcome_handshake_constant() {
        // PACKET_WELCOME's byte value, spelled out as the wire would send it.
        assert_eq!(hex_literal::hex!("01"), [PACKET_WELCOME]);
    }

    #[test]
    fn decodes_login_with_flags() {
        let mut body = vec![0b101]; // persist + enforce
        body.push(2);
        body.extend_from_slice(b"hi");
        let mut d = Decoder::new();
        d.feed(&frame(PACKET_LOGIN, &body));

        let packet = d.decode_next().unwrap().unwrap();
        assert_eq!(
            packet,
            InboundPacket::Login {
                name: b"hi".to_vec(),
                enforce: true,
                standby: false,
                persist: true,
            }
        );
        assert!(d.decode_next().unwrap().is_none());
    }

    #[test]
    fn buffers_partial_frames_across_feeds() {
        let full = frame(PACKET_LOGOUT, &[1, b'x']);
        let mut d = Decoder::new();
        d.feed(&full[..3]);
        assert!(d.decode_next().unwrap().is_none());
        d.feed(&full[3..]);
        assert_eq!(d.decode_next().unwrap().unwrap(), InboundPacket::Logout { name: b"x".to_vec() });
    }

    #[test]
    fn rejects_unknown_packet_type() {
        let mut d = Decoder::new();
        d.feed(&frame(0xfe, &[]));
        assert!(matches!(d.decode_next(), Err(CodecError::UnknownPacketType(0xfe))));
    }

    #[test]
    fn decodes_request_unidirectional() {
        let mut body = Vec::new();
        body.push(3);
        body.extend_from_slice(b"svc");
        body.push(1); // unidirectional flag
        body.extend_from_slice(&0u32.to_be_bytes()); // messageref, reserved but unused
        body.extend_from_slice(&5000u32.to_be_bytes()); // timeout ms
        body.extend_from_slice(&3u32.to_be_bytes());
        body.extend_from_slice(b"abc");

        let mut d = Decoder::new();
        d.feed(&frame(PACKET_REQUEST, &body));
        let packet = d.decode_next().unwrap().unwrap();
        assert_eq!(
            packet,
            InboundPacket::Request {
                name: b"svc".to_vec(),
                unidirectional: true,
                messageref: 0,
                timeout: 5.0,
                payload: b"abc".to_vec(),
            }
        );
    }
}
