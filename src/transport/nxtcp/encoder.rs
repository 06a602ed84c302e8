//! Encoder for the NXTCP frame format: `u32 BE length | u8 type | body`.

use crate::verb::{InterestStatus, MessageReason, MessageStatus, SessionState};

use super::defines::*;

pub enum OutboundPacket<'a> {
    Welcome {
        server_version: &'a str,
        protocol_version: u8,
    },
    Session {
        name: &'a [u8],
        state: SessionState,
    },
    Call {
        unidirectional: bool,
        postref: Option<u32>,
        name: &'a [u8],
        payload: &'a [u8],
    },
    Message {
        messageref: u32,
        status: MessageStatus,
        reason: MessageReason,
        payload: Option<&'a [u8]>,
    },
    Interest {
        postref: u32,
        name: &'a [u8],
        status: InterestStatus,
        topic: &'a [u8],
    },
    Ping {
        payload: &'a [u8],
    },
    ByeBye,
}

pub fn encode(packet: OutboundPacket<'_>) -> Vec<u8> {
    let mut body = Vec::new();
    let packet_type = match packet {
        OutboundPacket::Welcome { server_version, protocol_version } => {
            push_string(&mut body, server_version.as_bytes());
            body.push(protocol_version);
            PACKET_WELCOME
        }
        OutboundPacket::Session { name, state } => {
            push_string(&mut body, name);
            body.push(session_state_byte(state));
            PACKET_SESSION
        }
        OutboundPacket::Call { unidirectional, postref, name, payload } => {
            push_string(&mut body, name);
            body.push(unidirectional as u8);
            body.extend_from_slice(&postref.unwrap_or(0).to_be_bytes());
            push_blob(&mut body, payload);
            PACKET_CALL
        }
        OutboundPacket::Message { messageref, status, reason, payload } => {
            body.extend_from_slice(&messageref.to_be_bytes());
            body.push(message_status_byte(status));
            body.push(message_reason_byte(reason));
            push_blob(&mut body, payload.unwrap_or(&[]));
            PACKET_MESSAGE
        }
        OutboundPacket::Interest { postref, name, status, topic } => {
            body.extend_from_slice(&postref.to_be_bytes());
            push_string(&mut body, name);
            body.push(interest_status_byte(status));
            push_blob(&mut body, topic);
            PACKET_INTEREST
        }
        OutboundPacket::Ping { payload } => {
            push_blob(&mut body, payload);
            PACKET_PING
        }
        OutboundPacket::ByeBye => PACKET_BYEBYE,
    };

    let mut out = Vec::with_capacity(5 + body.len());
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.push(packet_type);
    out.extend_from_slice(&body);
    out
}

fn session_state_byte(state: SessionState) -> u8 {
    match state {
        SessionState::Active => 0,
        SessionState::Standby => 1,
        SessionState::Ended => 2,
    }
}

fn message_status_byte(status: MessageStatus) -> u8 {
    match status {
        MessageStatus::Ok => 0,
        MessageStatus::Nok => 1,
    }
}

fn message_reason_byte(reason: MessageReason) -> u8 {
    match reason {
        MessageReason::None => 0,
        MessageReason::Timeout => 1,
        MessageReason::Unreachable => 2,
    }
}

fn interest_status_byte(status: InterestStatus) -> u8 {
    match status {
        InterestStatus::Interest => 0,
        InterestStatus::NoInterest => 1,
    }
}

fn push_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.push(bytes.len() as u8);
    out.extend_from_slice(bytes);
}

fn push_blob(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_welcome_frame() {
        let frame = encode(OutboundPacket::Welcome { server_version: "nx", protocol_version: 1 });
        assert_eq!(&frame[0..4], &[0, 0, 0, 4]);
        assert_eq!(frame[4], PACKET_WELCOME);
        assert_eq!(&frame[5..], &[2, b'n', b'x', 1]);
    }

    #[test]
    fn encodes_call_with_postref() {
        let frame = encode(OutboundPacket::Call {
            unidirectional: false,
            postref: Some(7),
            name: b"svc",
            payload: b"hi",
        });
        assert_eq!(frame[4], PACKET_CALL);
        // string(name) + flag + postref(4) + bloblen(4) + payload
        let body = &frame[5..];
        assert_eq!(body[0], 3);
        assert_eq!(&body[1..4], b"svc");
        assert_eq!(body[4], 0);
        assert_eq!(&body[5..9], &7u32.to_be_bytes());
        assert_eq!(&body[9..13], &2u32.to_be_bytes());
        assert_eq!(&body[13..], b"hi");
    }
}
