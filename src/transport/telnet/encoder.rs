//! Line encoder for the telnet protocol: command word, space-separated
//! arguments, `\r\n`.

use crate::verb::{InterestStatus, MessageReason, MessageStatus, SessionState};

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
    Pong {
        payload: Option<&'a [u8]>,
    },
    Error {
        reason: &'a str,
    },
    ByeBye,
}

pub fn encode(packet: OutboundPacket<'_>) -> Vec<u8> {
    let mut args: Vec<Vec<u8>> = Vec::new();
    let cmd: &[u8] = match packet {
        OutboundPacket::Welcome { server_version, protocol_version } => {
            args.push(format!("server_version={server_version}").into_bytes());
            args.push(format!("protocol_version={protocol_version}").into_bytes());
            b"WELCOME"
        }
        OutboundPacket::Session { name, state } => {
            args.push(name.to_vec());
            args.push(session_state_word(state).to_vec());
            b"SESSION"
        }
        OutboundPacket::Call { unidirectional, postref, name, payload } => {
            if unidirectional {
                args.push(b"UNI".to_vec());
            } else {
                args.push(postref.unwrap_or(0).to_string().into_bytes());
            }
            args.push(name.to_vec());
            args.push(payload.to_vec());
            b"CALL"
        }
        OutboundPacket::Message { messageref, status, reason, payload } => {
            args.push(messageref.to_string().into_bytes());
            args.push(message_status_word(status, reason).to_vec());
            if status == MessageStatus::Ok {
                args.push(payload.unwrap_or(&[]).to_vec());
            }
            b"MESSAGE"
        }
        OutboundPacket::Interest { postref, name, status, topic } => {
            args.push(postref.to_string().into_bytes());
            args.push(interest_status_word(status).to_vec());
            args.push(name.to_vec());
            args.push(topic.to_vec());
            b"INTEREST"
        }
        OutboundPacket::Pong { payload } => {
            if let Some(payload) = payload {
                args.push(payload.to_vec());
            }
            b"PONG"
        }
        OutboundPacket::Error { reason } => {
            args.push(reason.as_bytes().to_vec());
            b"ERROR"
        }
        OutboundPacket::ByeBye => b"BYEBYE",
    };

    let mut out = Vec::new();
    out.extend_from_slice(cmd);
    for arg in &args {
        out.push(b' ');
        out.extend_from_slice(arg);
    }
    out.extend_from_slice(b"\r\n");
    out
}

fn session_state_word(state: SessionState) -> &'static [u8] {
    match state {
        SessionState::Ended => b"ENDED",
        SessionState::Standby => b"STANDBY",
        SessionState::Active => b"ACTIVE",
    }
}

fn message_status_word(status: MessageStatus, reason: MessageReason) -> &'static [u8] {
    match (status, reason) {
        (MessageStatus::Ok, _) => b"OK",
        (MessageStatus::Nok, MessageReason::Timeout) => b"TIMEOUT",
        (MessageStatus::Nok, _) => b"UNREACHABLE",
    }
}

fn interest_status_word(status: InterestStatus) -> &'static [u8] {
    match status {
        InterestStatus::NoInterest => b"NO_INTEREST",
        InterestStatus::Interest => b"INTEREST",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_session_line() {
        let frame = encode(OutboundPacket::Session { name: b"svc", state: SessionState::Active });
        assert_eq!(frame, b"SESSION svc ACTIVE\r\n");
    }

    #[test]
    fn encodes_message_nok_timeout_with_no_payload() {
        let frame = encode(OutboundPacket::Message {
            messageref: 7,
            status: MessageStatus::Nok,
            reason: MessageReason::Timeout,
            payload: None,
        });
        assert_eq!(frame, b"MESSAGE 7 TIMEOUT\r\n");
    }
}
