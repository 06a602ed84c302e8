//! Binds a [`Channel`] to a raw NXTCP byte stream.

use std::cell::RefCell;
use std::net::SocketAddr;
use std::rc::Rc;

use crate::channel::Channel;
use crate::transport::keepalive::{KeepAlive, KeepAliveEvent};
use crate::transport::Connection;
use crate::verb::{
    DownstreamVerb, LoginVerb, LogoutVerb, PostVerb, RequestVerb, SubscribeVerb, UnsubscribeVerb,
    UpstreamVerb,
};

use super::decoder::{Decoder, InboundPacket};
use super::encoder::{encode, OutboundPacket};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const PROTOCOL_VERSION: u8 = 1;

/// State shared between [`NxtcpConnection`] and the `'static` downstream
/// handler closure the reactor holds a clone of.
struct Shared {
    write_buf: Vec<u8>,
    close_requested: bool,
}

pub struct NxtcpConnection {
    channel: Channel,
    decoder: Decoder,
    keepalive: KeepAlive,
    shared: Rc<RefCell<Shared>>,
}

impl NxtcpConnection {
    pub fn new(channel: Channel, peer: SocketAddr) -> Self {
        channel.set_description(format!("NXTCP_{:05}", peer.port()));

        let shared = Rc::new(RefCell::new(Shared {
            write_buf: Vec::new(),
            close_requested: false,
        }));

        let handler_channel = channel.clone();
        let handler_shared = Rc::clone(&shared);
        channel.set_downstream_handler(move || {
            while let Some(verb) = handler_channel.pop_downstream() {
                let frame = encode_downstream(&verb);
                handler_shared.borrow_mut().write_buf.extend_from_slice(&frame);
            }
        });

        shared.borrow_mut().write_buf.extend_from_slice(&encode(OutboundPacket::Welcome {
            server_version: SERVER_VERSION,
            protocol_version: PROTOCOL_VERSION,
        }));

        NxtcpConnection {
            channel,
            decoder: Decoder::new(),
            keepalive: KeepAlive::new(),
            shared,
        }
    }

    fn handle_packet(&mut self, packet: InboundPacket) -> bool {
        self.keepalive.tickle();
        let verb = match packet {
            InboundPacket::Login { name, enforce, standby, persist } => {
                UpstreamVerb::Login(LoginVerb { name, enforce, standby, persist })
            }
            InboundPacket::Logout { name } => UpstreamVerb::Logout(LogoutVerb { name }),
            InboundPacket::Request { name, unidirectional, messageref, timeout, payload } => {
                UpstreamVerb::Request(RequestVerb {
                    name,
                    unidirectional,
                    messageref,
                    timeout: Some(timeout),
                    payload,
                })
            }
            InboundPacket::Post { postref, payload } => {
                UpstreamVerb::Post(PostVerb { postref, payload })
            }
            InboundPacket::Subscribe { messageref, name, topic } => {
                UpstreamVerb::Subscribe(SubscribeVerb { name, messageref, topic })
            }
            InboundPacket::Unsubscribe { name, topic } => {
                UpstreamVerb::Unsubscribe(UnsubscribeVerb { name, topic })
            }
            InboundPacket::Pong { .. } => return true,
            InboundPacket::Quit => return false,
        };
        let _ = self.channel.put_upstream(verb);
        true
    }
}

impl Connection for NxtcpConnection {
    fn on_readable(&mut self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            self.shared.borrow_mut().close_requested = true;
            return false;
        }
        self.decoder.feed(bytes);
        loop {
            match self.decoder.decode_next() {
                Ok(Some(packet)) => {
                    if !self.handle_packet(packet) {
                        self.shared.borrow_mut().close_requested = true;
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(_) => {
                    self.shared.borrow_mut().close_requested = true;
                    return false;
                }
            }
        }
    }

    fn fill_write_buffer(&mut self, out: &mut Vec<u8>) -> usize {
        let mut shared = self.shared.borrow_mut();
        let n = shared.write_buf.len();
        out.append(&mut shared.write_buf);
        n
    }

    fn wants_write(&self) -> bool {
        !self.shared.borrow().write_buf.is_empty()
    }

    fn keepalive_tick(&mut self) {
        match self.keepalive.tick() {
            Some(KeepAliveEvent::Warn) => {
                let frame = encode(OutboundPacket::Ping { payload: &[] });
                self.shared.borrow_mut().write_buf.extend_from_slice(&frame);
            }
            Some(KeepAliveEvent::Dead) => {
                let frame = encode(OutboundPacket::ByeBye);
                let mut shared = self.shared.borrow_mut();
                shared.write_buf.extend_from_slice(&frame);
                shared.close_requested = true;
            }
            None => {}
        }
    }

    fn should_close(&self) -> bool {
        self.shared.borrow().close_requested
    }

    fn close(&mut self) {
        self.channel.close();
    }
}

fn encode_downstream(verb: &DownstreamVerb) -> Vec<u8> {
    match verb {
        DownstreamVerb::Session(v) => encode(OutboundPacket::Session { name: &v.name, state: v.state }),
        DownstreamVerb::Call(v) => encode(OutboundPacket::Call {
            unidirectional: v.unidirectional,
            postref: v.postref,
            name: &v.name,
            payload: &v.payload,
        }),
        DownstreamVerb::Message(v) => encode(OutboundPacket::Message {
            messageref: v.messageref,
            status: v.status,
            reason: v.reason,
            payload: v.payload.as_deref(),
        }),
        DownstreamVerb::Interest(v) => encode(OutboundPacket::Interest {
            postref: v.postref,
            name: &v.name,
            status: v.status,
            topic: &v.topic,
        }),
    }
}
