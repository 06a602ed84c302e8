//! Packet type byte values for the NXTCP binary protocol.

pub const PACKET_WELCOME: u8 = 0x01;
pub const PACKET_LOGIN: u8 = 0x02;
pub const PACKET_LOGOUT: u8 = 0x03;
pub const PACKET_SESSION: u8 = 0x04;
pub const PACKET_REQUEST: u8 = 0x05;
pub const PACKET_CALL: u8 = 0x06;
pub const PACKET_POST: u8 = 0x07;
pub const PACKET_MESSAGE: u8 = 0x08;
pub const PACKET_SUBSCRIBE: u8 = 0x09;
pub const PACKET_UNSUBSCRIBE: u8 = 0x0a;
pub const PACKET_INTEREST: u8 = 0x0b;
pub const PACKET_PING: u8 = 0x0c;
pub const PACKET_PONG: u8 = 0x0d;
pub const PACKET_QUIT: u8 = 0x0e;
pub const PACKET_BYEBYE: u8 = 0x0f;
