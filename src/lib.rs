//! A lightweight named-endpoint request/response and topic pub/sub message
//! broker: channels log in under a name, callers `REQUEST` or `POST` against
//! that name, and anyone may `SUBSCRIBE` to topics published under it.
//!
//! The reactor (`reactor.rs`) is pure dispatch logic over `state.rs`'s data
//! store; everything else in this crate is plumbing to drive it from real
//! sockets: a `mio` poll loop (`mainloop`), two wire protocols
//! (`transport::nxtcp`, `transport::telnet`), and a keepalive state machine
//! shared by both.

pub mod channel;
pub mod error;
pub mod mainloop;
pub mod reactor;
pub mod state;
pub mod timer;
pub mod tracer;
pub mod transport;
pub mod verb;

pub use channel::{Channel, ChannelId};
pub use error::{CodecError, ConfigError, ReactorError, StateError};
pub use reactor::ReactorHandle;
pub use tracer::Tracer;
