//! The reactor's internal message shapes.
//!
//! Upstream verbs travel from a transport into the reactor; downstream verbs
//! travel from the reactor back out to a channel's transport. Verbs carry
//! only semantic fields, never transport encoding.

use crate::channel::ChannelId;

/// Opaque client-assigned identifier, used to correlate a `MESSAGE` reply
/// with the request that triggered it. Telnet and NXTCP both carry this as
/// an unsigned 32 bit number on the wire.
pub type MessageRef = u32;

/// Server-assigned identifier for an outstanding request or a subscription's
/// persistent post.
pub type PostId = u32;

/// A name is an opaque byte-string endpoint identifier.
pub type Name = Vec<u8>;

/// A topic is an opaque byte-string, scoped to a single name.
pub type Topic = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Standby,
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageStatus {
    Ok,
    Nok,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageReason {
    None,
    Timeout,
    Unreachable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestStatus {
    Interest,
    NoInterest,
}

/// Request to become owner (or standby candidate) of `name`.
#[derive(Debug, Clone)]
pub struct LoginVerb {
    pub name: Name,
    pub enforce: bool,
    pub standby: bool,
    pub persist: bool,
}

/// Release ownership (or a standby position) of `name`.
#[derive(Debug, Clone)]
pub struct LogoutVerb {
    pub name: Name,
}

/// A request addressed to the current owner of `name`.
///
/// `messageref` is only meaningful when `unidirectional` is false: the
/// eventual `MESSAGE` reply echoes it back.
#[derive(Debug, Clone)]
pub struct RequestVerb {
    pub name: Name,
    pub unidirectional: bool,
    pub messageref: MessageRef,
    /// Requested timeout in seconds. `None` or `Some(0.0)` selects the
    /// reactor's default.
    pub timeout: Option<f64>,
    pub payload: Vec<u8>,
}

/// A reply to an outstanding post, sent by the name's current owner.
#[derive(Debug, Clone)]
pub struct PostVerb {
    pub postref: PostId,
    pub payload: Vec<u8>,
}

/// Subscribe to fan-out messages on `(name, topic)`.
#[derive(Debug, Clone)]
pub struct SubscribeVerb {
    pub name: Name,
    pub messageref: MessageRef,
    pub topic: Topic,
}

/// Withdraw a previous subscription to `(name, topic)`.
#[derive(Debug, Clone)]
pub struct UnsubscribeVerb {
    pub name: Name,
    pub topic: Topic,
}

/// Upstream verb sum type, dispatched on by the reactor.
#[derive(Debug, Clone)]
pub enum UpstreamVerb {
    Login(LoginVerb),
    Logout(LogoutVerb),
    Request(RequestVerb),
    Post(PostVerb),
    Subscribe(SubscribeVerb),
    Unsubscribe(UnsubscribeVerb),
}

impl UpstreamVerb {
    /// Checks required-field invariants that the wire codecs cannot already
    /// guarantee by construction. A failure here is always client-origin: it
    /// is traced and the verb is dropped, never escalated.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            UpstreamVerb::Login(v) if v.name.is_empty() => Err("login name is empty".into()),
            UpstreamVerb::Logout(v) if v.name.is_empty() => Err("logout name is empty".into()),
            UpstreamVerb::Request(v) if v.name.is_empty() => Err("request name is empty".into()),
            UpstreamVerb::Subscribe(v) if v.name.is_empty() => {
                Err("subscribe name is empty".into())
            }
            UpstreamVerb::Subscribe(v) if v.topic.is_empty() => {
                Err("subscribe topic is empty".into())
            }
            UpstreamVerb::Unsubscribe(v) if v.name.is_empty() => {
                Err("unsubscribe name is empty".into())
            }
            UpstreamVerb::Unsubscribe(v) if v.topic.is_empty() => {
                Err("unsubscribe topic is empty".into())
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionVerb {
    pub name: Name,
    pub state: SessionState,
}

#[derive(Debug, Clone)]
pub struct CallVerb {
    pub unidirectional: bool,
    pub postref: Option<PostId>,
    pub name: Name,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct MessageVerb {
    pub messageref: MessageRef,
    pub status: MessageStatus,
    pub reason: MessageReason,
    pub payload: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct InterestVerb {
    pub postref: PostId,
    pub name: Name,
    pub status: InterestStatus,
    pub topic: Topic,
}

/// Downstream verb sum type, deposited into a channel's queue.
#[derive(Debug, Clone)]
pub enum DownstreamVerb {
    Session(SessionVerb),
    Call(CallVerb),
    Message(MessageVerb),
    Interest(InterestVerb),
}

impl DownstreamVerb {
    /// Downstream verbs are built exclusively by the reactor itself, so a
    /// validation failure here indicates a reactor bug rather than
    /// client-origin misbehavior; see [`crate::error::ReactorError`].
    pub fn validate(&self) -> Result<(), String> {
        match self {
            DownstreamVerb::Session(v) if v.name.is_empty() => {
                Err("session verb with empty name".into())
            }
            DownstreamVerb::Call(v) if v.name.is_empty() => {
                Err("call verb with empty name".into())
            }
            DownstreamVerb::Interest(v) if v.name.is_empty() => {
                Err("interest verb with empty name".into())
            }
            DownstreamVerb::Interest(v) if v.topic.is_empty() => {
                Err("interest verb with empty topic".into())
            }
            _ => Ok(()),
        }
    }
}

/// Identifies a watcher awaiting a reply on a given post, from a given
/// channel. Used both as a state key and as a timer callback argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatcherKey {
    pub postref: PostId,
    pub channel: ChannelId,
}
