//! Duplex conduit between a transport and the reactor.
//!
//! The source keys every reverse index on channel *object identity*. Here we
//! use an integer [`ChannelId`] issued by the reactor instead (see
//! `SPEC_FULL.md` §9): the reactor is the single authoritative owner of every
//! channel's queue and handler, and [`Channel`] is a thin, cheaply-cloned
//! handle transports hold onto.

use std::collections::VecDeque;
use std::fmt;

use crate::error::ReactorError;
use crate::reactor::ReactorHandle;
use crate::verb::{DownstreamVerb, UpstreamVerb};

/// Canonical identifier for a channel, stable for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub(crate) u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The bookkeeping the reactor keeps for one open channel: its downstream
/// queue and drain callback. Lives inside the reactor's channel table; never
/// exposed directly to a transport.
pub(crate) struct ChannelRecord {
    pub description: String,
    pub downstream: VecDeque<DownstreamVerb>,
    pub handler: Option<Box<dyn FnMut()>>,
}

impl ChannelRecord {
    pub fn new() -> Self {
        ChannelRecord {
            description: String::new(),
            downstream: VecDeque::new(),
            handler: None,
        }
    }
}

/// A handle to an open channel, held by a transport connection.
///
/// Cloning a `Channel` is cheap (it shares the reactor's `Rc`) but a closed
/// channel stays closed for every clone — `close` tears down reactor state
/// exactly once regardless of how many handles observe it.
#[derive(Clone)]
pub struct Channel {
    id: ChannelId,
    reactor: ReactorHandle,
}

impl Channel {
    pub(crate) fn new(id: ChannelId, reactor: ReactorHandle) -> Self {
        Channel { id, reactor }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Hands `verb` to the reactor synchronously. The reactor may, before
    /// returning, deposit downstream verbs on this or any other channel.
    pub fn put_upstream(&self, verb: UpstreamVerb) -> Result<(), ReactorError> {
        self.reactor.put_upstream(self.id, verb)
    }

    /// Pops the head of the downstream queue, or `None` if drained.
    pub fn pop_downstream(&self) -> Option<DownstreamVerb> {
        self.reactor.pop_downstream(self.id)
    }

    /// Registers the callback invoked every time a verb is deposited into
    /// this channel's downstream queue, repeatedly while it stays non-empty.
    pub fn set_downstream_handler<F>(&self, handler: F)
    where
        F: FnMut() + 'static,
    {
        self.reactor.set_downstream_handler(self.id, Box::new(handler));
    }

    /// Diagnostics-only label, surfaced in tracer and log output.
    pub fn set_description(&self, description: impl Into<String>) {
        self.reactor.set_description(self.id, description.into());
    }

    /// Tears down all reactor state referencing this channel. Idempotent
    /// from the caller's perspective.
    pub fn close(&self) {
        self.reactor.close_channel(self.id);
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Channel({})", self.id)
    }
}
