//! Structured-logging sink for reactor and transport lifecycle events.
//!
//! Every hook has a no-op default so a `Tracer` implementation only needs to
//! override the events it cares about; with [`NoopTracer`] the whole trait
//! compiles down to nothing on the hot path.

use crate::channel::ChannelId;
use crate::verb::{DownstreamVerb, Name, PostId, Topic, UpstreamVerb};

pub trait Tracer {
    fn channel_opened(&self, _channel: ChannelId) {}
    fn channel_closed(&self, _channel: ChannelId) {}
    fn upstream_verb(&self, _sender: ChannelId, _verb: &UpstreamVerb) {}
    fn downstream_verb(&self, _receiver: ChannelId, _verb: &DownstreamVerb) {}
    fn improper_logout(&self, _sender: ChannelId, _name: &Name) {}
    fn unknown_postref(&self, _sender: ChannelId, _postref: PostId) {}
    fn unowned_post(&self, _sender: ChannelId, _postref: PostId) {}
    fn unwatched_unsubscribe(&self, _sender: ChannelId, _name: &Name, _topic: &Topic) {}
    fn invalid_upstream_verb(&self, _sender: ChannelId, _reason: &str) {}
    fn invalid_downstream_verb(&self, _receiver: ChannelId, _reason: &str) {}
    fn session_activated(&self, _channel: ChannelId, _name: &Name) {}
    fn client_unresponsive(&self, _channel: ChannelId) {}
}

/// Forwards to a shared `T`, so tests can keep a handle to a tracer (e.g.
/// [`RecordingTracer`]) after moving a `Box<dyn Tracer>` into the reactor.
impl<T: Tracer + ?Sized> Tracer for std::rc::Rc<T> {
    fn channel_opened(&self, channel: ChannelId) {
        (**self).channel_opened(channel)
    }
    fn channel_closed(&self, channel: ChannelId) {
        (**self).channel_closed(channel)
    }
    fn upstream_verb(&self, sender: ChannelId, verb: &UpstreamVerb) {
        (**self).upstream_verb(sender, verb)
    }
    fn downstream_verb(&self, receiver: ChannelId, verb: &DownstreamVerb) {
        (**self).downstream_verb(receiver, verb)
    }
    fn improper_logout(&self, sender: ChannelId, name: &Name) {
        (**self).improper_logout(sender, name)
    }
    fn unknown_postref(&self, sender: ChannelId, postref: PostId) {
        (**self).unknown_postref(sender, postref)
    }
    fn unowned_post(&self, sender: ChannelId, postref: PostId) {
        (**self).unowned_post(sender, postref)
    }
    fn unwatched_unsubscribe(&self, sender: ChannelId, name: &Name, topic: &Topic) {
        (**self).unwatched_unsubscribe(sender, name, topic)
    }
    fn invalid_upstream_verb(&self, sender: ChannelId, reason: &str) {
        (**self).invalid_upstream_verb(sender, reason)
    }
    fn invalid_downstream_verb(&self, receiver: ChannelId, reason: &str) {
        (**self).invalid_downstream_verb(receiver, reason)
    }
    fn session_activated(&self, channel: ChannelId, name: &Name) {
        (**self).session_activated(channel, name)
    }
    fn client_unresponsive(&self, channel: ChannelId) {
        (**self).client_unresponsive(channel)
    }
}

/// Discards every event. The default tracer for embedders that don't care.
#[derive(Default)]
pub struct NoopTracer;

impl Tracer for NoopTracer {}

/// Forwards every hook to the `log` facade at a level matching its
/// severity: client-origin protocol noise at `debug!`, operationally
/// interesting events at `info!`/`warn!`.
#[derive(Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn channel_opened(&self, channel: ChannelId) {
        log::debug!("channel {channel} opened");
    }

    fn channel_closed(&self, channel: ChannelId) {
        log::debug!("channel {channel} closed");
    }

    fn upstream_verb(&self, sender: ChannelId, verb: &UpstreamVerb) {
        log::trace!("{sender} -> reactor: {verb:?}");
    }

    fn downstream_verb(&self, receiver: ChannelId, verb: &DownstreamVerb) {
        log::trace!("reactor -> {receiver}: {verb:?}");
    }

    fn improper_logout(&self, sender: ChannelId, name: &Name) {
        log::debug!(
            "channel {sender} sent LOGOUT for {:?} without owning it",
            String::from_utf8_lossy(name)
        );
    }

    fn unknown_postref(&self, sender: ChannelId, postref: PostId) {
        log::debug!("channel {sender} posted to unknown postref {postref}");
    }

    fn unowned_post(&self, sender: ChannelId, postref: PostId) {
        log::debug!("channel {sender} posted to postref {postref} it does not own");
    }

    fn unwatched_unsubscribe(&self, sender: ChannelId, name: &Name, topic: &Topic) {
        log::debug!(
            "channel {sender} unsubscribed from {:?}/{:?} without a prior subscription",
            String::from_utf8_lossy(name),
            String::from_utf8_lossy(topic)
        );
    }

    fn invalid_upstream_verb(&self, sender: ChannelId, reason: &str) {
        log::debug!("dropping invalid upstream verb from {sender}: {reason}");
    }

    fn invalid_downstream_verb(&self, receiver: ChannelId, reason: &str) {
        log::error!("reactor produced invalid downstream verb for {receiver}: {reason}");
    }

    fn session_activated(&self, channel: ChannelId, name: &Name) {
        log::debug!(
            "channel {channel} activated session on {:?}",
            String::from_utf8_lossy(name)
        );
    }

    fn client_unresponsive(&self, channel: ChannelId) {
        log::warn!("channel {channel} is unresponsive");
    }
}

/// Records every hook invocation verbatim, for assertions in reactor tests.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingTracer {
    pub events: std::cell::RefCell<Vec<String>>,
}

#[cfg(test)]
impl Tracer for RecordingTracer {
    fn improper_logout(&self, sender: ChannelId, name: &Name) {
        self.events
            .borrow_mut()
            .push(format!("improper_logout({sender}, {name:?})"));
    }

    fn unknown_postref(&self, sender: ChannelId, postref: PostId) {
        self.events
            .borrow_mut()
            .push(format!("unknown_postref({sender}, {postref})"));
    }

    fn unowned_post(&self, sender: ChannelId, postref: PostId) {
        self.events
            .borrow_mut()
            .push(format!("unowned_post({sender}, {postref})"));
    }

    fn unwatched_unsubscribe(&self, sender: ChannelId, name: &Name, topic: &Topic) {
        self.events.borrow_mut().push(format!(
            "unwatched_unsubscribe({sender}, {name:?}, {topic:?})"
        ));
    }

    fn session_activated(&self, channel: ChannelId, name: &Name) {
        self.events
            .borrow_mut()
            .push(format!("session_activated({channel}, {name:?})"));
    }

    fn client_unresponsive(&self, channel: ChannelId) {
        self.events
            .borrow_mut()
            .push(format!("client_unresponsive({channel})"));
    }
}
