//! The verb-dispatch core: owns [`State`], every open channel's queue, and
//! the timers backing outstanding requests.
//!
//! The source keys channels by object identity and lets exceptions from
//! `state.py` propagate out of the reactor on a driving bug. Here a
//! [`ChannelId`] is a plain integer key into `Reactor`'s own channel table
//! (see `channel.rs`), and every `State` precondition the reactor itself is
//! responsible for upholding is `expect`ed rather than propagated, since a
//! failure there means the reactor mis-drove its own state machine.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use crate::channel::{Channel, ChannelId, ChannelRecord};
use crate::error::ReactorError;
use crate::state::{PostKind, State};
use crate::timer::{Clock, TimerHandle};
use crate::tracer::Tracer;
use crate::verb::{
    CallVerb, DownstreamVerb, InterestStatus, InterestVerb, LoginVerb, LogoutVerb, MessageReason,
    MessageStatus, MessageVerb, Name, PostVerb, RequestVerb, SessionState, SessionVerb,
    SubscribeVerb, UnsubscribeVerb, UpstreamVerb, WatcherKey,
};

/// Default per-request watch timeout, used when a `REQUEST` omits one.
pub const WATCH_TIMEOUT_DEFAULT: Duration = Duration::from_secs(4);
/// Upper bound a client-requested timeout is clamped to.
pub const WATCH_TIMEOUT_MAX: Duration = Duration::from_secs(60);

struct Inner {
    state: State,
    channels: HashMap<ChannelId, ChannelRecord>,
    next_channel_id: u64,
    watch_timers: HashMap<WatcherKey, TimerHandle>,
    tracer: Box<dyn Tracer>,
    clock: Box<dyn Clock>,
    watch_timeout_default: Duration,
    watch_timeout_max: Duration,
}

/// Shared handle to the reactor, held by every open [`Channel`].
///
/// Single-threaded by design: the whole broker lives on one `mio` poll
/// thread, so `Rc<RefCell<_>>` replaces the source's GIL-backed method
/// calls with no locking of its own.
#[derive(Clone)]
pub struct ReactorHandle(Rc<RefCell<Inner>>);

impl ReactorHandle {
    pub fn new(tracer: Box<dyn Tracer>, clock: Box<dyn Clock>) -> Self {
        Self::with_timeouts(tracer, clock, WATCH_TIMEOUT_DEFAULT, WATCH_TIMEOUT_MAX)
    }

    pub fn with_timeouts(
        tracer: Box<dyn Tracer>,
        clock: Box<dyn Clock>,
        watch_timeout_default: Duration,
        watch_timeout_max: Duration,
    ) -> Self {
        ReactorHandle(Rc::new(RefCell::new(Inner {
            state: State::new(),
            channels: HashMap::new(),
            next_channel_id: 0,
            watch_timers: HashMap::new(),
            tracer,
            clock,
            watch_timeout_default,
            watch_timeout_max,
        })))
    }

    /// Opens a new channel and returns the handle a transport holds onto.
    pub fn channel(&self, description: Option<&str>) -> Channel {
        let id = {
            let mut inner = self.0.borrow_mut();
            let id = ChannelId(inner.next_channel_id);
            inner.next_channel_id += 1;
            let mut record = ChannelRecord::new();
            if let Some(d) = description {
                record.description = d.to_string();
            }
            inner.channels.insert(id, record);
            inner.tracer.channel_opened(id);
            id
        };
        Channel::new(id, self.clone())
    }

    pub(crate) fn put_upstream(&self, sender: ChannelId, verb: UpstreamVerb) -> Result<(), ReactorError> {
        if !self.0.borrow().channels.contains_key(&sender) {
            return Err(ReactorError::ClosedChannel);
        }
        if let Err(reason) = verb.validate() {
            self.0.borrow().tracer.invalid_upstream_verb(sender, &reason);
            return Ok(());
        }
        self.0.borrow().tracer.upstream_verb(sender, &verb);
        match verb {
            UpstreamVerb::Login(v) => self.process_login(sender, v),
            UpstreamVerb::Logout(v) => self.process_logout(sender, v),
            UpstreamVerb::Request(v) => self.process_request(sender, v),
            UpstreamVerb::Post(v) => self.process_post(sender, v),
            UpstreamVerb::Subscribe(v) => self.process_subscribe(sender, v),
            UpstreamVerb::Unsubscribe(v) => self.process_unsubscribe(sender, v),
        }
        Ok(())
    }

    pub(crate) fn pop_downstream(&self, id: ChannelId) -> Option<DownstreamVerb> {
        self.0
            .borrow_mut()
            .channels
            .get_mut(&id)
            .and_then(|r| r.downstream.pop_front())
    }

    pub(crate) fn set_downstream_handler(&self, id: ChannelId, handler: Box<dyn FnMut()>) {
        if let Some(record) = self.0.borrow_mut().channels.get_mut(&id) {
            record.handler = Some(handler);
        }
    }

    pub(crate) fn set_description(&self, id: ChannelId, description: String) {
        if let Some(record) = self.0.borrow_mut().channels.get_mut(&id) {
            record.description = description;
        }
    }

    pub(crate) fn close_channel(&self, id: ChannelId) {
        if !self.0.borrow().channels.contains_key(&id) {
            return;
        }
        self.teardown_channel(id);
    }

    // ---- downstream delivery --------------------------------------------

    /// Deposits `verb` on `id`'s queue and, if present, drains its handler.
    ///
    /// The handler is taken out of its slot before being invoked and put
    /// back only once it returns — a handler that itself calls back into the
    /// reactor (e.g. to pop the verb it was just notified about) would
    /// otherwise double-borrow `Inner` and panic.
    fn put_downstream(&self, id: ChannelId, verb: DownstreamVerb) {
        if let Err(reason) = verb.validate() {
            self.0.borrow().tracer.invalid_downstream_verb(id, &reason);
            panic!("reactor produced invalid downstream verb for {id}: {reason}");
        }
        {
            let mut inner = self.0.borrow_mut();
            inner.tracer.downstream_verb(id, &verb);
            match inner.channels.get_mut(&id) {
                Some(record) => record.downstream.push_back(verb),
                None => return,
            }
        }
        self.drain(id);
    }

    fn drain(&self, id: ChannelId) {
        loop {
            let mut handler = {
                let mut inner = self.0.borrow_mut();
                let Some(record) = inner.channels.get_mut(&id) else {
                    return;
                };
                if record.downstream.is_empty() {
                    return;
                }
                match record.handler.take() {
                    Some(h) => h,
                    None => return,
                }
            };
            handler();
            let mut inner = self.0.borrow_mut();
            if let Some(record) = inner.channels.get_mut(&id) {
                if record.handler.is_none() {
                    record.handler = Some(handler);
                }
            }
        }
    }

    /// Emits `SESSION(name, ACTIVE)` to the new owner, then one
    /// `INTEREST(.., INTEREST, topic)` per topic already subscribed on
    /// `name`, so a channel that just won ownership sees the same interest
    /// set a previously-active owner would have accumulated incrementally.
    fn activate_session(&self, channel: ChannelId, name: &Name) {
        self.put_downstream(
            channel,
            DownstreamVerb::Session(SessionVerb {
                name: name.clone(),
                state: SessionState::Active,
            }),
        );
        let topics = self.0.borrow().state.get_interest_on_name(name);
        for topic in topics {
            let postref = self
                .0
                .borrow()
                .state
                .get_interest_post(name, &topic)
                .expect("interest_on_name and interest_posts are kept in lockstep");
            self.put_downstream(
                channel,
                DownstreamVerb::Interest(InterestVerb {
                    postref,
                    name: name.clone(),
                    status: InterestStatus::Interest,
                    topic,
                }),
            );
        }
        self.0.borrow().tracer.session_activated(channel, name);
    }

    // ---- verb handlers ---------------------------------------------------

    fn process_login(&self, sender: ChannelId, verb: LoginVerb) {
        let name = verb.name;
        let current_owner = self.0.borrow().state.get_name_owner(&name);

        if current_owner.is_none() || current_owner == Some(sender) {
            self.0.borrow_mut().state.set_name_owner(&name, sender, verb.persist);
            self.activate_session(sender, &name);
            return;
        }
        let owner = current_owner.unwrap();
        let owner_persists = self
            .0
            .borrow()
            .state
            .get_name_persistence(&name)
            .unwrap_or(false);

        if verb.enforce && !owner_persists {
            self.0.borrow_mut().state.set_name_owner(&name, sender, verb.persist);
            self.put_downstream(
                owner,
                DownstreamVerb::Session(SessionVerb {
                    name: name.clone(),
                    state: SessionState::Ended,
                }),
            );
            self.activate_session(sender, &name);
            return;
        }

        if verb.standby {
            // A channel that logs in with `standby` twice for the same name
            // before logging out is harmless: keep the existing queue slot.
            let _ = self
                .0
                .borrow_mut()
                .state
                .add_name_owner_candidate(&name, sender, verb.persist);
            self.put_downstream(
                sender,
                DownstreamVerb::Session(SessionVerb {
                    name: name.clone(),
                    state: SessionState::Standby,
                }),
            );
            return;
        }

        self.put_downstream(
            sender,
            DownstreamVerb::Session(SessionVerb {
                name,
                state: SessionState::Ended,
            }),
        );
    }

    fn process_logout(&self, sender: ChannelId, verb: LogoutVerb) {
        let name = verb.name;
        self.put_downstream(
            sender,
            DownstreamVerb::Session(SessionVerb {
                name: name.clone(),
                state: SessionState::Ended,
            }),
        );

        let owner = self.0.borrow().state.get_name_owner(&name);
        if owner == Some(sender) {
            self.0
                .borrow_mut()
                .state
                .clear_name_owner(&name)
                .expect("sender was just confirmed as owner");
            self.promote_next_candidate(&name);
        } else {
            self.0.borrow().tracer.improper_logout(sender, &name);
        }
        self.0.borrow_mut().state.del_name_owner_candidate(&name, sender);
    }

    fn promote_next_candidate(&self, name: &Name) {
        let candidate = self.0.borrow_mut().state.pop_name_owner_candidate(name);
        if let Some(candidate) = candidate {
            self.0
                .borrow_mut()
                .state
                .set_name_owner(name, candidate.channel, candidate.persist);
            self.activate_session(candidate.channel, name);
        }
    }

    fn process_request(&self, sender: ChannelId, verb: RequestVerb) {
        let name = verb.name;
        let owner = self.0.borrow().state.get_name_owner(&name);

        match owner {
            None => {
                if !verb.unidirectional {
                    self.put_downstream(
                        sender,
                        DownstreamVerb::Message(MessageVerb {
                            messageref: verb.messageref,
                            status: MessageStatus::Nok,
                            reason: MessageReason::Unreachable,
                            payload: None,
                        }),
                    );
                }
            }
            Some(owner) if verb.unidirectional => {
                self.put_downstream(
                    owner,
                    DownstreamVerb::Call(CallVerb {
                        unidirectional: true,
                        postref: None,
                        name,
                        payload: verb.payload,
                    }),
                );
            }
            Some(owner) => {
                let post_id = {
                    let mut inner = self.0.borrow_mut();
                    let post_id = inner
                        .state
                        .new_post(
                            &name,
                            PostKind::Transient {
                                payload: verb.payload.clone(),
                            },
                        )
                        .expect("post id space exhaustion is not handled by any client recovery path")
                        .id;
                    inner.state.add_post_watcher(post_id, sender, verb.messageref);
                    post_id
                };

                let key = WatcherKey { postref: post_id, channel: sender };
                let timeout = {
                    let inner = self.0.borrow();
                    match verb.timeout {
                        Some(t) if t > 0.0 => Duration::from_secs_f64(t).min(inner.watch_timeout_max),
                        _ => inner.watch_timeout_default,
                    }
                };
                let reactor = self.clone();
                let handle = self
                    .0
                    .borrow_mut()
                    .clock
                    .arm(timeout, Box::new(move || reactor.timeout_fire(key)));
                self.0.borrow_mut().watch_timers.insert(key, handle);

                self.put_downstream(
                    owner,
                    DownstreamVerb::Call(CallVerb {
                        unidirectional: false,
                        postref: Some(post_id),
                        name,
                        payload: verb.payload,
                    }),
                );
            }
        }
    }

    fn process_post(&self, sender: ChannelId, verb: PostVerb) {
        let id = verb.postref;
        if !self.0.borrow().state.check_post(id) {
            self.0.borrow().tracer.unknown_postref(sender, id);
            return;
        }
        if self.0.borrow().state.get_post_owner(id) != Some(sender) {
            self.0.borrow().tracer.unowned_post(sender, id);
            return;
        }

        let watchers = self.0.borrow().state.get_post_watchers(id);
        for watcher in &watchers {
            self.cancel_watch_timer(WatcherKey { postref: id, channel: watcher.channel });
            self.put_downstream(
                watcher.channel,
                DownstreamVerb::Message(MessageVerb {
                    messageref: watcher.messageref,
                    status: MessageStatus::Ok,
                    reason: MessageReason::None,
                    payload: Some(verb.payload.clone()),
                }),
            );
        }

        if !self.0.borrow().state.is_post_persistent(id) {
            let mut inner = self.0.borrow_mut();
            for watcher in &watchers {
                inner.state.del_post_watcher(id, watcher.channel);
            }
            inner.state.discard_post(id);
        }
    }

    fn timeout_fire(&self, key: WatcherKey) {
        self.0.borrow_mut().watch_timers.remove(&key);

        let messageref = self
            .0
            .borrow()
            .state
            .get_post_watchers(key.postref)
            .into_iter()
            .find(|w| w.channel == key.channel)
            .map(|w| w.messageref);
        let Some(messageref) = messageref else {
            return;
        };

        self.0.borrow_mut().state.del_post_watcher(key.postref, key.channel);
        self.put_downstream(
            key.channel,
            DownstreamVerb::Message(MessageVerb {
                messageref,
                status: MessageStatus::Nok,
                reason: MessageReason::Timeout,
                payload: None,
            }),
        );

        if self.0.borrow().state.get_post_watcher_count(key.postref) == 0 {
            self.0.borrow_mut().state.discard_post(key.postref);
        }
    }

    fn cancel_watch_timer(&self, key: WatcherKey) {
        let handle = self.0.borrow_mut().watch_timers.remove(&key);
        if let Some(handle) = handle {
            self.0.borrow_mut().clock.cancel(handle);
        }
    }

    fn process_subscribe(&self, sender: ChannelId, verb: SubscribeVerb) {
        let name = verb.name;
        let topic = verb.topic;
        let level = self.0.borrow_mut().state.inc_interest_level(&name, &topic);

        let post_id = if level == 1 {
            let id = self
                .0
                .borrow_mut()
                .state
                .new_post(&name, PostKind::Persistent { topic: topic.clone() })
                .expect("post id space exhaustion is not handled by any client recovery path")
                .id;
            self.0.borrow_mut().state.set_interest_post(&name, &topic, id);

            if let Some(owner) = self.0.borrow().state.get_name_owner(&name) {
                self.put_downstream(
                    owner,
                    DownstreamVerb::Interest(InterestVerb {
                        postref: id,
                        name: name.clone(),
                        status: InterestStatus::Interest,
                        topic: topic.clone(),
                    }),
                );
            }
            id
        } else {
            self.0
                .borrow()
                .state
                .get_interest_post(&name, &topic)
                .expect("interest level positive implies a post was allocated for it")
        };

        self.0.borrow_mut().state.add_post_watcher(post_id, sender, verb.messageref);
        self.0.borrow_mut().state.add_channel_subscription(sender, name, topic);
    }

    fn process_unsubscribe(&self, sender: ChannelId, verb: UnsubscribeVerb) {
        let name = verb.name;
        let topic = verb.topic;

        let post_id = self.0.borrow().state.get_interest_post(&name, &topic);
        let is_watcher = post_id
            .map(|id| self.0.borrow().state.is_post_watcher(id, sender))
            .unwrap_or(false);
        if !is_watcher {
            self.0.borrow().tracer.unwatched_unsubscribe(sender, &name, &topic);
            return;
        }
        let post_id = post_id.unwrap();

        // The source leaves `sender` registered as a watcher of a post that
        // stays alive for other subscribers, which would keep delivering
        // POSTs to an unsubscribed channel; dropping the watcher entry here
        // regardless of the resulting interest level keeps unsubscribe an
        // exact inverse of subscribe for the unsubscribing channel.
        self.0.borrow_mut().state.del_post_watcher(post_id, sender);

        let level = self
            .0
            .borrow_mut()
            .state
            .dec_interest_level(&name, &topic)
            .expect("sender was just confirmed a watcher, so interest was positive");
        if level == 0 {
            self.0.borrow_mut().state.discard_post(post_id);
            if let Some(owner) = self.0.borrow().state.get_name_owner(&name) {
                self.put_downstream(
                    owner,
                    DownstreamVerb::Interest(InterestVerb {
                        postref: post_id,
                        name: name.clone(),
                        status: InterestStatus::NoInterest,
                        topic: topic.clone(),
                    }),
                );
            }
        }
        self.0.borrow_mut().state.del_channel_subscription(sender, &name, &topic);
    }

    // ---- teardown ---------------------------------------------------------

    fn teardown_channel(&self, id: ChannelId) {
        let names = self.0.borrow().state.get_name_references_from_channel(id);
        for name in names {
            self.put_downstream(
                id,
                DownstreamVerb::Session(SessionVerb {
                    name: name.clone(),
                    state: SessionState::Ended,
                }),
            );
            self.0.borrow_mut().state.del_name_owner_candidate(&name, id);

            let is_owner = self.0.borrow().state.get_name_owner(&name) == Some(id);
            if is_owner {
                self.0
                    .borrow_mut()
                    .state
                    .clear_name_owner(&name)
                    .expect("just confirmed id is the owner");
                self.promote_next_candidate(&name);
            }
        }

        let subscriptions = self.0.borrow().state.get_channel_subscriptions(id);
        for (name, topic) in subscriptions {
            if let Some(post_id) = self.0.borrow().state.get_interest_post(&name, &topic) {
                let level = self
                    .0
                    .borrow_mut()
                    .state
                    .dec_interest_level(&name, &topic)
                    .expect("a channel subscription implies positive interest");
                if level == 0 {
                    self.0.borrow_mut().state.del_post_watcher(post_id, id);
                    self.0.borrow_mut().state.discard_post(post_id);
                    if let Some(owner) = self.0.borrow().state.get_name_owner(&name) {
                        self.put_downstream(
                            owner,
                            DownstreamVerb::Interest(InterestVerb {
                                postref: post_id,
                                name: name.clone(),
                                status: InterestStatus::NoInterest,
                                topic: topic.clone(),
                            }),
                        );
                    }
                }
            }
            self.0.borrow_mut().state.del_channel_subscription(id, &name, &topic);
        }

        // Catches both the transient watchers `process_request` armed and
        // the persistent-post watchers `process_subscribe` added; a single
        // pass over the reverse index is simpler than re-deriving which
        // applies from the subscription loop above.
        let watches = self.0.borrow().state.get_post_watchers_from_channel(id);
        for watch in watches {
            self.0.borrow_mut().state.del_post_watcher(watch.postref, id);
            self.cancel_watch_timer(WatcherKey { postref: watch.postref, channel: id });
        }

        let mut inner = self.0.borrow_mut();
        inner.tracer.channel_closed(id);
        inner.channels.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{SharedClock, VirtualClock};
    use crate::tracer::RecordingTracer;
    use std::rc::Rc;

    struct Harness {
        reactor: ReactorHandle,
        clock: Rc<RefCell<VirtualClock>>,
        tracer: Rc<RecordingTracer>,
    }

    fn harness() -> Harness {
        let clock = Rc::new(RefCell::new(VirtualClock::new()));
        let tracer = Rc::new(RecordingTracer::default());
        let reactor = ReactorHandle::new(
            Box::new(tracer.clone()),
            Box::new(SharedClock(clock.clone())),
        );
        Harness { reactor, clock, tracer }
    }

    fn login(ch: &Channel, name: &[u8], enforce: bool, standby: bool, persist: bool) {
        ch.put_upstream(UpstreamVerb::Login(LoginVerb {
            name: name.to_vec(),
            enforce,
            standby,
            persist,
        }))
        .unwrap();
    }

    fn drain_all(ch: &Channel) -> Vec<DownstreamVerb> {
        let mut out = Vec::new();
        while let Some(v) = ch.pop_downstream() {
            out.push(v);
        }
        out
    }

    #[test_log::test]
    fn simple_login_activates_session() {
        let h = harness();
        let client = h.reactor.channel(Some("client"));
        login(&client, b"svc", false, false, false);

        let out = drain_all(&client);
        assert_eq!(out.len(), 1);
        assert!(matches!(
            &out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Active && v.name == b"svc"
        ));
        assert!(h.tracer.events.borrow().iter().any(|e| e.starts_with("session_activated")));
    }

    #[test]
    fn enforce_takeover_ends_prior_owner() {
        let h = harness();
        let a = h.reactor.channel(None);
        let b = h.reactor.channel(None);

        login(&a, b"svc", false, false, false);
        drain_all(&a);

        login(&b, b"svc", true, false, false);
        let a_out = drain_all(&a);
        let b_out = drain_all(&b);

        assert!(matches!(
            &a_out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Ended
        ));
        assert!(matches!(
            &b_out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Active
        ));
    }

    #[test]
    fn persistence_defeats_enforcement() {
        let h = harness();
        let a = h.reactor.channel(None);
        let b = h.reactor.channel(None);

        login(&a, b"svc", false, false, true);
        drain_all(&a);

        login(&b, b"svc", true, false, false);
        let b_out = drain_all(&b);
        assert!(matches!(
            &b_out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Ended
        ));
    }

    #[test]
    fn standby_promotes_on_logout() {
        let h = harness();
        let a = h.reactor.channel(None);
        let b = h.reactor.channel(None);

        login(&a, b"svc", false, false, false);
        drain_all(&a);
        login(&b, b"svc", false, true, false);
        let b_out = drain_all(&b);
        assert!(matches!(
            &b_out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Standby
        ));

        a.put_upstream(UpstreamVerb::Logout(LogoutVerb { name: b"svc".to_vec() }))
            .unwrap();
        let b_out = drain_all(&b);
        assert!(matches!(
            &b_out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Active
        ));
    }

    #[test]
    fn request_without_owner_is_unreachable() {
        let h = harness();
        let client = h.reactor.channel(None);
        client
            .put_upstream(UpstreamVerb::Request(RequestVerb {
                name: b"svc".to_vec(),
                unidirectional: false,
                messageref: 9,
                timeout: None,
                payload: vec![1, 2, 3],
            }))
            .unwrap();

        let out = drain_all(&client);
        assert!(matches!(
            &out[0],
            DownstreamVerb::Message(v) if v.status == MessageStatus::Nok
                && v.reason == MessageReason::Unreachable
                && v.messageref == 9
        ));
    }

    #[test]
    fn request_timeout_fires_nok() {
        let h = harness();
        let owner = h.reactor.channel(None);
        let client = h.reactor.channel(None);
        login(&owner, b"svc", false, false, false);
        drain_all(&owner);

        client
            .put_upstream(UpstreamVerb::Request(RequestVerb {
                name: b"svc".to_vec(),
                unidirectional: false,
                messageref: 5,
                timeout: Some(1.0),
                payload: vec![],
            }))
            .unwrap();
        drain_all(&owner); // the CALL verb, irrelevant here

        h.clock.borrow_mut().advance(Duration::from_secs(2));
        let out = drain_all(&client);
        assert!(matches!(
            &out[0],
            DownstreamVerb::Message(v) if v.status == MessageStatus::Nok
                && v.reason == MessageReason::Timeout
                && v.messageref == 5
        ));
    }

    #[test]
    fn post_reply_satisfies_watcher_before_timeout() {
        let h = harness();
        let owner = h.reactor.channel(None);
        let client = h.reactor.channel(None);
        login(&owner, b"svc", false, false, false);
        drain_all(&owner);

        client
            .put_upstream(UpstreamVerb::Request(RequestVerb {
                name: b"svc".to_vec(),
                unidirectional: false,
                messageref: 77,
                timeout: Some(5.0),
                payload: vec![9],
            }))
            .unwrap();
        let call = drain_all(&owner);
        let postref = match &call[0] {
            DownstreamVerb::Call(c) => c.postref.unwrap(),
            _ => panic!("expected a CALL verb"),
        };

        owner
            .put_upstream(UpstreamVerb::Post(PostVerb { postref, payload: vec![1, 2] }))
            .unwrap();
        let out = drain_all(&client);
        assert!(matches!(
            &out[0],
            DownstreamVerb::Message(v) if v.status == MessageStatus::Ok && v.payload == Some(vec![1, 2])
        ));

        // the timer was cancelled, so advancing the clock fires nothing more
        h.clock.borrow_mut().advance(Duration::from_secs(10));
        assert!(client.pop_downstream().is_none());
    }

    #[test]
    fn subscribe_fan_out_and_unsubscribe_roundtrip() {
        let h = harness();
        let owner = h.reactor.channel(None);
        let sub = h.reactor.channel(None);
        login(&owner, b"svc", false, false, false);
        drain_all(&owner);

        sub.put_upstream(UpstreamVerb::Subscribe(SubscribeVerb {
            name: b"svc".to_vec(),
            messageref: 1,
            topic: b"ticks".to_vec(),
        }))
        .unwrap();
        let owner_out = drain_all(&owner);
        assert!(matches!(
            &owner_out[0],
            DownstreamVerb::Interest(v) if v.status == InterestStatus::Interest
        ));

        owner
            .put_upstream(UpstreamVerb::Post(PostVerb {
                postref: match &owner_out[0] {
                    DownstreamVerb::Interest(v) => v.postref,
                    _ => unreachable!(),
                },
                payload: vec![42],
            }))
            .unwrap();
        let sub_out = drain_all(&sub);
        assert!(matches!(
            &sub_out[0],
            DownstreamVerb::Message(v) if v.payload == Some(vec![42])
        ));

        sub.put_upstream(UpstreamVerb::Unsubscribe(UnsubscribeVerb {
            name: b"svc".to_vec(),
            topic: b"ticks".to_vec(),
        }))
        .unwrap();
        let owner_out = drain_all(&owner);
        assert!(matches!(
            &owner_out[0],
            DownstreamVerb::Interest(v) if v.status == InterestStatus::NoInterest
        ));
    }

    #[test]
    fn close_channel_ends_sessions_and_cancels_timers() {
        let h = harness();
        let owner = h.reactor.channel(None);
        let client = h.reactor.channel(None);
        login(&owner, b"svc", false, false, false);
        drain_all(&owner);

        client
            .put_upstream(UpstreamVerb::Request(RequestVerb {
                name: b"svc".to_vec(),
                unidirectional: false,
                messageref: 1,
                timeout: Some(5.0),
                payload: vec![],
            }))
            .unwrap();
        drain_all(&owner);
        assert_eq!(h.clock.borrow().pending_count(), 1);

        // closing the requester cancels its own pending watch timer
        client.close();
        assert_eq!(h.clock.borrow().pending_count(), 0);
        h.clock.borrow_mut().advance(Duration::from_secs(100));

        // closing the owner ends its session; no standby candidate exists
        // so the name simply becomes unowned
        owner.close();
        let another = h.reactor.channel(None);
        login(&another, b"svc", false, false, false);
        let out = drain_all(&another);
        assert!(matches!(
            &out[0],
            DownstreamVerb::Session(v) if v.state == SessionState::Active
        ));
    }
}
