//! Pure in-memory data store for the reactor.
//!
//! Every operation here is synchronous and side-effect-free beyond mutating
//! `self`. Precondition violations return a [`StateError`] rather than
//! silently doing the wrong thing; the reactor treats any such error as a
//! bug in its own driving logic (see `SPEC_FULL.md` §7).

use std::collections::{HashMap, HashSet, VecDeque};

use crate::channel::ChannelId;
use crate::error::StateError;
use crate::verb::{Name, PostId, Topic};

/// A channel waiting to become owner of a name, either as the current owner
/// or as a queued standby candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameCandidate {
    pub channel: ChannelId,
    pub persist: bool,
}

/// The kind-specific payload of a [`Post`].
///
/// The source's `new_post(name, payload, persist=False)` overloads the same
/// positional argument for a request payload and a subscription topic;
/// `SPEC_FULL.md` §9 resolves that ambiguity by splitting the two into a
/// proper enum.
#[derive(Debug, Clone)]
pub enum PostKind {
    /// Allocated by a non-unidirectional `REQUEST`; discarded once every
    /// watcher has been satisfied or has timed out.
    Transient { payload: Vec<u8> },
    /// Allocated by the first `SUBSCRIBE` to a `(name, topic)`; lives until
    /// interest in that topic returns to zero.
    Persistent { topic: Topic },
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: PostId,
    pub name: Name,
    pub kind: PostKind,
}

impl Post {
    pub fn is_persistent(&self) -> bool {
        matches!(self.kind, PostKind::Persistent { .. })
    }
}

/// A (post, channel, messageref) record: a channel awaiting a reply on a
/// post. At most one watcher per (post, channel) pair exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PostWatcher {
    pub postref: PostId,
    pub channel: ChannelId,
    pub messageref: u32,
}

#[derive(Default)]
struct NameEntry {
    owner: Option<NameCandidate>,
    candidates: VecDeque<NameCandidate>,
    candidate_set: HashSet<ChannelId>,
}

/// Pure data store: names, candidates, posts, watchers, interest counters,
/// and every per-channel reverse index the reactor needs for O(1) cleanup.
pub struct State {
    names: HashMap<Name, NameEntry>,
    /// Reverse index: every name a channel is owner or candidate of.
    name_refs_from_channel: HashMap<ChannelId, HashSet<Name>>,

    next_post_id: u64,
    posts: HashMap<PostId, Post>,
    /// `post_id -> (channel -> watcher)`, mirroring the source's nested dict
    /// so that `get_post_watcher_count` stays O(1).
    post_watchers: HashMap<PostId, HashMap<ChannelId, PostWatcher>>,
    post_watchers_from_channel: HashMap<ChannelId, HashSet<PostWatcher>>,

    interest_counter: HashMap<(Name, Topic), u32>,
    interest_posts: HashMap<(Name, Topic), PostId>,
    interest_on_name: HashMap<Name, HashSet<Topic>>,
    channel_subscriptions: HashMap<ChannelId, HashSet<(Name, Topic)>>,
}

impl State {
    pub fn new() -> Self {
        State {
            names: HashMap::new(),
            name_refs_from_channel: HashMap::new(),
            next_post_id: 1,
            posts: HashMap::new(),
            post_watchers: HashMap::new(),
            post_watchers_from_channel: HashMap::new(),
            interest_counter: HashMap::new(),
            interest_posts: HashMap::new(),
            interest_on_name: HashMap::new(),
            channel_subscriptions: HashMap::new(),
        }
    }

    // ---- names -----------------------------------------------------

    pub fn is_name_owned(&self, name: &[u8]) -> bool {
        self.names.get(name).and_then(|e| e.owner).is_some()
    }

    pub fn get_name_owner(&self, name: &[u8]) -> Option<ChannelId> {
        self.names.get(name).and_then(|e| e.owner).map(|c| c.channel)
    }

    pub fn get_name_persistence(&self, name: &[u8]) -> Option<bool> {
        self.names.get(name).and_then(|e| e.owner).map(|c| c.persist)
    }

    /// Installs `channel` as owner of `name`, returning the previous owner
    /// (if any).
    pub fn set_name_owner(
        &mut self,
        name: &Name,
        channel: ChannelId,
        persist: bool,
    ) -> Option<ChannelId> {
        let entry = self.names.entry(name.clone()).or_default();
        let prev = entry.owner.replace(NameCandidate { channel, persist });

        self.name_refs_from_channel
            .entry(channel)
            .or_default()
            .insert(name.clone());

        if let Some(prev) = prev {
            if prev.channel != channel {
                if let Some(refs) = self.name_refs_from_channel.get_mut(&prev.channel) {
                    refs.remove(name);
                }
            }
        }

        prev.map(|c| c.channel)
    }

    /// Precondition: `name` has an owner.
    pub fn clear_name_owner(&mut self, name: &[u8]) -> Result<(), StateError> {
        let entry = self
            .names
            .get_mut(name)
            .ok_or_else(|| StateError::NameNotOwned(name.to_vec()))?;
        let prev = entry
            .owner
            .take()
            .ok_or_else(|| StateError::NameNotOwned(name.to_vec()))?;
        if let Some(refs) = self.name_refs_from_channel.get_mut(&prev.channel) {
            refs.remove(name);
        }
        Ok(())
    }

    /// Precondition: `name` currently owned; fails if `channel` is already a
    /// candidate of `name`.
    pub fn add_name_owner_candidate(
        &mut self,
        name: &Name,
        channel: ChannelId,
        persist: bool,
    ) -> Result<(), StateError> {
        let entry = self.names.entry(name.clone()).or_default();
        if !entry.candidate_set.insert(channel) {
            return Err(StateError::DuplicateCandidate(name.clone()));
        }
        entry.candidates.push_back(NameCandidate { channel, persist });

        self.name_refs_from_channel
            .entry(channel)
            .or_default()
            .insert(name.clone());
        Ok(())
    }

    /// Removes every candidate entry of `channel` from `name`'s queue.
    /// No-op if `channel` is not a candidate.
    pub fn del_name_owner_candidate(&mut self, name: &[u8], channel: ChannelId) {
        let Some(entry) = self.names.get_mut(name) else {
            return;
        };
        if !entry.candidate_set.remove(&channel) {
            return;
        }
        entry.candidates.retain(|c| c.channel != channel);

        if let Some(refs) = self.name_refs_from_channel.get_mut(&channel) {
            refs.remove(name);
        }
    }

    /// Pops the head candidate for `name`, if any.
    pub fn pop_name_owner_candidate(&mut self, name: &[u8]) -> Option<NameCandidate> {
        let entry = self.names.get_mut(name)?;
        let candidate = entry.candidates.pop_front()?;
        entry.candidate_set.remove(&candidate.channel);

        if let Some(refs) = self.name_refs_from_channel.get_mut(&candidate.channel) {
            refs.remove(name);
        }
        Some(candidate)
    }

    pub fn get_name_references_from_channel(&self, channel: ChannelId) -> HashSet<Name> {
        self.name_refs_from_channel
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    // ---- posts -------------------------------------------------------

    pub fn new_post(&mut self, name: &Name, kind: PostKind) -> Result<&Post, StateError> {
        if self.next_post_id > u32::MAX as u64 {
            return Err(StateError::PostIdSpaceExhausted(self.next_post_id));
        }
        let id = self.next_post_id as u32;
        self.next_post_id += 1;

        let post = Post {
            id,
            name: name.clone(),
            kind,
        };
        self.post_watchers.insert(id, HashMap::new());
        self.posts.insert(id, post);
        Ok(self.posts.get(&id).expect("just inserted"))
    }

    pub fn check_post(&self, id: PostId) -> bool {
        self.posts.contains_key(&id)
    }

    pub fn get_post(&self, id: PostId) -> Option<&Post> {
        self.posts.get(&id)
    }

    /// Returns the current owner of the post's name, if any.
    pub fn get_post_owner(&self, id: PostId) -> Option<ChannelId> {
        let post = self.posts.get(&id)?;
        self.get_name_owner(&post.name)
    }

    pub fn is_post_persistent(&self, id: PostId) -> bool {
        self.posts.get(&id).map(|p| p.is_persistent()).unwrap_or(false)
    }

    /// Removes the post and all of its watcher entries' primary index.
    /// Reverse-index cleanup of `post_watchers_from_channel` is the caller's
    /// responsibility via `del_post_watcher`, matching the source.
    pub fn discard_post(&mut self, id: PostId) {
        self.posts.remove(&id);
        self.post_watchers.remove(&id);
    }

    /// Idempotent on `(id, channel)`: re-adding updates the messageref.
    pub fn add_post_watcher(
        &mut self,
        id: PostId,
        channel: ChannelId,
        messageref: u32,
    ) -> PostWatcher {
        let watchers = self.post_watchers.entry(id).or_default();
        if let Some(existing) = watchers.get_mut(&channel) {
            if let Some(set) = self.post_watchers_from_channel.get_mut(&channel) {
                set.remove(existing);
            }
            existing.messageref = messageref;
            let updated = *existing;
            self.post_watchers_from_channel
                .entry(channel)
                .or_default()
                .insert(updated);
            return updated;
        }
        let watcher = PostWatcher {
            postref: id,
            channel,
            messageref,
        };
        watchers.insert(channel, watcher);
        self.post_watchers_from_channel
            .entry(channel)
            .or_default()
            .insert(watcher);
        watcher
    }

    pub fn del_post_watcher(&mut self, id: PostId, channel: ChannelId) {
        if let Some(watchers) = self.post_watchers.get_mut(&id) {
            if let Some(watcher) = watchers.remove(&channel) {
                if let Some(set) = self.post_watchers_from_channel.get_mut(&channel) {
                    set.remove(&watcher);
                    if set.is_empty() {
                        self.post_watchers_from_channel.remove(&channel);
                    }
                }
            }
        }
    }

    pub fn get_post_watchers(&self, id: PostId) -> Vec<PostWatcher> {
        self.post_watchers
            .get(&id)
            .map(|w| w.values().copied().collect())
            .unwrap_or_default()
    }

    pub fn get_post_watcher_count(&self, id: PostId) -> usize {
        self.post_watchers.get(&id).map(|w| w.len()).unwrap_or(0)
    }

    pub fn is_post_watcher(&self, id: PostId, channel: ChannelId) -> bool {
        self.post_watchers
            .get(&id)
            .map(|w| w.contains_key(&channel))
            .unwrap_or(false)
    }

    pub fn get_post_watchers_from_channel(&self, channel: ChannelId) -> HashSet<PostWatcher> {
        self.post_watchers_from_channel
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    // ---- interest ------------------------------------------------------

    pub fn get_interest_level(&self, name: &[u8], topic: &[u8]) -> u32 {
        self.interest_counter
            .get(&(name.to_vec(), topic.to_vec()))
            .copied()
            .unwrap_or(0)
    }

    pub fn inc_interest_level(&mut self, name: &Name, topic: &Topic) -> u32 {
        let key = (name.clone(), topic.clone());
        let level = self.interest_counter.entry(key).or_insert(0);
        *level += 1;
        let new_level = *level;
        if new_level == 1 {
            self.interest_on_name
                .entry(name.clone())
                .or_default()
                .insert(topic.clone());
        }
        new_level
    }

    pub fn dec_interest_level(&mut self, name: &Name, topic: &Topic) -> Result<u32, StateError> {
        let key = (name.clone(), topic.clone());
        let level = self
            .interest_counter
            .get_mut(&key)
            .filter(|l| **l > 0)
            .ok_or_else(|| StateError::InterestUnderflow(name.clone(), topic.clone()))?;
        *level -= 1;
        let new_level = *level;

        if new_level == 0 {
            self.interest_counter.remove(&key);
            self.interest_posts.remove(&key);
            if let Some(topics) = self.interest_on_name.get_mut(name) {
                topics.remove(topic);
                if topics.is_empty() {
                    self.interest_on_name.remove(name);
                }
            }
        }
        Ok(new_level)
    }

    pub fn set_interest_post(&mut self, name: &Name, topic: &Topic, id: PostId) {
        self.interest_posts.insert((name.clone(), topic.clone()), id);
    }

    pub fn get_interest_post(&self, name: &[u8], topic: &[u8]) -> Option<PostId> {
        self.interest_posts
            .get(&(name.to_vec(), topic.to_vec()))
            .copied()
    }

    pub fn get_interest_on_name(&self, name: &[u8]) -> HashSet<Topic> {
        self.interest_on_name.get(name).cloned().unwrap_or_default()
    }

    // ---- channel subscriptions ------------------------------------------

    pub fn add_channel_subscription(&mut self, channel: ChannelId, name: Name, topic: Topic) {
        self.channel_subscriptions
            .entry(channel)
            .or_default()
            .insert((name, topic));
    }

    pub fn del_channel_subscription(&mut self, channel: ChannelId, name: &[u8], topic: &[u8]) {
        if let Some(subs) = self.channel_subscriptions.get_mut(&channel) {
            subs.remove(&(name.to_vec(), topic.to_vec()));
            if subs.is_empty() {
                self.channel_subscriptions.remove(&channel);
            }
        }
    }

    pub fn get_channel_subscriptions(&self, channel: ChannelId) -> HashSet<(Name, Topic)> {
        self.channel_subscriptions
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for NameEntry {
    fn default() -> Self {
        NameEntry {
            owner: None,
            candidates: VecDeque::new(),
            candidate_set: HashSet::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u64) -> ChannelId {
        ChannelId(n)
    }

    #[test]
    fn owner_lifecycle() {
        let mut state = State::new();
        assert!(!state.is_name_owned(b"n"));

        assert_eq!(state.set_name_owner(&b"n".to_vec(), cid(1), false), None);
        assert!(state.is_name_owned(b"n"));
        assert_eq!(state.get_name_owner(b"n"), Some(cid(1)));
        assert!(state
            .get_name_references_from_channel(cid(1))
            .contains(&b"n".to_vec()));

        state.clear_name_owner(b"n").unwrap();
        assert!(!state.is_name_owned(b"n"));
        assert!(state.get_name_references_from_channel(cid(1)).is_empty());
    }

    #[test]
    fn candidate_queue_rejects_duplicates() {
        let mut state = State::new();
        state.set_name_owner(&b"n".to_vec(), cid(1), false);
        state
            .add_name_owner_candidate(&b"n".to_vec(), cid(2), false)
            .unwrap();
        assert!(state
            .add_name_owner_candidate(&b"n".to_vec(), cid(2), false)
            .is_err());

        let popped = state.pop_name_owner_candidate(b"n").unwrap();
        assert_eq!(popped.channel, cid(2));
        assert!(state.pop_name_owner_candidate(b"n").is_none());
    }

    #[test]
    fn interest_level_roundtrip() {
        let mut state = State::new();
        let name = b"n".to_vec();
        let topic = b"t".to_vec();

        assert_eq!(state.inc_interest_level(&name, &topic), 1);
        assert!(state.get_interest_on_name(&name).contains(&topic));

        state.set_interest_post(&name, &topic, 7);
        assert_eq!(state.get_interest_post(&name, &topic), Some(7));

        assert_eq!(state.inc_interest_level(&name, &topic), 2);
        assert_eq!(state.dec_interest_level(&name, &topic).unwrap(), 1);
        assert_eq!(state.get_interest_post(&name, &topic), Some(7));

        assert_eq!(state.dec_interest_level(&name, &topic).unwrap(), 0);
        assert!(state.get_interest_on_name(&name).is_empty());
        assert_eq!(state.get_interest_post(&name, &topic), None);
    }

    #[test]
    fn dec_interest_below_zero_fails() {
        let mut state = State::new();
        let name = b"n".to_vec();
        let topic = b"t".to_vec();
        assert!(state.dec_interest_level(&name, &topic).is_err());
    }

    #[test]
    fn post_watcher_readd_updates_messageref() {
        let mut state = State::new();
        let name = b"n".to_vec();
        let post = state
            .new_post(&name, PostKind::Transient { payload: vec![] })
            .unwrap()
            .id;

        state.add_post_watcher(post, cid(1), 42);
        assert_eq!(state.get_post_watcher_count(post), 1);

        state.add_post_watcher(post, cid(1), 43);
        assert_eq!(state.get_post_watcher_count(post), 1);
        let watchers = state.get_post_watchers(post);
        assert_eq!(watchers[0].messageref, 43);
    }

    #[test]
    fn post_ids_are_monotonic() {
        let mut state = State::new();
        let name = b"n".to_vec();
        let a = state
            .new_post(&name, PostKind::Transient { payload: vec![] })
            .unwrap()
            .id;
        let b = state
            .new_post(&name, PostKind::Transient { payload: vec![] })
            .unwrap()
            .id;
        assert!(b > a);
    }
}
