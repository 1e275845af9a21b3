use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::Future;
use futures::unsync::oneshot;

use errors::{Error, ErrorKind};
use coordination::{CoordinationStore, LockStatus, SessionId, SessionStatus, StoreFuture,
                   WatchEvent};

/// A single-process coordination store.
///
/// Backs tests, demos and single-process deployments; the semantics mirror
/// what the trait demands from a real store: a store-wide modification index,
/// ephemeral keys bound to sessions, and locks that outlive nothing but their
/// session.
pub struct InMemoryStore {
    state: Rc<RefCell<State>>,
}

#[derive(Default)]
struct State {
    index: u64,
    next_session: u32,
    entries: HashMap<String, Entry>,
    /// Last modification index per path, kept across deletes so a stale
    /// `watch` fires immediately.
    touched: HashMap<String, u64>,
    locks: HashMap<String, SessionId>,
    sessions: HashMap<SessionId, Session>,
    watchers: Vec<Watcher>,
}

struct Entry {
    value: Vec<u8>,
    index: u64,
    session_id: Option<SessionId>,
}

struct Session {
    ttl: Duration,
    deadline: Instant,
}

struct Watcher {
    prefix: String,
    from_index: u64,
    sender: oneshot::Sender<WatchEvent>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        InMemoryStore::new()
    }
}

impl Clone for InMemoryStore {
    fn clone(&self) -> Self {
        InMemoryStore { state: self.state.clone() }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore { state: Rc::new(RefCell::new(State::default())) }
    }

    /// Forces a session to expire, releasing its locks and ephemeral keys.
    pub fn expire_session(&self, session_id: &SessionId) {
        self.state.borrow_mut().expire(session_id);
    }
}

impl State {
    fn bump(&mut self, path: &str) -> u64 {
        self.index += 1;

        let index = self.index;

        self.touched.insert(path.to_owned(), index);

        let (fired, remaining) = self.watchers
            .drain(..)
            .partition::<Vec<_>, _>(|watcher| {
                path.starts_with(watcher.prefix.as_str()) && index > watcher.from_index
            });

        self.watchers = remaining;

        for watcher in fired {
            let _ = watcher
                .sender
                .send(WatchEvent {
                          path: path.to_owned(),
                          index: index,
                      });
        }

        index
    }

    fn reap_expired_sessions(&mut self) {
        let now = Instant::now();
        let expired: Vec<SessionId> = self.sessions
            .iter()
            .filter(|&(_, session)| session.deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();

        for session_id in expired {
            debug!("session `{}` expired", session_id);

            self.expire(&session_id);
        }
    }

    fn expire(&mut self, session_id: &SessionId) {
        self.sessions.remove(session_id);

        let released: Vec<String> = self.locks
            .iter()
            .filter(|&(_, owner)| owner == session_id)
            .map(|(path, _)| path.clone())
            .collect();

        for path in released {
            self.locks.remove(&path);
            self.bump(&path);
        }

        let orphaned: Vec<String> = self.entries
            .iter()
            .filter(|&(_, entry)| entry.session_id.as_ref() == Some(session_id))
            .map(|(path, _)| path.clone())
            .collect();

        for path in orphaned {
            self.entries.remove(&path);
            self.bump(&path);
        }
    }

    fn check_session(&self, session_id: &SessionId) -> Result<(), Error> {
        if self.sessions.contains_key(session_id) {
            Ok(())
        } else {
            Err(ErrorKind::CoordinationError(format!("unknown session `{}`", session_id)).into())
        }
    }
}

impl CoordinationStore for InMemoryStore {
    fn session_create(&self, ttl: Duration) -> StoreFuture<SessionId> {
        let mut state = self.state.borrow_mut();

        state.next_session += 1;

        let session_id = format!("session-{}", state.next_session);

        state
            .sessions
            .insert(session_id.clone(),
                    Session {
                        ttl: ttl,
                        deadline: Instant::now() + ttl,
                    });

        StoreFuture::ok(session_id)
    }

    fn session_renew(&self, session_id: &SessionId) -> StoreFuture<SessionStatus> {
        let mut state = self.state.borrow_mut();

        let renewed = match state.sessions.get_mut(session_id) {
            Some(session) if session.deadline > Instant::now() => {
                session.deadline = Instant::now() + session.ttl;
                true
            }
            _ => false,
        };

        if renewed {
            StoreFuture::ok(SessionStatus::Active)
        } else {
            state.expire(session_id);

            StoreFuture::ok(SessionStatus::Expired)
        }
    }

    fn lock_acquire(&self, path: &str, session_id: &SessionId) -> StoreFuture<LockStatus> {
        let mut state = self.state.borrow_mut();

        state.reap_expired_sessions();

        if let Err(err) = state.check_session(session_id) {
            return StoreFuture::err(err);
        }

        match state.locks.get(path).cloned() {
            Some(ref owner) if owner == session_id => StoreFuture::ok(LockStatus::Acquired),
            Some(_) => StoreFuture::ok(LockStatus::HeldByOther),
            None => {
                state.locks.insert(path.to_owned(), session_id.clone());
                state.bump(path);

                StoreFuture::ok(LockStatus::Acquired)
            }
        }
    }

    fn lock_release(&self, path: &str, session_id: &SessionId) -> StoreFuture<()> {
        let mut state = self.state.borrow_mut();

        let held = state.locks.get(path) == Some(session_id);

        if held {
            state.locks.remove(path);
            state.bump(path);
        }

        StoreFuture::ok(())
    }

    fn kv_put(&self, path: &str, value: Vec<u8>, session_id: Option<&SessionId>) -> StoreFuture<()> {
        let mut state = self.state.borrow_mut();

        state.reap_expired_sessions();

        if let Some(session_id) = session_id {
            if let Err(err) = state.check_session(session_id) {
                return StoreFuture::err(err);
            }
        }

        let index = state.bump(path);

        state
            .entries
            .insert(path.to_owned(),
                    Entry {
                        value: value,
                        index: index,
                        session_id: session_id.cloned(),
                    });

        StoreFuture::ok(())
    }

    fn kv_get(&self, path: &str) -> StoreFuture<Option<(Vec<u8>, u64)>> {
        let mut state = self.state.borrow_mut();

        state.reap_expired_sessions();

        StoreFuture::ok(state
                            .entries
                            .get(path)
                            .map(|entry| (entry.value.clone(), entry.index)))
    }

    fn kv_list(&self, prefix: &str) -> StoreFuture<(u64, Vec<(String, Vec<u8>)>)> {
        let mut state = self.state.borrow_mut();

        state.reap_expired_sessions();

        let mut entries: Vec<(String, Vec<u8>)> = state
            .entries
            .iter()
            .filter(|&(path, _)| path.starts_with(prefix))
            .map(|(path, entry)| (path.clone(), entry.value.clone()))
            .collect();

        entries.sort();

        StoreFuture::ok((state.index, entries))
    }

    fn kv_delete(&self, path: &str) -> StoreFuture<()> {
        let mut state = self.state.borrow_mut();

        if state.entries.remove(path).is_some() {
            state.bump(path);
        }

        StoreFuture::ok(())
    }

    fn watch(&self, path: &str, from_index: u64) -> StoreFuture<WatchEvent> {
        let mut state = self.state.borrow_mut();

        // something already changed past the caller's snapshot
        if let Some(&index) = state
               .touched
               .iter()
               .filter(|&(touched, _)| touched.starts_with(path))
               .map(|(_, index)| index)
               .max() {
            if index > from_index {
                return StoreFuture::ok(WatchEvent {
                                           path: path.to_owned(),
                                           index: index,
                                       });
            }
        }

        let (sender, receiver) = oneshot::channel();

        state
            .watchers
            .push(Watcher {
                      prefix: path.to_owned(),
                      from_index: from_index,
                      sender: sender,
                  });

        StoreFuture::new(receiver.map_err(|_| {
            Error::from(ErrorKind::CoordinationError("watch canceled".to_owned()))
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(store: &InMemoryStore) -> SessionId {
        store
            .session_create(Duration::from_secs(60))
            .wait()
            .unwrap()
    }

    #[test]
    fn test_kv_roundtrip() {
        let store = InMemoryStore::new();

        assert_eq!(store.kv_get("groups/we/leader").wait().unwrap(), None);

        store
            .kv_put("groups/we/leader", b"m1".to_vec(), None)
            .wait()
            .unwrap();

        let (value, index) = store.kv_get("groups/we/leader").wait().unwrap().unwrap();

        assert_eq!(value, b"m1".to_vec());
        assert!(index > 0);

        store.kv_delete("groups/we/leader").wait().unwrap();

        assert_eq!(store.kv_get("groups/we/leader").wait().unwrap(), None);
    }

    #[test]
    fn test_kv_list_is_sorted_under_prefix() {
        let store = InMemoryStore::new();

        store
            .kv_put("groups/we/members/m3", b"m3".to_vec(), None)
            .wait()
            .unwrap();
        store
            .kv_put("groups/we/members/m1", b"m1".to_vec(), None)
            .wait()
            .unwrap();
        store
            .kv_put("groups/other/members/m2", b"m2".to_vec(), None)
            .wait()
            .unwrap();

        let (index, members) = store.kv_list("groups/we/members/").wait().unwrap();

        assert!(index > 0);
        assert_eq!(members,
                   vec![("groups/we/members/m1".to_owned(), b"m1".to_vec()),
                        ("groups/we/members/m3".to_owned(), b"m3".to_vec())]);
    }

    #[test]
    fn test_session_expiry_deletes_ephemeral_keys() {
        let store = InMemoryStore::new();
        let session_id = session(&store);

        store
            .kv_put("groups/we/members/m1", b"m1".to_vec(), Some(&session_id))
            .wait()
            .unwrap();
        store
            .kv_put("groups/we/assignments/m1", b"0".to_vec(), None)
            .wait()
            .unwrap();

        store.expire_session(&session_id);

        assert_eq!(store.kv_get("groups/we/members/m1").wait().unwrap(), None);
        // non-ephemeral keys survive
        assert!(store
                    .kv_get("groups/we/assignments/m1")
                    .wait()
                    .unwrap()
                    .is_some());
    }

    #[test]
    fn test_session_renew() {
        let store = InMemoryStore::new();
        let session_id = session(&store);

        assert_eq!(store.session_renew(&session_id).wait().unwrap(),
                   SessionStatus::Active);

        store.expire_session(&session_id);

        assert_eq!(store.session_renew(&session_id).wait().unwrap(),
                   SessionStatus::Expired);
    }

    #[test]
    fn test_watch_fires_on_mutation_under_prefix() {
        let store = InMemoryStore::new();

        let (index, _) = store.kv_list("groups/we/members/").wait().unwrap();

        let watch = store.watch("groups/we/members/", index);

        store
            .kv_put("groups/we/members/m2", b"m2".to_vec(), None)
            .wait()
            .unwrap();

        let event = watch.wait().unwrap();

        assert_eq!(event.path, "groups/we/members/m2");
        assert!(event.index > index);
    }

    #[test]
    fn test_watch_fires_immediately_for_stale_index() {
        let store = InMemoryStore::new();

        store
            .kv_put("groups/we/members/m1", b"m1".to_vec(), None)
            .wait()
            .unwrap();

        let event = store.watch("groups/we/members/", 0).wait().unwrap();

        assert!(event.index > 0);
    }
}
