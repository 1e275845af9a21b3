use std::time::Duration;

use client::StaticBoxFuture;

mod lock;
mod memory;

pub use self::lock::DistributedLock;
pub use self::memory::InMemoryStore;

/// An ephemeral token; when it expires, every lock held under it is released
/// and every key written under it is deleted.
pub type SessionId = String;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Expired,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockStatus {
    Acquired,
    HeldByOther,
}

/// Notification that something under a watched path changed.
#[derive(Clone, Debug, PartialEq)]
pub struct WatchEvent {
    pub path: String,
    pub index: u64,
}

pub type StoreFuture<T> = StaticBoxFuture<T>;

/// The contract consumer-group coordination places on an external
/// strongly-consistent key/value service (ZooKeeper, Consul, ...).
///
/// Every mutation advances a store-wide modification index; reads report the
/// index they observed so a `watch` can be anchored to it without a race.
pub trait CoordinationStore: 'static {
    fn session_create(&self, ttl: Duration) -> StoreFuture<SessionId>;

    fn session_renew(&self, session_id: &SessionId) -> StoreFuture<SessionStatus>;

    fn lock_acquire(&self, path: &str, session_id: &SessionId) -> StoreFuture<LockStatus>;

    fn lock_release(&self, path: &str, session_id: &SessionId) -> StoreFuture<()>;

    /// Writes a key; a key written with a session is ephemeral and vanishes
    /// when the session expires.
    fn kv_put(&self, path: &str, value: Vec<u8>, session_id: Option<&SessionId>) -> StoreFuture<()>;

    /// Reads a key together with its last modification index.
    fn kv_get(&self, path: &str) -> StoreFuture<Option<(Vec<u8>, u64)>>;

    /// Enumerates keys under a prefix together with the index the listing
    /// observed.
    fn kv_list(&self, prefix: &str) -> StoreFuture<(u64, Vec<(String, Vec<u8>)>)>;

    fn kv_delete(&self, path: &str) -> StoreFuture<()>;

    /// Long poll: resolves once anything under `path` changes past
    /// `from_index`; resolves immediately when such a change already
    /// happened.
    fn watch(&self, path: &str, from_index: u64) -> StoreFuture<WatchEvent>;
}
