use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use errors::{Error, ErrorKind};
use protocol::PartitionId;

/// Coordination-store session TTL; the session is renewed at half this.
pub const DEFAULT_SESSION_TIMEOUT_MILLIS: u64 = 10_000;

pub const DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS: u64 = 5_000;

/// Broker-side long-poll bound per fetch.
pub const DEFAULT_FETCH_MAX_WAIT_MILLIS: u64 = 500;

pub const DEFAULT_FETCH_MIN_BYTES: i32 = 1;

/// Per-partition fetch size cap.
pub const DEFAULT_FETCH_MAX_BYTES: i32 = 1024 * 1024;

/// Back-off before redelivering after the handler asked to pause.
pub const DEFAULT_PAUSE_MILLIS: u64 = 1_000;

/// A partition worker pushes a commit after this many acknowledged messages,
/// ahead of the periodic committer.
pub const DEFAULT_COMMIT_MESSAGE_INTERVAL: usize = 100;

pub const DEFAULT_STORE_PREFIX: &str = "kafka-groups";

/// Where to resume when a partition has no committed offset, or the
/// committed one fell off the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OffsetReset {
    Earliest,
    Latest,
}

impl Default for OffsetReset {
    fn default() -> Self {
        OffsetReset::Latest
    }
}

impl FromStr for OffsetReset {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "earliest" => Ok(OffsetReset::Earliest),
            "latest" => Ok(OffsetReset::Latest),
            _ => bail!(ErrorKind::Internal(format!("unknown offset reset policy: {}", s))),
        }
    }
}

impl fmt::Display for OffsetReset {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            OffsetReset::Earliest => write!(f, "earliest"),
            OffsetReset::Latest => write!(f, "latest"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub group_id: String,

    pub topic_name: String,

    pub offset_reset: OffsetReset,

    /// Coordination-store session TTL, in milliseconds.
    pub session_timeout: u64,

    pub auto_commit_interval: u64,

    pub fetch_max_wait: u64,

    pub fetch_min_bytes: i32,

    pub fetch_max_bytes: i32,

    pub pause: u64,

    pub commit_message_interval: usize,

    /// Annotation stored next to every committed offset.
    pub commit_metadata: Option<String>,

    /// Root of this client's keys in the coordination store.
    pub store_prefix: String,

    /// Bound on waiting for a partition lock, in milliseconds; `None` waits
    /// forever.
    pub lock_wait: Option<u64>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            group_id: String::new(),
            topic_name: String::new(),
            offset_reset: OffsetReset::default(),
            session_timeout: DEFAULT_SESSION_TIMEOUT_MILLIS,
            auto_commit_interval: DEFAULT_AUTO_COMMIT_INTERVAL_MILLIS,
            fetch_max_wait: DEFAULT_FETCH_MAX_WAIT_MILLIS,
            fetch_min_bytes: DEFAULT_FETCH_MIN_BYTES,
            fetch_max_bytes: DEFAULT_FETCH_MAX_BYTES,
            pause: DEFAULT_PAUSE_MILLIS,
            commit_message_interval: DEFAULT_COMMIT_MESSAGE_INTERVAL,
            commit_metadata: None,
            store_prefix: DEFAULT_STORE_PREFIX.to_owned(),
            lock_wait: None,
        }
    }
}

impl ConsumerConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout)
    }

    /// Sessions renew at half their TTL.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.session_timeout / 2)
    }

    pub fn auto_commit_interval(&self) -> Duration {
        Duration::from_millis(self.auto_commit_interval)
    }

    pub fn fetch_max_wait(&self) -> Duration {
        Duration::from_millis(self.fetch_max_wait)
    }

    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause)
    }

    pub fn lock_wait(&self) -> Option<Duration> {
        self.lock_wait.map(Duration::from_millis)
    }

    fn group_prefix(&self) -> String {
        format!("{}/{}", self.store_prefix, self.group_id)
    }

    pub fn leader_path(&self) -> String {
        format!("{}/leader", self.group_prefix())
    }

    pub fn members_prefix(&self) -> String {
        format!("{}/members/", self.group_prefix())
    }

    pub fn member_path(&self, member_id: &str) -> String {
        format!("{}{}", self.members_prefix(), member_id)
    }

    pub fn assignment_path(&self, member_id: &str) -> String {
        format!("{}/assignments/{}", self.group_prefix(), member_id)
    }

    pub fn partition_lock_path(&self, partition: PartitionId) -> String {
        format!("{}/partitions/{}/{}",
                self.group_prefix(),
                self.topic_name,
                partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_paths() {
        let mut config = ConsumerConfig::default();

        config.group_id = "we".to_owned();
        config.topic_name = "bar".to_owned();

        assert_eq!(config.leader_path(), "kafka-groups/we/leader");
        assert_eq!(config.members_prefix(), "kafka-groups/we/members/");
        assert_eq!(config.member_path("m1"), "kafka-groups/we/members/m1");
        assert_eq!(config.assignment_path("m1"), "kafka-groups/we/assignments/m1");
        assert_eq!(config.partition_lock_path(3), "kafka-groups/we/partitions/bar/3");
    }

    #[test]
    fn test_heartbeat_is_half_the_session() {
        let config = ConsumerConfig::default();

        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_offset_reset_parse() {
        assert_eq!("earliest".parse::<OffsetReset>().unwrap(), OffsetReset::Earliest);
        assert_eq!("latest".parse::<OffsetReset>().unwrap(), OffsetReset::Latest);
        assert!("none".parse::<OffsetReset>().is_err());
    }
}
