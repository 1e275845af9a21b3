use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::Bytes;

use futures::Future;
use futures::unsync::oneshot;

use errors::{Error, ErrorKind, Result};
use network::TopicPartition;
use protocol::{Message, MessageSet, Offset};
use client::StaticBoxFuture;
use producer::RecordMetadata;

/// The future a caller holds while its record sits in a batch.
pub type PushRecord = StaticBoxFuture<RecordMetadata>;

/// Completion handle of one record inside a batch.
pub struct Thunk {
    sender: oneshot::Sender<Result<RecordMetadata>>,
    tp: TopicPartition,
    relative_offset: Offset,
}

impl Thunk {
    pub fn tp(&self) -> &TopicPartition {
        &self.tp
    }

    /// Resolves the caller with the broker-assigned offset.
    pub fn done(self, base_offset: Offset) {
        let metadata = RecordMetadata {
            topic_name: self.tp.topic_name,
            partition: self.tp.partition,
            offset: base_offset + self.relative_offset,
        };

        let _ = self.sender.send(Ok(metadata));
    }

    /// Resolves a fire-and-forget send; the broker reports no offset.
    pub fn unacked(self) {
        let metadata = RecordMetadata {
            topic_name: self.tp.topic_name,
            partition: self.tp.partition,
            offset: -1,
        };

        let _ = self.sender.send(Ok(metadata));
    }

    pub fn fail(self, err: Error) {
        let _ = self.sender.send(Err(err));
    }
}

/// Records accumulated for one leader broker, across every partition that
/// broker leads.
pub struct ProducerBatch {
    created: Instant,
    size_in_bytes: usize,
    records: HashMap<TopicPartition, MessageSet>,
    thunks: Vec<Thunk>,
    /// How many times this batch content has been dispatched.
    pub attempts: usize,
}

impl Default for ProducerBatch {
    fn default() -> Self {
        ProducerBatch::new()
    }
}

impl ProducerBatch {
    pub fn new() -> Self {
        ProducerBatch {
            created: Instant::now(),
            size_in_bytes: 0,
            records: HashMap::new(),
            thunks: Vec::new(),
            attempts: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.thunks.is_empty()
    }

    pub fn message_count(&self) -> usize {
        self.thunks.len()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    pub fn push(&mut self,
                tp: TopicPartition,
                key: Option<Bytes>,
                value: Option<Bytes>)
                -> PushRecord {
        let message = Message::new(key, value);

        self.size_in_bytes += message.wire_size();

        let message_set = self.records
            .entry(tp.clone())
            .or_insert_with(MessageSet::default);
        let relative_offset = message_set.messages.len() as Offset;

        message_set.messages.push(message);

        let (sender, receiver) = oneshot::channel();

        self.thunks
            .push(Thunk {
                      sender: sender,
                      tp: tp,
                      relative_offset: relative_offset,
                  });

        PushRecord::new(receiver.then(|result| match result {
                                          Ok(Ok(metadata)) => Ok(metadata),
                                          Ok(Err(err)) => Err(err),
                                          Err(_) => {
                                              Err(ErrorKind::Canceled("batch dropped").into())
                                          }
                                      }))
    }

    pub fn is_full(&self, batch_size: usize, batch_count: usize) -> bool {
        self.size_in_bytes >= batch_size || self.thunks.len() >= batch_count
    }

    pub fn is_expired(&self, linger: Duration) -> bool {
        self.created.elapsed() >= linger
    }

    pub fn into_parts(self) -> (Vec<(TopicPartition, MessageSet)>, Vec<Thunk>, usize) {
        (self.records.into_iter().collect(), self.thunks, self.attempts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_thresholds() {
        let mut batch = ProducerBatch::new();

        assert!(batch.is_empty());

        for _ in 0..3 {
            batch.push(TopicPartition::new("bar", 0),
                       Some(Bytes::from(&b"key"[..])),
                       Some(Bytes::from(&b"value"[..])));
        }

        assert_eq!(batch.message_count(), 3);
        assert!(!batch.is_full(16 * 1024, 500));
        assert!(batch.is_full(16 * 1024, 3));
        assert!(batch.is_full(64, 500));
        assert!(batch.is_expired(Duration::from_millis(0)));
        assert!(!batch.is_expired(Duration::from_secs(3600)));
    }

    #[test]
    fn test_relative_offsets_per_partition() {
        let mut batch = ProducerBatch::new();

        batch.push(TopicPartition::new("bar", 0), None, Some(Bytes::from(&b"a"[..])));
        batch.push(TopicPartition::new("bar", 1), None, Some(Bytes::from(&b"b"[..])));
        batch.push(TopicPartition::new("bar", 0), None, Some(Bytes::from(&b"c"[..])));

        let (records, thunks, attempts) = batch.into_parts();

        assert_eq!(attempts, 0);
        assert_eq!(thunks.len(), 3);

        let records: HashMap<_, _> = records.into_iter().collect();

        assert_eq!(records[&TopicPartition::new("bar", 0)].messages.len(), 2);
        assert_eq!(records[&TopicPartition::new("bar", 1)].messages.len(), 1);
    }
}
