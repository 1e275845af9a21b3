use protocol::{Offset, PartitionId};

/// A record on its way into a topic.
#[derive(Clone, Debug)]
pub struct ProducerRecord<K, V> {
    pub topic_name: String,
    /// Explicit target partition; overrides the partitioner when set.
    pub partition: Option<PartitionId>,
    pub key: Option<K>,
    pub value: Option<V>,
}

impl<K, V> ProducerRecord<K, V> {
    pub fn from_value<S: Into<String>>(topic_name: S, value: V) -> Self {
        ProducerRecord {
            topic_name: topic_name.into(),
            partition: None,
            key: None,
            value: Some(value),
        }
    }

    pub fn from_key_value<S: Into<String>>(topic_name: S, key: K, value: V) -> Self {
        ProducerRecord {
            topic_name: topic_name.into(),
            partition: None,
            key: Some(key),
            value: Some(value),
        }
    }

    pub fn with_partition(mut self, partition: PartitionId) -> Self {
        self.partition = Some(partition);
        self
    }
}

/// Where a produced record landed.
#[derive(Clone, Debug, PartialEq)]
pub struct RecordMetadata {
    pub topic_name: String,
    pub partition: PartitionId,
    /// `-1` for fire-and-forget sends; the broker does not report one.
    pub offset: Offset,
}
