use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;

use network::TopicPartition;
use client::BrokerRef;
use producer::{ProducerBatch, ProducerConfig, PushRecord};

/// Open batches, one per leader broker.
///
/// A batch closes once it crosses the byte or count threshold, or once it has
/// lingered long enough; with `linger == 0` every `take_ready` drains
/// everything.
pub struct RecordAccumulator {
    batch_size: usize,
    batch_count: usize,
    linger: Duration,
    batches: HashMap<BrokerRef, ProducerBatch>,
}

impl RecordAccumulator {
    pub fn new(config: &ProducerConfig) -> Self {
        RecordAccumulator {
            batch_size: config.batch_size,
            batch_count: config.batch_count,
            linger: config.linger(),
            batches: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn push_record(&mut self,
                       leader: BrokerRef,
                       tp: TopicPartition,
                       key: Option<Bytes>,
                       value: Option<Bytes>)
                       -> PushRecord {
        self.batches
            .entry(leader)
            .or_insert_with(ProducerBatch::new)
            .push(tp, key, value)
    }

    /// Closes and hands out every batch that is full or has lingered out;
    /// `force` closes all of them (flush and shutdown paths).
    pub fn take_ready(&mut self, force: bool) -> Vec<(BrokerRef, ProducerBatch)> {
        let ready: Vec<BrokerRef> = self.batches
            .iter()
            .filter(|&(_, batch)| {
                        force || batch.is_full(self.batch_size, self.batch_count) ||
                        batch.is_expired(self.linger)
                    })
            .map(|(&leader, _)| leader)
            .collect();

        ready
            .into_iter()
            .flat_map(|leader| {
                          self.batches
                              .remove(&leader)
                              .into_iter()
                              .filter(|batch| !batch.is_empty())
                              .map(move |batch| (leader, batch))
                      })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(linger: u64, batch_count: usize) -> ProducerConfig {
        let mut config = ProducerConfig::default();

        config.linger = linger;
        config.batch_count = batch_count;

        config
    }

    #[test]
    fn test_zero_linger_drains_on_every_take() {
        let mut accumulator = RecordAccumulator::new(&config(0, 500));

        accumulator.push_record(BrokerRef::new(1),
                                TopicPartition::new("bar", 0),
                                None,
                                Some(Bytes::from(&b"a"[..])));

        let ready = accumulator.take_ready(false);

        assert_eq!(ready.len(), 1);
        assert!(accumulator.is_empty());
    }

    #[test]
    fn test_count_threshold_closes_batch() {
        let mut accumulator = RecordAccumulator::new(&config(60_000, 2));

        accumulator.push_record(BrokerRef::new(1),
                                TopicPartition::new("bar", 0),
                                None,
                                Some(Bytes::from(&b"a"[..])));

        assert!(accumulator.take_ready(false).is_empty());

        accumulator.push_record(BrokerRef::new(1),
                                TopicPartition::new("bar", 0),
                                None,
                                Some(Bytes::from(&b"b"[..])));

        let ready = accumulator.take_ready(false);

        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].1.message_count(), 2);
    }

    #[test]
    fn test_force_takes_lingering_batches() {
        let mut accumulator = RecordAccumulator::new(&config(60_000, 500));

        accumulator.push_record(BrokerRef::new(1),
                                TopicPartition::new("bar", 0),
                                None,
                                Some(Bytes::from(&b"a"[..])));
        accumulator.push_record(BrokerRef::new(2),
                                TopicPartition::new("bar", 1),
                                None,
                                Some(Bytes::from(&b"b"[..])));

        assert!(accumulator.take_ready(false).is_empty());

        let ready = accumulator.take_ready(true);

        assert_eq!(ready.len(), 2);
        assert!(accumulator.is_empty());
    }
}
