use std::cell::RefCell;
use std::rc::{Rc, Weak};

use futures::{Future, Stream, future};

use errors::ErrorKind;
use network::TopicPartition;
use protocol::KafkaCode;
use client::{Client, Cluster, KafkaClient, StaticBoxFuture, ToStaticBoxFuture};
use serialization::Serializer;
use producer::{Partitioner, ProducerConfig, ProducerRecord, RecordAccumulator, RecordMetadata,
               Sender};

/// A topic-scoped producer.
pub trait Producer: 'static {
    type Key;
    type Value;

    /// Enqueues a record; the future resolves once the record is durable (or
    /// merely queued, for `RequiredAcks::None`).
    fn send(&self, record: ProducerRecord<Self::Key, Self::Value>) -> SendRecord;

    /// Closes every open batch and resolves when they have been dispatched
    /// and answered.
    fn flush(&self) -> Flush;
}

pub type SendRecord = StaticBoxFuture<RecordMetadata>;

pub type Flush = StaticBoxFuture<()>;

pub struct KafkaProducer<K, V> {
    inner: Rc<Inner<K, V>>,
}

impl<K, V> Clone for KafkaProducer<K, V> {
    fn clone(&self) -> Self {
        KafkaProducer { inner: self.inner.clone() }
    }
}

struct Inner<K, V> {
    client: KafkaClient,
    config: ProducerConfig,
    accumulator: RefCell<RecordAccumulator>,
    partitioner: Box<Partitioner>,
    key_serializer: K,
    value_serializer: V,
    sender: Sender,
}

impl<K, V> KafkaProducer<K, V>
    where K: Serializer + 'static,
          V: Serializer + 'static
{
    pub fn new(client: KafkaClient,
               config: ProducerConfig,
               partitioner: Box<Partitioner>,
               key_serializer: K,
               value_serializer: V)
               -> Self {
        let accumulator = RecordAccumulator::new(&config);
        let sender = Sender::new(client.clone(), &config);

        let producer = KafkaProducer {
            inner: Rc::new(Inner {
                               client: client,
                               config: config,
                               accumulator: RefCell::new(accumulator),
                               partitioner: partitioner,
                               key_serializer: key_serializer,
                               value_serializer: value_serializer,
                               sender: sender,
                           }),
        };

        // a lingering batch is dispatched by this loop once it ages out
        if producer.inner.config.linger > 0 {
            let weak: Weak<Inner<K, V>> = Rc::downgrade(&producer.inner);
            let interval = producer
                .inner
                .client
                .timer()
                .interval(producer.inner.config.linger());

            producer
                .inner
                .client
                .handle()
                .spawn(interval
                           .map_err(|_| ())
                           .for_each(move |_| match weak.upgrade() {
                                         Some(inner) => {
                                             inner.dispatch_ready(false);
                                             Ok(())
                                         }
                                         None => Err(()),
                                     })
                           .then(|_| Ok(())));
        }

        producer
    }

    pub fn client(&self) -> &KafkaClient {
        &self.inner.client
    }
}

impl<K, V> Inner<K, V> {
    fn dispatch_ready(&self, force: bool) {
        let ready = self.accumulator.borrow_mut().take_ready(force);

        for (leader, batch) in ready {
            trace!("dispatching batch of {} messages ({} bytes) to broker #{}",
                   batch.message_count(),
                   batch.size_in_bytes(),
                   leader.index());

            self.client
                .handle()
                .spawn(self.sender
                           .send_batch(leader, batch)
                           .map_err(|err| warn!("fail to send batch, {}", err)));
        }
    }

    fn flush_all(&self) -> Flush {
        let ready = self.accumulator.borrow_mut().take_ready(true);

        let batches: Vec<_> = ready
            .into_iter()
            .map(|(leader, batch)| self.sender.send_batch(leader, batch))
            .collect();

        future::join_all(batches).map(|_| ()).static_boxed()
    }
}

impl<K, V> Producer for KafkaProducer<K, V>
    where K: Serializer + 'static,
          V: Serializer + 'static
{
    type Key = K::Item;
    type Value = V::Item;

    fn send(&self, record: ProducerRecord<Self::Key, Self::Value>) -> SendRecord {
        let inner = self.inner.clone();

        let ProducerRecord {
            topic_name,
            partition,
            key,
            value,
        } = record;

        let key = match key.map(|key| inner.key_serializer.serialize(&topic_name, key)) {
            Some(Ok(key)) => Some(key),
            Some(Err(err)) => return SendRecord::err(err),
            None => None,
        };
        let value = match value.map(|value| {
                                        inner.value_serializer.serialize(&topic_name, value)
                                    }) {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => return SendRecord::err(err),
            None => None,
        };

        let wire_size = key.as_ref().map_or(0, |k| k.len()) +
                        value.as_ref().map_or(0, |v| v.len());

        if wire_size > inner.config.max_request_size {
            return SendRecord::err(ErrorKind::KafkaError(KafkaCode::MessageSizeTooLarge).into());
        }

        self.inner
            .client
            .metadata()
            .and_then(move |metadata| {
                let partitions = match metadata.partitions_for(&topic_name) {
                    Some(partitions) if !partitions.is_empty() => partitions,
                    _ => {
                        inner.client.refresh_metadata();

                        return SendRecord::err(ErrorKind::KafkaError(
                            KafkaCode::UnknownTopicOrPartition).into());
                    }
                };

                let partition_id = match partition {
                    Some(partition_id) => {
                        if partitions
                               .iter()
                               .any(|p| p.partition_id == partition_id) {
                            partition_id
                        } else {
                            return SendRecord::err(ErrorKind::KafkaError(
                                KafkaCode::UnknownTopicOrPartition).into());
                        }
                    }
                    None => {
                        match inner
                                  .partitioner
                                  .partition(&topic_name,
                                             key.as_ref().map(|k| &k[..]),
                                             partitions) {
                            Some(partition_id) => partition_id,
                            None => {
                                return SendRecord::err(ErrorKind::KafkaError(
                                    KafkaCode::LeaderNotAvailable).into());
                            }
                        }
                    }
                };

                let leader = match partitions
                          .iter()
                          .find(|p| p.partition_id == partition_id)
                          .and_then(|p| p.leader) {
                    Some(leader) => leader,
                    None => {
                        // operations against an electing partition wait for
                        // fresh metadata via the caller's retry
                        inner.client.refresh_metadata();

                        return SendRecord::err(ErrorKind::LeaderNotAvailable(topic_name.clone(),
                                                                             partition_id)
                                                       .into());
                    }
                };

                let tp = TopicPartition::new(topic_name, partition_id);

                let push = inner
                    .accumulator
                    .borrow_mut()
                    .push_record(leader, tp, key, value);

                inner.dispatch_ready(false);

                push
            })
            .static_boxed()
    }

    fn flush(&self) -> Flush {
        self.inner.flush_all()
    }
}
