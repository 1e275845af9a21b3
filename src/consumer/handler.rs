use bytes::Bytes;

use protocol::{Offset, PartitionId};
use serialization::Deserializer;

/// What the handler wants next.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// Advance past this message.
    Ack,
    /// Back off and redeliver the same message.
    Pause,
    /// Release the partition and unwind its worker.
    Stop,
}

/// One message delivered to a group's handler.
#[derive(Clone, Debug)]
pub struct ConsumerRecord<K, V> {
    pub topic_name: String,
    pub partition: PartitionId,
    pub offset: Offset,
    pub key: Option<K>,
    pub value: Option<V>,
}

/// The callable a consumer group drives, one message at a time and in offset
/// order; the next message is not delivered until this returns.
pub trait MessageHandler<K, V>: 'static {
    fn handle(&mut self, record: ConsumerRecord<K, V>) -> Verdict;
}

impl<K, V, F> MessageHandler<K, V> for F
    where F: FnMut(ConsumerRecord<K, V>) -> Verdict + 'static,
          K: 'static,
          V: 'static
{
    fn handle(&mut self, record: ConsumerRecord<K, V>) -> Verdict {
        self(record)
    }
}

/// A record before deserialization, as the partition workers see it.
pub type RawConsumerRecord = ConsumerRecord<Bytes, Bytes>;

/// The type-erased handler the group machinery carries around.
pub type RawHandler = Box<MessageHandler<Bytes, Bytes>>;

/// Pairs a typed handler with its deserializers.
///
/// A record that fails to deserialize is logged and acknowledged; pausing on
/// it would redeliver the same poison bytes forever.
pub struct ErasedHandler<K, V, H> {
    key_deserializer: K,
    value_deserializer: V,
    handler: H,
}

impl<K, V, H> ErasedHandler<K, V, H>
    where K: Deserializer,
          V: Deserializer,
          H: MessageHandler<K::Item, V::Item>
{
    pub fn new(key_deserializer: K, value_deserializer: V, handler: H) -> Self {
        ErasedHandler {
            key_deserializer: key_deserializer,
            value_deserializer: value_deserializer,
            handler: handler,
        }
    }
}

impl<K, V, H> MessageHandler<Bytes, Bytes> for ErasedHandler<K, V, H>
    where K: Deserializer + 'static,
          V: Deserializer + 'static,
          H: MessageHandler<K::Item, V::Item>
{
    fn handle(&mut self, record: RawConsumerRecord) -> Verdict {
        let RawConsumerRecord {
            topic_name,
            partition,
            offset,
            key,
            value,
        } = record;

        let key = match key.map(|key| self.key_deserializer.deserialize(&topic_name, &key)) {
            Some(Ok(key)) => Some(key),
            Some(Err(err)) => {
                warn!("skipping undeserializable key at {}#{} offset {}, {}",
                      topic_name,
                      partition,
                      offset,
                      err);

                return Verdict::Ack;
            }
            None => None,
        };

        let value = match value.map(|value| {
                                        self.value_deserializer.deserialize(&topic_name, &value)
                                    }) {
            Some(Ok(value)) => Some(value),
            Some(Err(err)) => {
                warn!("skipping undeserializable value at {}#{} offset {}, {}",
                      topic_name,
                      partition,
                      offset,
                      err);

                return Verdict::Ack;
            }
            None => None,
        };

        self.handler
            .handle(ConsumerRecord {
                        topic_name: topic_name,
                        partition: partition,
                        offset: offset,
                        key: key,
                        value: value,
                    })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialization::StringDeserializer;

    #[test]
    fn test_erased_handler_deserializes() {
        let seen = ::std::rc::Rc::new(::std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();

        let mut handler = ErasedHandler::new(
            StringDeserializer::default(),
            StringDeserializer::default(),
            move |record: ConsumerRecord<String, String>| {
                sink.borrow_mut().push((record.key, record.value));
                Verdict::Ack
            });

        let verdict = handler.handle(RawConsumerRecord {
                                         topic_name: "bar".to_owned(),
                                         partition: 0,
                                         offset: 1,
                                         key: Some(Bytes::from(&b"k"[..])),
                                         value: Some(Bytes::from(&b"v"[..])),
                                     });

        assert_eq!(verdict, Verdict::Ack);
        assert_eq!(*seen.borrow(),
                   vec![(Some("k".to_owned()), Some("v".to_owned()))]);
    }

    #[test]
    fn test_erased_handler_skips_poison_records() {
        let mut handler = ErasedHandler::new(
            StringDeserializer::default(),
            StringDeserializer::default(),
            |_record: ConsumerRecord<String, String>| Verdict::Stop);

        let verdict = handler.handle(RawConsumerRecord {
                                         topic_name: "bar".to_owned(),
                                         partition: 0,
                                         offset: 1,
                                         key: None,
                                         value: Some(Bytes::from(&b"\xfe\xff"[..])),
                                     });

        // the poison record is skipped instead of reaching the handler
        assert_eq!(verdict, Verdict::Ack);
    }
}
