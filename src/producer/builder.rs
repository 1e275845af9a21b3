use std::net::SocketAddr;

use tokio_core::reactor::Handle;

use errors::{ErrorKind, Result};
use protocol::RequiredAcks;
use client::{ClientConfig, KafkaClient};
use serialization::{NoopSerializer, Serializer};
use producer::{KafkaProducer, Murmur2Partitioner, Partitioner, ProducerConfig};

/// Builds a `KafkaProducer`, optionally sharing an existing client.
pub struct ProducerBuilder<K = NoopSerializer<()>, V = NoopSerializer<()>> {
    client_config: ClientConfig,
    config: ProducerConfig,
    handle: Option<Handle>,
    client: Option<KafkaClient>,
    partitioner: Box<Partitioner>,
    key_serializer: K,
    value_serializer: V,
}

impl ProducerBuilder {
    pub fn with_bootstrap_servers<I>(hosts: I, handle: Handle) -> Self
        where I: IntoIterator<Item = SocketAddr>
    {
        let mut client_config = ClientConfig::default();

        client_config.hosts = hosts.into_iter().collect();

        ProducerBuilder {
            client_config: client_config,
            config: ProducerConfig::default(),
            handle: Some(handle),
            client: None,
            partitioner: Box::new(Murmur2Partitioner::default()),
            key_serializer: NoopSerializer::default(),
            value_serializer: NoopSerializer::default(),
        }
    }

    pub fn from_client(client: KafkaClient) -> Self {
        ProducerBuilder {
            client_config: client.config().clone(),
            config: ProducerConfig::default(),
            handle: None,
            client: Some(client),
            partitioner: Box::new(Murmur2Partitioner::default()),
            key_serializer: NoopSerializer::default(),
            value_serializer: NoopSerializer::default(),
        }
    }
}

impl<K, V> ProducerBuilder<K, V> {
    pub fn with_client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.client_config.client_id = Some(client_id.into());
        self
    }

    pub fn with_acks(mut self, acks: RequiredAcks) -> Self {
        self.config.acks = acks;
        self
    }

    pub fn with_ack_timeout(mut self, millis: u64) -> Self {
        self.config.ack_timeout = millis;
        self
    }

    pub fn with_linger(mut self, millis: u64) -> Self {
        self.config.linger = millis;
        self
    }

    pub fn with_batch_size(mut self, bytes: usize) -> Self {
        self.config.batch_size = bytes;
        self
    }

    pub fn with_batch_count(mut self, count: usize) -> Self {
        self.config.batch_count = count;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.client_config.max_retries = max_retries;
        self
    }

    pub fn with_partitioner<P: Partitioner + 'static>(mut self, partitioner: P) -> Self {
        self.partitioner = Box::new(partitioner);
        self
    }

    pub fn with_key_serializer<K2>(self, key_serializer: K2) -> ProducerBuilder<K2, V> {
        ProducerBuilder {
            client_config: self.client_config,
            config: self.config,
            handle: self.handle,
            client: self.client,
            partitioner: self.partitioner,
            key_serializer: key_serializer,
            value_serializer: self.value_serializer,
        }
    }

    pub fn with_value_serializer<V2>(self, value_serializer: V2) -> ProducerBuilder<K, V2> {
        ProducerBuilder {
            client_config: self.client_config,
            config: self.config,
            handle: self.handle,
            client: self.client,
            partitioner: self.partitioner,
            key_serializer: self.key_serializer,
            value_serializer: value_serializer,
        }
    }

    pub fn build(self) -> Result<KafkaProducer<K, V>>
        where K: Serializer + 'static,
              V: Serializer + 'static
    {
        let client = match self.client {
            Some(client) => client,
            None => {
                let handle = self.handle
                    .ok_or_else(|| {
                                    ErrorKind::Internal("producer builder needs a reactor handle"
                                                            .to_owned())
                                })?;

                KafkaClient::from_config(self.client_config, handle)
            }
        };

        Ok(KafkaProducer::new(client,
                              self.config,
                              self.partitioner,
                              self.key_serializer,
                              self.value_serializer))
    }
}
