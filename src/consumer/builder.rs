use std::net::SocketAddr;
use std::rc::Rc;

use rand;

use tokio_core::reactor::Handle;

use errors::{ErrorKind, Result};
use client::{ClientConfig, KafkaClient};
use coordination::CoordinationStore;
use serialization::{Deserializer, NoopDeserializer};
use consumer::{ConsumerConfig, ErasedHandler, GroupCoordinator, KafkaConsumer, MessageHandler,
               OffsetReset, RawHandler};

/// Builds a `KafkaConsumer`.
///
/// Deserializers must be in place before `with_handler`, which erases their
/// types into the handler pipeline.
pub struct ConsumerBuilder<S, K = NoopDeserializer<()>, V = NoopDeserializer<()>> {
    client_config: ClientConfig,
    config: ConsumerConfig,
    handle: Option<Handle>,
    client: Option<KafkaClient>,
    store: Option<Rc<S>>,
    key_deserializer: K,
    value_deserializer: V,
    handler: Option<RawHandler>,
}

impl<S> ConsumerBuilder<S>
    where S: CoordinationStore
{
    pub fn with_bootstrap_servers<I>(hosts: I, handle: Handle) -> Self
        where I: IntoIterator<Item = SocketAddr>
    {
        let mut client_config = ClientConfig::default();

        client_config.hosts = hosts.into_iter().collect();

        ConsumerBuilder {
            client_config: client_config,
            config: ConsumerConfig::default(),
            handle: Some(handle),
            client: None,
            store: None,
            key_deserializer: NoopDeserializer::default(),
            value_deserializer: NoopDeserializer::default(),
            handler: None,
        }
    }

    pub fn from_client(client: KafkaClient) -> Self {
        ConsumerBuilder {
            client_config: client.config().clone(),
            config: ConsumerConfig::default(),
            handle: None,
            client: Some(client),
            store: None,
            key_deserializer: NoopDeserializer::default(),
            value_deserializer: NoopDeserializer::default(),
            handler: None,
        }
    }
}

impl<S, K, V> ConsumerBuilder<S, K, V>
    where S: CoordinationStore
{
    pub fn with_group_id<G: Into<String>>(mut self, group_id: G) -> Self {
        self.config.group_id = group_id.into();
        self
    }

    pub fn with_topic<T: Into<String>>(mut self, topic_name: T) -> Self {
        self.config.topic_name = topic_name.into();
        self
    }

    pub fn with_client_id<C: Into<String>>(mut self, client_id: C) -> Self {
        self.client_config.client_id = Some(client_id.into());
        self
    }

    pub fn with_offset_reset(mut self, offset_reset: OffsetReset) -> Self {
        self.config.offset_reset = offset_reset;
        self
    }

    pub fn with_session_timeout(mut self, millis: u64) -> Self {
        self.config.session_timeout = millis;
        self
    }

    pub fn with_auto_commit_interval(mut self, millis: u64) -> Self {
        self.config.auto_commit_interval = millis;
        self
    }

    pub fn with_commit_metadata<M: Into<String>>(mut self, metadata: M) -> Self {
        self.config.commit_metadata = Some(metadata.into());
        self
    }

    pub fn with_store_prefix<P: Into<String>>(mut self, prefix: P) -> Self {
        self.config.store_prefix = prefix.into();
        self
    }

    pub fn with_coordination_store(mut self, store: S) -> Self {
        self.store = Some(Rc::new(store));
        self
    }

    pub fn with_key_deserializer<K2>(self, key_deserializer: K2) -> ConsumerBuilder<S, K2, V> {
        ConsumerBuilder {
            client_config: self.client_config,
            config: self.config,
            handle: self.handle,
            client: self.client,
            store: self.store,
            key_deserializer: key_deserializer,
            value_deserializer: self.value_deserializer,
            handler: self.handler,
        }
    }

    pub fn with_value_deserializer<V2>(self, value_deserializer: V2) -> ConsumerBuilder<S, K, V2> {
        ConsumerBuilder {
            client_config: self.client_config,
            config: self.config,
            handle: self.handle,
            client: self.client,
            store: self.store,
            key_deserializer: self.key_deserializer,
            value_deserializer: value_deserializer,
            handler: self.handler,
        }
    }

    pub fn with_handler<H>(mut self, handler: H) -> Self
        where K: Deserializer + Clone + 'static,
              V: Deserializer + Clone + 'static,
              H: MessageHandler<K::Item, V::Item>
    {
        self.handler = Some(Box::new(ErasedHandler::new(self.key_deserializer.clone(),
                                                        self.value_deserializer.clone(),
                                                        handler)));
        self
    }

    pub fn build(self) -> Result<KafkaConsumer<S>> {
        if self.config.group_id.is_empty() {
            bail!(ErrorKind::Internal("consumer needs a group id".to_owned()));
        }

        if self.config.topic_name.is_empty() {
            bail!(ErrorKind::Internal("consumer needs a topic".to_owned()));
        }

        let handler = self.handler
            .ok_or_else(|| ErrorKind::Internal("consumer needs a handler".to_owned()))?;

        let store = self.store
            .ok_or_else(|| {
                            ErrorKind::Internal("consumer needs a coordination store".to_owned())
                        })?;

        let client = match self.client {
            Some(client) => client,
            None => {
                let handle = self.handle
                    .ok_or_else(|| {
                                    ErrorKind::Internal("consumer builder needs a reactor handle"
                                                            .to_owned())
                                })?;

                KafkaClient::from_config(self.client_config, handle)
            }
        };

        let member_id = format!("{}-{:08x}",
                                client
                                    .config()
                                    .client_id
                                    .as_ref()
                                    .map_or("consumer", |client_id| client_id.as_str()),
                                rand::random::<u32>());

        let coordinator =
            GroupCoordinator::new(client.clone(), store, self.config, member_id, handler);

        Ok(KafkaConsumer::new(client, coordinator))
    }
}
