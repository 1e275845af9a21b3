use std::net::SocketAddr;

use tokio_core::reactor::Handle;

use client::{ClientConfig, KafkaClient, KafkaVersion};

/// Builds a `KafkaClient` from bootstrap brokers and tuning knobs.
pub struct ClientBuilder {
    config: ClientConfig,
    handle: Handle,
}

impl ClientBuilder {
    pub fn from_config(config: ClientConfig, handle: Handle) -> Self {
        ClientBuilder {
            config: config,
            handle: handle,
        }
    }

    pub fn from_hosts<I>(hosts: I, handle: Handle) -> Self
        where I: IntoIterator<Item = SocketAddr>
    {
        let mut config = ClientConfig::default();

        config.hosts = hosts.into_iter().collect();

        ClientBuilder::from_config(config, handle)
    }

    pub fn with_client_id<S: Into<String>>(mut self, client_id: S) -> Self {
        self.config.client_id = Some(client_id.into());
        self
    }

    pub fn with_broker_version(mut self, version: KafkaVersion) -> Self {
        self.config.broker_version = version;
        self
    }

    pub fn with_request_timeout(mut self, millis: u64) -> Self {
        self.config.request_timeout = millis;
        self
    }

    pub fn with_metadata_max_age(mut self, millis: u64) -> Self {
        self.config.metadata_max_age = millis;
        self
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    pub fn with_metrics(mut self) -> Self {
        self.config.metrics = true;
        self
    }

    pub fn build(self) -> KafkaClient {
        KafkaClient::from_config(self.config, self.handle)
    }
}
