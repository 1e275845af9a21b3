use std::result::Result as StdResult;

use prometheus::{CounterVec, Gauge, Opts, Registry, proto};

use protocol::ApiKeys;

/// Request/response traffic counters, registered against a private registry
/// so embedding applications can scrape them without fighting over the
/// global one.
pub struct Metrics {
    registry: Registry,
    send_requests: CounterVec,
    received_responses: CounterVec,
    connections: Gauge,
}

impl Metrics {
    pub fn new() -> StdResult<Metrics, ::prometheus::Error> {
        let registry = Registry::new();

        let send_requests = CounterVec::new(Opts::new("kafka_requests_total",
                                                      "Requests sent to brokers."),
                                            &["api"])?;
        let received_responses = CounterVec::new(Opts::new("kafka_responses_total",
                                                           "Responses received from brokers."),
                                                 &["api"])?;
        let connections = Gauge::new("kafka_connections", "Open broker connections.")?;

        registry.register(Box::new(send_requests.clone()))?;
        registry.register(Box::new(received_responses.clone()))?;
        registry.register(Box::new(connections.clone()))?;

        Ok(Metrics {
               registry: registry,
               send_requests: send_requests,
               received_responses: received_responses,
               connections: connections,
           })
    }

    pub fn request_sent(&self, api_key: ApiKeys) {
        self.send_requests
            .with_label_values(&[api_key.name()])
            .inc();
    }

    pub fn response_received(&self, api_key: ApiKeys) {
        self.received_responses
            .with_label_values(&[api_key.name()])
            .inc();
    }

    pub fn connection_opened(&self) {
        self.connections.inc();
    }

    pub fn connection_closed(&self) {
        self.connections.dec();
    }

    pub fn gather(&self) -> Vec<proto::MetricFamily> {
        self.registry.gather()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counters() {
        let metrics = Metrics::new().unwrap();

        metrics.request_sent(ApiKeys::Metadata);
        metrics.request_sent(ApiKeys::Metadata);
        metrics.response_received(ApiKeys::Metadata);
        metrics.connection_opened();

        let families = metrics.gather();

        assert_eq!(families.len(), 3);
    }
}
