use std::cell::RefCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;

use futures::Future;
use futures::unsync::oneshot;

use tokio_core::reactor::Handle;
use tokio_service::Service;

use errors::{Error, ErrorKind};
use network::{Connection, KafkaRequest, KafkaResponse};
use client::{Metrics, StaticBoxFuture, ToStaticBoxFuture};

/// Routes requests to per-endpoint connections.
///
/// The registry keeps at most one live connection per `(host, port)`; a
/// request hitting a dead entry replaces it with a fresh connection and rides
/// along.  This is the only process-wide shared structure in the client.
#[derive(Clone)]
pub struct KafkaService {
    handle: Handle,
    connections: Rc<RefCell<HashMap<SocketAddr, Connection>>>,
    metrics: Option<Rc<Metrics>>,
}

impl KafkaService {
    pub fn new(handle: Handle, metrics: Option<Rc<Metrics>>) -> Self {
        KafkaService {
            handle: handle,
            connections: Rc::new(RefCell::new(HashMap::new())),
            metrics: metrics,
        }
    }
}

impl Service for KafkaService {
    type Request = (SocketAddr, KafkaRequest);
    type Response = Option<KafkaResponse>;
    type Error = Error;
    type Future = StaticBoxFuture<Option<KafkaResponse>>;

    fn call(&self, (addr, request): Self::Request) -> Self::Future {
        if let Some(ref metrics) = self.metrics {
            metrics.request_sent(request.api_key());
        }

        let (tx, rx) = oneshot::channel();

        let mut connections = self.connections.borrow_mut();

        let unsent = if let Some(conn) = connections.get(&addr) {
            match conn.send(request, Some(tx)) {
                Ok(()) => None,
                // the actor died; reconnect below and retry the envelope
                Err(envelope) => Some(envelope),
            }
        } else {
            Some((request, Some(tx)))
        };

        if let Some((request, reply)) = unsent {
            let conn = Connection::connect(addr, &self.handle);

            if let Err((_, reply)) = conn.send(request, reply) {
                if let Some(reply) = reply {
                    let _ = reply.send(Err(ErrorKind::ConnectionClosed.into()));
                }
            }

            if let Some(ref metrics) = self.metrics {
                metrics.connection_opened();
            }

            if connections.insert(addr, conn).is_some() {
                if let Some(ref metrics) = self.metrics {
                    metrics.connection_closed();
                }
            }
        }

        let metrics = self.metrics.clone();

        rx.then(move |result| match result {
                    Ok(Ok(response)) => {
                        if let (&Some(ref metrics), &Some(ref response)) = (&metrics, &response) {
                            metrics.response_received(response.body.api_key());
                        }

                        Ok(response)
                    }
                    Ok(Err(err)) => Err(err),
                    Err(_) => Err(ErrorKind::ConnectionClosed.into()),
                })
            .static_boxed()
    }
}
