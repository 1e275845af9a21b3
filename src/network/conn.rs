use std::cell::RefCell;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{ATOMIC_USIZE_INIT, AtomicUsize, Ordering};

use futures::unsync::{mpsc, oneshot};
use futures::{Async, AsyncSink, Future, Poll, Sink, Stream};

use tokio_core::net::TcpStream;
use tokio_core::reactor::Handle;
use tokio_io::AsyncRead;
use tokio_io::codec::Framed;

use errors::{Error, ErrorKind, Result};
use network::{KafkaCodec, KafkaRequest, KafkaResponse};

/// Process-wide connection id allocator, for log correlation only.
static CONNECTION_IDS: AtomicUsize = ATOMIC_USIZE_INIT;

/// The receiving half a caller hands over for asynchronous delivery.
///
/// Responses resolve to `None` for requests the broker never answers
/// (produce with `required_acks == 0`).
pub type ResponseSender = oneshot::Sender<Result<Option<KafkaResponse>>>;

type Envelope = (KafkaRequest, Option<ResponseSender>);

/// Handle to the actor owning one TCP socket to a broker.
///
/// Requests are serialized over the socket in mailbox order; responses are
/// matched back by arrival order, which the broker guarantees to be send
/// order.  Any transport or codec error tears the actor down and fails every
/// pending request with `ConnectionClosed`; the owner reconnects on the next
/// request.
pub struct Connection {
    id: u32,
    addr: SocketAddr,
    tx: mpsc::UnboundedSender<Envelope>,
    shutdown: RefCell<Option<oneshot::Sender<()>>>,
}

impl Connection {
    pub fn connect(addr: SocketAddr, handle: &Handle) -> Self {
        let id = CONNECTION_IDS.fetch_add(1, Ordering::Relaxed) as u32;
        let (tx, rx) = mpsc::unbounded();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        debug!("connection #{} connecting to broker @ {}", id, addr);

        let task = TcpStream::connect(&addr, handle)
            .map_err(Error::from)
            .and_then(move |stream| {
                if let Err(err) = stream.set_nodelay(true) {
                    warn!("fail to disable Nagle on connection #{}, {}", id, err);
                }

                ConnectionTask {
                    id: id,
                    framed: stream.framed(KafkaCodec::new()),
                    rx: rx,
                    shutdown: shutdown_rx,
                    stalled: None,
                    in_flight: VecDeque::new(),
                    shutting_down: false,
                }
            })
            .map_err(move |err| {
                debug!("connection #{} terminated, {}", id, err);
            });

        handle.spawn(task);

        Connection {
            id: id,
            addr: addr,
            tx: tx,
            shutdown: RefCell::new(Some(shutdown_tx)),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn addr(&self) -> &SocketAddr {
        &self.addr
    }

    /// Hands a request to the actor; the envelope comes back if the actor is
    /// already gone so the caller can retry on a fresh connection.
    pub fn send(&self,
                request: KafkaRequest,
                reply: Option<ResponseSender>)
                -> ::std::result::Result<(), Envelope> {
        self.tx
            .unbounded_send((request, reply))
            .map_err(|err| err.into_inner())
    }

    /// Sends a request and resolves with its response.
    pub fn request(&self, request: KafkaRequest) -> FutureResponse {
        let (tx, rx) = oneshot::channel();

        if let Err((_, reply)) = self.send(request, Some(tx)) {
            if let Some(reply) = reply {
                let _ = reply.send(Err(ErrorKind::ConnectionClosed.into()));
            }
        }

        FutureResponse(rx)
    }

    /// Graceful teardown: pending responses are still delivered, then the
    /// socket closes.  Takes priority over requests that are queued but not
    /// yet written.
    pub fn close(&self) {
        if let Some(shutdown) = self.shutdown.borrow_mut().take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

/// The response future of a single request.
pub struct FutureResponse(oneshot::Receiver<Result<Option<KafkaResponse>>>);

impl Future for FutureResponse {
    type Item = Option<KafkaResponse>;
    type Error = Error;

    fn poll(&mut self) -> Poll<Self::Item, Self::Error> {
        match self.0.poll() {
            Ok(Async::Ready(Ok(response))) => Ok(Async::Ready(response)),
            Ok(Async::Ready(Err(err))) => Err(err),
            Ok(Async::NotReady) => Ok(Async::NotReady),
            Err(_) => Err(ErrorKind::ConnectionClosed.into()),
        }
    }
}

struct ConnectionTask {
    id: u32,
    framed: Framed<TcpStream, KafkaCodec>,
    rx: mpsc::UnboundedReceiver<Envelope>,
    shutdown: oneshot::Receiver<()>,
    stalled: Option<Envelope>,
    /// One entry per request awaiting a response, in correlation order.
    in_flight: VecDeque<Option<ResponseSender>>,
    shutting_down: bool,
}

impl Future for ConnectionTask {
    type Item = ();
    type Error = Error;

    fn poll(&mut self) -> Poll<(), Error> {
        match self.poll_connection() {
            Err(err) => {
                self.fail_in_flight();
                Err(err)
            }
            ready => ready,
        }
    }
}

impl ConnectionTask {
    fn poll_connection(&mut self) -> Poll<(), Error> {
        if !self.shutting_down {
            if let Ok(Async::Ready(())) = self.shutdown.poll() {
                debug!("connection #{} shutting down", self.id);

                self.shutting_down = true;
            }
        }

        if let Some((request, reply)) = self.stalled.take() {
            self.start_send(request, reply)?;
        }

        while self.stalled.is_none() && !self.shutting_down {
            match self.rx.poll() {
                Ok(Async::Ready(Some((request, reply)))) => {
                    self.start_send(request, reply)?;
                }
                Ok(Async::Ready(None)) => {
                    // every handle is gone; drain and close
                    self.shutting_down = true;
                }
                Ok(Async::NotReady) | Err(()) => break,
            }
        }

        self.framed.poll_complete()?;

        loop {
            match self.framed.poll()? {
                Async::Ready(Some(response)) => {
                    trace!("connection #{} received {:?} response #{}",
                           self.id,
                           response.body.api_key(),
                           response.correlation_id);

                    match self.in_flight.pop_front() {
                        Some(Some(reply)) => {
                            let _ = reply.send(Ok(Some(response)));
                        }
                        Some(None) => {}
                        None => bail!(ErrorKind::CodecError("response without a request")),
                    }
                }
                Async::Ready(None) => {
                    if self.shutting_down && self.in_flight.is_empty() {
                        return Ok(Async::Ready(()));
                    }

                    bail!(ErrorKind::ConnectionClosed);
                }
                Async::NotReady => break,
            }
        }

        if self.shutting_down && self.stalled.is_none() && self.in_flight.is_empty() {
            debug!("connection #{} closed", self.id);

            return Ok(Async::Ready(()));
        }

        Ok(Async::NotReady)
    }

    fn start_send(&mut self, request: KafkaRequest, reply: Option<ResponseSender>) -> Result<()> {
        let has_response = request.has_response();

        match self.framed.start_send(request)? {
            AsyncSink::Ready => {
                if has_response {
                    self.in_flight.push_back(reply);
                } else if let Some(reply) = reply {
                    // fire-and-forget resolves once the frame is queued
                    let _ = reply.send(Ok(None));
                }
            }
            AsyncSink::NotReady(request) => {
                self.stalled = Some((request, reply));
            }
        }

        Ok(())
    }

    fn fail_in_flight(&mut self) {
        if let Some((_, Some(reply))) = self.stalled.take() {
            let _ = reply.send(Err(ErrorKind::ConnectionClosed.into()));
        }

        while let Some(reply) = self.in_flight.pop_front() {
            if let Some(reply) = reply {
                let _ = reply.send(Err(ErrorKind::ConnectionClosed.into()));
            }
        }

        while let Ok(Async::Ready(Some((_, reply)))) = self.rx.poll() {
            if let Some(reply) = reply {
                let _ = reply.send(Err(ErrorKind::ConnectionClosed.into()));
            }
        }
    }
}
