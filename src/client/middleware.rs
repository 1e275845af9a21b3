use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use futures::Future;
use futures::future::Either;

use tokio_service::Service;
use tokio_timer::Timer;

use errors::{Error, ErrorKind};
use client::{StaticBoxFuture, ToStaticBoxFuture};

/// Requests that can tell which endpoint they are bound for.
pub trait WithAddr {
    fn addr(&self) -> SocketAddr;
}

impl<T> WithAddr for (SocketAddr, T) {
    fn addr(&self) -> SocketAddr {
        self.0
    }
}

/// Tracks the number of outstanding requests per endpoint; the client uses
/// the counts to pick the least loaded broker for group discovery.
#[derive(Clone)]
pub struct InFlightMiddleware<S> {
    upstream: S,
    state: Rc<RefCell<State>>,
}

#[derive(Default)]
struct State {
    requests: HashMap<SocketAddr, usize>,
}

impl State {
    fn send_request(&mut self, addr: SocketAddr) {
        let requests = self.requests.entry(addr).or_insert(0);

        if let Some(new) = requests.checked_add(1) {
            *requests = new;
        }
    }

    fn received_response(&mut self, addr: SocketAddr) {
        let requests = self.requests.entry(addr).or_insert(0);

        if let Some(new) = requests.checked_sub(1) {
            *requests = new;
        }
    }
}

impl<S> InFlightMiddleware<S> {
    pub fn new(upstream: S) -> InFlightMiddleware<S> {
        InFlightMiddleware {
            upstream: upstream,
            state: Rc::new(RefCell::new(State::default())),
        }
    }

    pub fn in_flight_requests(&self, addr: &SocketAddr) -> Option<usize> {
        self.state.borrow().requests.get(addr).cloned()
    }
}

impl<S> Service for InFlightMiddleware<S>
    where S: Service<Error = Error>,
          S::Request: WithAddr,
          S::Future: 'static,
          S::Response: 'static
{
    type Request = S::Request;
    type Response = S::Response;
    type Error = Error;
    type Future = StaticBoxFuture<S::Response, Error>;

    fn call(&self, request: Self::Request) -> Self::Future {
        let addr = request.addr();
        let state = self.state.clone();

        state.borrow_mut().send_request(addr);

        self.upstream
            .call(request)
            .then(move |response| {
                      state.borrow_mut().received_response(addr);

                      response
                  })
            .static_boxed()
    }
}

/// Traces requests and their round-trip latency.
#[derive(Clone)]
pub struct LogMiddleware<S> {
    upstream: S,
}

impl<S> LogMiddleware<S> {
    pub fn new(upstream: S) -> LogMiddleware<S> {
        LogMiddleware { upstream: upstream }
    }
}

impl<S> Service for LogMiddleware<S>
    where S: Service<Error = Error>,
          S::Request: WithAddr + Debug,
          S::Future: 'static,
          S::Response: 'static
{
    type Request = S::Request;
    type Response = S::Response;
    type Error = Error;
    type Future = StaticBoxFuture<S::Response, Error>;

    fn call(&self, request: Self::Request) -> Self::Future {
        let addr = request.addr();
        let started = Instant::now();

        trace!("sending request to {}: {:?}", addr, request);

        self.upstream
            .call(request)
            .then(move |response| {
                let elapsed = started.elapsed();
                let millis =
                    elapsed.as_secs() * 1_000 + u64::from(elapsed.subsec_nanos()) / 1_000_000;

                match response {
                    Ok(response) => {
                        trace!("response from {} after {} ms", addr, millis);

                        Ok(response)
                    }
                    Err(err) => {
                        debug!("request to {} failed after {} ms, {}", addr, millis, err);

                        Err(err)
                    }
                }
            })
            .static_boxed()
    }
}

/// Bounds every request round-trip; an overdue response fails the caller
/// with `TimedOut` while the connection keeps waiting for the frame.
#[derive(Clone)]
pub struct TimeoutMiddleware<S> {
    upstream: S,
    timer: Timer,
    timeout: Duration,
}

impl<S> TimeoutMiddleware<S> {
    pub fn new(upstream: S, timer: Timer, timeout: Duration) -> TimeoutMiddleware<S> {
        TimeoutMiddleware {
            upstream: upstream,
            timer: timer,
            timeout: timeout,
        }
    }
}

impl<S> Service for TimeoutMiddleware<S>
    where S: Service<Error = Error>,
          S::Future: 'static,
          S::Response: 'static
{
    type Request = S::Request;
    type Response = S::Response;
    type Error = Error;
    type Future = StaticBoxFuture<S::Response, Error>;

    fn call(&self, request: Self::Request) -> Self::Future {
        self.upstream
            .call(request)
            .select2(self.timer.sleep(self.timeout))
            .then(|result| match result {
                      Ok(Either::A((response, _))) => Ok(response),
                      Ok(Either::B(_)) => Err(ErrorKind::TimedOut.into()),
                      Err(Either::A((err, _))) => Err(err),
                      Err(Either::B((err, _))) => {
                          Err(ErrorKind::Internal(format!("timer error, {}", err)).into())
                      }
                  })
            .static_boxed()
    }
}
