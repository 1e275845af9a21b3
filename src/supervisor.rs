use std::cmp;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

use futures::{Async, Future, Poll};

use tokio_core::reactor::Handle;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tokio_timer::{Sleep, Timer};

use errors::Error;

/// A window of ten crashes per minute ends the supervision; a component
/// failing faster than that is not going to heal by restarting.
pub const MAX_RESTARTS: usize = 10;

pub const RESTART_WINDOW_SECS: u64 = 60;

const BACKOFF_BASE_MILLIS: u64 = 10;

const MAX_BACKOFF_SECS: u64 = 30;

/// Runs a long-lived component, restarting it with exponential backoff when
/// it fails.  A component that completes with `Ok` is done and stays down.
pub fn spawn<F, R>(handle: &Handle, timer: Timer, name: &'static str, factory: F)
    where F: FnMut() -> R + 'static,
          R: Future<Item = (), Error = Error> + 'static
{
    handle.spawn(Supervisor {
                     name: name,
                     timer: timer,
                     factory: factory,
                     backoff: ExponentialBackoff::from_millis(BACKOFF_BASE_MILLIS),
                     restarts: VecDeque::new(),
                     state: State::Idle,
                 });
}

struct Supervisor<F, R> {
    name: &'static str,
    timer: Timer,
    factory: F,
    backoff: ExponentialBackoff,
    restarts: VecDeque<Instant>,
    state: State<R>,
}

enum State<R> {
    Idle,
    Running(R),
    BackingOff(Sleep),
}

impl<F, R> Future for Supervisor<F, R>
    where F: FnMut() -> R,
          R: Future<Item = (), Error = Error>
{
    type Item = ();
    type Error = ();

    fn poll(&mut self) -> Poll<(), ()> {
        loop {
            let next = match self.state {
                State::Idle => State::Running((self.factory)()),
                State::Running(ref mut child) => {
                    match child.poll() {
                        Ok(Async::NotReady) => return Ok(Async::NotReady),
                        Ok(Async::Ready(())) => {
                            debug!("{} finished", self.name);

                            return Ok(Async::Ready(()));
                        }
                        Err(err) => {
                            warn!("{} crashed, {}", self.name, err);

                            let now = Instant::now();
                            let window = Duration::from_secs(RESTART_WINDOW_SECS);

                            self.restarts.push_back(now);

                            while self.restarts
                                      .front()
                                      .map_or(false, |&at| now.duration_since(at) > window) {
                                self.restarts.pop_front();
                            }

                            if self.restarts.len() > MAX_RESTARTS {
                                error!("{} crashed {} times within {}s, giving up",
                                       self.name,
                                       self.restarts.len(),
                                       RESTART_WINDOW_SECS);

                                return Ok(Async::Ready(()));
                            }

                            let delay = cmp::min(jitter(self.backoff
                                                            .next()
                                                            .unwrap_or_else(|| {
                                Duration::from_secs(MAX_BACKOFF_SECS)
                            })),
                                                 Duration::from_secs(MAX_BACKOFF_SECS));

                            debug!("restarting {} in {:?}", self.name, delay);

                            State::BackingOff(self.timer.sleep(delay))
                        }
                    }
                }
                State::BackingOff(ref mut sleep) => {
                    match sleep.poll() {
                        Ok(Async::NotReady) => return Ok(Async::NotReady),
                        Ok(Async::Ready(())) | Err(_) => State::Idle,
                    }
                }
            };

            self.state = next;
        }
    }
}
