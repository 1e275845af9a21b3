use std::cell::Cell;

use futures::future::{self, Either};

use errors::{Error, ErrorKind};
use client::{KafkaClient, StaticBoxFuture};
use coordination::CoordinationStore;
use consumer::GroupCoordinator;
use supervisor;

/// A consumer-group member.
pub trait Consumer: 'static {
    /// Joins the group in the background; the future resolves once
    /// membership is registered, and fails when the cluster or the
    /// coordination store is unreachable.
    fn start(&self) -> Start;

    /// Leaves the group: commits outstanding offsets, releases locks and
    /// membership, and winds the workers down.
    fn stop(&self) -> Stop;
}

pub type Start = StaticBoxFuture<()>;

pub type Stop = StaticBoxFuture<()>;

pub struct KafkaConsumer<S> {
    client: KafkaClient,
    coordinator: GroupCoordinator<S>,
    started: Cell<bool>,
}

impl<S> KafkaConsumer<S>
    where S: CoordinationStore
{
    pub fn new(client: KafkaClient, coordinator: GroupCoordinator<S>) -> Self {
        KafkaConsumer {
            client: client,
            coordinator: coordinator,
            started: Cell::new(false),
        }
    }

    pub fn client(&self) -> &KafkaClient {
        &self.client
    }

    pub fn member_id(&self) -> &str {
        self.coordinator.member_id()
    }
}

impl<S> Consumer for KafkaConsumer<S>
    where S: CoordinationStore
{
    fn start(&self) -> Start {
        if self.started.get() {
            return Start::err(ErrorKind::Internal("consumer already started".to_owned()).into());
        }

        self.started.set(true);

        let started = self.coordinator.started();
        let coordinator = self.coordinator.clone();

        supervisor::spawn(self.client.handle(),
                          self.client.timer(),
                          "group-coordinator",
                          move || if coordinator.shutting_down() {
                              Either::A(future::ok::<(), Error>(()))
                          } else {
                              Either::B(coordinator.run())
                          });

        started
    }

    fn stop(&self) -> Stop {
        debug!("stopping consumer `{}`", self.member_id());

        self.coordinator.stop()
    }
}
