use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use futures::future::{Either, Loop};
use futures::unsync::{mpsc, oneshot};
use futures::{Future, Stream, future};

use tokio_timer::Timer;

use errors::{ErrorKind, Result};
use network::TopicPartition;
use protocol::{FetchOffset, KafkaCode, Offset, PartitionId};
use client::{BrokerRef, Client, Cluster, CommitEntry, KafkaClient, StaticBoxFuture,
             ToStaticBoxFuture};
use coordination::{CoordinationStore, DistributedLock, SessionId, SessionStatus, StoreFuture};
use consumer::{ConsumerConfig, MemberAssignment, OffsetReset, RawHandler, Subscriptions,
               assign_round_robin, fetcher};

/// Anything that forces the group machinery out of steady-state consuming.
#[derive(Debug)]
pub enum GroupEvent {
    /// A member joined or left; ownership must be redealt.
    MembersChanged,
    /// The coordination-store session expired; all ephemeral state is gone.
    SessionLost,
    /// The offset coordinator moved; rediscover it, the session is fine.
    CoordinatorLost,
    /// The handler returned `Stop` for this partition.
    WorkerStopped(PartitionId),
    Shutdown,
}

/// Everything a partition worker needs, shared by reference counting.
pub struct WorkerContext<S> {
    pub client: KafkaClient,
    pub store: Rc<S>,
    pub config: ConsumerConfig,
    pub coordinator: BrokerRef,
    pub session: SessionId,
    pub subscriptions: Rc<RefCell<Subscriptions>>,
    pub handler: Rc<RefCell<RawHandler>>,
    pub events: mpsc::UnboundedSender<GroupEvent>,
    pub timer: Timer,
}

/// Drives one member of a consumer group:
///
/// ```text
/// Discover -> Join -> Rebalance -> Consume <-> Rebalance
///     ^                                |
///     +--------- session lost ---------+
/// ```
///
/// Discovery finds the offset coordinator broker; Join creates the store
/// session and registers an ephemeral membership key; Rebalance races for
/// the leader lock, publishes assignments (leader only) and reads its own;
/// Consume runs partition workers, the session heartbeat, the offset
/// committer and the membership watch until an event forces a transition.
/// Errors propagate out and the supervisor restarts the machine from
/// Discover with backoff.
pub struct GroupCoordinator<S> {
    inner: Rc<Inner<S>>,
}

impl<S> Clone for GroupCoordinator<S> {
    fn clone(&self) -> Self {
        GroupCoordinator { inner: self.inner.clone() }
    }
}

struct Inner<S> {
    client: KafkaClient,
    store: Rc<S>,
    config: ConsumerConfig,
    member_id: String,
    timer: Timer,
    handler: Rc<RefCell<RawHandler>>,
    subscriptions: Rc<RefCell<Subscriptions>>,
    running: Cell<bool>,
    shutting_down: Cell<bool>,
    shutdown_wakers: RefCell<Vec<mpsc::UnboundedSender<GroupEvent>>>,
    task_shutdowns: RefCell<Vec<oneshot::Sender<()>>>,
    started: RefCell<Option<oneshot::Sender<Result<()>>>>,
    stopped: RefCell<Vec<oneshot::Sender<()>>>,
}

#[derive(Clone)]
struct GroupContext {
    coordinator: BrokerRef,
    session: SessionId,
    is_leader: bool,
    members_index: u64,
}

enum Phase {
    Discover { session: Option<SessionId> },
    Join {
        coordinator: BrokerRef,
        session: Option<SessionId>,
    },
    Rebalance { ctx: GroupContext },
    Consume {
        ctx: GroupContext,
        partitions: Vec<PartitionId>,
    },
}

type GroupStep = StaticBoxFuture<Loop<(), Phase>>;

impl<S> GroupCoordinator<S>
    where S: CoordinationStore
{
    pub fn new(client: KafkaClient,
               store: Rc<S>,
               config: ConsumerConfig,
               member_id: String,
               handler: RawHandler)
               -> Self {
        let timer = client.timer();

        GroupCoordinator {
            inner: Rc::new(Inner {
                               client: client,
                               store: store,
                               config: config,
                               member_id: member_id,
                               timer: timer,
                               handler: Rc::new(RefCell::new(handler)),
                               subscriptions: Rc::new(RefCell::new(Subscriptions::default())),
                               running: Cell::new(false),
                               shutting_down: Cell::new(false),
                               shutdown_wakers: RefCell::new(Vec::new()),
                               task_shutdowns: RefCell::new(Vec::new()),
                               started: RefCell::new(None),
                               stopped: RefCell::new(Vec::new()),
                           }),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.inner.member_id
    }

    pub fn shutting_down(&self) -> bool {
        self.inner.shutting_down.get()
    }

    /// Resolves once the member has a session and registered membership, or
    /// fails with whatever kept it from getting there.
    pub fn started(&self) -> StaticBoxFuture<()> {
        let (sender, receiver) = oneshot::channel();

        *self.inner.started.borrow_mut() = Some(sender);

        receiver
            .then(|result| match result {
                      Ok(Ok(())) => Ok(()),
                      Ok(Err(err)) => Err(err),
                      Err(_) => Err(ErrorKind::Canceled("group start canceled").into()),
                  })
            .static_boxed()
    }

    /// The group state machine; runs until shutdown (`Ok`) or an error the
    /// supervisor should restart from (`Err`).
    pub fn run(&self) -> StaticBoxFuture<()> {
        let inner = self.inner.clone();
        let terminal = self.inner.clone();

        inner.running.set(true);

        future::loop_fn(Phase::Discover { session: None }, move |phase| {
            let inner = inner.clone();

            if inner.shutting_down.get() {
                return shutdown_step(inner, phase);
            }

            match phase {
                Phase::Discover { session } => discover(inner, session),
                Phase::Join {
                    coordinator,
                    session,
                } => join(inner, coordinator, session),
                Phase::Rebalance { ctx } => rebalance(inner, ctx),
                Phase::Consume { ctx, partitions } => consume(inner, ctx, partitions),
            }
        })
                .then(move |result| {
            terminal.running.set(false);
            terminal.stop_tasks();

            match result {
                Ok(()) => {
                    terminal.notify_stopped();

                    Ok(())
                }
                Err(err) => {
                    // a failure before the caller's start future resolved is
                    // a startup failure; deliver it instead of retrying
                    let started = terminal.started.borrow_mut().take();

                    if let Some(sender) = started {
                        let _ = sender.send(Err(err));

                        terminal.notify_stopped();

                        Ok(())
                    } else {
                        Err(err)
                    }
                }
            }
        })
                .static_boxed()
    }

    /// Graceful shutdown: flushes commits, releases the leader lock and the
    /// membership key.  Resolves when the machine has wound down.
    pub fn stop(&self) -> StaticBoxFuture<()> {
        self.inner.shutting_down.set(true);

        for waker in self.inner.shutdown_wakers.borrow_mut().drain(..) {
            let _ = waker.unbounded_send(GroupEvent::Shutdown);
        }

        if !self.inner.running.get() {
            return StaticBoxFuture::ok(());
        }

        let (sender, receiver) = oneshot::channel();

        self.inner.stopped.borrow_mut().push(sender);

        receiver.then(|_| Ok(())).static_boxed()
    }
}

impl<S> Inner<S>
    where S: CoordinationStore
{
    fn notify_started(&self) {
        if let Some(sender) = self.started.borrow_mut().take() {
            let _ = sender.send(Ok(()));
        }
    }

    fn notify_stopped(&self) {
        for sender in self.stopped.borrow_mut().drain(..) {
            let _ = sender.send(());
        }
    }

    fn register_shutdown_waker(&self, waker: mpsc::UnboundedSender<GroupEvent>) {
        self.shutdown_wakers.borrow_mut().push(waker);
    }

    /// Winds down every task and worker of the current round.
    fn stop_tasks(&self) {
        for shutdown in self.task_shutdowns.borrow_mut().drain(..) {
            let _ = shutdown.send(());
        }
    }

    /// Spawns an auxiliary task that dies with the current round.
    fn spawn_task<F>(&self, task: F)
        where F: Future<Item = (), Error = ()> + 'static
    {
        let (sender, receiver) = oneshot::channel();

        self.task_shutdowns.borrow_mut().push(sender);

        self.client
            .handle()
            .spawn(task.select2(receiver).then(|_| Ok(())));
    }

    /// Hands out a shutdown receiver for a worker that needs to clean up on
    /// its own (commit flush, lock release) instead of being cancelled.
    fn worker_shutdown(&self) -> oneshot::Receiver<()> {
        let (sender, receiver) = oneshot::channel();

        self.task_shutdowns.borrow_mut().push(sender);

        receiver
    }
}

fn discover<S>(inner: Rc<Inner<S>>, session: Option<SessionId>) -> GroupStep
    where S: CoordinationStore
{
    debug!("discovering coordinator of group `{}`", inner.config.group_id);

    inner
        .client
        .group_coordinator(inner.config.group_id.clone())
        .map(move |coordinator| {
                 debug!("group coordinator is {}", coordinator);

                 Loop::Continue(Phase::Join {
                                    coordinator: coordinator.as_ref(),
                                    session: session,
                                })
             })
        .static_boxed()
}

fn join<S>(inner: Rc<Inner<S>>, coordinator: BrokerRef, session: Option<SessionId>) -> GroupStep
    where S: CoordinationStore
{
    let ensure_session: StoreFuture<SessionId> = match session {
        Some(session) => StoreFuture::ok(session),
        None => inner.store.session_create(inner.config.session_timeout()),
    };

    let register = inner.clone();
    let done = inner.clone();

    ensure_session
        .and_then(move |session| {
            debug!("member `{}` joining group `{}` with session `{}`",
                   register.member_id,
                   register.config.group_id,
                   session);

            let path = register.config.member_path(&register.member_id);
            let member_id = register.member_id.clone().into_bytes();

            register
                .store
                .kv_put(&path, member_id, Some(&session))
                .map(move |_| session)
        })
        .map(move |session| {
                 done.notify_started();

                 Loop::Continue(Phase::Rebalance {
                                    ctx: GroupContext {
                                        coordinator: coordinator,
                                        session: session,
                                        is_leader: false,
                                        members_index: 0,
                                    },
                                })
             })
        .static_boxed()
}

fn rebalance<S>(inner: Rc<Inner<S>>, ctx: GroupContext) -> GroupStep
    where S: CoordinationStore
{
    debug!("group `{}` rebalancing", inner.config.group_id);

    inner.stop_tasks();

    let elect = inner.clone();
    let topology = inner.clone();
    let membership = inner.clone();
    let publish = inner.clone();
    let read = inner.clone();
    let offsets = inner.clone();

    sync_commit(inner.clone(), ctx.clone())
        .then(move |result| {
            if let Err(err) = result {
                warn!("commit before rebalance failed, {}", err);
            }

            // whoever holds the leader lock deals the assignment
            let lock = DistributedLock::new(elect.store.clone(),
                                            elect.config.leader_path(),
                                            ctx.session.clone());

            lock.try_acquire().map(move |is_leader| (ctx, is_leader))
        })
        .and_then(move |(mut ctx, is_leader)| {
            ctx.is_leader = is_leader;

            if is_leader {
                debug!("member `{}` is the assignment leader", topology.member_id);
            }

            topology
                .client
                .metadata()
                .and_then(move |metadata| {
                    let partitions: Vec<PartitionId> = metadata
                        .partitions_for(&topology.config.topic_name)
                        .map(|partitions| {
                                 partitions.iter().map(|p| p.partition_id).collect()
                             })
                        .unwrap_or_default();

                    if partitions.is_empty() {
                        bail!(ErrorKind::KafkaError(KafkaCode::UnknownTopicOrPartition));
                    }

                    Ok((ctx, partitions))
                })
        })
        .and_then(move |(mut ctx, partitions)| {
            membership
                .store
                .kv_list(&membership.config.members_prefix())
                .and_then(move |(index, members)| {
                    ctx.members_index = index;

                    let member_ids: Vec<String> = members
                        .iter()
                        .map(|&(ref key, ref value)| {
                                 String::from_utf8(value.clone())
                                     .unwrap_or_else(|_| {
                                                         key.rsplit('/')
                                                             .next()
                                                             .unwrap_or("")
                                                             .to_owned()
                                                     })
                             })
                        .collect();

                    debug!("group `{}` has {} members over {} partitions",
                           publish.config.group_id,
                           member_ids.len(),
                           partitions.len());

                    if ctx.is_leader {
                        let table = assign_round_robin(&member_ids, &partitions);

                        let puts: Vec<StoreFuture<()>> = table
                            .into_iter()
                            .map(|(member_id, owned)| {
                                let assignment = MemberAssignment {
                                    topic_name: publish.config.topic_name.clone(),
                                    partitions: owned,
                                };

                                match assignment.serialize() {
                                    Ok(data) => {
                                        publish
                                            .store
                                            .kv_put(&publish.config.assignment_path(&member_id),
                                                    data.to_vec(),
                                                    None)
                                    }
                                    Err(err) => StoreFuture::err(err),
                                }
                            })
                            .collect();

                        Either::A(future::join_all(puts).map(move |_| ctx))
                    } else {
                        Either::B(future::ok(ctx))
                    }
                })
        })
        .and_then(move |ctx| read_assignment(read, ctx))
        .and_then(move |(ctx, assignment)| init_offsets(offsets, ctx, assignment))
        .map(|(ctx, partitions)| {
                 Loop::Continue(Phase::Consume {
                                    ctx: ctx,
                                    partitions: partitions,
                                })
             })
        .static_boxed()
}

/// Waits until the leader has published an assignment for this member.
fn read_assignment<S>(inner: Rc<Inner<S>>,
                      ctx: GroupContext)
                      -> StaticBoxFuture<(GroupContext, MemberAssignment)>
    where S: CoordinationStore
{
    future::loop_fn(ctx, move |ctx| {
            let store = inner.store.clone();
            let watcher = inner.store.clone();
            let path = inner.config.assignment_path(&inner.member_id);

            store
                .kv_list(&path)
                .and_then(move |(index, mut entries)| match entries.pop() {
                              Some((_, data)) => {
                                  match MemberAssignment::deserialize(&data) {
                                      Ok(assignment) => {
                                          Either::A(future::ok(Loop::Break((ctx, assignment))))
                                      }
                                      Err(err) => Either::A(future::err(err)),
                                  }
                              }
                              None => {
                                  Either::B(watcher
                                                .watch(&path, index)
                                                .map(move |_| Loop::Continue(ctx)))
                              }
                          })
        })
        .static_boxed()
}

/// Primes fetch positions: committed offsets where they exist, the reset
/// policy elsewhere.
fn init_offsets<S>(inner: Rc<Inner<S>>,
                   ctx: GroupContext,
                   assignment: MemberAssignment)
                   -> StaticBoxFuture<(GroupContext, Vec<PartitionId>)>
    where S: CoordinationStore
{
    let partitions = assignment.partitions;

    debug!("member `{}` owns partitions {:?}", inner.member_id, partitions);

    inner.subscriptions.borrow_mut().assign(&partitions);

    if partitions.is_empty() {
        return StaticBoxFuture::ok((ctx, partitions));
    }

    let tps: Vec<TopicPartition> = partitions
        .iter()
        .map(|&partition| TopicPartition::new(inner.config.topic_name.clone(), partition))
        .collect();

    let reset = inner.clone();
    let seeks = inner.clone();

    inner
        .client
        .offset_fetch(ctx.coordinator, inner.config.group_id.clone(), tps)
        .and_then(move |fetched| {
            let mut to_reset = Vec::new();

            for status in fetched {
                match status.error {
                    KafkaCode::None if status.offset >= 0 => {
                        reset
                            .subscriptions
                            .borrow_mut()
                            .seek(status.tp.partition, status.offset);
                    }
                    // offset -1 means the group never committed here
                    KafkaCode::None |
                    KafkaCode::UnknownTopicOrPartition => to_reset.push(status.tp),
                    code => return Either::A(future::err(ErrorKind::KafkaError(code).into())),
                }
            }

            if to_reset.is_empty() {
                return Either::A(future::ok(()));
            }

            let offset = match reset.config.offset_reset {
                OffsetReset::Earliest => FetchOffset::Earliest,
                OffsetReset::Latest => FetchOffset::Latest,
            };

            Either::B(reset
                          .client
                          .list_offsets(to_reset, offset)
                          .map(move |offsets| {
                for (_, partition_offsets) in offsets {
                    for po in partition_offsets {
                        seeks
                            .subscriptions
                            .borrow_mut()
                            .seek(po.partition, po.offset);
                    }
                }
            }))
        })
        .map(move |_| (ctx, partitions))
        .static_boxed()
}

fn consume<S>(inner: Rc<Inner<S>>, ctx: GroupContext, partitions: Vec<PartitionId>) -> GroupStep
    where S: CoordinationStore
{
    debug!("member `{}` consuming partitions {:?}", inner.member_id, partitions);

    let (events_tx, events_rx) = mpsc::unbounded();

    inner.register_shutdown_waker(events_tx.clone());

    // session heartbeat at ttl/2
    {
        let tx = events_tx.clone();
        let store = inner.store.clone();
        let session = ctx.session.clone();
        let heartbeat = inner
            .timer
            .interval(inner.config.heartbeat_interval())
            .map_err(|_| ())
            .for_each(move |_| {
                let tx = tx.clone();

                store
                    .session_renew(&session)
                    .then(move |result| match result {
                              Ok(SessionStatus::Active) => Ok(()),
                              Ok(SessionStatus::Expired) | Err(_) => {
                                  let _ = tx.unbounded_send(GroupEvent::SessionLost);

                                  Err(())
                              }
                          })
            });

        inner.spawn_task(heartbeat);
    }

    // periodic offset committer
    {
        let tx = events_tx.clone();
        let committer = inner.clone();
        let commit_ctx = ctx.clone();
        let commits = inner
            .timer
            .interval(inner.config.auto_commit_interval())
            .map_err(|_| ())
            .for_each(move |_| {
                let tx = tx.clone();

                sync_commit(committer.clone(), commit_ctx.clone()).then(move |result| {
                    if let Err(err) = result {
                        if let ErrorKind::KafkaError(KafkaCode::NotCoordinatorForConsumer) =
                            *err.kind() {
                            let _ = tx.unbounded_send(GroupEvent::CoordinatorLost);

                            return Err(());
                        }

                        warn!("periodic offset commit failed, {}", err);
                    }

                    Ok(())
                })
            });

        inner.spawn_task(commits);
    }

    // membership watch; one event per round is enough
    {
        let tx = events_tx.clone();
        let watch = inner
            .store
            .watch(&inner.config.members_prefix(), ctx.members_index)
            .then(move |result| {
                      match result {
                          Ok(event) => {
                              trace!("membership changed @ index {}", event.index);

                              let _ = tx.unbounded_send(GroupEvent::MembersChanged);
                          }
                          Err(err) => warn!("membership watch failed, {}", err),
                      }

                      Ok(())
                  });

        inner.spawn_task(watch);
    }

    // one worker per owned partition
    for &partition in &partitions {
        let worker_ctx = Rc::new(WorkerContext {
                                     client: inner.client.clone(),
                                     store: inner.store.clone(),
                                     config: inner.config.clone(),
                                     coordinator: ctx.coordinator,
                                     session: ctx.session.clone(),
                                     subscriptions: inner.subscriptions.clone(),
                                     handler: inner.handler.clone(),
                                     events: events_tx.clone(),
                                     timer: inner.timer.clone(),
                                 });

        let shutdown = inner.worker_shutdown();

        inner
            .client
            .handle()
            .spawn(fetcher::run(worker_ctx, partition, shutdown));
    }

    let decide = inner.clone();

    future::loop_fn(events_rx, |events_rx| {
            events_rx
                .into_future()
                .then(|result| match result {
                          Ok((Some(GroupEvent::WorkerStopped(partition)), rest)) => {
                              info!("handler released partition {}", partition);

                              Ok(Loop::Continue(rest))
                          }
                          Ok((Some(event), _)) => Ok(Loop::Break(event)),
                          Ok((None, _)) | Err(_) => Ok(Loop::Break(GroupEvent::Shutdown)),
                      })
        })
        .and_then(move |event| match event {
                      GroupEvent::MembersChanged => {
                          debug!("membership changed, rebalancing");

                          StaticBoxFuture::ok(Loop::Continue(Phase::Rebalance { ctx: ctx }))
                      }
                      GroupEvent::SessionLost => {
                          warn!("coordination session lost, rejoining from scratch");

                          decide.stop_tasks();

                          StaticBoxFuture::ok(Loop::Continue(Phase::Discover { session: None }))
                      }
                      GroupEvent::CoordinatorLost => {
                          debug!("offset coordinator moved, rediscovering");

                          decide.stop_tasks();

                          StaticBoxFuture::ok(Loop::Continue(Phase::Discover {
                                                                 session: Some(ctx.session),
                                                             }))
                      }
                      GroupEvent::Shutdown => shutdown_with_group(decide, ctx),
                      GroupEvent::WorkerStopped(_) => {
                          StaticBoxFuture::ok(Loop::Continue(Phase::Rebalance { ctx: ctx }))
                      }
                  })
        .static_boxed()
}

fn shutdown_step<S>(inner: Rc<Inner<S>>, phase: Phase) -> GroupStep
    where S: CoordinationStore
{
    match phase {
        Phase::Rebalance { ctx } |
        Phase::Consume { ctx, .. } => shutdown_with_group(inner, ctx),
        Phase::Discover { .. } |
        Phase::Join { .. } => {
            inner.notify_stopped();

            StaticBoxFuture::ok(Loop::Break(()))
        }
    }
}

fn shutdown_with_group<S>(inner: Rc<Inner<S>>, ctx: GroupContext) -> GroupStep
    where S: CoordinationStore
{
    debug!("member `{}` leaving group `{}`", inner.member_id, inner.config.group_id);

    inner.stop_tasks();

    let unlock = inner.clone();
    let unregister = inner.clone();
    let finish = inner.clone();
    let session = ctx.session.clone();

    sync_commit(inner.clone(), ctx)
        .then(move |result| {
                  if let Err(err) = result {
                      warn!("final offset commit failed, {}", err);
                  }

                  let lock = DistributedLock::new(unlock.store.clone(),
                                                  unlock.config.leader_path(),
                                                  session);

                  lock.release()
              })
        .then(move |_| {
                  unregister
                      .store
                      .kv_delete(&unregister.config.member_path(&unregister.member_id))
              })
        .then(move |_| {
                  finish.subscriptions.borrow_mut().clear();
                  finish.notify_stopped();

                  Ok(Loop::Break(()))
              })
        .static_boxed()
}

/// Commits every position that moved past its committed offset.
fn sync_commit<S>(inner: Rc<Inner<S>>, ctx: GroupContext) -> StaticBoxFuture<()>
    where S: CoordinationStore
{
    let committable = inner.subscriptions.borrow().committable();

    if committable.is_empty() {
        return StaticBoxFuture::ok(());
    }

    let entries: Vec<CommitEntry> = committable
        .iter()
        .map(|&(partition, offset)| {
                 CommitEntry {
                     tp: TopicPartition::new(inner.config.topic_name.clone(), partition),
                     offset: offset,
                     metadata: Some(inner.config.commit_metadata.clone().unwrap_or_default()),
                 }
             })
        .collect();

    let offsets: HashMap<PartitionId, Offset> = committable.into_iter().collect();
    let subscriptions = inner.subscriptions.clone();

    inner
        .client
        .offset_commit(ctx.coordinator, inner.config.group_id.clone(), entries)
        .and_then(move |results| {
            for (tp, code) in results {
                match code {
                    KafkaCode::None => {
                        if let Some(&offset) = offsets.get(&tp.partition) {
                            subscriptions.borrow_mut().committed(tp.partition, offset);
                        }
                    }
                    KafkaCode::NotCoordinatorForConsumer => {
                        bail!(ErrorKind::KafkaError(code));
                    }
                    code => warn!("commit of {} rejected, {:?}", tp, code),
                }
            }

            Ok(())
        })
        .static_boxed()
}
