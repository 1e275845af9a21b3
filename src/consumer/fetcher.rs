use std::rc::Rc;

use futures::future::{Either, Loop};
use futures::unsync::oneshot;
use futures::{Async, Future, future};

use errors::Result;
use network::TopicPartition;
use protocol::{FetchOffset, KafkaCode, Message, Offset, PartitionId};
use client::{Client, Cluster, CommitEntry, FetchedPartition, StaticBoxFuture, ToStaticBoxFuture};
use coordination::{CoordinationStore, DistributedLock};
use consumer::{GroupEvent, OffsetReset, RawConsumerRecord, Verdict, WorkerContext};

/// The long-poll fetch loop for one owned partition.
///
/// Before fetching anything the worker takes the partition lock, so at most
/// one member in the group consumes the partition even while an assignment
/// handover is still settling.  Messages are delivered to the handler in
/// offset order, one at a time; the loop does not fetch ahead of an
/// unacknowledged message.
pub fn run<S>(ctx: Rc<WorkerContext<S>>,
              partition: PartitionId,
              shutdown: oneshot::Receiver<()>)
              -> Box<Future<Item = (), Error = ()>>
    where S: CoordinationStore
{
    let tp = TopicPartition::new(ctx.config.topic_name.clone(), partition);

    debug!("starting worker for {}", tp);

    let lock = DistributedLock::new(ctx.store.clone(),
                                    ctx.config.partition_lock_path(partition),
                                    ctx.session.clone());

    let looped = ctx.clone();
    let finish = ctx.clone();
    let release = lock.clone();
    let lock_wait = ctx.config.lock_wait();

    let task = lock.acquire(&ctx.timer, lock_wait)
        .and_then(move |_| {
                      future::loop_fn(WorkerState {
                                          shutdown: shutdown,
                                          pauses: 0,
                                      },
                                      move |state| iteration(looped.clone(), tp.clone(), state))
                  })
        .then(move |result| {
                  if let Err(err) = result {
                      warn!("worker for partition {} failed, {}", partition, err);
                  }

                  // flush whatever was consumed, then let go of the partition
                  commit_position(finish, partition).then(move |_| release.release())
              });

    Box::new(task.then(move |_| {
                           debug!("worker for partition {} finished", partition);

                           Ok(())
                       }))
}

struct WorkerState {
    shutdown: oneshot::Receiver<()>,
    /// Consecutive `Pause` verdicts; the redelivery backoff doubles with
    /// each one.
    pauses: u32,
}

type WorkerStep = StaticBoxFuture<Loop<(), WorkerState>>;

fn iteration<S>(ctx: Rc<WorkerContext<S>>, tp: TopicPartition, mut state: WorkerState) -> WorkerStep
    where S: CoordinationStore
{
    // shutdown outranks pending work
    match state.shutdown.poll() {
        Ok(Async::NotReady) => {}
        _ => return WorkerStep::ok(Loop::Break(())),
    }

    let position = ctx.subscriptions.borrow().position(tp.partition);
    let position = match position {
        Some(position) => position,
        None => return reset_position(ctx, tp, state),
    };

    let fetched = ctx.clone();

    ctx.client
        .metadata()
        .and_then(move |metadata| {
            let leader = metadata.leader_for(&tp).map(|broker| broker.as_ref());

            match leader {
                None => {
                    trace!("{} has no leader, waiting for fresh metadata", tp);

                    fetched.client.refresh_metadata();

                    let backoff = fetched.client.config().retry_backoff();

                    Either::A(fetched
                                  .timer
                                  .sleep(backoff)
                                  .then(|_| Ok(Loop::Continue(state))))
                }
                Some(leader) => {
                    let handle = fetched.clone();
                    let max_bytes = fetched.config.fetch_max_bytes;
                    let min_bytes = fetched.config.fetch_min_bytes;
                    let max_wait = fetched.config.fetch_max_wait();

                    Either::B(fetched
                                  .client
                                  .fetch_records(leader,
                                                 max_wait,
                                                 min_bytes,
                                                 vec![(tp.clone(), position, max_bytes)])
                                  .then(move |result| {
                                            handle_fetch(handle, tp, state, result)
                                        }))
                }
            }
        })
        .static_boxed()
}

fn handle_fetch<S>(ctx: Rc<WorkerContext<S>>,
                   tp: TopicPartition,
                   state: WorkerState,
                   result: Result<Vec<FetchedPartition>>)
                   -> WorkerStep
    where S: CoordinationStore
{
    let fetched = match result {
        Ok(fetched) => fetched,
        Err(err) => {
            warn!("fetch for {} failed, {}", tp, err);

            return backoff(ctx, state);
        }
    };

    let partition_data = fetched
        .into_iter()
        .find(|data| data.tp == tp);

    match partition_data {
        None => backoff(ctx, state),
        Some(data) => {
            match data.error {
                KafkaCode::None => deliver(ctx, tp, state, data.messages),
                KafkaCode::OffsetOutOfRange => {
                    let position = ctx.subscriptions.borrow().position(tp.partition);

                    info!("offset {:?} of {} fell off the log, resetting",
                          position,
                          tp);

                    reset_position(ctx, tp, state)
                }
                code if code.needs_metadata_refresh() => {
                    debug!("leader of {} moved ({:?}), refreshing metadata", tp, code);

                    ctx.client.refresh_metadata();

                    backoff(ctx, state)
                }
                code => {
                    warn!("fetch for {} answered with {:?}", tp, code);

                    backoff(ctx, state)
                }
            }
        }
    }
}

fn deliver<S>(ctx: Rc<WorkerContext<S>>,
              tp: TopicPartition,
              mut state: WorkerState,
              messages: Vec<Message>)
              -> WorkerStep
    where S: CoordinationStore
{
    let mut paused = false;
    let mut stopped = false;

    {
        let mut handler = ctx.handler.borrow_mut();

        for message in &messages {
            // compressed sets may start before the requested offset
            let position = ctx.subscriptions
                .borrow()
                .position(tp.partition)
                .unwrap_or(0);

            if message.offset < position {
                continue;
            }

            let record = RawConsumerRecord {
                topic_name: tp.topic_name.clone(),
                partition: tp.partition,
                offset: message.offset,
                key: message.key.clone(),
                value: message.value.clone(),
            };

            match handler.handle(record) {
                Verdict::Ack => {
                    ctx.subscriptions
                        .borrow_mut()
                        .record_consumed(tp.partition, message.offset);
                }
                Verdict::Pause => {
                    paused = true;
                    break;
                }
                Verdict::Stop => {
                    stopped = true;
                    break;
                }
            }
        }
    }

    if stopped {
        debug!("handler asked to stop consuming {}", tp);

        let _ = ctx.events
            .unbounded_send(GroupEvent::WorkerStopped(tp.partition));

        return WorkerStep::ok(Loop::Break(()));
    }

    // push a commit every K acknowledged messages; the periodic committer
    // covers the time axis
    let commit = if ctx.subscriptions.borrow().acked_since_commit(tp.partition) >=
                    ctx.config.commit_message_interval {
        commit_position(ctx.clone(), tp.partition)
    } else {
        StaticBoxFuture::ok(())
    };

    if paused {
        state.pauses += 1;

        // repeated pauses back off exponentially
        let factor = 1u32 << (state.pauses - 1).min(6);
        let pause = ctx.config.pause() * factor;
        let timer = ctx.timer.clone();

        commit
            .and_then(move |_| timer.sleep(pause).then(|_| Ok(Loop::Continue(state))))
            .static_boxed()
    } else {
        state.pauses = 0;

        commit.map(move |_| Loop::Continue(state)).static_boxed()
    }
}

/// Repositions per the reset policy after `OffsetOutOfRange` or a missing
/// initial offset.
fn reset_position<S>(ctx: Rc<WorkerContext<S>>, tp: TopicPartition, state: WorkerState) -> WorkerStep
    where S: CoordinationStore
{
    let offset = match ctx.config.offset_reset {
        OffsetReset::Earliest => FetchOffset::Earliest,
        OffsetReset::Latest => FetchOffset::Latest,
    };

    let seeker = ctx.clone();
    let topic_name = tp.topic_name.clone();

    ctx.client
        .list_offsets(vec![tp], offset)
        .then(move |result| {
                  match result {
                      Ok(offsets) => {
                          if let Some(partition_offsets) = offsets.get(&topic_name) {
                              for po in partition_offsets {
                                  seeker
                                      .subscriptions
                                      .borrow_mut()
                                      .seek(po.partition, po.offset);
                              }
                          }
                      }
                      Err(err) => warn!("offset reset failed, {}", err),
                  }

                  Ok(Loop::Continue(state))
              })
        .static_boxed()
}

/// Commits this partition's position, reporting a moved coordinator to the
/// group machinery instead of failing the worker.
fn commit_position<S>(ctx: Rc<WorkerContext<S>>, partition: PartitionId) -> StaticBoxFuture<()>
    where S: CoordinationStore
{
    let position = ctx.subscriptions
        .borrow()
        .committable()
        .into_iter()
        .find(|&(p, _)| p == partition)
        .map(|(_, offset)| offset);

    let offset: Offset = match position {
        Some(offset) => offset,
        None => return StaticBoxFuture::ok(()),
    };

    let entry = CommitEntry {
        tp: TopicPartition::new(ctx.config.topic_name.clone(), partition),
        offset: offset,
        metadata: Some(ctx.config.commit_metadata.clone().unwrap_or_default()),
    };

    let committed = ctx.clone();

    ctx.client
        .offset_commit(ctx.coordinator, ctx.config.group_id.clone(), vec![entry])
        .then(move |result| {
                  match result {
                      Ok(results) => {
                          for (tp, code) in results {
                              match code {
                                  KafkaCode::None => {
                                      committed
                                          .subscriptions
                                          .borrow_mut()
                                          .committed(tp.partition, offset);
                                  }
                                  KafkaCode::NotCoordinatorForConsumer => {
                                      let _ = committed
                                          .events
                                          .unbounded_send(GroupEvent::CoordinatorLost);
                                  }
                                  code => warn!("commit of {} rejected, {:?}", tp, code),
                              }
                          }
                      }
                      Err(err) => warn!("commit of partition {} failed, {}", partition, err),
                  }

                  Ok(())
              })
        .static_boxed()
}

fn backoff<S>(ctx: Rc<WorkerContext<S>>, state: WorkerState) -> WorkerStep
    where S: CoordinationStore
{
    let pause = ctx.client.config().retry_backoff();

    ctx.timer
        .sleep(pause)
        .then(|_| Ok(Loop::Continue(state)))
        .static_boxed()
}
