use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use futures::{Future, future};

use errors::{Error, ErrorKind};
use network::TopicPartition;
use protocol::{KafkaCode, MessageSet, Offset, RequiredAcks};
use client::{BrokerRef, Client, Cluster, KafkaClient, ProducedPartition, StaticBoxFuture,
             ToStaticBoxFuture};
use producer::{ProducerBatch, ProducerConfig, Thunk};

/// The future of a dispatched batch; resolves once every record in it has
/// been resolved, including retries.
pub type SendBatch = StaticBoxFuture<()>;

/// Dispatches closed batches to their leader brokers and drives the
/// per-partition retry policy:
///
///   * stale-metadata errors refresh the view and re-dispatch to the new
///     leader,
///   * `RequestTimedOut` re-dispatches without a refresh,
///   * anything else fails the partition's records back to their callers.
pub struct Sender {
    inner: Rc<SenderInner>,
}

struct SenderInner {
    client: KafkaClient,
    acks: RequiredAcks,
    ack_timeout: Duration,
    retry_backoff: Duration,
    max_retries: usize,
}

impl Sender {
    pub fn new(client: KafkaClient, config: &ProducerConfig) -> Self {
        let retry_backoff = client.config().retry_backoff();
        let max_retries = client.config().max_retries;

        Sender {
            inner: Rc::new(SenderInner {
                               client: client,
                               acks: config.acks,
                               ack_timeout: config.ack_timeout(),
                               retry_backoff: retry_backoff,
                               max_retries: max_retries,
                           }),
        }
    }

    pub fn send_batch(&self, leader: BrokerRef, batch: ProducerBatch) -> SendBatch {
        let (records, thunks, attempts) = batch.into_parts();

        dispatch(self.inner.clone(), leader, records, thunks, attempts)
    }
}

enum Outcome {
    Delivered(Offset),
    Retry,
    RetryAfterRefresh,
    Failed(KafkaCode),
}

fn dispatch(inner: Rc<SenderInner>,
            leader: BrokerRef,
            records: Vec<(TopicPartition, MessageSet)>,
            thunks: Vec<Thunk>,
            attempts: usize)
            -> SendBatch {
    trace!("dispatching batch of {} records to broker #{}, attempt {}",
           thunks.len(),
           leader.index(),
           attempts);

    let request_records = records.clone();
    let sender = inner.clone();

    inner
        .client
        .produce_batch(leader, inner.acks, inner.ack_timeout, request_records)
        .then(move |result| match result {
                  Ok(outcomes) => complete(sender, records, thunks, attempts, outcomes),
                  Err(err) => {
                      // transport failure; the business layer decides whether to retry
                      debug!("batch to broker #{} failed, {}", leader.index(), err);

                      for thunk in thunks {
                          thunk.fail(clone_error(&err));
                      }

                      SendBatch::ok(())
                  }
              })
        .static_boxed()
}

fn complete(inner: Rc<SenderInner>,
            records: Vec<(TopicPartition, MessageSet)>,
            thunks: Vec<Thunk>,
            attempts: usize,
            outcomes: Vec<ProducedPartition>)
            -> SendBatch {
    if inner.acks == RequiredAcks::None {
        for thunk in thunks {
            thunk.unacked();
        }

        return SendBatch::ok(());
    }

    let may_retry = attempts + 1 <= inner.max_retries;

    let classified: HashMap<TopicPartition, Outcome> = outcomes
        .into_iter()
        .map(|outcome| {
            let class = match outcome.error {
                KafkaCode::None => Outcome::Delivered(outcome.offset),
                code if code.needs_metadata_refresh() && may_retry => {
                    Outcome::RetryAfterRefresh
                }
                KafkaCode::RequestTimedOut if may_retry => Outcome::Retry,
                code => Outcome::Failed(code),
            };

            (outcome.tp, class)
        })
        .collect();

    let mut records_by_tp: HashMap<TopicPartition, MessageSet> = records.into_iter().collect();

    let mut needs_refresh = false;
    let mut retries: HashMap<TopicPartition, (MessageSet, Vec<Thunk>)> = HashMap::new();

    for thunk in thunks {
        match classified.get(thunk.tp()) {
            Some(&Outcome::Delivered(base_offset)) => thunk.done(base_offset),
            Some(&Outcome::Retry) |
            Some(&Outcome::RetryAfterRefresh) => {
                if let Some(&Outcome::RetryAfterRefresh) = classified.get(thunk.tp()) {
                    needs_refresh = true;
                }

                let tp = thunk.tp().clone();
                let message_set = records_by_tp.remove(&tp).unwrap_or_default();

                retries
                    .entry(tp)
                    .or_insert_with(|| (message_set, Vec::new()))
                    .1
                    .push(thunk);
            }
            Some(&Outcome::Failed(code)) => thunk.fail(ErrorKind::KafkaError(code).into()),
            None => {
                thunk.fail(ErrorKind::Internal("partition missing from produce response"
                                                   .to_owned())
                                   .into())
            }
        }
    }

    if retries.is_empty() {
        return SendBatch::ok(());
    }

    debug!("retrying {} partitions, attempt {} of {}",
           retries.len(),
           attempts + 1,
           inner.max_retries);

    let timer = inner.client.timer();
    let sender = inner.clone();

    timer
        .sleep(inner.retry_backoff)
        .map_err(|err| Error::from(ErrorKind::Internal(format!("timer error, {}", err))))
        .and_then(move |_| {
            let refreshed: StaticBoxFuture<()> = if needs_refresh {
                sender.client.load_metadata().map(|_| ()).static_boxed()
            } else {
                StaticBoxFuture::ok(())
            };

            let sender = sender.clone();

            refreshed.and_then(move |_| {
                let client = sender.client.clone();

                client
                    .metadata()
                    .and_then(move |metadata| {
                        let mut regrouped: HashMap<BrokerRef,
                                                   (Vec<(TopicPartition, MessageSet)>,
                                                    Vec<Thunk>)> = HashMap::new();

                        for (tp, (message_set, tp_thunks)) in retries {
                            match metadata.leader_for(&tp).map(|broker| broker.as_ref()) {
                                Some(new_leader) => {
                                    let entry = regrouped
                                        .entry(new_leader)
                                        .or_insert_with(|| (Vec::new(), Vec::new()));

                                    entry.0.push((tp, message_set));
                                    entry.1.extend(tp_thunks);
                                }
                                None => {
                                    for thunk in tp_thunks {
                                        thunk.fail(ErrorKind::LeaderNotAvailable(tp.topic_name
                                                                                     .clone(),
                                                                                 tp.partition)
                                                           .into());
                                    }
                                }
                            }
                        }

                        let batches: Vec<SendBatch> = regrouped
                            .into_iter()
                            .map(|(new_leader, (tp_records, tp_thunks))| {
                                     dispatch(sender.clone(),
                                              new_leader,
                                              tp_records,
                                              tp_thunks,
                                              attempts + 1)
                                 })
                            .collect();

                        future::join_all(batches).map(|_| ())
                    })
            })
        })
        .static_boxed()
}

/// Errors fan out to every record of a failed batch; keep the kind where it
/// matters to the caller's retry decision.
fn clone_error(err: &Error) -> Error {
    match *err.kind() {
        ErrorKind::ConnectionClosed => ErrorKind::ConnectionClosed.into(),
        ErrorKind::TimedOut => ErrorKind::TimedOut.into(),
        ErrorKind::KafkaError(code) => ErrorKind::KafkaError(code).into(),
        _ => ErrorKind::Internal(err.to_string()).into(),
    }
}
