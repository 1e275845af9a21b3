use std::cell::RefCell;
use std::collections::HashMap;
use std::mem;
use std::net::SocketAddr;
use std::rc::Rc;
use std::time::Duration;

use rand::{self, Rng};

use futures::{Future, Stream, future};
use futures::unsync::oneshot;

use tokio_core::reactor::Handle;
use tokio_service::Service;
use tokio_timer::Timer;

use errors::{Error, ErrorKind, Result};
use network::{KafkaRequest, KafkaResponse, ResponseBody, TopicPartition};
use protocol::{FetchOffset, FetchPartition, FetchRequest, FetchTopic, GenerationId,
               GroupCoordinatorRequest, HeartbeatRequest, JoinGroupMember, JoinGroupProtocol,
               JoinGroupRequest, KafkaCode, ListOffsetsPartition, ListOffsetsRequest,
               ListOffsetsTopic, Message, MessageSet, MetadataRequest, MetadataResponse, Offset,
               OffsetCommitPartition, OffsetCommitRequest, OffsetCommitTopic, OffsetFetchRequest,
               OffsetFetchTopic, PartitionId, ProducePartitionData, ProduceRequest,
               ProduceTopicData, RequiredAcks};
use client::{Broker, BrokerRef, ClientConfig, Cluster, InFlightMiddleware, KafkaService,
             LogMiddleware, Metadata, Metrics, StaticBoxFuture, TimeoutMiddleware,
             ToStaticBoxFuture};

/// A client of the Kafka cluster: metadata, produce, fetch, offsets and
/// group plumbing, all expressed against the cached topology view.
pub trait Client: 'static {
    /// The current metadata view; parks until the first load completes.
    fn metadata(&self) -> GetMetadata;

    /// Forces a metadata reload and resolves with the fresh view.
    fn load_metadata(&self) -> LoadMetadata;

    /// Sends one produce request to `leader`, covering every partition batch
    /// whose leader it is.  Resolves with an empty outcome list when
    /// `required_acks` is `None`.
    fn produce_batch(&self,
                     leader: BrokerRef,
                     required_acks: RequiredAcks,
                     ack_timeout: Duration,
                     batch: Vec<(TopicPartition, MessageSet)>)
                     -> ProduceBatch;

    /// Long-poll fetch from `leader` for the given partitions and offsets.
    fn fetch_records(&self,
                     leader: BrokerRef,
                     max_wait: Duration,
                     min_bytes: i32,
                     partitions: Vec<(TopicPartition, Offset, i32)>)
                     -> FetchRecords;

    /// Looks up log offsets (earliest/latest/by-time) for the partitions,
    /// routed to each partition's leader.
    fn list_offsets(&self, partitions: Vec<TopicPartition>, offset: FetchOffset) -> ListOffsets;

    /// Discovers the broker coordinating the consumer group.
    fn group_coordinator(&self, group_id: String) -> GroupCoordinator;

    fn offset_commit(&self,
                     coordinator: BrokerRef,
                     group_id: String,
                     offsets: Vec<CommitEntry>)
                     -> OffsetCommit;

    fn offset_fetch(&self,
                    coordinator: BrokerRef,
                    group_id: String,
                    partitions: Vec<TopicPartition>)
                    -> OffsetFetch;

    /// Native-protocol group join; offered for coordinator plugins that speak
    /// Kafka's own group protocol instead of an external store.
    fn join_group(&self,
                  coordinator: BrokerRef,
                  group_id: String,
                  session_timeout: Duration,
                  member_id: String,
                  protocol_type: String,
                  protocols: Vec<JoinGroupProtocol>)
                  -> JoinGroup;

    fn heartbeat(&self,
                 coordinator: BrokerRef,
                 group_id: String,
                 generation_id: GenerationId,
                 member_id: String)
                 -> Heartbeat;
}

pub type GetMetadata = StaticBoxFuture<Rc<Metadata>>;

pub type LoadMetadata = StaticBoxFuture<Rc<Metadata>>;

pub type ProduceBatch = StaticBoxFuture<Vec<ProducedPartition>>;

/// Per-partition outcome of a produce request.
#[derive(Clone, Debug)]
pub struct ProducedPartition {
    pub tp: TopicPartition,
    pub error: KafkaCode,
    /// Offset assigned to the first message of the partition's set.
    pub offset: Offset,
}

pub type FetchRecords = StaticBoxFuture<Vec<FetchedPartition>>;

/// Per-partition outcome of a fetch request.
#[derive(Clone, Debug)]
pub struct FetchedPartition {
    pub tp: TopicPartition,
    pub error: KafkaCode,
    pub highwater_mark_offset: Offset,
    pub messages: Vec<Message>,
}

pub type ListOffsets = StaticBoxFuture<HashMap<String, Vec<PartitionOffset>>>;

/// The offset found for a partition.
#[derive(Clone, Debug)]
pub struct PartitionOffset {
    pub partition: PartitionId,
    pub offset: Offset,
}

pub type GroupCoordinator = StaticBoxFuture<Broker>;

/// One partition's offset headed for an offset commit.
#[derive(Clone, Debug)]
pub struct CommitEntry {
    pub tp: TopicPartition,
    pub offset: Offset,
    pub metadata: Option<String>,
}

pub type CommittedOffset = (TopicPartition, KafkaCode);

pub type OffsetCommit = StaticBoxFuture<Vec<CommittedOffset>>;

/// A committed offset fetched back from the coordinator; `offset` is `-1`
/// with `UnknownTopicOrPartition` when the group never committed.
#[derive(Clone, Debug)]
pub struct FetchedOffset {
    pub tp: TopicPartition,
    pub offset: Offset,
    pub metadata: Option<String>,
    pub error: KafkaCode,
}

pub type OffsetFetch = StaticBoxFuture<Vec<FetchedOffset>>;

/// Membership granted by a native-protocol group join.
#[derive(Clone, Debug)]
pub struct JoinedGroup {
    pub group_id: String,
    pub generation_id: GenerationId,
    pub protocol: String,
    pub leader_id: String,
    pub member_id: String,
    pub members: Vec<JoinGroupMember>,
}

impl JoinedGroup {
    pub fn is_leader(&self) -> bool {
        self.leader_id == self.member_id
    }
}

pub type JoinGroup = StaticBoxFuture<JoinedGroup>;

pub type Heartbeat = StaticBoxFuture<()>;

/// The Kafka client; cheap to clone, every clone shares the connection
/// registry and metadata cache.
#[derive(Clone)]
pub struct KafkaClient {
    inner: Rc<Inner>,
}

struct Inner {
    config: ClientConfig,
    handle: Handle,
    service: InFlightMiddleware<LogMiddleware<TimeoutMiddleware<KafkaService>>>,
    timer: Timer,
    metrics: Option<Rc<Metrics>>,
    state: RefCell<State>,
}

#[derive(Default)]
struct State {
    metadata_status: MetadataStatus,
    last_metadata: Option<Rc<Metadata>>,
}

enum MetadataStatus {
    Loading(RefCell<Vec<oneshot::Sender<Rc<Metadata>>>>),
    Loaded(Rc<Metadata>),
}

impl Default for MetadataStatus {
    fn default() -> Self {
        MetadataStatus::Loading(RefCell::new(Vec::new()))
    }
}

impl State {
    fn metadata(&self) -> GetMetadata {
        let (sender, receiver) = oneshot::channel();

        match self.metadata_status {
            MetadataStatus::Loading(ref senders) => senders.borrow_mut().push(sender),
            MetadataStatus::Loaded(ref metadata) => drop(sender.send(metadata.clone())),
        }

        GetMetadata::new(receiver
                             .map_err(|_| ErrorKind::Canceled("load metadata canceled").into()))
    }

    fn refresh_metadata(&mut self) {
        if let MetadataStatus::Loaded(_) = self.metadata_status {
            self.metadata_status = MetadataStatus::default();
        }
    }

    fn update_metadata(&mut self, metadata: Rc<Metadata>) {
        self.last_metadata = Some(metadata.clone());

        let status = mem::replace(&mut self.metadata_status,
                                  MetadataStatus::Loaded(metadata.clone()));

        if let MetadataStatus::Loading(senders) = status {
            for sender in senders.into_inner() {
                drop(sender.send(metadata.clone()));
            }
        }
    }

    /// A failed load drops the parked waiters (they observe cancellation)
    /// and falls back to the last good view if there is one.
    fn abort_loading(&mut self) {
        let status = mem::replace(&mut self.metadata_status, MetadataStatus::default());

        if let MetadataStatus::Loading(senders) = status {
            drop(senders);
        }

        if let Some(metadata) = self.last_metadata.clone() {
            self.metadata_status = MetadataStatus::Loaded(metadata);
        }
    }
}

impl KafkaClient {
    pub fn from_config(config: ClientConfig, handle: Handle) -> KafkaClient {
        trace!("create client from config: {:?}", config);

        let metrics = if config.metrics {
            match Metrics::new() {
                Ok(metrics) => Some(Rc::new(metrics)),
                Err(err) => {
                    warn!("fail to register metrics, {}", err);
                    None
                }
            }
        } else {
            None
        };

        let timer = Timer::default();
        let service = InFlightMiddleware::new(
            LogMiddleware::new(
                TimeoutMiddleware::new(KafkaService::new(handle.clone(), metrics.clone()),
                                       timer.clone(),
                                       config.request_timeout())));

        let client = KafkaClient {
            inner: Rc::new(Inner {
                               config: config,
                               handle: handle.clone(),
                               service: service,
                               timer: timer,
                               metrics: metrics,
                               state: RefCell::new(State::default()),
                           }),
        };

        if client.inner.config.metadata_max_age > 0 {
            let refresher = client.clone();
            let interval = client
                .inner
                .timer
                .interval(client.inner.config.metadata_max_age());

            handle.spawn(interval
                             .map_err(|_| ())
                             .for_each(move |_| {
                                           refresher.refresh_metadata();
                                           Ok(())
                                       }));
        }

        client.refresh_metadata();

        client
    }

    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    pub fn timer(&self) -> Timer {
        self.inner.timer.clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> Option<Rc<Metrics>> {
        self.inner.metrics.clone()
    }

    /// Kicks off a background metadata reload.
    pub fn refresh_metadata(&self) {
        self.inner
            .handle
            .spawn(self.load_metadata()
                       .then(|result| {
                                 match result {
                                     Ok(metadata) => {
                                         trace!("loaded metadata of {} brokers, {} topics",
                                                metadata.brokers().len(),
                                                metadata.topics().len())
                                     }
                                     Err(err) => warn!("fail to load metadata, {}", err),
                                 }

                                 Ok(())
                             }));
    }
}

impl Client for KafkaClient {
    fn metadata(&self) -> GetMetadata {
        self.inner.state.borrow().metadata()
    }

    fn load_metadata(&self) -> LoadMetadata {
        let inner = self.inner.clone();

        self.inner.state.borrow_mut().refresh_metadata();

        self.inner
            .fetch_metadata()
            .then(move |result| match result {
                      Ok(response) => {
                let prev = inner.state.borrow().last_metadata.clone();
                let metadata = Rc::new(Metadata::update(prev.as_ref().map(|m| &**m), response));

                inner.state.borrow_mut().update_metadata(metadata.clone());

                Ok(metadata)
            }
                      Err(err) => {
                          inner.state.borrow_mut().abort_loading();

                          Err(err)
                      }
                  })
            .static_boxed()
    }

    fn produce_batch(&self,
                     leader: BrokerRef,
                     required_acks: RequiredAcks,
                     ack_timeout: Duration,
                     batch: Vec<(TopicPartition, MessageSet)>)
                     -> ProduceBatch {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| {
                          inner.produce_batch(&metadata, leader, required_acks, ack_timeout, batch)
                      })
            .static_boxed()
    }

    fn fetch_records(&self,
                     leader: BrokerRef,
                     max_wait: Duration,
                     min_bytes: i32,
                     partitions: Vec<(TopicPartition, Offset, i32)>)
                     -> FetchRecords {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| {
                          inner.fetch_records(&metadata, leader, max_wait, min_bytes, partitions)
                      })
            .static_boxed()
    }

    fn list_offsets(&self, partitions: Vec<TopicPartition>, offset: FetchOffset) -> ListOffsets {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| inner.list_offsets(&metadata, partitions, offset))
            .static_boxed()
    }

    fn group_coordinator(&self, group_id: String) -> GroupCoordinator {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| inner.group_coordinator(&metadata, group_id))
            .static_boxed()
    }

    fn offset_commit(&self,
                     coordinator: BrokerRef,
                     group_id: String,
                     offsets: Vec<CommitEntry>)
                     -> OffsetCommit {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| inner.offset_commit(&metadata, coordinator, group_id, offsets))
            .static_boxed()
    }

    fn offset_fetch(&self,
                    coordinator: BrokerRef,
                    group_id: String,
                    partitions: Vec<TopicPartition>)
                    -> OffsetFetch {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| {
                          inner.offset_fetch(&metadata, coordinator, group_id, partitions)
                      })
            .static_boxed()
    }

    fn join_group(&self,
                  coordinator: BrokerRef,
                  group_id: String,
                  session_timeout: Duration,
                  member_id: String,
                  protocol_type: String,
                  protocols: Vec<JoinGroupProtocol>)
                  -> JoinGroup {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| {
                          inner.join_group(&metadata,
                                           coordinator,
                                           group_id,
                                           session_timeout,
                                           member_id,
                                           protocol_type,
                                           protocols)
                      })
            .static_boxed()
    }

    fn heartbeat(&self,
                 coordinator: BrokerRef,
                 group_id: String,
                 generation_id: GenerationId,
                 member_id: String)
                 -> Heartbeat {
        let inner = self.inner.clone();

        self.metadata()
            .and_then(move |metadata| {
                          inner.heartbeat(&metadata, coordinator, group_id, generation_id, member_id)
                      })
            .static_boxed()
    }
}

impl Inner {
    fn client_id(&self) -> Option<String> {
        self.config.client_id.clone()
    }

    fn broker_addr(&self, metadata: &Metadata, broker: BrokerRef) -> Result<SocketAddr> {
        metadata
            .find_broker(broker)
            .ok_or_else(|| Error::from(ErrorKind::BrokerNotFound(broker)))
            .and_then(Broker::addr)
    }

    /// Choose the broker with the fewest outstanding requests; before any
    /// metadata is known, fall back to the first bootstrap host.
    fn least_loaded_broker(&self, metadata: &Metadata) -> Result<SocketAddr> {
        let mut brokers: Vec<&Broker> = metadata.brokers().iter().collect();

        rand::thread_rng().shuffle(&mut brokers);

        let mut found: Option<(SocketAddr, usize)> = None;

        for broker in brokers {
            let addr = match broker.addr() {
                Ok(addr) => addr,
                Err(err) => {
                    warn!("skipping unresolvable broker {}, {}", broker, err);
                    continue;
                }
            };

            match self.service.in_flight_requests(&addr).unwrap_or(0) {
                0 => {
                    trace!("found least loaded broker {} without in flight requests", broker);

                    return Ok(addr);
                }
                in_flight => {
                    if found.map_or(true, |(_, best)| in_flight < best) {
                        found = Some((addr, in_flight));
                    }
                }
            }
        }

        found
            .map(|(addr, _)| addr)
            .or_else(|| self.config.hosts.first().cloned())
            .ok_or_else(|| ErrorKind::KafkaError(KafkaCode::BrokerNotAvailable).into())
    }

    fn fetch_metadata(&self) -> StaticBoxFuture<MetadataResponse> {
        debug!("fetching cluster metadata from {} bootstrap hosts",
               self.config.hosts.len());

        if self.config.hosts.is_empty() {
            return ErrorKind::Internal("no bootstrap brokers configured".to_owned()).into();
        }

        let responses: Vec<_> = self.config
            .hosts
            .iter()
            .map(|&addr| {
                let request =
                    KafkaRequest::Metadata(MetadataRequest::new::<String>(self.client_id(), &[]));

                self.service
                    .call((addr, request))
                    .and_then(|response| match response {
                                  Some(KafkaResponse {
                                           body: ResponseBody::Metadata(response), ..
                                       }) => Ok(response),
                                  Some(response) => {
                                      bail!(ErrorKind::UnexpectedResponse(response.body.api_key()))
                                  }
                                  None => bail!(ErrorKind::ConnectionClosed),
                              })
            })
            .collect();

        future::select_ok(responses)
            .map(|(response, _)| response)
            .static_boxed()
    }

    fn produce_batch(&self,
                     metadata: &Metadata,
                     leader: BrokerRef,
                     required_acks: RequiredAcks,
                     ack_timeout: Duration,
                     batch: Vec<(TopicPartition, MessageSet)>)
                     -> ProduceBatch {
        let addr = match self.broker_addr(metadata, leader) {
            Ok(addr) => addr,
            Err(err) => return ProduceBatch::err(err),
        };

        let mut topics: HashMap<String, Vec<ProducePartitionData>> = HashMap::new();

        for (tp, message_set) in batch {
            topics
                .entry(tp.topic_name)
                .or_insert_with(Vec::new)
                .push(ProducePartitionData {
                          partition: tp.partition,
                          message_set: message_set,
                      });
        }

        let topics = topics
            .into_iter()
            .map(|(topic_name, partitions)| {
                     ProduceTopicData {
                         topic_name: topic_name,
                         partitions: partitions,
                     }
                 })
            .collect();

        let request = KafkaRequest::Produce(ProduceRequest::new(self.client_id(),
                                                                required_acks as i16,
                                                                ack_timeout.as_millis() as i32,
                                                                topics));

        self.service
            .call((addr, request))
            .and_then(|response| match response {
                None => Ok(Vec::new()),
                Some(KafkaResponse { body: ResponseBody::Produce(response), .. }) => {
                    Ok(response
                           .topics
                           .into_iter()
                           .flat_map(|topic| {
                        let topic_name = topic.topic_name;

                        topic
                            .partitions
                            .into_iter()
                            .map(move |partition| {
                                     ProducedPartition {
                                         tp: TopicPartition::new(topic_name.clone(),
                                                                 partition.partition),
                                         error: KafkaCode::from(partition.error_code),
                                         offset: partition.offset,
                                     }
                                 })
                    })
                           .collect())
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
            })
            .static_boxed()
    }

    fn fetch_records(&self,
                     metadata: &Metadata,
                     leader: BrokerRef,
                     max_wait: Duration,
                     min_bytes: i32,
                     partitions: Vec<(TopicPartition, Offset, i32)>)
                     -> FetchRecords {
        let addr = match self.broker_addr(metadata, leader) {
            Ok(addr) => addr,
            Err(err) => return FetchRecords::err(err),
        };

        let mut topics: HashMap<String, Vec<FetchPartition>> = HashMap::new();

        for (tp, fetch_offset, max_bytes) in partitions {
            topics
                .entry(tp.topic_name)
                .or_insert_with(Vec::new)
                .push(FetchPartition {
                          partition: tp.partition,
                          fetch_offset: fetch_offset,
                          max_bytes: max_bytes,
                      });
        }

        let topics = topics
            .into_iter()
            .map(|(topic_name, partitions)| {
                     FetchTopic {
                         topic_name: topic_name,
                         partitions: partitions,
                     }
                 })
            .collect();

        let request = KafkaRequest::Fetch(FetchRequest::new(self.client_id(),
                                                            max_wait.as_millis() as i32,
                                                            min_bytes,
                                                            topics));

        self.service
            .call((addr, request))
            .and_then(|response| match response {
                Some(KafkaResponse { body: ResponseBody::Fetch(response), .. }) => {
                    Ok(response
                           .topics
                           .into_iter()
                           .flat_map(|topic| {
                        let topic_name = topic.topic_name;

                        topic
                            .partitions
                            .into_iter()
                            .map(move |partition| {
                                     FetchedPartition {
                                         tp: TopicPartition::new(topic_name.clone(),
                                                                 partition.partition),
                                         error: KafkaCode::from(partition.error_code),
                                         highwater_mark_offset: partition.highwater_mark_offset,
                                         messages: partition.message_set.messages,
                                     }
                                 })
                    })
                           .collect())
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
                None => bail!(ErrorKind::ConnectionClosed),
            })
            .static_boxed()
    }

    fn list_offsets(&self,
                    metadata: &Metadata,
                    partitions: Vec<TopicPartition>,
                    offset: FetchOffset)
                    -> ListOffsets {
        // partitions are led by different brokers; one request per leader
        let mut by_broker: HashMap<SocketAddr, HashMap<String, Vec<PartitionId>>> = HashMap::new();

        for tp in partitions {
            let addr = match metadata.leader_for(&tp).map(Broker::addr) {
                Some(Ok(addr)) => addr,
                Some(Err(err)) => return ListOffsets::err(err),
                None => {
                    return ListOffsets::err(ErrorKind::LeaderNotAvailable(tp.topic_name.clone(),
                                                                          tp.partition)
                                                    .into())
                }
            };

            by_broker
                .entry(addr)
                .or_insert_with(HashMap::new)
                .entry(tp.topic_name)
                .or_insert_with(Vec::new)
                .push(tp.partition);
        }

        let responses: Vec<_> = by_broker
            .into_iter()
            .map(|(addr, topics)| {
                let topics = topics
                    .into_iter()
                    .map(|(topic_name, partitions)| {
                             ListOffsetsTopic {
                                 topic_name: topic_name,
                                 partitions: partitions
                                     .into_iter()
                                     .map(|partition| {
                                              ListOffsetsPartition::new(partition, offset)
                                          })
                                     .collect(),
                             }
                         })
                    .collect();

                let request =
                    KafkaRequest::ListOffsets(ListOffsetsRequest::new(self.client_id(), topics));

                self.service
                    .call((addr, request))
                    .and_then(|response| match response {
                        Some(KafkaResponse { body: ResponseBody::ListOffsets(response), .. }) => {
                            let mut offsets = Vec::new();

                            for (topic_name, partitions) in response.topics {
                                for partition in partitions {
                                    match KafkaCode::from(partition.error_code) {
                                        KafkaCode::None => {
                                            offsets.push((topic_name.clone(),
                                                          PartitionOffset {
                                                              partition: partition.partition,
                                                              offset:
                                                                  partition
                                                                      .offsets
                                                                      .first()
                                                                      .cloned()
                                                                      .unwrap_or(-1),
                                                          }));
                                        }
                                        code => bail!(ErrorKind::KafkaError(code)),
                                    }
                                }
                            }

                            Ok(offsets)
                        }
                        Some(response) => {
                            bail!(ErrorKind::UnexpectedResponse(response.body.api_key()))
                        }
                        None => bail!(ErrorKind::ConnectionClosed),
                    })
            })
            .collect();

        future::join_all(responses)
            .map(|responses| {
                     responses
                         .into_iter()
                         .flat_map(|offsets| offsets)
                         .fold(HashMap::new(), |mut all, (topic_name, offset)| {
                    all.entry(topic_name).or_insert_with(Vec::new).push(offset);
                    all
                })
                 })
            .static_boxed()
    }

    fn group_coordinator(&self, metadata: &Metadata, group_id: String) -> GroupCoordinator {
        debug!("discovering coordinator of group `{}`", group_id);

        let addr = match self.least_loaded_broker(metadata) {
            Ok(addr) => addr,
            Err(err) => return GroupCoordinator::err(err),
        };

        let request = KafkaRequest::GroupCoordinator(GroupCoordinatorRequest::new(self.client_id(),
                                                                                  group_id));

        self.service
            .call((addr, request))
            .and_then(|response| match response {
                Some(KafkaResponse { body: ResponseBody::GroupCoordinator(response), .. }) => {
                    match KafkaCode::from(response.error_code) {
                        KafkaCode::None => {
                            Ok(Broker::new(response.coordinator_id,
                                           response.coordinator_host.as_str(),
                                           response.coordinator_port as u16))
                        }
                        code => bail!(ErrorKind::KafkaError(code)),
                    }
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
                None => bail!(ErrorKind::ConnectionClosed),
            })
            .static_boxed()
    }

    fn offset_commit(&self,
                     metadata: &Metadata,
                     coordinator: BrokerRef,
                     group_id: String,
                     offsets: Vec<CommitEntry>)
                     -> OffsetCommit {
        let addr = match self.broker_addr(metadata, coordinator) {
            Ok(addr) => addr,
            Err(err) => return OffsetCommit::err(err),
        };

        let mut topics: HashMap<String, Vec<OffsetCommitPartition>> = HashMap::new();

        for entry in offsets {
            topics
                .entry(entry.tp.topic_name)
                .or_insert_with(Vec::new)
                .push(OffsetCommitPartition {
                          partition: entry.tp.partition,
                          offset: entry.offset,
                          metadata: entry.metadata,
                      });
        }

        let topics = topics
            .into_iter()
            .map(|(topic_name, partitions)| {
                     OffsetCommitTopic {
                         topic_name: topic_name,
                         partitions: partitions,
                     }
                 })
            .collect();

        let request = KafkaRequest::OffsetCommit(OffsetCommitRequest::new(self.client_id(),
                                                                          group_id,
                                                                          topics));

        self.service
            .call((addr, request))
            .and_then(|response| match response {
                Some(KafkaResponse { body: ResponseBody::OffsetCommit(response), .. }) => {
                    Ok(response
                           .topics
                           .into_iter()
                           .flat_map(|(topic_name, partitions)| {
                        partitions
                            .into_iter()
                            .map(move |(partition, error_code)| {
                                     (TopicPartition::new(topic_name.clone(), partition),
                                      KafkaCode::from(error_code))
                                 })
                    })
                           .collect())
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
                None => bail!(ErrorKind::ConnectionClosed),
            })
            .static_boxed()
    }

    fn offset_fetch(&self,
                    metadata: &Metadata,
                    coordinator: BrokerRef,
                    group_id: String,
                    partitions: Vec<TopicPartition>)
                    -> OffsetFetch {
        let addr = match self.broker_addr(metadata, coordinator) {
            Ok(addr) => addr,
            Err(err) => return OffsetFetch::err(err),
        };

        let mut topics: HashMap<String, Vec<PartitionId>> = HashMap::new();

        for tp in partitions {
            topics
                .entry(tp.topic_name)
                .or_insert_with(Vec::new)
                .push(tp.partition);
        }

        let topics = topics
            .into_iter()
            .map(|(topic_name, partitions)| {
                     OffsetFetchTopic {
                         topic_name: topic_name,
                         partitions: partitions,
                     }
                 })
            .collect();

        let request = KafkaRequest::OffsetFetch(OffsetFetchRequest::new(self.client_id(),
                                                                        group_id,
                                                                        topics));

        self.service
            .call((addr, request))
            .and_then(|response| match response {
                Some(KafkaResponse { body: ResponseBody::OffsetFetch(response), .. }) => {
                    Ok(response
                           .topics
                           .into_iter()
                           .flat_map(|(topic_name, partitions)| {
                        partitions
                            .into_iter()
                            .map(move |status| {
                                     FetchedOffset {
                                         tp: TopicPartition::new(topic_name.clone(),
                                                                 status.partition),
                                         offset: status.offset,
                                         metadata: status.metadata,
                                         error: KafkaCode::from(status.error_code),
                                     }
                                 })
                    })
                           .collect())
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
                None => bail!(ErrorKind::ConnectionClosed),
            })
            .static_boxed()
    }

    fn join_group(&self,
                  metadata: &Metadata,
                  coordinator: BrokerRef,
                  group_id: String,
                  session_timeout: Duration,
                  member_id: String,
                  protocol_type: String,
                  protocols: Vec<JoinGroupProtocol>)
                  -> JoinGroup {
        debug!("member `{}` joining group `{}`", member_id, group_id);

        let addr = match self.broker_addr(metadata, coordinator) {
            Ok(addr) => addr,
            Err(err) => return JoinGroup::err(err),
        };

        let joined_group_id = group_id.clone();
        let request = KafkaRequest::JoinGroup(JoinGroupRequest::new(self.client_id(),
                                                                    group_id,
                                                                    session_timeout.as_millis() as
                                                                    i32,
                                                                    member_id,
                                                                    protocol_type,
                                                                    protocols));

        self.service
            .call((addr, request))
            .and_then(move |response| match response {
                Some(KafkaResponse { body: ResponseBody::JoinGroup(response), .. }) => {
                    match KafkaCode::from(response.error_code) {
                        KafkaCode::None => {
                            Ok(JoinedGroup {
                                   group_id: joined_group_id,
                                   generation_id: response.generation_id,
                                   protocol: response.protocol,
                                   leader_id: response.leader_id,
                                   member_id: response.member_id,
                                   members: response.members,
                               })
                        }
                        code => bail!(ErrorKind::KafkaError(code)),
                    }
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
                None => bail!(ErrorKind::ConnectionClosed),
            })
            .static_boxed()
    }

    fn heartbeat(&self,
                 metadata: &Metadata,
                 coordinator: BrokerRef,
                 group_id: String,
                 generation_id: GenerationId,
                 member_id: String)
                 -> Heartbeat {
        let addr = match self.broker_addr(metadata, coordinator) {
            Ok(addr) => addr,
            Err(err) => return Heartbeat::err(err),
        };

        let request = KafkaRequest::Heartbeat(HeartbeatRequest::new(self.client_id(),
                                                                    group_id,
                                                                    generation_id,
                                                                    member_id));

        self.service
            .call((addr, request))
            .and_then(|response| match response {
                Some(KafkaResponse { body: ResponseBody::Heartbeat(response), .. }) => {
                    match KafkaCode::from(response.error_code) {
                        KafkaCode::None => Ok(()),
                        code => bail!(ErrorKind::KafkaError(code)),
                    }
                }
                Some(response) => bail!(ErrorKind::UnexpectedResponse(response.body.api_key())),
                None => bail!(ErrorKind::ConnectionClosed),
            })
            .static_boxed()
    }
}
