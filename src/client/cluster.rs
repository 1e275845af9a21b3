use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

use errors::{ErrorKind, Result};
use network::TopicPartition;
use protocol::{KafkaCode, NodeId, PartitionId};

/// A broker node as advertised by cluster metadata.
///
/// Identity is the `node_id`; `(host, port)` names the transport endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct Broker {
    node_id: NodeId,
    host: String,
    port: u16,
}

impl Broker {
    pub fn new<S: Into<String>>(node_id: NodeId, host: S, port: u16) -> Self {
        Broker {
            node_id: node_id,
            host: host.into(),
            port: port,
        }
    }

    pub fn id(&self) -> NodeId {
        self.node_id
    }

    pub fn as_ref(&self) -> BrokerRef {
        BrokerRef(self.node_id)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolves the advertised endpoint to a socket address.
    pub fn addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                            ErrorKind::Internal(format!("unresolvable broker address {}:{}",
                                                        self.host,
                                                        self.port))
                                    .into()
                        })
    }
}

impl fmt::Display for Broker {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{} @ {}:{}", self.node_id, self.host, self.port)
    }
}

/// A lightweight, copyable reference to a broker by node id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BrokerRef(NodeId);

impl BrokerRef {
    pub fn new(node_id: NodeId) -> Self {
        BrokerRef(node_id)
    }

    pub fn index(&self) -> NodeId {
        self.0
    }
}

impl From<NodeId> for BrokerRef {
    fn from(node_id: NodeId) -> Self {
        BrokerRef(node_id)
    }
}

/// Per-partition leadership view.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionInfo {
    pub partition_id: PartitionId,
    /// `None` while the cluster reports a leader-election error.
    pub leader: Option<BrokerRef>,
    pub replicas: Vec<NodeId>,
    pub isr: Vec<NodeId>,
    pub error: KafkaCode,
}

impl PartitionInfo {
    pub fn available(&self) -> bool {
        self.leader.is_some()
    }
}

/// Read access to the cluster topology.
pub trait Cluster {
    fn brokers(&self) -> &[Broker];

    fn find_broker(&self, broker: BrokerRef) -> Option<&Broker>;

    /// The current leader broker of a partition; `None` when the partition or
    /// its leader is unknown to the cached view.
    fn leader_for(&self, tp: &TopicPartition) -> Option<&Broker>;

    fn partitions_for(&self, topic_name: &str) -> Option<&[PartitionInfo]>;
}
