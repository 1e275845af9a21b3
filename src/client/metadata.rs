use std::collections::{HashMap, HashSet};

use network::TopicPartition;
use protocol::{KafkaCode, MetadataResponse, NodeId};
use client::{Broker, BrokerRef, Cluster, PartitionInfo};

/// An immutable snapshot of the cluster topology.
///
/// A broker disappears from the view only after it is absent from two
/// successive refreshes; a single missing metadata response must not unplug
/// an endpoint that still leads partitions.
#[derive(Clone, Debug, Default)]
pub struct Metadata {
    brokers: Vec<Broker>,
    /// Node ids that were missing from the response that built this view.
    fading: HashSet<NodeId>,
    topic_partitions: HashMap<String, Vec<PartitionInfo>>,
}

impl Metadata {
    /// Builds the next snapshot from a metadata response, carrying over
    /// brokers the previous view knew that this response omitted.
    pub fn update(prev: Option<&Metadata>, response: MetadataResponse) -> Metadata {
        let mut brokers: Vec<Broker> = response
            .brokers
            .iter()
            .map(|broker| Broker::new(broker.node_id, broker.host.as_str(), broker.port as u16))
            .collect();

        let seen: HashSet<NodeId> = brokers.iter().map(|broker| broker.id()).collect();
        let mut fading = HashSet::new();

        if let Some(prev) = prev {
            for broker in prev.brokers() {
                if !seen.contains(&broker.id()) && !prev.fading.contains(&broker.id()) {
                    debug!("broker {} absent from metadata, keeping once", broker);

                    fading.insert(broker.id());
                    brokers.push(broker.clone());
                }
            }
        }

        let topic_partitions = response
            .topics
            .into_iter()
            .map(|topic| {
                let mut partitions: Vec<PartitionInfo> = topic
                    .partitions
                    .into_iter()
                    .map(|partition| {
                        let error = KafkaCode::from(partition.error_code);
                        let leader = if partition.leader < 0 ||
                                        error == KafkaCode::LeaderNotAvailable {
                            None
                        } else {
                            Some(BrokerRef::new(partition.leader))
                        };

                        PartitionInfo {
                            partition_id: partition.partition_id,
                            leader: leader,
                            replicas: partition.replicas,
                            isr: partition.isr,
                            error: error,
                        }
                    })
                    .collect();

                partitions.sort_by_key(|partition| partition.partition_id);

                (topic.topic_name, partitions)
            })
            .collect();

        Metadata {
            brokers: brokers,
            fading: fading,
            topic_partitions: topic_partitions,
        }
    }

    pub fn topics(&self) -> &HashMap<String, Vec<PartitionInfo>> {
        &self.topic_partitions
    }
}

impl Cluster for Metadata {
    fn brokers(&self) -> &[Broker] {
        &self.brokers
    }

    fn find_broker(&self, broker: BrokerRef) -> Option<&Broker> {
        self.brokers
            .iter()
            .find(|candidate| candidate.id() == broker.index())
    }

    fn leader_for(&self, tp: &TopicPartition) -> Option<&Broker> {
        self.topic_partitions
            .get(&tp.topic_name)
            .and_then(|partitions| {
                          partitions
                              .iter()
                              .find(|partition| partition.partition_id == tp.partition)
                      })
            .and_then(|partition| partition.leader)
            .and_then(|leader| self.find_broker(leader))
    }

    fn partitions_for(&self, topic_name: &str) -> Option<&[PartitionInfo]> {
        self.topic_partitions
            .get(topic_name)
            .map(|partitions| &partitions[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{BrokerMetadata, PartitionMetadata, TopicMetadata};

    fn metadata_response() -> MetadataResponse {
        MetadataResponse {
            brokers: vec![BrokerMetadata {
                              node_id: 9092,
                              host: "192.168.0.1".to_owned(),
                              port: 9092,
                          }],
            topics: vec![TopicMetadata {
                             error_code: 0,
                             topic_name: "bar".to_owned(),
                             partitions: vec![PartitionMetadata {
                                                  error_code: 0,
                                                  partition_id: 0,
                                                  leader: 9092,
                                                  replicas: vec![9092],
                                                  isr: vec![9092],
                                              }],
                         }],
        }
    }

    #[test]
    fn test_leader_lookup() {
        let metadata = Metadata::update(None, metadata_response());

        let leader = metadata
            .leader_for(&TopicPartition::new("bar", 0))
            .expect("leader");

        assert_eq!(leader.id(), 9092);
        assert_eq!(leader.host(), "192.168.0.1");
        assert_eq!(leader.port(), 9092);
    }

    #[test]
    fn test_leader_lookup_misses() {
        let metadata = Metadata::update(None, metadata_response());

        // unknown topic
        assert!(metadata
                    .leader_for(&TopicPartition::new("nonexistent", 0))
                    .is_none());
        // unknown partition
        assert!(metadata.leader_for(&TopicPartition::new("bar", 9)).is_none());

        // leader under election
        let mut response = metadata_response();
        response.topics[0].partitions[0].leader = -1;

        let metadata = Metadata::update(None, response);

        assert!(metadata.leader_for(&TopicPartition::new("bar", 0)).is_none());

        // leader node id that no broker advertises
        let mut response = metadata_response();
        response.brokers.clear();

        let metadata = Metadata::update(None, response);

        assert!(metadata.leader_for(&TopicPartition::new("bar", 0)).is_none());
    }

    #[test]
    fn test_broker_survives_one_missing_refresh() {
        let first = Metadata::update(None, metadata_response());

        let mut omitted = metadata_response();
        omitted.brokers.clear();

        let second = Metadata::update(Some(&first), omitted);

        // still visible after one absence
        assert!(second.find_broker(BrokerRef::new(9092)).is_some());

        let mut omitted = metadata_response();
        omitted.brokers.clear();

        let third = Metadata::update(Some(&second), omitted);

        // gone after the second absence
        assert!(third.find_broker(BrokerRef::new(9092)).is_none());
    }
}
