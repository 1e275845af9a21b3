use std::cell::Cell;
use std::hash::Hasher;

use twox_hash::XxHash;

use client::PartitionInfo;
use protocol::PartitionId;

/// Picks the partition a record lands in.
///
/// Callers resolve an explicit `partition` on the record before consulting
/// the partitioner; implementations only see keyed and keyless records.
pub trait Partitioner {
    /// `None` when the topic has no usable partition at all.
    fn partition(&self,
                 topic_name: &str,
                 key: Option<&[u8]>,
                 partitions: &[PartitionInfo])
                 -> Option<PartitionId>;
}

/// The murmur2 hash exactly as Kafka's Java client computes it, so keyed
/// records land on the same partitions as records produced by Java
/// applications.
pub fn murmur2(data: &[u8]) -> u32 {
    const SEED: u32 = 0x9747_b28c;
    const M: u32 = 0x5bd1_e995;
    const R: u32 = 24;

    let len = data.len();
    let mut h = SEED ^ len as u32;

    let blocks = len / 4;

    for i in 0..blocks {
        let i4 = i * 4;
        let mut k = u32::from(data[i4]) | u32::from(data[i4 + 1]) << 8 |
                    u32::from(data[i4 + 2]) << 16 |
                    u32::from(data[i4 + 3]) << 24;

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);
        h = h.wrapping_mul(M);
        h ^= k;
    }

    let tail = blocks * 4;

    if len % 4 == 3 {
        h ^= u32::from(data[tail + 2]) << 16;
    }
    if len % 4 >= 2 {
        h ^= u32::from(data[tail + 1]) << 8;
    }
    if len % 4 >= 1 {
        h ^= u32::from(data[tail]);
        h = h.wrapping_mul(M);
    }

    h ^= h >> 13;
    h = h.wrapping_mul(M);
    h ^= h >> 15;

    h
}

/// Default partitioner: murmur2 over the key with the sign bit cleared, then
/// modulo the partition count; keyless records round-robin over the
/// partitions that currently have a leader.
#[derive(Debug, Default)]
pub struct Murmur2Partitioner {
    next: Cell<usize>,
}

impl Murmur2Partitioner {
    fn round_robin(&self, partitions: &[PartitionInfo]) -> Option<PartitionId> {
        round_robin(&self.next, partitions)
    }
}

impl Partitioner for Murmur2Partitioner {
    fn partition(&self,
                 _topic_name: &str,
                 key: Option<&[u8]>,
                 partitions: &[PartitionInfo])
                 -> Option<PartitionId> {
        if partitions.is_empty() {
            return None;
        }

        match key {
            Some(key) => {
                let index = (murmur2(key) & 0x7fff_ffff) as usize % partitions.len();

                Some(partitions[index].partition_id)
            }
            None => self.round_robin(partitions),
        }
    }
}

/// Alternative partitioner hashing keys with xxHash; faster than murmur2 but
/// incompatible with Java clients' placement.
#[derive(Debug, Default)]
pub struct XxHashPartitioner {
    next: Cell<usize>,
}

impl Partitioner for XxHashPartitioner {
    fn partition(&self,
                 _topic_name: &str,
                 key: Option<&[u8]>,
                 partitions: &[PartitionInfo])
                 -> Option<PartitionId> {
        if partitions.is_empty() {
            return None;
        }

        match key {
            Some(key) => {
                let mut hasher = XxHash::with_seed(0);
                hasher.write(key);

                let index = (hasher.finish() % partitions.len() as u64) as usize;

                Some(partitions[index].partition_id)
            }
            None => round_robin(&self.next, partitions),
        }
    }
}

fn round_robin(next: &Cell<usize>, partitions: &[PartitionInfo]) -> Option<PartitionId> {
    let n = next.get();
    next.set(n.wrapping_add(1));

    let available: Vec<&PartitionInfo> =
        partitions.iter().filter(|p| p.available()).collect();

    if available.is_empty() {
        Some(partitions[n % partitions.len()].partition_id)
    } else {
        Some(available[n % available.len()].partition_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use client::BrokerRef;
    use protocol::KafkaCode;

    fn partitions(count: PartitionId) -> Vec<PartitionInfo> {
        (0..count)
            .map(|partition_id| {
                     PartitionInfo {
                         partition_id: partition_id,
                         leader: Some(BrokerRef::new(1)),
                         replicas: vec![1],
                         isr: vec![1],
                         error: KafkaCode::None,
                     }
                 })
            .collect()
    }

    #[test]
    fn test_murmur2_reference_values() {
        // cross-checked against org.apache.kafka.common.utils.Utils.murmur2
        assert_eq!(murmur2(b""), 0x106e_08d9);
        assert_eq!(murmur2(b"key"), 0xbfa1_76a9);
        assert_eq!(murmur2(b"foo"), 0x23a2_56d0);
        assert_eq!(murmur2(b"hello-kafka"), 0xdfc3_8e17);
    }

    #[test]
    fn test_keyed_placement_is_stable() {
        let partitioner = Murmur2Partitioner::default();
        let partitions = partitions(4);

        // (murmur2(key) & 0x7fffffff) % 4
        assert_eq!(partitioner.partition("t", Some(b"key"), &partitions), Some(1));
        assert_eq!(partitioner.partition("t", Some(b"foo"), &partitions), Some(0));
        assert_eq!(partitioner.partition("t", Some(b"bar"), &partitions), Some(1));
        assert_eq!(partitioner.partition("t", Some(b"baz"), &partitions), Some(0));

        for _ in 0..10 {
            assert_eq!(partitioner.partition("t", Some(b"key"), &partitions), Some(1));
        }
    }

    #[test]
    fn test_keyless_round_robin() {
        let partitioner = Murmur2Partitioner::default();
        let partitions = partitions(3);

        let picked: Vec<Option<PartitionId>> = (0..6)
            .map(|_| partitioner.partition("t", None, &partitions))
            .collect();

        assert_eq!(picked,
                   vec![Some(0), Some(1), Some(2), Some(0), Some(1), Some(2)]);
    }

    #[test]
    fn test_round_robin_skips_leaderless_partitions() {
        let partitioner = Murmur2Partitioner::default();

        let mut partitions = partitions(3);
        partitions[1].leader = None;

        let picked: Vec<Option<PartitionId>> = (0..4)
            .map(|_| partitioner.partition("t", None, &partitions))
            .collect();

        assert_eq!(picked, vec![Some(0), Some(2), Some(0), Some(2)]);
    }

    #[test]
    fn test_no_partitions() {
        let partitioner = Murmur2Partitioner::default();

        assert_eq!(partitioner.partition("t", Some(b"key"), &[]), None);
        assert_eq!(partitioner.partition("t", None, &[]), None);
    }
}
