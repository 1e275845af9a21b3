use std::collections::HashMap;

use protocol::{Offset, PartitionId};

/// Per-partition consume progress for the current assignment.
///
/// `position` is the next offset to fetch; `committed` only ever moves
/// forward.
#[derive(Debug, Default)]
pub struct Subscriptions {
    partitions: HashMap<PartitionId, PartitionProgress>,
}

#[derive(Debug, Default)]
struct PartitionProgress {
    position: Option<Offset>,
    committed: Option<Offset>,
    acked_since_commit: usize,
}

impl Subscriptions {
    /// Replaces the assignment; all progress of the previous one is dropped
    /// (it was committed during the rebalance transition).
    pub fn assign(&mut self, partitions: &[PartitionId]) {
        self.partitions = partitions
            .iter()
            .map(|&partition| (partition, PartitionProgress::default()))
            .collect();
    }

    pub fn clear(&mut self) {
        self.partitions.clear();
    }

    pub fn partitions(&self) -> Vec<PartitionId> {
        let mut partitions: Vec<PartitionId> = self.partitions.keys().cloned().collect();
        partitions.sort();
        partitions
    }

    pub fn position(&self, partition: PartitionId) -> Option<Offset> {
        self.partitions
            .get(&partition)
            .and_then(|progress| progress.position)
    }

    /// Moves the fetch position, for offset-reset and resume-from-commit.
    pub fn seek(&mut self, partition: PartitionId, offset: Offset) {
        if let Some(progress) = self.partitions.get_mut(&partition) {
            progress.position = Some(offset);
        }
    }

    /// A message was delivered and acknowledged; the position advances past
    /// it.
    pub fn record_consumed(&mut self, partition: PartitionId, offset: Offset) {
        if let Some(progress) = self.partitions.get_mut(&partition) {
            progress.position = Some(offset + 1);
            progress.acked_since_commit += 1;
        }
    }

    pub fn acked_since_commit(&self, partition: PartitionId) -> usize {
        self.partitions
            .get(&partition)
            .map_or(0, |progress| progress.acked_since_commit)
    }

    /// Positions that have moved past their committed offset.
    pub fn committable(&self) -> Vec<(PartitionId, Offset)> {
        let mut committable: Vec<(PartitionId, Offset)> = self.partitions
            .iter()
            .filter_map(|(&partition, progress)| match (progress.position, progress.committed) {
                            (Some(position), Some(committed)) if position > committed => {
                                Some((partition, position))
                            }
                            (Some(position), None) => Some((partition, position)),
                            _ => None,
                        })
            .collect();

        committable.sort();
        committable
    }

    /// Records a successful commit; regressions are ignored so the committed
    /// offset stays monotonic.
    pub fn committed(&mut self, partition: PartitionId, offset: Offset) {
        if let Some(progress) = self.partitions.get_mut(&partition) {
            if progress.committed.map_or(true, |committed| offset > committed) {
                progress.committed = Some(offset);
            }

            progress.acked_since_commit = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_advance_with_consumption() {
        let mut subscriptions = Subscriptions::default();

        subscriptions.assign(&[0, 1]);
        subscriptions.seek(0, 100);
        subscriptions.seek(1, 5);

        assert_eq!(subscriptions.position(0), Some(100));

        subscriptions.record_consumed(0, 100);
        subscriptions.record_consumed(0, 101);

        assert_eq!(subscriptions.position(0), Some(102));
        assert_eq!(subscriptions.acked_since_commit(0), 2);
        assert_eq!(subscriptions.committable(), vec![(0, 102), (1, 5)]);
    }

    #[test]
    fn test_committed_offsets_are_monotonic() {
        let mut subscriptions = Subscriptions::default();

        subscriptions.assign(&[0]);
        subscriptions.seek(0, 0);
        subscriptions.record_consumed(0, 0);
        subscriptions.record_consumed(0, 1);

        subscriptions.committed(0, 2);

        assert!(subscriptions.committable().is_empty());

        // a stale commit acknowledgement cannot move the offset backwards
        subscriptions.committed(0, 1);

        assert!(subscriptions.committable().is_empty());
        assert_eq!(subscriptions.acked_since_commit(0), 0);
    }

    #[test]
    fn test_reassignment_drops_progress() {
        let mut subscriptions = Subscriptions::default();

        subscriptions.assign(&[0]);
        subscriptions.seek(0, 42);
        subscriptions.assign(&[1]);

        assert_eq!(subscriptions.position(0), None);
        assert_eq!(subscriptions.partitions(), vec![1]);
    }
}
