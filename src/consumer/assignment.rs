use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};

use byteorder::BigEndian;

use nom::{IResult, be_i16, be_i32};

use errors::{ErrorKind, Result};
use protocol::{PartitionId, WriteExt, parse_string};

/// Deterministic round-robin: sorted partitions dealt over sorted member
/// ids.  Every member computes the same table from the same inputs, so only
/// the leader needs to publish it.
pub fn assign_round_robin(member_ids: &[String],
                          partitions: &[PartitionId])
                          -> HashMap<String, Vec<PartitionId>> {
    let mut members = member_ids.to_vec();
    members.sort();
    members.dedup();

    let mut assignments: HashMap<String, Vec<PartitionId>> = members
        .iter()
        .map(|member_id| (member_id.clone(), Vec::new()))
        .collect();

    if members.is_empty() {
        return assignments;
    }

    let mut partitions = partitions.to_vec();
    partitions.sort();

    for (index, partition) in partitions.into_iter().enumerate() {
        if let Some(owned) = assignments.get_mut(&members[index % members.len()]) {
            owned.push(partition);
        }
    }

    assignments
}

const ASSIGNMENT_VERSION: i16 = 0;

/// The assignment a leader publishes for one member, in the same wire idiom
/// as the broker protocol: version, topic, partition array.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberAssignment {
    pub topic_name: String,
    pub partitions: Vec<PartitionId>,
}

impl MemberAssignment {
    pub fn serialize(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);

        buf.put_i16::<BigEndian>(ASSIGNMENT_VERSION);
        buf.put_str::<BigEndian, String>(Some(&self.topic_name))?;
        buf.put_array::<BigEndian, _, _>(&self.partitions, |buf, &partition| {
            buf.put_i32::<BigEndian>(partition);
            Ok(())
        })?;

        Ok(buf.freeze())
    }

    pub fn deserialize(data: &[u8]) -> Result<MemberAssignment> {
        match parse_member_assignment(data) {
            IResult::Done(_, assignment) => Ok(assignment),
            IResult::Incomplete(_) => {
                bail!(ErrorKind::CodecError("truncated member assignment"))
            }
            IResult::Error(err) => Err(err.into()),
        }
    }
}

named!(parse_member_assignment<MemberAssignment>,
    do_parse!(
        _version: verify!(be_i16, |v: i16| v == ASSIGNMENT_VERSION)
     >> topic_name: parse_string
     >> partitions: length_count!(be_i32, be_i32)
     >> (MemberAssignment {
            topic_name: topic_name,
            partitions: partitions,
        })
    )
);

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn members(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| String::from(*id)).collect()
    }

    #[test]
    fn test_round_robin_assignment() {
        let assignments = assign_round_robin(&members(&["m1", "m2", "m3"]), &[0, 1, 2, 3]);

        assert_eq!(assignments["m1"], vec![0, 3]);
        assert_eq!(assignments["m2"], vec![1]);
        assert_eq!(assignments["m3"], vec![2]);
    }

    #[test]
    fn test_assignment_ignores_input_order() {
        let shuffled = assign_round_robin(&members(&["m3", "m1", "m2"]), &[3, 1, 0, 2]);
        let sorted = assign_round_robin(&members(&["m1", "m2", "m3"]), &[0, 1, 2, 3]);

        assert_eq!(shuffled, sorted);
    }

    #[test]
    fn test_assignment_is_exclusive_and_complete() {
        for member_count in 1..6 {
            let member_ids: Vec<String> =
                (0..member_count).map(|i| format!("m{}", i)).collect();
            let partitions: Vec<PartitionId> = (0..7).collect();

            let assignments = assign_round_robin(&member_ids, &partitions);

            let mut seen = HashSet::new();

            for owned in assignments.values() {
                for &partition in owned {
                    // no partition owned twice
                    assert!(seen.insert(partition));
                }
            }

            // the union covers the whole partition set
            assert_eq!(seen.len(), partitions.len());
        }
    }

    #[test]
    fn test_more_members_than_partitions() {
        let assignments = assign_round_robin(&members(&["m1", "m2", "m3"]), &[0]);

        assert_eq!(assignments["m1"], vec![0]);
        assert!(assignments["m2"].is_empty());
        assert!(assignments["m3"].is_empty());
    }

    #[test]
    fn test_no_members() {
        assert!(assign_round_robin(&[], &[0, 1]).is_empty());
    }

    #[test]
    fn test_member_assignment_wire_roundtrip() {
        let assignment = MemberAssignment {
            topic_name: "bar".to_owned(),
            partitions: vec![0, 3],
        };

        let data = assignment.serialize().unwrap();

        assert_eq!(&data[..],
                   &[0, 0,                      // version
                     0, 3, b'b', b'a', b'r',    // topic_name
                     0, 0, 0, 2,                // partitions
                     0, 0, 0, 0,
                     0, 0, 0, 3][..]);

        assert_eq!(MemberAssignment::deserialize(&data).unwrap(), assignment);
    }
}
