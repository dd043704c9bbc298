//! Collapses the flat join file into per-group worklists.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tracing::info;

use crate::config::{DedupPolicy, GroupSplit};
use crate::error::{HarvestError, Result};
use crate::models::JoinTuple;

/// Dimensions shared by every tuple of a group. Absent dimensions vary
/// within the group's worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKey {
    pub entity_id: i64,
    pub province_id: Option<i64>,
    pub year: Option<i32>,
}

impl GroupSplit {
    pub fn key_of(self, tuple: &JoinTuple) -> GroupKey {
        match self {
            GroupSplit::EntityProvince => GroupKey {
                entity_id: tuple.entity_id,
                province_id: Some(tuple.province_id),
                year: None,
            },
            GroupSplit::YearEntityProvince => GroupKey {
                entity_id: tuple.entity_id,
                province_id: Some(tuple.province_id),
                year: Some(tuple.year),
            },
            GroupSplit::EntityYear => GroupKey {
                entity_id: tuple.entity_id,
                province_id: None,
                year: Some(tuple.year),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: GroupKey,
    pub worklist: Vec<JoinTuple>,
}

impl Group {
    pub fn year_type_batches(&self) -> Vec<(i32, i64, i64)> {
        self.worklist
            .iter()
            .map(|t| (t.year, t.type_id, t.batch))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct GroupIndex {
    groups: BTreeMap<GroupKey, Vec<JoinTuple>>,
    pub tuples_read: u64,
    pub duplicates_dropped: u64,
}

impl GroupIndex {
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, key: &GroupKey) -> Option<&[JoinTuple]> {
        self.groups.get(key).map(Vec::as_slice)
    }

    /// Total worklist entries across all groups.
    pub fn worklist_total(&self) -> u64 {
        self.groups.values().map(|w| w.len() as u64).sum()
    }

    pub fn largest_worklist(&self) -> usize {
        self.groups.values().map(Vec::len).max().unwrap_or(0)
    }

    pub fn into_groups(self) -> Vec<Group> {
        self.groups
            .into_iter()
            .map(|(key, worklist)| Group { key, worklist })
            .collect()
    }
}

/// Builds the group index in one pass over `year,entity,province,type,batch` lines.
pub fn build_groups<R: BufRead>(reader: R, split: GroupSplit, dedup: DedupPolicy) -> Result<GroupIndex> {
    let mut index = GroupIndex::default();
    // the key dimensions are part of the tuple, so a repeat anywhere is a repeat within its group
    let mut seen: HashSet<JoinTuple> = HashSet::new();

    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tuple = JoinTuple::parse(&line).ok_or_else(|| HarvestError::MalformedJoinTuple {
            line: number + 1,
            content: line.clone(),
        })?;
        index.tuples_read += 1;

        if dedup == DedupPolicy::Drop && !seen.insert(tuple) {
            index.duplicates_dropped += 1;
            continue;
        }
        index.groups.entry(split.key_of(&tuple)).or_default().push(tuple);
    }

    Ok(index)
}

/// Reads the finished join file. A missing file is fatal.
pub fn load_groups(path: &Path, split: GroupSplit, dedup: DedupPolicy) -> Result<GroupIndex> {
    let file = File::open(path)?;
    let index = build_groups(BufReader::new(file), split, dedup)?;
    info!(
        "Detail groups: {} from {} join tuples ({:?}, largest worklist {}, {} duplicates dropped)",
        index.len(),
        index.tuples_read,
        split,
        index.largest_worklist(),
        index.duplicates_dropped
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    const SAMPLE: &str = "\
2020,102,10,1,7
2020,102,10,2,7
2021,102,10,1,7
2021,102,10,2,7
";

    fn build(content: &str, split: GroupSplit, dedup: DedupPolicy) -> Result<GroupIndex> {
        build_groups(Cursor::new(content.as_bytes()), split, dedup)
    }

    #[test]
    fn entity_province_collapses_years_types_batches() {
        let index = build(SAMPLE, GroupSplit::EntityProvince, DedupPolicy::Keep).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.tuples_read, 4);

        let groups = index.into_groups();
        assert_eq!(
            groups[0].key,
            GroupKey {
                entity_id: 102,
                province_id: Some(10),
                year: None
            }
        );
        assert_eq!(
            groups[0].year_type_batches(),
            vec![(2020, 1, 7), (2020, 2, 7), (2021, 1, 7), (2021, 2, 7)]
        );
    }

    #[test]
    fn splits_trade_group_count_against_worklist_length() {
        let content = format!("{SAMPLE}2020,102,11,1,7\n2020,103,10,1,7\n");
        let fine = build(&content, GroupSplit::YearEntityProvince, DedupPolicy::Keep).unwrap();
        let middle = build(&content, GroupSplit::EntityProvince, DedupPolicy::Keep).unwrap();
        let coarse = build(&content, GroupSplit::EntityYear, DedupPolicy::Keep).unwrap();

        assert_eq!(fine.len(), 4);
        assert_eq!(middle.len(), 3);
        assert_eq!(coarse.len(), 3);
        assert_eq!(fine.largest_worklist(), 2);
        assert_eq!(middle.largest_worklist(), 4);
        assert_eq!(coarse.largest_worklist(), 3);
    }

    #[test]
    fn duplicates_kept_or_dropped_by_policy() {
        let content = format!("{SAMPLE}2020,102,10,1,7\n2020,102,10,1,7\n");

        let kept = build(&content, GroupSplit::EntityProvince, DedupPolicy::Keep).unwrap();
        assert_eq!(kept.tuples_read, 6);
        assert_eq!(kept.worklist_total(), 6);
        assert_eq!(kept.duplicates_dropped, 0);

        let dropped = build(&content, GroupSplit::EntityProvince, DedupPolicy::Drop).unwrap();
        assert_eq!(dropped.tuples_read, 6);
        assert_eq!(dropped.worklist_total(), 4);
        assert_eq!(dropped.duplicates_dropped, 2);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let index = build("\n2020,102,10,1,7\n\n", GroupSplit::EntityProvince, DedupPolicy::Keep).unwrap();
        assert_eq!(index.tuples_read, 1);
    }

    #[test]
    fn truncated_line_is_fatal() {
        let err = build("2020,102,10,1,7\n2020,102,1", GroupSplit::EntityProvince, DedupPolicy::Keep)
            .unwrap_err();
        match err {
            HarvestError::MalformedJoinTuple { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_join_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_groups(
            &dir.path().join("ptb.txt"),
            GroupSplit::EntityProvince,
            DedupPolicy::Keep,
        )
        .unwrap_err();
        assert!(err.is_fatal());
    }

    fn arb_tuple() -> impl Strategy<Value = JoinTuple> {
        (2018..2024i32, 100..106i64, 10..14i64, 1..3i64, 6..9i64).prop_map(
            |(year, entity_id, province_id, type_id, batch)| JoinTuple {
                year,
                entity_id,
                province_id,
                type_id,
                batch,
            },
        )
    }

    fn arb_split() -> impl Strategy<Value = GroupSplit> {
        prop_oneof![
            Just(GroupSplit::EntityProvince),
            Just(GroupSplit::YearEntityProvince),
            Just(GroupSplit::EntityYear),
        ]
    }

    proptest! {
        #[test]
        fn every_tuple_lands_in_exactly_one_group(
            tuples in prop::collection::vec(arb_tuple(), 0..200),
            split in arb_split(),
        ) {
            let content: String = tuples.iter().map(|t| format!("{t}\n")).collect();
            let index = build(&content, split, DedupPolicy::Keep).unwrap();

            prop_assert_eq!(index.tuples_read, tuples.len() as u64);
            prop_assert_eq!(index.worklist_total(), tuples.len() as u64);
            for tuple in &tuples {
                let worklist = index.get(&split.key_of(tuple)).unwrap();
                prop_assert!(worklist.contains(tuple));
            }
            for group in index.into_groups() {
                for tuple in &group.worklist {
                    prop_assert_eq!(split.key_of(tuple), group.key);
                }
            }
        }

        #[test]
        fn dropping_duplicates_accounts_for_every_tuple(
            tuples in prop::collection::vec(arb_tuple(), 0..200),
        ) {
            let content: String = tuples.iter().map(|t| format!("{t}\n")).collect();
            let index = build(&content, GroupSplit::EntityProvince, DedupPolicy::Drop).unwrap();
            let unique: HashSet<JoinTuple> = tuples.iter().copied().collect();

            prop_assert_eq!(index.worklist_total(), unique.len() as u64);
            prop_assert_eq!(index.worklist_total() + index.duplicates_dropped, tuples.len() as u64);
        }
    }
}
