//! Per-stage handlers plugged into the worker pool.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::SchoolApi;
use crate::collector::Artifact;
use crate::combination::combination;
use crate::error::{HarvestError, Result};
use crate::grouping::Group;
use crate::models::{
    DetailBucket, DictionaryData, EntityInfoArtifact, GroupResult, JoinTuple, RootEntity,
};
use crate::pagination::{fetch_all_pages, PageCounters};
use crate::pool::StageHandler;

/// The school list plus an id → name table. Built once, read-only afterwards.
#[derive(Debug, Default)]
pub struct Roster {
    schools: Vec<RootEntity>,
    names: HashMap<String, String>,
}

impl Roster {
    pub fn new(schools: Vec<RootEntity>) -> Self {
        let names = schools
            .iter()
            .map(|s| (s.id.clone(), s.name.clone()))
            .collect();
        Self { schools, names }
    }

    pub fn schools(&self) -> &[RootEntity] {
        &self.schools
    }

    pub fn len(&self) -> usize {
        self.schools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schools.is_empty()
    }

    pub fn name_of(&self, school_id: &str) -> Option<&str> {
        self.names.get(school_id).map(String::as_str)
    }
}

// ====== ENTITY INFO ======
pub struct InfoHandler<A> {
    pub api: Arc<A>,
    pub roster: Arc<Roster>,
}

#[async_trait]
impl<A: SchoolApi> StageHandler for InfoHandler<A> {
    type Input = String;
    type Output = EntityInfoArtifact;

    async fn handle(&self, school_id: String) -> Result<Vec<EntityInfoArtifact>> {
        let info = self.api.school_info(&school_id).await?;
        let school_name = self
            .roster
            .name_of(&school_id)
            .map(str::to_string)
            .or_else(|| info.name.clone())
            .unwrap_or_else(|| school_id.clone());
        Ok(vec![EntityInfoArtifact {
            school_id,
            school_name,
            info,
        }])
    }
}

// ====== DICTIONARY ======

/// One join tuple per `(year, province, type, batch)` of a school's dictionary.
pub fn expand_dictionary(entity_id: i64, dictionary: &DictionaryData) -> Vec<JoinTuple> {
    let mut tuples = Vec::new();
    for year in &dictionary.data {
        for province in &year.province {
            for (type_id, batch) in combination(&province.types, &province.batches) {
                tuples.push(JoinTuple {
                    year: year.year,
                    entity_id,
                    province_id: province.pid,
                    type_id,
                    batch,
                });
            }
        }
    }
    tuples
}

pub struct DictionaryHandler<A> {
    pub api: Arc<A>,
}

#[async_trait]
impl<A: SchoolApi> StageHandler for DictionaryHandler<A> {
    type Input = String;
    type Output = JoinTuple;

    async fn handle(&self, school_id: String) -> Result<Vec<JoinTuple>> {
        let entity_id: i64 = school_id
            .parse()
            .map_err(|_| HarvestError::InvalidEntityId {
                id: school_id.clone(),
            })?;
        let dictionary = self.api.dictionary(&school_id).await?;
        Ok(expand_dictionary(entity_id, &dictionary))
    }
}

// ====== DETAIL ======
pub struct DetailHandler<A> {
    pub api: Arc<A>,
    pub roster: Arc<Roster>,
    pub page_size: u64,
    pub pages: Arc<PageCounters>,
}

#[async_trait]
impl<A: SchoolApi> StageHandler for DetailHandler<A> {
    type Input = Group;
    type Output = GroupResult;

    async fn handle(&self, group: Group) -> Result<Vec<GroupResult>> {
        let mut buckets = Vec::with_capacity(group.worklist.len());
        for tuple in &group.worklist {
            let items = fetch_all_pages(self.api.as_ref(), tuple, self.page_size, &self.pages).await?;
            if items.is_empty() {
                continue;
            }
            buckets.push(DetailBucket {
                year: tuple.year,
                province_id: tuple.province_id,
                type_id: tuple.type_id,
                batch: tuple.batch,
                items,
            });
        }

        let result = GroupResult {
            entity_id: group.key.entity_id,
            entity_name: self
                .roster
                .name_of(&group.key.entity_id.to_string())
                .map(str::to_string),
            province_id: group.key.province_id,
            year: group.key.year,
            year_type_batch_groups: buckets,
        };
        if result.year_type_batch_groups.is_empty() {
            return Err(HarvestError::EmptyGroup {
                group: result.artifact_stem(),
            });
        }
        Ok(vec![result])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DictionaryYear, ProvinceEntry};

    #[test]
    fn dictionary_expands_to_full_product() {
        let dictionary = DictionaryData {
            data: vec![
                DictionaryYear {
                    year: 2020,
                    province: vec![ProvinceEntry {
                        pid: 10,
                        types: vec![1, 2],
                        batches: vec![7],
                    }],
                },
                DictionaryYear {
                    year: 2021,
                    province: vec![
                        ProvinceEntry {
                            pid: 10,
                            types: vec![1, 2],
                            batches: vec![7],
                        },
                        ProvinceEntry {
                            pid: 11,
                            types: vec![],
                            batches: vec![7, 8],
                        },
                    ],
                },
            ],
        };

        let lines: Vec<String> = expand_dictionary(102, &dictionary)
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            lines,
            vec![
                "2020,102,10,1,7",
                "2020,102,10,2,7",
                "2021,102,10,1,7",
                "2021,102,10,2,7",
            ]
        );
    }

    #[test]
    fn roster_looks_up_names() {
        let roster = Roster::new(vec![RootEntity {
            id: "102".into(),
            name: "North University".into(),
        }]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.name_of("102"), Some("North University"));
        assert_eq!(roster.name_of("999"), None);
    }
}
