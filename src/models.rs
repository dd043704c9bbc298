use std::fmt;

use serde::{Deserialize, Serialize};

// ====== ROOT ENTITIES ======

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootEntity {
    #[serde(rename = "school_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolListResponse {
    pub data: Vec<RootEntity>,
}

// ====== ENTITY INFO ======

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchoolInfoResponse {
    pub data: EntityInfoRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualClass {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub school_id: Option<String>,
}

/// Flat descriptive record of one school. Every attribute is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityInfoRecord {
    pub school_id: Option<String>,
    pub name: Option<String>,
    pub old_name: Option<String>,
    pub address: Option<String>,
    pub belong: Option<String>,
    pub city_id: Option<String>,
    pub city_name: Option<String>,
    pub county_id: Option<String>,
    pub create_date: Option<String>,
    pub dual_class: Option<String>,
    pub dual_class_name: Option<String>,
    pub dualclass: Vec<DualClass>,
    pub f211: Option<String>,
    pub f985: Option<String>,
    pub level: Option<String>,
    pub level_name: Option<String>,
    pub nature_name: Option<String>,
    pub num_academician: Option<String>,
    pub num_doctor: Option<String>,
    pub num_doctor2: Option<String>,
    pub num_lab: Option<String>,
    pub num_library: Option<String>,
    pub num_master: Option<String>,
    pub num_master2: Option<String>,
    pub num_subject: Option<String>,
    pub phone: Option<String>,
    pub postcode: Option<String>,
    pub qs_rank: Option<String>,
    pub qs_world: Option<String>,
    pub ruanke_rank: Option<String>,
    /// Comma separated batch ids, e.g. `"7,14,36"`.
    pub school_batch: Option<String>,
    pub school_nature: Option<String>,
    pub school_nature_name: Option<String>,
    pub school_type: Option<String>,
    pub school_type_name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub type_name: Option<String>,
}

/// Info record as persisted: one artifact per school.
#[derive(Debug, Clone, Serialize)]
pub struct EntityInfoArtifact {
    pub school_id: String,
    pub school_name: String,
    pub info: EntityInfoRecord,
}

// ====== DICTIONARY ======

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryResponse {
    pub data: DictionaryData,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DictionaryData {
    #[serde(default)]
    pub data: Vec<DictionaryYear>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryYear {
    pub year: i32,
    #[serde(default)]
    pub province: Vec<ProvinceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvinceEntry {
    pub pid: i64,
    #[serde(rename = "type", default)]
    pub types: Vec<i64>,
    #[serde(rename = "batch", default)]
    pub batches: Vec<i64>,
}

// ====== JOIN TUPLES ======

/// One fetchable leaf request: `(year, entity, province, type, batch)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinTuple {
    pub year: i32,
    pub entity_id: i64,
    pub province_id: i64,
    pub type_id: i64,
    pub batch: i64,
}

impl JoinTuple {
    /// Parses one `year,entity,province,type,batch` line.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.trim().split(',').map(str::trim);
        let tuple = JoinTuple {
            year: fields.next()?.parse().ok()?,
            entity_id: fields.next()?.parse().ok()?,
            province_id: fields.next()?.parse().ok()?,
            type_id: fields.next()?.parse().ok()?,
            batch: fields.next()?.parse().ok()?,
        };
        if fields.next().is_some() {
            return None;
        }
        Some(tuple)
    }
}

impl fmt::Display for JoinTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.year, self.entity_id, self.province_id, self.type_id, self.batch
        )
    }
}

// ====== DETAIL PAGES ======

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailPageResponse {
    pub data: DetailPage,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetailPage {
    #[serde(rename = "numFound", default)]
    pub num_found: u64,
    #[serde(default)]
    pub item: Vec<DetailItem>,
}

/// One score/ranking entry of a major for a `(year, type, batch)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailItem {
    pub school_id: Option<String>,
    pub special_id: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub batch: Option<String>,
    pub zslx: Option<String>,
    pub zslx_name: Option<String>,
    pub max: Option<String>,
    pub min: Option<String>,
    pub average: Option<String>,
    pub min_section: Option<String>,
    pub province: Option<String>,
    pub spe_id: Option<String>,
    pub info: Option<String>,
    pub special_group: Option<String>,
    pub first_km: Option<String>,
    pub sp_type: Option<String>,
    pub sp_fxk: Option<String>,
    pub sp_sxk: Option<String>,
    pub sp_info: Option<String>,
    pub level1: Option<String>,
    pub level1_name: Option<String>,
    pub level2: Option<String>,
    pub level2_name: Option<String>,
    pub level3: Option<String>,
    pub level3_name: Option<String>,
    pub spname: Option<String>,
    pub local_batch_name: Option<String>,
    pub sg_fxk: Option<String>,
    pub sg_sxk: Option<String>,
    pub sg_type: Option<String>,
    pub sg_name: Option<String>,
    pub sg_info: Option<String>,
}

// ====== GROUP RESULTS ======

/// All items harvested for one worklist entry of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetailBucket {
    pub year: i32,
    pub province_id: i64,
    #[serde(rename = "type")]
    pub type_id: i64,
    pub batch: i64,
    pub items: Vec<DetailItem>,
}

/// Aggregate output artifact of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupResult {
    pub entity_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub province_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    pub year_type_batch_groups: Vec<DetailBucket>,
}

impl GroupResult {
    pub fn item_count(&self) -> usize {
        self.year_type_batch_groups
            .iter()
            .map(|bucket| bucket.items.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_tuple_line_format() {
        let tuple = JoinTuple {
            year: 2021,
            entity_id: 102,
            province_id: 11,
            type_id: 1,
            batch: 7,
        };
        let line = tuple.to_string();
        assert_eq!(line, "2021,102,11,1,7");
        assert_eq!(JoinTuple::parse(&line), Some(tuple));
    }

    #[test]
    fn join_tuple_rejects_wrong_arity_and_garbage() {
        assert_eq!(JoinTuple::parse("2021,102,11,1"), None);
        assert_eq!(JoinTuple::parse("2021,102,11,1,7,9"), None);
        assert_eq!(JoinTuple::parse("2021,abc,11,1,7"), None);
        assert_eq!(JoinTuple::parse(""), None);
    }

    #[test]
    fn dictionary_payload_decodes() {
        let body = r#"{"data":{"data":[
            {"year":2020,"province":[{"pid":10,"type":[1,2],"batch":[7]}]},
            {"year":2021,"province":[]}
        ]}}"#;
        let parsed: DictionaryResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.data.len(), 2);
        let entry = &parsed.data.data[0].province[0];
        assert_eq!(entry.pid, 10);
        assert_eq!(entry.types, vec![1, 2]);
        assert_eq!(entry.batches, vec![7]);
    }

    #[test]
    fn info_payload_tolerates_missing_attributes() {
        let body = r#"{"data":{"school_id":"102","name":"Some University","f211":"1"}}"#;
        let parsed: SchoolInfoResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.name.as_deref(), Some("Some University"));
        assert_eq!(parsed.data.f211.as_deref(), Some("1"));
        assert!(parsed.data.address.is_none());
        assert!(parsed.data.dualclass.is_empty());
    }

    #[test]
    fn detail_page_reads_num_found() {
        let body = r#"{"data":{"numFound":25,"item":[{"spname":"Physics","min":"601"}]}}"#;
        let parsed: DetailPageResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.data.num_found, 25);
        assert_eq!(parsed.data.item[0].spname.as_deref(), Some("Physics"));
    }

    #[test]
    fn group_result_omits_absent_key_dimensions() {
        let result = GroupResult {
            entity_id: 102,
            entity_name: None,
            province_id: Some(11),
            year: None,
            year_type_batch_groups: vec![],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["province_id"], 11);
        assert!(json.get("year").is_none());
        assert!(json.get("entity_name").is_none());
    }
}
