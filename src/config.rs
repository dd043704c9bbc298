use std::path::PathBuf;

use clap::ValueEnum;

pub const DEFAULT_BASE_URL: &str = "https://static-data.gaokao.cn/www/2.0";
pub const DEFAULT_WORKERS: usize = 200;
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;
/// Items per detail page, fixed by the remote API.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

pub const SCHOOL_LIST_FILE: &str = "school_list.json";
pub const SCHOOL_INFO_DIR: &str = "school_info";
pub const JOIN_TUPLE_FILE: &str = "ptb.txt";
pub const SCHOOL_DETAIL_DIR: &str = "school_detail";

/// Which join-tuple dimensions form the group key.
///
/// The remaining dimensions go into the per-group worklist. More key
/// dimensions mean more groups (more artifacts, more parallelism) and shorter
/// worklists; fewer key dimensions mean the opposite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum GroupSplit {
    /// `(entity, province)`: one artifact per school and province.
    #[default]
    EntityProvince,
    /// `(year, entity, province)`: maximal group count, tiny worklists,
    /// far too many output artifacts.
    YearEntityProvince,
    /// `(entity, year)`: few large groups, under-parallelized.
    EntityYear,
}

/// What to do with a join tuple already present in its group's worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DedupPolicy {
    /// Keep every tuple exactly as the source data repeats it.
    #[default]
    Keep,
    /// Drop repeated tuples within a group and count them.
    Drop,
}

#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub output_dir: PathBuf,
    pub base_url: String,
    /// Concurrent workers per stage.
    pub workers: usize,
    /// Capacity of every bounded stage queue.
    pub queue_capacity: usize,
    /// Enqueue only the first N items of every stage (0 = no limit).
    pub debug_limit: usize,
    pub page_size: u64,
    pub group_split: GroupSplit,
    pub dedup: DedupPolicy,
    pub show_progress: bool,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./harvest"),
            base_url: DEFAULT_BASE_URL.to_string(),
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            debug_limit: 0,
            page_size: DEFAULT_PAGE_SIZE,
            group_split: GroupSplit::default(),
            dedup: DedupPolicy::default(),
            show_progress: true,
        }
    }
}

impl HarvestConfig {
    pub fn school_list_path(&self) -> PathBuf {
        self.output_dir.join(SCHOOL_LIST_FILE)
    }

    pub fn school_info_dir(&self) -> PathBuf {
        self.output_dir.join(SCHOOL_INFO_DIR)
    }

    pub fn join_tuple_path(&self) -> PathBuf {
        self.output_dir.join(JOIN_TUPLE_FILE)
    }

    pub fn school_detail_dir(&self) -> PathBuf {
        self.output_dir.join(SCHOOL_DETAIL_DIR)
    }

    /// Applies the debug limit to a producer's item count.
    pub fn limited(&self, available: usize) -> usize {
        if self.debug_limit > 0 && self.debug_limit < available {
            self.debug_limit
        } else {
            available
        }
    }
}
