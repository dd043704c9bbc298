//! Runs the harvest stages in order, each one a full barrier for the next.

use std::fs;
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::SchoolApi;
use crate::collector::{Collector, JoinTupleSink, JsonArtifactSink, RecordSink};
use crate::config::HarvestConfig;
use crate::error::{HarvestError, Result};
use crate::grouping::load_groups;
use crate::models::{EntityInfoArtifact, GroupResult, SchoolListResponse};
use crate::pagination::PageCounters;
use crate::pool::{StageCounters, StageHandler, StageSnapshot, WorkerPool};
use crate::stages::{DetailHandler, DictionaryHandler, InfoHandler, Roster};

// ====== HARVEST STATISTICS ======

/// Counters shared with the workers of each stage.
#[derive(Debug, Default)]
pub struct HarvestStats {
    pub info: Arc<StageCounters>,
    pub dictionary: Arc<StageCounters>,
    pub detail: Arc<StageCounters>,
    pub pages: Arc<PageCounters>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub schools: usize,
    pub info: StageSnapshot,
    pub info_written: u64,
    pub dictionary: StageSnapshot,
    pub join_tuples_written: u64,
    pub groups: usize,
    pub duplicates_dropped: u64,
    pub detail: StageSnapshot,
    pub group_artifacts_written: u64,
    pub detail_page_attempts: u64,
    pub detail_page_failures: u64,
    pub short_results: u64,
}

impl HarvestSummary {
    fn absorb(&mut self, stats: &HarvestStats) {
        use std::sync::atomic::Ordering;

        self.info = stats.info.snapshot();
        self.dictionary = stats.dictionary.snapshot();
        self.detail = stats.detail.snapshot();
        self.detail_page_attempts = stats.pages.attempts.load(Ordering::Relaxed);
        self.detail_page_failures = stats.pages.failures.load(Ordering::Relaxed);
        self.short_results = stats.pages.short_results.load(Ordering::Relaxed);
    }

    pub fn log(&self) {
        info!("Final Harvest Statistics:");
        info!("  Schools listed: {}", self.schools);
        info!("  School info failed: {}/{}", self.info.failed, self.info.attempted);
        info!("  School info written: {}", self.info_written);
        info!("  School dictionary failed: {}/{}", self.dictionary.failed, self.dictionary.attempted);
        info!("  Join tuples written: {}", self.join_tuples_written);
        info!("  Detail groups: {} ({} duplicates dropped)", self.groups, self.duplicates_dropped);
        info!("  Detail groups without items: {}", self.detail.failed);
        info!("  Detail group artifacts written: {}", self.group_artifacts_written);
        info!("  Detail pages failed: {}/{}", self.detail_page_failures, self.detail_page_attempts);
        info!("  Detail tuples short of numFound: {}", self.short_results);
    }
}

// ====== HARVESTER ======
pub struct Harvester<A> {
    config: HarvestConfig,
    api: Arc<A>,
}

impl<A: SchoolApi> Harvester<A> {
    pub fn new(config: HarvestConfig, api: Arc<A>) -> Self {
        Self { config, api }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Runs every stage. A fatal error halts the pipeline at the stage that raised it.
    pub async fn run(&self) -> Result<HarvestSummary> {
        let stats = HarvestStats::default();
        let mut summary = HarvestSummary::default();

        match self.run_stages(&stats, &mut summary).await {
            Ok(()) => {
                summary.absorb(&stats);
                Ok(summary)
            }
            Err(e) => {
                summary.absorb(&stats);
                error!(error = %e, "harvest halted");
                summary.log();
                Err(e)
            }
        }
    }

    async fn run_stages(&self, stats: &HarvestStats, summary: &mut HarvestSummary) -> Result<()> {
        fs::create_dir_all(&self.config.output_dir)?;

        // 1. school list
        let roster = Arc::new(self.load_roster().await?);
        summary.schools = roster.len();
        let school_ids: Vec<String> = roster.schools().iter().map(|s| s.id.clone()).collect();

        // 2. school info, one artifact per school
        let info_sink = JsonArtifactSink::<EntityInfoArtifact>::create(&self.config.school_info_dir())?;
        let info_handler = InfoHandler {
            api: Arc::clone(&self.api),
            roster: Arc::clone(&roster),
        };
        summary.info_written = self
            .run_stage(
                "school_info",
                school_ids.clone(),
                Arc::new(info_handler),
                info_sink,
                Arc::clone(&stats.info),
            )
            .await?;

        // 3. dictionaries flattened into the join file
        let join_path = self.config.join_tuple_path();
        let dictionary_handler = DictionaryHandler {
            api: Arc::clone(&self.api),
        };
        summary.join_tuples_written = self
            .run_stage(
                "dictionary",
                school_ids,
                Arc::new(dictionary_handler),
                JoinTupleSink::create(&join_path)?,
                Arc::clone(&stats.dictionary),
            )
            .await?;

        // 4. the join file is closed, group it
        let index = load_groups(&join_path, self.config.group_split, self.config.dedup)?;
        summary.groups = index.len();
        summary.duplicates_dropped = index.duplicates_dropped;

        // 5. paginated detail per group
        let detail_sink = JsonArtifactSink::<GroupResult>::create(&self.config.school_detail_dir())?;
        let detail_handler = DetailHandler {
            api: Arc::clone(&self.api),
            roster,
            page_size: self.config.page_size,
            pages: Arc::clone(&stats.pages),
        };
        summary.group_artifacts_written = self
            .run_stage(
                "detail",
                index.into_groups(),
                Arc::new(detail_handler),
                detail_sink,
                Arc::clone(&stats.detail),
            )
            .await?;

        Ok(())
    }

    async fn load_roster(&self) -> Result<Roster> {
        let schools = self.api.school_list().await.map_err(|e| {
            error!(error = %e, "could not obtain the school list");
            e
        })?;

        let snapshot = SchoolListResponse { data: schools };
        let content = serde_json::to_vec_pretty(&snapshot).map_err(|source| HarvestError::Serialize {
            what: "school list".to_string(),
            source,
        })?;
        fs::write(self.config.school_list_path(), content)?;

        if snapshot.data.is_empty() {
            warn!("school list is empty");
        }
        info!("School list loaded: {} schools", snapshot.data.len());
        Ok(Roster::new(snapshot.data))
    }

    /// One stage: producer → worker pool → collector, fully drained before returning.
    async fn run_stage<H, S>(
        &self,
        stage: &'static str,
        inputs: Vec<H::Input>,
        handler: Arc<H>,
        sink: S,
        counters: Arc<StageCounters>,
    ) -> Result<u64>
    where
        H: StageHandler,
        S: RecordSink<Record = H::Output>,
    {
        let total = self.config.limited(inputs.len());
        info!(
            "Stage {}: {} items, {} workers",
            stage, total, self.config.workers
        );
        let progress = self.progress_bar(stage, total);

        let (input_tx, input_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let (output_tx, output_rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let collector = Collector::spawn(stage, sink, output_rx);
        let pool = WorkerPool::spawn(
            stage,
            self.config.workers,
            handler,
            input_rx,
            output_tx,
            counters,
            progress.clone(),
        );

        for (index, item) in inputs.into_iter().take(total).enumerate() {
            if input_tx.send(item).await.is_err() {
                warn!(stage, "input queue closed early, producer stopped");
                break;
            }
            if index % 100 == 0 {
                debug!("{}/{} {} items enqueued", index, total, stage);
            }
        }
        drop(input_tx);

        let pool_result = pool.join().await;
        let collector_result = collector.join().await;
        progress.finish_with_message(format!("{stage} done"));

        // a dead collector is the root cause of any send failure in the pool
        let written = collector_result?;
        pool_result?;
        info!("Stage {} complete: {} records written", stage, written);
        Ok(written)
    }

    fn progress_bar(&self, stage: &'static str, total: usize) -> ProgressBar {
        if !self.config.show_progress {
            return ProgressBar::hidden();
        }
        let progress = ProgressBar::new(total as u64);
        progress.set_style(
            ProgressStyle::with_template(
                "[{elapsed_precise}] {bar:50.cyan/blue} {pos:>7}/{len:7} {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message(stage);
        progress
    }
}
