use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use gaokao_harvester::api::HttpSchoolApi;
use gaokao_harvester::config::{
    DEFAULT_BASE_URL, DEFAULT_PAGE_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS,
};
use gaokao_harvester::{DedupPolicy, GroupSplit, HarvestConfig, Harvester};

#[derive(Parser)]
#[command(name = "gaokao_harvester")]
#[command(about = "School admission score harvester")]
struct Cli {
    /// Output directory for the school list, info, join file and detail artifacts
    #[arg(short, long, default_value = "./harvest")]
    output_dir: PathBuf,

    /// Base URL of the static data API
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Concurrent workers per stage
    #[arg(short, long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Capacity of every stage queue
    #[arg(short, long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Only enqueue the first N items of each stage (0 = no limit)
    #[arg(short, long, default_value = "0")]
    debug_limit: usize,

    /// Items per detail page served by the API
    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: u64,

    /// Dimensions that form a detail group
    #[arg(long, value_enum, default_value_t = GroupSplit::EntityProvince)]
    group_split: GroupSplit,

    /// Handling of repeated join tuples within a group
    #[arg(long, value_enum, default_value_t = DedupPolicy::Keep)]
    dedup: DedupPolicy,

    /// Disable progress bars
    #[arg(long)]
    no_progress: bool,
}

impl From<Cli> for HarvestConfig {
    fn from(cli: Cli) -> Self {
        HarvestConfig {
            output_dir: cli.output_dir,
            base_url: cli.base_url,
            workers: cli.workers,
            queue_capacity: cli.queue_capacity,
            debug_limit: cli.debug_limit,
            page_size: cli.page_size,
            group_split: cli.group_split,
            dedup: cli.dedup,
            show_progress: !cli.no_progress,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = HarvestConfig::from(Cli::parse());

    info!(
        "Using {} workers per stage ({} cores available)",
        config.workers,
        num_cpus::get()
    );
    if config.debug_limit > 0 {
        warn!("Debug run: each stage enqueues at most {} items", config.debug_limit);
    }
    info!("Output directory: {}", config.output_dir.display());

    let api = Arc::new(HttpSchoolApi::new(&config.base_url)?);
    let harvester = Harvester::new(config, api);
    let summary = harvester.run().await?;

    summary.log();
    info!(
        "Harvest complete in: {}",
        harvester.config().output_dir.display()
    );

    Ok(())
}
