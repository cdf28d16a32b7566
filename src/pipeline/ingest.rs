// src/pipeline/ingest.rs

//! Ladder ingestion pipeline.

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{Config, LadderFilter};
use crate::rpc::Transport;
use crate::services::{EntityResolver, IngestReport, RaidCrawler};
use crate::storage::RaidStore;

/// Crawl the ladder and save every listed raid with its encounters and rosters.
///
/// Raids are processed in chunks of `crawler.batch_size`; each chunk is
/// crawled completely and then saved as one batch. An error aborts the run
/// after the chunks already saved.
pub async fn run_ingest(
    config: &Config,
    transport: &dyn Transport,
    store: &dyn RaidStore,
    filter: &LadderFilter,
    cancel: CancellationToken,
) -> Result<IngestReport> {
    let start_time = Utc::now();
    let crawler = RaidCrawler::new(transport, &config.crawler, cancel.clone());
    let resolver = EntityResolver::new(store, cancel);

    log::info!("Fetching ladder...");
    let ladder = crawler.fetch_ladder(filter).await?;
    log::info!("Ladder lists {} raids", ladder.len());

    let batch_size = config.crawler.batch_size.max(1);
    let chunks = ladder.len().div_ceil(batch_size);
    let mut report = IngestReport::default();

    for (index, chunk) in ladder.chunks(batch_size).enumerate() {
        log::info!(
            "Batch {}/{}: crawling {} raids",
            index + 1,
            chunks,
            chunk.len()
        );
        let batch = crawler.collect_batch(chunk.to_vec()).await?;
        log::debug!(
            "Batch {}/{}: {} encounters, {} roster lines",
            index + 1,
            chunks,
            batch.encounters.len(),
            batch.players.len()
        );

        let saved = resolver.save_batch(&batch).await?;
        report.merge(&saved);
    }

    let elapsed = Utc::now() - start_time;
    log::info!(
        "Ingest finished in {}s: {}",
        elapsed.num_seconds(),
        report
    );

    Ok(report)
}
