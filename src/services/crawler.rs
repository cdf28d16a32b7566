// src/services/crawler.rs

//! Paginated crawler over the panel's list methods.
//!
//! Pages are requested with `{page, start, limit}` merged into the resource
//! selector. A crawl ends on the first page shorter than `limit` or on a
//! reply without a result.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{
    CrawlerConfig, EncounterRecord, LadderFilter, PlayerEncounterRecord, RaidBatch, RaidRecord,
};
use crate::rpc::{Page, Transport, methods};
use crate::utils::{parse_epoch, parse_field, parse_text};

/// Service for crawling ladder entries, encounters and rosters.
pub struct RaidCrawler<'a> {
    transport: &'a dyn Transport,
    config: CrawlerConfig,
    cancel: CancellationToken,
}

impl<'a> RaidCrawler<'a> {
    /// Create a new crawler over the given transport.
    pub fn new(
        transport: &'a dyn Transport,
        config: &CrawlerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            config: config.clone(),
            cancel,
        }
    }

    /// Fetch ladder entries matching `filter`.
    pub async fn fetch_ladder(&self, filter: &LadderFilter) -> Result<Vec<RaidRecord>> {
        let selector = serde_json::to_value(filter)?;
        self.paginate(
            methods::LADDER,
            &selector,
            self.config.max_ladder_pages,
            Duration::ZERO,
        )
        .await
    }

    /// Fetch every encounter of one raid.
    pub async fn fetch_encounters(&self, raid_id: &str) -> Result<Vec<EncounterRecord>> {
        let selector = json!({ "raidId": raid_id });
        let encounters: Vec<EncounterRecord> = self
            .paginate(methods::RAID_ENCOUNTERS, &selector, None, Duration::ZERO)
            .await?;
        Ok(encounters
            .into_iter()
            .filter_map(|mut encounter| {
                claim_for_raid(raid_id, &mut encounter.raid_id, "encounter").then_some(encounter)
            })
            .collect())
    }

    /// Fetch the roster of one encounter.
    ///
    /// The upstream scopes rosters per raid, so lines from other encounters
    /// of the same raid are dropped here.
    pub async fn fetch_roster(
        &self,
        raid_id: &str,
        encounter_entry: i32,
        start_time: i64,
    ) -> Result<Vec<PlayerEncounterRecord>> {
        let selector = json!({
            "raidId": raid_id,
            "encounterEntry": encounter_entry.to_string(),
            "startTime": start_time.to_string(),
        });
        let delay = Duration::from_millis(self.config.roster_delay_ms);
        let lines: Vec<PlayerEncounterRecord> = self
            .paginate(methods::ENCOUNTER_PLAYERS, &selector, None, delay)
            .await?;

        let total = lines.len();
        let roster: Vec<_> = lines
            .into_iter()
            .filter_map(|mut line| {
                claim_for_raid(raid_id, &mut line.raid_id, "roster line").then_some(line)
            })
            .filter(|line| line.belongs_to(encounter_entry, start_time))
            .collect();
        if roster.len() < total {
            log::debug!(
                "Roster for raid {} entry {}: kept {} of {} lines",
                raid_id,
                encounter_entry,
                roster.len(),
                total
            );
        }
        Ok(roster)
    }

    /// Crawl encounters and rosters for the given ladder entries.
    ///
    /// Entries or encounters without a usable key are passed through for the
    /// resolver to report; nothing is fetched for them.
    pub async fn collect_batch(&self, raids: Vec<RaidRecord>) -> Result<RaidBatch> {
        let mut batch = RaidBatch::default();

        for raid in &raids {
            let Some(raid_id) = parse_text(raid.raid_id.as_deref()) else {
                continue;
            };

            let encounters = self.fetch_encounters(&raid_id).await?;
            log::debug!("Raid {}: {} encounters", raid_id, encounters.len());

            for encounter in &encounters {
                let key = parse_field::<i32>(
                    "encounter",
                    "encounterEntry",
                    encounter.encounter_entry.as_deref(),
                )
                .and_then(|entry| {
                    parse_epoch("encounter", "startTime", encounter.start_time.as_deref())
                        .map(|start| (entry, start.timestamp()))
                });
                let (entry, start) = match key {
                    Ok(key) => key,
                    Err(error) => {
                        log::warn!("Raid {}: not fetching roster: {}", raid_id, error);
                        continue;
                    }
                };

                let roster = self.fetch_roster(&raid_id, entry, start).await?;
                batch.players.extend(roster);
            }

            batch.encounters.extend(encounters);
        }

        batch.raids = raids;
        Ok(batch)
    }

    async fn paginate<T: DeserializeOwned>(
        &self,
        method: &str,
        selector: &Value,
        max_pages: Option<usize>,
        delay: Duration,
    ) -> Result<Vec<T>> {
        let limit = self.config.page_limit;
        let mut records = Vec::new();

        for page in 1.. {
            self.checkpoint()?;

            let payload = page_payload(selector, page, limit);
            let Some(result) = self.transport.call(method, payload).await? else {
                log::debug!("{} page {}: no result, done", method, page);
                break;
            };

            let page_data: Page<T> = serde_json::from_value(result)?;
            let fetched = page_data.data.len();
            records.extend(page_data.data);
            log::debug!("{} page {}: {} records", method, page, fetched);

            if !delay.is_zero() {
                self.pause(delay).await?;
            }

            if fetched < limit {
                break;
            }
            if max_pages.is_some_and(|max| page >= max) {
                log::info!("{} stopped at page cap {}", method, page);
                break;
            }
        }

        Ok(records)
    }

    fn checkpoint(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }
        Ok(())
    }

    async fn pause(&self, delay: Duration) -> Result<()> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Stamp a record fetched for `raid_id` with that raid when the reply left it out.
///
/// Returns `false` for a record that names a different raid.
fn claim_for_raid(raid_id: &str, field: &mut Option<String>, kind: &str) -> bool {
    match parse_text(field.as_deref()) {
        None => {
            *field = Some(raid_id.to_string());
            true
        }
        Some(other) if other == raid_id => true,
        Some(other) => {
            log::warn!(
                "Dropping {} of raid {} returned for raid {}",
                kind,
                other,
                raid_id
            );
            false
        }
    }
}

/// Merge paging fields into a resource selector.
fn page_payload(selector: &Value, page: usize, limit: usize) -> Value {
    let mut payload: Map<String, Value> = selector.as_object().cloned().unwrap_or_default();
    payload.insert("page".into(), json!(page));
    payload.insert("start".into(), json!((page - 1) * limit));
    payload.insert("limit".into(), json!(limit));
    Value::Object(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::fake::FakeTransport;

    fn config(limit: usize) -> CrawlerConfig {
        CrawlerConfig {
            page_limit: limit,
            roster_delay_ms: 0,
            ..CrawlerConfig::default()
        }
    }

    fn ladder_rows(count: usize) -> Vec<Value> {
        (0..count)
            .map(|i| json!({"raidId": format!("R{i}"), "map": "533", "difficulty": "1"}))
            .collect()
    }

    #[test]
    fn test_page_payload() {
        let payload = page_payload(&json!({"raidId": "R1"}), 3, 25);
        assert_eq!(
            payload,
            json!({"raidId": "R1", "page": 3, "start": 50, "limit": 25})
        );
    }

    #[tokio::test]
    async fn test_short_first_page_stops_after_one_call() {
        let transport = FakeTransport::new().with_records(methods::LADDER, ladder_rows(3));
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());

        let raids = crawler.fetch_ladder(&LadderFilter::default()).await.unwrap();

        assert_eq!(raids.len(), 3);
        assert_eq!(transport.call_count(methods::LADDER), 1);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_limit_needs_one_empty_page() {
        let transport = FakeTransport::new().with_records(methods::LADDER, ladder_rows(50));
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());

        let raids = crawler.fetch_ladder(&LadderFilter::default()).await.unwrap();

        assert_eq!(raids.len(), 50);
        assert_eq!(transport.call_count(methods::LADDER), 3);
        assert_eq!(raids[49].raid_id.as_deref(), Some("R49"));
    }

    #[tokio::test]
    async fn test_page_cap_limits_ladder() {
        let transport = FakeTransport::new().with_records(methods::LADDER, ladder_rows(100));
        let mut cfg = config(25);
        cfg.max_ladder_pages = Some(2);
        let crawler = RaidCrawler::new(&transport, &cfg, CancellationToken::new());

        let raids = crawler.fetch_ladder(&LadderFilter::default()).await.unwrap();

        assert_eq!(raids.len(), 50);
        assert_eq!(transport.call_count(methods::LADDER), 2);
    }

    #[tokio::test]
    async fn test_ladder_filter_is_sent() {
        let transport = FakeTransport::new().with_records(methods::LADDER, ladder_rows(1));
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());
        let filter = LadderFilter {
            map: Some("533".into()),
            ..LadderFilter::default()
        };

        crawler.fetch_ladder(&filter).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls[0].1["map"], "533");
        assert_eq!(calls[0].1["page"], 1);
    }

    #[tokio::test]
    async fn test_null_result_ends_crawl() {
        let transport = FakeTransport::new();
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());

        let raids = crawler.fetch_ladder(&LadderFilter::default()).await.unwrap();
        assert!(raids.is_empty());
    }

    #[tokio::test]
    async fn test_envelope_miss_is_not_end_of_data() {
        let transport = FakeTransport::new().failing(methods::LADDER);
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());

        let err = crawler
            .fetch_ladder(&LadderFilter::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EnvelopeMiss { .. }));
    }

    #[tokio::test]
    async fn test_roster_keeps_only_requested_encounter() {
        let lines = vec![
            json!({"raidId": "R1", "encounterEntry": "15956", "startTime": "1700000000", "characterGuid": "G1"}),
            json!({"raidId": "R1", "encounterEntry": "15953", "startTime": "1700000900", "characterGuid": "G1"}),
            json!({"raidId": "R1", "encounterEntry": "15956", "startTime": "1700000000", "characterGuid": "G2"}),
        ];
        let transport = FakeTransport::new().with_records(methods::ENCOUNTER_PLAYERS, lines);
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());

        let roster = crawler
            .fetch_roster("R1", 15956, 1_700_000_000)
            .await
            .unwrap();

        let guids: Vec<_> = roster
            .iter()
            .map(|r| r.character_guid.as_deref().unwrap())
            .collect();
        assert_eq!(guids, ["G1", "G2"]);
    }

    #[tokio::test]
    async fn test_cancelled_crawl_makes_no_calls() {
        let transport = FakeTransport::new().with_records(methods::LADDER, ladder_rows(3));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let crawler = RaidCrawler::new(&transport, &config(25), cancel);

        let err = crawler
            .fetch_ladder(&LadderFilter::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Cancelled));
        assert_eq!(transport.call_count(methods::LADDER), 0);
    }

    #[tokio::test]
    async fn test_collect_batch_walks_encounters_and_rosters() {
        let transport = FakeTransport::new()
            .with_records(
                methods::RAID_ENCOUNTERS,
                vec![
                    json!({"raidId": "R1", "encounterEntry": "15956", "startTime": "1700000000", "endTime": "1700000300"}),
                    json!({"raidId": "R1", "encounterEntry": "15953", "startTime": "1700000900", "endTime": "1700001200"}),
                    json!({"raidId": "R1", "encounterEntry": "oops", "startTime": "1700002000"}),
                ],
            )
            .with_records(
                methods::ENCOUNTER_PLAYERS,
                vec![
                    json!({"raidId": "R1", "encounterEntry": "15956", "startTime": "1700000000", "characterGuid": "G1"}),
                    json!({"raidId": "R1", "encounterEntry": "15953", "startTime": "1700000900", "characterGuid": "G1"}),
                ],
            );
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());
        let raids = vec![RaidRecord {
            raid_id: Some("R1".into()),
            ..RaidRecord::default()
        }];

        let batch = crawler.collect_batch(raids).await.unwrap();

        assert_eq!(batch.raids.len(), 1);
        assert_eq!(batch.encounters.len(), 3);
        assert_eq!(batch.players.len(), 2);
        assert_eq!(transport.call_count(methods::ENCOUNTER_PLAYERS), 2);
    }

    #[tokio::test]
    async fn test_records_without_raid_id_take_the_requested_raid() {
        let transport = FakeTransport::new()
            .with_records(
                methods::RAID_ENCOUNTERS,
                vec![json!({"encounterEntry": "15956", "startTime": "1700000000", "endTime": "1700000300"})],
            )
            .with_records(
                methods::ENCOUNTER_PLAYERS,
                vec![json!({"encounterEntry": "15956", "startTime": "1700000000", "characterGuid": "G1"})],
            );
        let crawler = RaidCrawler::new(&transport, &config(25), CancellationToken::new());
        let raids = vec![RaidRecord {
            raid_id: Some("R1".into()),
            ..RaidRecord::default()
        }];

        let batch = crawler.collect_batch(raids).await.unwrap();

        assert_eq!(batch.encounters.len(), 1);
        assert_eq!(batch.encounters[0].raid_id.as_deref(), Some("R1"));
        assert_eq!(batch.players.len(), 1);
        assert_eq!(batch.players[0].raid_id.as_deref(), Some("R1"));
        assert!(batch.encounters[0].decode().is_ok());
        assert!(batch.players[0].decode().is_ok());
    }

    #[test]
    fn test_claim_for_raid() {
        let mut missing = None;
        assert!(claim_for_raid("R1", &mut missing, "encounter"));
        assert_eq!(missing.as_deref(), Some("R1"));

        let mut blank = Some("  ".to_string());
        assert!(claim_for_raid("R1", &mut blank, "encounter"));
        assert_eq!(blank.as_deref(), Some("R1"));

        let mut same = Some("R1".to_string());
        assert!(claim_for_raid("R1", &mut same, "encounter"));

        let mut other = Some("R2".to_string());
        assert!(!claim_for_raid("R1", &mut other, "encounter"));
        assert_eq!(other.as_deref(), Some("R2"));
    }
}
