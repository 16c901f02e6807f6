// The fetch/reconcile cycle and the in-memory repository behind it.

use std::collections::HashSet;

use log::{info, warn};

use result_board::{ProgramFlag, ProgramView, ResultRecord};

use crate::board::feed;
use crate::board::store::{flags, ProgramStatusRow, PublicationStore};
use crate::board::*;

/// In-memory holder of the decoded record sequence for the current fetch
/// cycle.
///
/// A successful cycle replaces the sequence wholesale; a failed fetch
/// leaves the previous sequence untouched, so the most recent good data
/// stays available while the error is reported.
#[derive(Debug, Clone, Default)]
pub struct ResultRepository {
    records: Vec<ResultRecord>,
}

impl ResultRepository {
    pub fn replace(&mut self, records: Vec<ResultRecord>) {
        self.records = records;
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unique_program_codes(&self) -> HashSet<String> {
        result_board::unique_program_codes(&self.records)
    }

    /// Pure, non-mutating subset of the held sequence.
    pub fn filter<P>(&self, predicate: P) -> Vec<ResultRecord>
    where
        P: Fn(&ResultRecord) -> bool,
    {
        self.records
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect()
    }
}

/// Orchestrates the fetch/decode/reconcile cycle and the operator actions
/// against the publication store.
pub struct BoardService<S: PublicationStore> {
    client: reqwest::Client,
    feed_url: String,
    store: S,
    repository: ResultRepository,
    statuses: Vec<ProgramStatusRow>,
    last_cycle_error: Option<String>,
}

impl<S: PublicationStore> BoardService<S> {
    pub fn new(feed_url: &str, store: S) -> BoardService<S> {
        BoardService {
            client: reqwest::Client::new(),
            feed_url: feed_url.to_string(),
            store,
            repository: ResultRepository::default(),
            statuses: Vec::new(),
            last_cycle_error: None,
        }
    }

    /// Runs one full cycle: fetch, decode, replace, auto-publish, re-read.
    ///
    /// On failure the previous sequence stays available and the error is
    /// both recorded and returned; retrying is calling this again.
    pub async fn refresh(&mut self) -> BoardResult<()> {
        let outcome = self.run_cycle().await;
        self.record_outcome(outcome)
    }

    async fn run_cycle(&mut self) -> BoardResult<()> {
        let records = feed::fetch_records(&self.client, &self.feed_url).await?;
        self.adopt(records).await
    }

    /// Decodes one feed snapshot and adopts it, as [`refresh`] does for a
    /// fetched one.
    ///
    /// [`refresh`]: BoardService::refresh
    pub async fn ingest(&mut self, raw: &str) -> BoardResult<()> {
        let outcome = self.adopt(result_board::decode(raw)).await;
        self.record_outcome(outcome)
    }

    fn record_outcome(&mut self, outcome: BoardResult<()>) -> BoardResult<()> {
        match &outcome {
            Ok(()) => self.last_cycle_error = None,
            Err(e) => {
                warn!("cycle failed, keeping previous results: {}", e);
                self.last_cycle_error = Some(e.to_string());
            }
        }
        outcome
    }

    // Replaces the repository contents, then runs the one-way
    // auto-publication against the persisted flags. The replacement happens
    // before any derived view is recomputed, so readers never observe a
    // half-replaced sequence.
    async fn adopt(&mut self, records: Vec<ResultRecord>) -> BoardResult<()> {
        info!(
            "adopt: {} records across {} programs",
            records.len(),
            result_board::unique_program_codes(&records).len()
        );
        self.repository.replace(records);
        self.reconcile().await
    }

    // Proposes publish upserts for feed-published programs that are not yet
    // published, then re-reads the store to converge the in-memory view
    // instead of assuming the writes succeeded.
    async fn reconcile(&mut self) -> BoardResult<()> {
        self.statuses = self.store.select_all().await?;
        let plan =
            result_board::auto_publish_plan(self.repository.records(), &flags(&self.statuses));
        if !plan.is_empty() {
            info!("reconcile: auto-publishing {:?}", plan);
            let rows: Vec<ProgramStatusRow> = plan
                .iter()
                .map(|code| ProgramStatusRow::now(code, true))
                .collect();
            self.store.upsert_many(rows).await?;
            self.statuses = self.store.select_all().await?;
        }
        Ok(())
    }

    /// Operator toggle for one program. Authoritative: a publish set here is
    /// never reverted by auto-publication, and an unpublish stands until the
    /// feed (or an operator) publishes again.
    pub async fn set_published(&mut self, program_code: &str, is_published: bool) -> BoardResult<()> {
        info!(
            "set_published: {} -> {}",
            program_code,
            if is_published { "published" } else { "unpublished" }
        );
        self.store
            .upsert_one(ProgramStatusRow::now(program_code, is_published))
            .await?;
        self.statuses = self.store.select_all().await?;
        Ok(())
    }

    /// Operator bulk toggle across all programs known from the current feed.
    pub async fn set_all_published(&mut self, is_published: bool) -> BoardResult<()> {
        let rows: Vec<ProgramStatusRow> =
            result_board::program_views(self.repository.records(), &[])
                .iter()
                .map(|view| ProgramStatusRow::now(&view.code, is_published))
                .collect();
        info!(
            "set_all_published: {} programs -> {}",
            rows.len(),
            if is_published { "published" } else { "unpublished" }
        );
        self.store.upsert_many(rows).await?;
        self.statuses = self.store.select_all().await?;
        Ok(())
    }

    pub fn repository(&self) -> &ResultRepository {
        &self.repository
    }

    /// Error message of the last cycle, or None if it succeeded.
    pub fn last_cycle_error(&self) -> Option<&str> {
        self.last_cycle_error.as_deref()
    }

    fn current_flags(&self) -> Vec<ProgramFlag> {
        flags(&self.statuses)
    }

    /// Per-program summaries for the current cycle.
    pub fn program_views(&self) -> Vec<ProgramView> {
        result_board::program_views(self.repository.records(), &self.current_flags())
    }

    /// Records of the effectively published programs only.
    pub fn public_records(&self) -> Vec<ResultRecord> {
        result_board::public_records(self.repository.records(), &self.current_flags())
    }

    /// Grouped and recency-ordered result sets; restricted to published
    /// programs unless `include_unpublished`.
    pub fn grouped(&self, include_unpublished: bool) -> Vec<(String, Vec<ResultRecord>)> {
        let subset = if include_unpublished {
            self.repository.records().to_vec()
        } else {
            self.public_records()
        };
        result_board::group_programs(&subset, self.repository.records())
    }

    /// Headline lines for the published programs, in group order.
    pub fn ticker(&self) -> Vec<String> {
        result_board::ticker_lines(&self.grouped(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FEED: &str = "Program Code,Name,Position,Section,Grade,Candidate Name,Chest No,Team Code,h9,h10,h11,h12,h13,h14,Status\n\
P1,ProgA,1,JUNIOR,A,Asha,101,AR,,,,,,,Published\n\
,,2,,B,Binu,102,TD,,,,,,,Published\n\
P2,ProgB,1,SENIOR,A,Chitra,201,ZR,,,,,,,";

    // Store wrapper counting upserted rows, to assert that a converged
    // reconcile proposes nothing.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        upserted: AtomicUsize,
    }

    #[async_trait]
    impl PublicationStore for CountingStore {
        async fn select_all(&self) -> BoardResult<Vec<ProgramStatusRow>> {
            self.inner.select_all().await
        }
        async fn upsert_one(&self, row: ProgramStatusRow) -> BoardResult<()> {
            self.upserted.fetch_add(1, Ordering::SeqCst);
            self.inner.upsert_one(row).await
        }
        async fn upsert_many(&self, rows: Vec<ProgramStatusRow>) -> BoardResult<()> {
            self.upserted.fetch_add(rows.len(), Ordering::SeqCst);
            self.inner.upsert_many(rows).await
        }
    }

    #[tokio::test]
    async fn ingest_replaces_repository_and_auto_publishes() {
        let mut service = BoardService::new("http://unused.invalid/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();

        assert_eq!(service.repository().records().len(), 3);
        let views = service.program_views();
        assert_eq!(views.len(), 2);
        // P1's feed status says published, P2's says nothing.
        assert!(views[0].is_published);
        assert!(!views[1].is_published);
    }

    #[tokio::test]
    async fn second_cycle_proposes_no_upserts() {
        let mut service = BoardService::new("http://unused.invalid/feed", CountingStore::default());
        service.ingest(FEED).await.unwrap();
        let after_first = service.store.upserted.load(Ordering::SeqCst);
        assert_eq!(after_first, 1);

        service.ingest(FEED).await.unwrap();
        assert_eq!(service.store.upserted.load(Ordering::SeqCst), after_first);
    }

    #[tokio::test]
    async fn manual_unpublish_is_republished_by_feed_status() {
        // Documented one-way behavior: unpublishing a program whose feed
        // status still says published only lasts until the next cycle.
        let mut service = BoardService::new("http://unused.invalid/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();

        service.set_published("P1", false).await.unwrap();
        assert!(!service.program_views()[0].is_published);

        service.ingest(FEED).await.unwrap();
        assert!(service.program_views()[0].is_published);
    }

    #[tokio::test]
    async fn manual_publish_is_never_auto_reverted() {
        let mut service = BoardService::new("http://unused.invalid/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();

        // P2 has no publication hint in the feed; publish it by hand.
        service.set_published("P2", true).await.unwrap();
        for _ in 0..3 {
            service.ingest(FEED).await.unwrap();
        }
        let views = service.program_views();
        assert!(views.iter().find(|v| v.code == "P2").unwrap().is_published);
    }

    #[tokio::test]
    async fn bulk_unpublish_then_cycle_republishes_hinted_programs() {
        let mut service = BoardService::new("http://unused.invalid/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();

        service.set_all_published(false).await.unwrap();
        assert!(service.program_views().iter().all(|v| !v.is_published));

        service.ingest(FEED).await.unwrap();
        let views = service.program_views();
        assert!(views.iter().find(|v| v.code == "P1").unwrap().is_published);
        assert!(!views.iter().find(|v| v.code == "P2").unwrap().is_published);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_results() {
        // Closed port: the refresh fails at the fetch boundary.
        let mut service = BoardService::new("http://127.0.0.1:1/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();
        assert_eq!(service.repository().records().len(), 3);

        let err = service.refresh().await.unwrap_err();
        assert!(!err.is_store_error());
        assert_eq!(service.repository().records().len(), 3);
        assert!(service.last_cycle_error().is_some());
    }

    #[tokio::test]
    async fn public_output_is_grouped_and_filtered() {
        let mut service = BoardService::new("http://unused.invalid/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();

        // Only P1 is published; its two members stay in feed order.
        let groups = service.grouped(false);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0, "P1");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(service.ticker(), vec!["P1: ProgA"]);

        // Including unpublished programs, the latest-appearing leads.
        let all = service.grouped(true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "P2");
    }

    #[tokio::test]
    async fn repository_filtering() {
        let mut service = BoardService::new("http://unused.invalid/feed", MemoryStore::default());
        service.ingest(FEED).await.unwrap();

        let repo = service.repository();
        assert_eq!(repo.unique_program_codes().len(), 2);
        let juniors = repo.filter(|r| r.program_section == "JUNIOR");
        assert_eq!(juniors.len(), 2);
        assert!(!repo.is_empty());
    }
}
