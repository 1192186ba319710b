//! Re-expand every paper already in the graph across a bounded worker pool.

use std::sync::Arc;

use futures::StreamExt;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::expand::PaperExpander;
use crate::upsert::{GraphUpsertClient, UpsertStats};

/// Reported after every finished expansion.
#[derive(Debug, Clone, Copy)]
pub struct RefreshProgress<'a> {
    pub paper_id: &'a str,
    pub ok: bool,
    /// 0 for the first pass, 1.. for retry passes.
    pub pass: u32,
    pub completed: usize,
    /// Papers dispatched in this pass.
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Expansions that finished but recorded neighbor or direction failures.
    pub incomplete: usize,
    pub stats: UpsertStats,
    /// `(paper id, error)` for every paper still failing after the last pass.
    pub failures: Vec<(String, String)>,
}

pub struct BulkRefreshScheduler {
    expander: Arc<dyn PaperExpander>,
    upsert: Arc<GraphUpsertClient>,
    workers: usize,
    retry_passes: u32,
}

impl BulkRefreshScheduler {
    pub fn new(
        expander: Arc<dyn PaperExpander>,
        upsert: Arc<GraphUpsertClient>,
        workers: usize,
    ) -> Self {
        Self {
            expander,
            upsert,
            workers: workers.max(1),
            retry_passes: 0,
        }
    }

    /// Re-run failed papers up to `passes` more times after the first pass.
    pub fn with_retry_passes(mut self, passes: u32) -> Self {
        self.retry_passes = passes;
        self
    }

    pub async fn run(&self) -> Result<RefreshSummary> {
        self.run_with_progress(|_| {}).await
    }

    /// Discover every paper id in the graph and expand each one.
    ///
    /// Only discovery can fail; per-paper failures are collected in the summary.
    pub async fn run_with_progress<F>(&self, on_progress: F) -> Result<RefreshSummary>
    where
        F: Fn(RefreshProgress<'_>),
    {
        let ids = self.upsert.paper_ids().await?;
        info!(papers = ids.len(), workers = self.workers, "starting refresh");
        let summary = self.refresh(ids, on_progress).await;
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            nodes_created = summary.stats.nodes_created,
            relationships_created = summary.stats.relationships_created,
            "refresh finished"
        );
        Ok(summary)
    }

    /// Expand the given ids; no ordering between them is assumed.
    pub async fn refresh<F>(&self, ids: Vec<String>, on_progress: F) -> RefreshSummary
    where
        F: Fn(RefreshProgress<'_>),
    {
        let mut summary = RefreshSummary {
            total: ids.len(),
            ..RefreshSummary::default()
        };
        let mut pending = ids;

        for pass in 0..=self.retry_passes {
            if pending.is_empty() {
                break;
            }
            if pass > 0 {
                info!(pass, papers = pending.len(), "retrying failed papers");
            }

            let total = pending.len();
            let mut completed = 0;
            let mut failures = Vec::new();

            let mut results = futures::stream::iter(pending)
                .map(|id| {
                    let expander = Arc::clone(&self.expander);
                    async move {
                        let handle = tokio::spawn({
                            let id = id.clone();
                            async move { expander.expand(&id).await }
                        });
                        let result = match handle.await {
                            Ok(result) => result.map_err(|e| e.to_string()),
                            Err(join) => Err(format!("worker task failed: {join}")),
                        };
                        (id, result)
                    }
                })
                .buffer_unordered(self.workers);

            while let Some((id, result)) = results.next().await {
                completed += 1;
                let ok = result.is_ok();
                match result {
                    Ok(report) => {
                        summary.succeeded += 1;
                        summary.stats += report.stats;
                        if !report.is_complete() {
                            summary.incomplete += 1;
                        }
                    }
                    Err(error) => {
                        warn!(paper = %id, pass, %error, "expansion failed");
                        failures.push((id.clone(), error));
                    }
                }
                on_progress(RefreshProgress {
                    paper_id: &id,
                    ok,
                    pass,
                    completed,
                    total,
                });
            }

            pending = failures.iter().map(|(id, _)| id.clone()).collect();
            summary.failures = failures;
        }

        summary.failed = summary.failures.len();
        summary
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use citegraph_core::{Paper, SqliteGraph};

    use super::*;
    use crate::error::IngestError;
    use crate::expand::ExpansionReport;
    use crate::rate_limit::{FixedWindowLimiter, RetryPolicy};

    /// Records calls; ids in `fail_times` fail that many times before succeeding.
    #[derive(Default)]
    struct FakeExpander {
        calls: Mutex<Vec<String>>,
        fail_times: Mutex<HashMap<String, u32>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeExpander {
        fn failing(id: &str, times: u32) -> Self {
            let fake = Self::default();
            fake.fail_times.lock().unwrap().insert(id.to_string(), times);
            fake
        }

        fn calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    #[async_trait]
    impl PaperExpander for FakeExpander {
        async fn expand(&self, paper_id: &str) -> crate::error::Result<ExpansionReport> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            self.calls.lock().unwrap().push(paper_id.to_string());
            let should_fail = {
                let mut fails = self.fail_times.lock().unwrap();
                match fails.get_mut(paper_id) {
                    Some(left) if *left > 0 => {
                        *left -= 1;
                        true
                    }
                    _ => false,
                }
            };
            if should_fail {
                return Err(IngestError::NotFound(format!("paper {paper_id}")));
            }
            Ok(ExpansionReport {
                paper_id: paper_id.to_string(),
                stats: UpsertStats {
                    nodes_created: 1,
                    relationships_created: 2,
                },
                ..ExpansionReport::default()
            })
        }
    }

    async fn graph_with(ids: &[&str]) -> Arc<GraphUpsertClient> {
        let upsert = Arc::new(GraphUpsertClient::new(
            Arc::new(SqliteGraph::open_in_memory().unwrap()),
            Arc::new(FixedWindowLimiter::new(1000, Duration::from_secs(60))),
            RetryPolicy::new(2, Duration::from_millis(1), Duration::from_millis(2)),
        ));
        for id in ids {
            let paper = Paper {
                id: id.to_string(),
                title: format!("Paper {id}"),
                primary_author: "unknown".into(),
                authors: Vec::new(),
                year: 0,
                venue: String::new(),
                abstract_text: String::new(),
                summary: None,
                citation_count: 0,
                reference_count: 0,
                url: String::new(),
            };
            upsert.upsert_paper(&paper).await.unwrap();
        }
        upsert
    }

    #[tokio::test]
    async fn dispatches_one_task_per_paper() {
        let upsert = graph_with(&["A", "B", "C"]).await;
        let expander = Arc::new(FakeExpander::default());
        let scheduler = BulkRefreshScheduler::new(expander.clone(), upsert, 2);

        let progress = Mutex::new(Vec::new());
        let summary = scheduler
            .run_with_progress(|p| progress.lock().unwrap().push((p.completed, p.total)))
            .await
            .unwrap();

        assert_eq!(expander.calls(), vec!["A", "B", "C"]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.stats.relationships_created, 6);
        assert_eq!(
            progress.into_inner().unwrap(),
            vec![(1, 3), (2, 3), (3, 3)]
        );
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_batch() {
        let upsert = graph_with(&["A", "B", "C"]).await;
        let expander = Arc::new(FakeExpander::failing("B", 1));
        let scheduler = BulkRefreshScheduler::new(expander.clone(), upsert, 4);

        let summary = scheduler.run().await.unwrap();

        assert_eq!(expander.calls(), vec!["A", "B", "C"]);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].0, "B");
    }

    #[tokio::test]
    async fn retry_pass_reruns_only_failed_papers() {
        let upsert = graph_with(&["A", "B", "C"]).await;
        let expander = Arc::new(FakeExpander::failing("B", 1));
        let scheduler =
            BulkRefreshScheduler::new(expander.clone(), upsert, 4).with_retry_passes(1);

        let summary = scheduler.run().await.unwrap();

        assert_eq!(expander.calls(), vec!["A", "B", "B", "C"]);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 0);
        assert!(summary.failures.is_empty());
    }

    #[tokio::test]
    async fn worker_count_bounds_concurrency() {
        let ids: Vec<String> = (0..12).map(|i| format!("P{i}")).collect();
        let upsert = graph_with(&[]).await;
        let expander = Arc::new(FakeExpander::default());
        let scheduler = BulkRefreshScheduler::new(expander.clone(), upsert, 3);

        let summary = scheduler.refresh(ids, |_| {}).await;

        assert_eq!(summary.succeeded, 12);
        let max = expander.max_in_flight.load(Ordering::SeqCst);
        assert!(max <= 3, "saw {max} concurrent expansions");
    }

    #[tokio::test]
    async fn empty_graph_is_a_no_op() {
        let upsert = graph_with(&[]).await;
        let expander = Arc::new(FakeExpander::default());
        let scheduler = BulkRefreshScheduler::new(expander.clone(), upsert, 10);

        let summary = scheduler.run().await.unwrap();

        assert_eq!(summary.total, 0);
        assert!(expander.calls().is_empty());
    }
}
