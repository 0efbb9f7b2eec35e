//! Metrics for the recommendation pipeline.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Recorder for query, embedder, training, reindex and job metrics.
pub struct PhraseMetrics;

impl PhraseMetrics {
    /// `outcome` is `ok` or the error code of the failed query.
    pub fn record_query(outcome: &str, results: usize, elapsed: Duration) {
        counter!("phrase_queries_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("phrase_query_duration_seconds").record(elapsed.as_secs_f64());

        tracing::debug!(
            outcome,
            results,
            duration_ms = elapsed.as_millis() as u64,
            "Recommendation query finished"
        );
    }

    pub fn record_embed(outcome: &str, elapsed: Duration) {
        counter!("embed_calls_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("embed_call_duration_seconds").record(elapsed.as_secs_f64());
    }

    pub fn record_dropped_tokens(count: usize) {
        if count > 0 {
            counter!("embed_tokens_dropped_total").increment(count as u64);
        }
    }

    pub fn record_training(outcome: &str, elapsed: Duration) {
        counter!("training_runs_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("training_duration_seconds").record(elapsed.as_secs_f64());
    }

    pub fn record_reindex_completed(indexed: usize, skipped: usize, elapsed: Duration) {
        counter!("reindex_runs_total", "outcome" => "ok").increment(1);
        histogram!("reindex_duration_seconds").record(elapsed.as_secs_f64());
        counter!("reindex_rows_skipped_total").increment(skipped as u64);
        gauge!("indexed_items").set(indexed as f64);
    }

    pub fn record_reindex_failed(elapsed: Duration) {
        counter!("reindex_runs_total", "outcome" => "error").increment(1);
        histogram!("reindex_duration_seconds").record(elapsed.as_secs_f64());
    }

    /// Count a job entering `state` (`pending`, `training`, ...).
    pub fn record_job_transition(state: &str) {
        counter!("pipeline_job_transitions_total", "state" => state.to_string()).increment(1);
    }

    pub fn set_pending_jobs(count: usize) {
        gauge!("pipeline_jobs_pending").set(count as f64);
    }
}
