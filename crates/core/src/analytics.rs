//! In-process usage analytics for answered questions.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;

use crate::domain::conversation::truncate_chars;

const RECENT_CAPACITY: usize = 100;
const SLOW_CAPACITY: usize = 50;
const SNAPSHOT_TAIL: usize = 10;
const SLOW_THRESHOLD_MS: u64 = 10_000;
const PREVIEW_CHARS: usize = 100;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct QueryRecord {
    pub query: String,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub total_queries: u64,
    pub total_errors: u64,
    pub success_rate: f64,
    pub average_response_time_ms: f64,
    pub queries_last_24h: u64,
    pub slow_queries_count: usize,
    pub errors_by_type: BTreeMap<String, u64>,
    pub recent_queries: Vec<QueryRecord>,
    pub slow_queries: Vec<QueryRecord>,
}

#[derive(Debug, Default)]
struct AnalyticsState {
    query_count: u64,
    error_count: u64,
    total_response_time_ms: u64,
    /// Hour bucket (unix seconds / 3600) to count.
    queries_by_hour: BTreeMap<i64, u64>,
    errors_by_type: BTreeMap<String, u64>,
    slow_queries: VecDeque<QueryRecord>,
    recent_queries: VecDeque<QueryRecord>,
}

#[derive(Debug, Default)]
pub struct AnalyticsRecorder {
    state: Mutex<AnalyticsState>,
}

impl AnalyticsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, question: &str, response_time_ms: u64, success: bool, error: Option<&str>) {
        self.record_at(question, response_time_ms, success, error, Utc::now());
    }

    pub fn snapshot(&self) -> AnalyticsSnapshot {
        self.snapshot_at(Utc::now())
    }

    pub fn reset(&self) {
        *self.lock() = AnalyticsState::default();
    }

    fn record_at(
        &self,
        question: &str,
        response_time_ms: u64,
        success: bool,
        error: Option<&str>,
        now: DateTime<Utc>,
    ) {
        let record = QueryRecord {
            query: truncate_chars(question, PREVIEW_CHARS),
            response_time_ms,
            timestamp: now,
            success,
            error: error.map(str::to_string),
        };

        let mut state = self.lock();
        state.query_count += 1;
        state.total_response_time_ms = state.total_response_time_ms.saturating_add(response_time_ms);
        *state.queries_by_hour.entry(hour_bucket(now)).or_default() += 1;
        let horizon = day_horizon(now);
        state.queries_by_hour.retain(|bucket, _| *bucket >= horizon);

        if !success {
            state.error_count += 1;
            if let Some(error) = error {
                *state.errors_by_type.entry(error_type(error)).or_default() += 1;
            }
        }

        if response_time_ms > SLOW_THRESHOLD_MS {
            push_bounded(&mut state.slow_queries, record.clone(), SLOW_CAPACITY);
        }
        push_bounded(&mut state.recent_queries, record, RECENT_CAPACITY);
    }

    fn snapshot_at(&self, now: DateTime<Utc>) -> AnalyticsSnapshot {
        let state = self.lock();

        let (success_rate, average_response_time_ms) = if state.query_count == 0 {
            (100.0, 0.0)
        } else {
            let total = state.query_count as f64;
            let successes = (state.query_count - state.error_count) as f64;
            (
                successes / total * 100.0,
                (state.total_response_time_ms as f64 / total * 100.0).round() / 100.0,
            )
        };

        let queries_last_24h = state.queries_by_hour.range(day_horizon(now)..).map(|(_, count)| count).sum();

        AnalyticsSnapshot {
            total_queries: state.query_count,
            total_errors: state.error_count,
            success_rate,
            average_response_time_ms,
            queries_last_24h,
            slow_queries_count: state.slow_queries.iter().filter(|record| record.success).count(),
            errors_by_type: state.errors_by_type.clone(),
            recent_queries: tail(&state.recent_queries),
            slow_queries: tail(&state.slow_queries),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AnalyticsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn hour_bucket(at: DateTime<Utc>) -> i64 {
    at.timestamp().div_euclid(3600)
}

/// Oldest hour bucket that still counts toward the last 24 hours.
fn day_horizon(now: DateTime<Utc>) -> i64 {
    hour_bucket(now - ChronoDuration::hours(24))
}

/// Everything before the first `:`, or `Unknown` when there is none.
fn error_type(error: &str) -> String {
    match error.split_once(':') {
        Some((prefix, _)) => prefix.to_string(),
        None => "Unknown".to_string(),
    }
}

fn push_bounded(queue: &mut VecDeque<QueryRecord>, record: QueryRecord, capacity: usize) {
    if queue.len() == capacity {
        queue.pop_front();
    }
    queue.push_back(record);
}

fn tail(queue: &VecDeque<QueryRecord>) -> Vec<QueryRecord> {
    queue.iter().skip(queue.len().saturating_sub(SNAPSHOT_TAIL)).cloned().collect()
}
