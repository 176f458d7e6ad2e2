//! # Ranking Engine
//!
//! Assigns every post a "hotness" score that grows with its vote count and
//! decays with its age:
//!
//! ```text
//! score = trunc( factor * (votes - penalty) / (age_hours + damper) ^ gravity )
//! ```
//!
//! The score is a cache. The vote set is authoritative, and a sweep over all
//! posts rebuilds every cached score from it.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, Result};
use crate::models::{PostId, RankingInput};
use crate::traits::PostRepo;

/// Multiplier that lifts fractional scores into a useful integer range.
pub const DEFAULT_FACTOR: f64 = 100.0;
/// Votes subtracted before scoring (self-vote penalty). Currently inert.
pub const DEFAULT_PENALTY: i64 = 0;
/// Hours added to the age so brand-new posts do not divide by zero.
pub const DEFAULT_DAMPER: i64 = 2;
/// Decay exponent. 1.0 is linear; 1.8 would bury old posts much faster.
pub const DEFAULT_GRAVITY: f64 = 1.0;

/// Tunables of the score function.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingParams {
    pub factor: f64,
    pub penalty: i64,
    pub damper: i64,
    pub gravity: f64,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            factor: DEFAULT_FACTOR,
            penalty: DEFAULT_PENALTY,
            damper: DEFAULT_DAMPER,
            gravity: DEFAULT_GRAVITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("unparsable creation timestamp {raw:?}")]
    BadTimestamp { raw: String },
}

/// The score formula. The float result is truncated toward zero, so a
/// negative numerator yields a negative or zero score rather than an error.
pub fn compute_score(params: &RankingParams, votes: i64, age_hours: i64) -> i64 {
    let numerator = (votes - params.penalty) as f64;
    let denominator = ((age_hours + params.damper) as f64).powf(params.gravity);
    (params.factor * (numerator / denominator)) as i64
}

/// Whole hours between `created_at` and `now`. Creation times in the future
/// count as age 0.
pub fn age_in_hours(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_hours().max(0)
}

/// Parses a stored creation timestamp: RFC 3339, or SQLite's
/// `CURRENT_TIMESTAMP` layout (UTC without offset).
pub fn parse_created_at(raw: &str) -> std::result::Result<DateTime<Utc>, ScoreError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|_| ScoreError::BadTimestamp { raw: raw.to_string() })
}

/// Scores one post as of `now`. Pure: identical inputs give identical output.
pub fn score_post(
    params: &RankingParams,
    votes: i64,
    created_at: &str,
    now: DateTime<Utc>,
) -> std::result::Result<i64, ScoreError> {
    let created = parse_created_at(created_at)?;
    Ok(compute_score(params, votes, age_in_hours(created, now)))
}

/// Source of "now" for age computation.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Outcome of one sweep over all posts.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Posts whose score was computed and written.
    pub scored: usize,
    /// Posts with a malformed creation timestamp; written as 0.
    pub unparsable: usize,
    /// Posts whose score could not be persisted.
    pub failed_writes: usize,
}

/// Computes and persists post scores.
pub struct RankingEngine {
    repo: Arc<dyn PostRepo>,
    params: RankingParams,
    clock: Arc<dyn Clock>,
}

impl RankingEngine {
    pub fn new(repo: Arc<dyn PostRepo>, params: RankingParams) -> Self {
        Self {
            repo,
            params,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the wall clock, e.g. with a [`FixedClock`] in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn score_input(&self, input: &RankingInput) -> (i64, bool) {
        match score_post(&self.params, input.vote_count, &input.created_at, self.clock.now()) {
            Ok(score) => (score, true),
            Err(e) => {
                warn!(post_id = %input.post_id, error = %e, "scoring post as 0");
                (0, false)
            }
        }
    }

    /// Recomputes every post's score.
    ///
    /// A failure to read the inputs aborts the sweep before any score is
    /// written. Per-post failures (bad timestamp, failed write) are logged
    /// and counted; they never stop the remaining posts.
    pub async fn recompute_all(&self) -> Result<SweepReport> {
        let inputs = self.repo.ranking_inputs().await.map_err(|e| {
            error!(error = %e, "could not read posts for ranking");
            e
        })?;
        debug!(posts = inputs.len(), "running post ranking");

        let mut report = SweepReport::default();
        for input in &inputs {
            let (score, parsed) = self.score_input(input);
            if !parsed {
                report.unparsable += 1;
            }
            match self.repo.update_rank(input.post_id, score).await {
                Ok(()) => {
                    if parsed {
                        report.scored += 1;
                    }
                }
                Err(e) => {
                    error!(post_id = %input.post_id, error = %e, "could not update rank");
                    report.failed_writes += 1;
                }
            }
        }

        info!(
            scored = report.scored,
            unparsable = report.unparsable,
            failed_writes = report.failed_writes,
            "post ranking finished"
        );
        Ok(report)
    }

    /// Recomputes a single post, typically right after a vote on it.
    pub async fn recompute_one(&self, id: PostId) -> Result<i64> {
        let input = self
            .repo
            .ranking_input(id)
            .await?
            .ok_or_else(|| AppError::not_found("Post", id))?;
        let (score, _) = self.score_input(&input);
        self.repo.update_rank(id, score).await?;
        Ok(score)
    }
}
