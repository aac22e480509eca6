use crate::domain::rating::{self, Rating};
use crate::error::{AppError, Result};
use crate::services::ports::{RatingStore, UserDirectory};
use opentelemetry::{KeyValue, global, metrics::Counter};
use rust_decimal::Decimal;
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Metrics {
    submitted_total: Counter<u64>,
    recomputed_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("bazaar-server");
        Self {
            submitted_total: meter
                .u64_counter("bazaar_ratings_submitted_total")
                .with_description("Rating submissions by outcome")
                .build(),
            recomputed_total: meter
                .u64_counter("bazaar_trust_recomputed_total")
                .with_description("Materialized trust scores recomputed")
                .build(),
        }
    }
}

/// Outcome of one reconcile pass over every rated user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub recomputed: u64,
    pub failed: u64,
}

/// Keeps each user's materialized trust score equal to the rounded mean of
/// the latest rating from every distinct rater.
#[derive(Clone, Debug)]
pub struct RatingService {
    ratings: Arc<dyn RatingStore>,
    users: Arc<dyn UserDirectory>,
    metrics: Metrics,
}

impl RatingService {
    #[must_use]
    pub fn new(ratings: Arc<dyn RatingStore>, users: Arc<dyn UserDirectory>) -> Self {
        Self { ratings, users, metrics: Metrics::new() }
    }

    /// Records `rater`'s rating of `rated` (overwriting an earlier one) and
    /// refreshes the aggregate by a full re-scan, so concurrent submissions
    /// converge on the same value.
    ///
    /// # Errors
    /// Returns `AppError::InvalidRating` for self-ratings or values outside 1..=5.
    /// Returns `AppError::NotFound` if the rated user is unknown.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn submit(&self, rater: &str, rated: &str, value: i32) -> Result<(Rating, Option<Decimal>)> {
        if let Err(e) = rating::validate(rater, rated, value) {
            self.metrics.submitted_total.add(1, &[KeyValue::new("status", "invalid")]);
            return Err(e);
        }
        if self.users.get_user(rated).await?.is_none() {
            self.metrics.submitted_total.add(1, &[KeyValue::new("status", "unknown_user")]);
            return Err(AppError::NotFound);
        }

        let stored = self.ratings.upsert(rater, rated, value).await?;
        let aggregate = self.recompute(rated).await?;

        tracing::debug!(aggregate = ?aggregate, "Rating recorded");
        self.metrics.submitted_total.add(1, &[KeyValue::new("status", "success")]);
        Ok((stored, aggregate))
    }

    /// Re-derives the trust score of `user_id` from all stored ratings and
    /// writes it to the profile. `None` means the user has no ratings.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` if the profile is gone, or the store error.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn recompute(&self, user_id: &str) -> Result<Option<Decimal>> {
        let stats = self.ratings.stats_for(user_id).await?;
        let mean = stats.mean();
        self.users.set_rating(user_id, mean).await?;
        self.metrics.recomputed_total.add(1, &[]);
        Ok(mean)
    }

    /// # Errors
    /// Returns `AppError::NotFound` if `rater` has not rated `rated`.
    #[tracing::instrument(err(level = "debug"), skip(self))]
    pub async fn get(&self, rater: &str, rated: &str) -> Result<Rating> {
        self.ratings.get(rater, rated).await?.ok_or(AppError::NotFound)
    }

    /// Recomputes every rated user, continuing past individual failures.
    ///
    /// # Errors
    /// Returns the store error if the set of rated users cannot be read.
    #[tracing::instrument(err, skip(self), fields(recomputed = tracing::field::Empty, failed = tracing::field::Empty))]
    pub async fn recompute_all(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        for user_id in self.ratings.rated_users().await? {
            match self.recompute(&user_id).await {
                Ok(_) => report.recomputed += 1,
                Err(e) => {
                    tracing::warn!(error = %e, user_id = %user_id, "Trust recompute failed");
                    report.failed += 1;
                }
            }
        }

        let span = tracing::Span::current();
        span.record("recomputed", report.recomputed);
        span.record("failed", report.failed);
        Ok(report)
    }
}
