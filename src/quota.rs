// ABOUTME: Per-user daily quota tracking with tier-based ceilings
// ABOUTME: Atomic conditional increments ensure no provider spend past the limit
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Forma Coach

//! # Quota Tracker
//!
//! Counts AI-billable requests per user per UTC calendar day. The free tier
//! has a fixed daily ceiling; paid tiers are unlimited but still counted for
//! usage reporting. The check-and-reserve operation is a single conditional
//! upsert, so two concurrent requests can never both slip past the ceiling.
//!
//! The day boundary is computed in UTC regardless of client timezone, so a
//! user's "today" is well-defined everywhere.

use crate::errors::{AppError, AppResult};
use crate::models::UserTier;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

/// Per-user, per-day request counter backed by the relational store
#[derive(Clone)]
pub struct QuotaTracker {
    pool: SqlitePool,
    free_daily_limit: u32,
}

impl QuotaTracker {
    /// Create a tracker over the shared connection pool
    #[must_use]
    pub const fn new(pool: SqlitePool, free_daily_limit: u32) -> Self {
        Self {
            pool,
            free_daily_limit,
        }
    }

    /// Daily ceiling for a tier; `None` means unlimited
    #[must_use]
    pub const fn ceiling_for(&self, tier: UserTier) -> Option<u32> {
        if tier.is_unlimited() {
            None
        } else {
            Some(self.free_daily_limit)
        }
    }

    /// Today's counter key in the fixed reference timezone (UTC)
    fn today_utc() -> String {
        Utc::now().date_naive().to_string()
    }

    /// Reserve one billable request, failing with `QuotaExceeded` when the
    /// tier ceiling is reached. Called only after a confirmed cache miss so
    /// cache hits stay free.
    ///
    /// # Errors
    ///
    /// Returns `QuotaExceeded` at the ceiling, or a database error.
    pub async fn check_and_reserve(&self, user_id: Uuid, tier: UserTier) -> AppResult<()> {
        let day = Self::today_utc();

        match self.ceiling_for(tier) {
            None => {
                // Unlimited tiers are still counted for usage reporting
                sqlx::query(
                    r"
                    INSERT INTO quota_counters (user_id, day, count) VALUES ($1, $2, 1)
                    ON CONFLICT(user_id, day) DO UPDATE SET count = count + 1
                    ",
                )
                .bind(user_id.to_string())
                .bind(&day)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to increment quota: {e}")))?;
                Ok(())
            }
            Some(0) => Err(AppError::quota_exceeded(0).with_user_id(user_id)),
            Some(ceiling) => {
                // Conditional upsert: the WHERE clause makes increment-past-
                // ceiling impossible even under concurrent reservations
                let result = sqlx::query(
                    r"
                    INSERT INTO quota_counters (user_id, day, count) VALUES ($1, $2, 1)
                    ON CONFLICT(user_id, day) DO UPDATE SET count = count + 1
                    WHERE quota_counters.count < $3
                    ",
                )
                .bind(user_id.to_string())
                .bind(&day)
                .bind(i64::from(ceiling))
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::database(format!("Failed to reserve quota: {e}")))?;

                if result.rows_affected() == 0 {
                    debug!(%user_id, %day, ceiling, "Daily quota exhausted");
                    return Err(AppError::quota_exceeded(ceiling).with_user_id(user_id));
                }
                Ok(())
            }
        }
    }

    /// Release a reservation that never reached a provider.
    ///
    /// The common path reserves only after a confirmed cache miss, so this is
    /// a rarely-taken escape hatch rather than part of the steady state.
    ///
    /// # Errors
    ///
    /// Returns a database error if the decrement fails.
    pub async fn rollback(&self, user_id: Uuid) -> AppResult<()> {
        let day = Self::today_utc();

        sqlx::query(
            r"
            UPDATE quota_counters SET count = count - 1
            WHERE user_id = $1 AND day = $2 AND count > 0
            ",
        )
        .bind(user_id.to_string())
        .bind(&day)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to roll back quota: {e}")))?;

        Ok(())
    }

    /// Number of billable requests the user has issued today
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn usage_today(&self, user_id: Uuid) -> AppResult<u32> {
        let day = Self::today_utc();

        let row = sqlx::query(
            r"
            SELECT count FROM quota_counters WHERE user_id = $1 AND day = $2
            ",
        )
        .bind(user_id.to_string())
        .bind(&day)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database(format!("Failed to read quota: {e}")))?;

        Ok(row.map_or(0, |r| {
            let count: i64 = r.get("count");
            count.max(0) as u32
        }))
    }
}
