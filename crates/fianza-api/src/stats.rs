//! `GET /stats`: dashboard statistics.
//!
//! `?days=<n>` sets the chart window (default 90, clamped to 1–365). Totals
//! always cover the last 30 days.

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{Duration, NaiveDate, Utc};
use fianza_core::store::{ActivityTotals, DailyCount, IntakeStore};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::Staff, error::ApiError};

pub const DEFAULT_WINDOW_DAYS: i64 = 90;
pub const MAX_WINDOW_DAYS: i64 = 365;
pub const TOTALS_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Deserialize)]
pub struct StatsParams {
  pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct StatsBody {
  pub days:   i64,
  /// One entry per day of the window, oldest first, zero-filled.
  pub daily:  Vec<DailyCount>,
  pub totals: ActivityTotals,
}

/// Expand sparse counts into one entry per day in `first..=last`.
fn zero_fill(counts: &[DailyCount], first: NaiveDate, last: NaiveDate) -> Vec<DailyCount> {
  first
    .iter_days()
    .take_while(|day| *day <= last)
    .map(|day| DailyCount {
      day,
      count: counts.iter().find(|c| c.day == day).map_or(0, |c| c.count),
    })
    .collect()
}

/// `GET /stats[?days=<n>]`
pub async fn handler<S>(
  _staff: Staff,
  State(state): State<AppState<S>>,
  Query(params): Query<StatsParams>,
) -> Result<Json<StatsBody>, ApiError>
where
  S: IntakeStore,
{
  let days = params
    .days
    .unwrap_or(DEFAULT_WINDOW_DAYS)
    .clamp(1, MAX_WINDOW_DAYS);
  let now = Utc::now();
  let first_day = (now - Duration::days(days - 1)).date_naive();
  let since = first_day
    .and_hms_opt(0, 0, 0)
    .map_or(now, |midnight| midnight.and_utc());

  let counts = state
    .store
    .daily_registrations(since)
    .await
    .map_err(ApiError::store)?;
  let totals = state
    .store
    .activity_totals(now - Duration::days(TOTALS_WINDOW_DAYS))
    .await
    .map_err(ApiError::store)?;

  Ok(Json(StatsBody {
    days,
    daily: zero_fill(&counts, first_day, now.date_naive()),
    totals,
  }))
}
