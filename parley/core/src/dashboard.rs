//! Usage Dashboard
//!
//! Turns the usage figures reported by `/api/user/stats` into what a surface
//! draws: aligned per-day series, a budget warning and progress-bar widths.
//! Charting itself is left to the surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Budget usage above this percentage triggers a warning
pub const BUDGET_WARNING_THRESHOLD: f64 = 80.0;

/// Requests, tokens and cost for one bucket (day, model or provider)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageTotals {
    /// Number of requests
    pub requests: u64,
    /// Tokens consumed
    pub tokens: u64,
    /// Cost in dollars
    pub cost: f64,
}

/// Usage per `YYYY-MM-DD` date, kept in ascending key order
pub type DailyUsage = BTreeMap<String, UsageTotals>;

/// Response of `/api/user/stats`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserStats {
    /// Requests in the reporting window
    pub total_requests: u64,
    /// Tokens in the reporting window
    pub total_tokens: u64,
    /// Cost in the reporting window
    pub total_cost: f64,
    /// Spend in the current month
    pub current_month_usage: f64,
    /// Monthly budget
    pub monthly_budget: f64,
    /// Budget left this month
    pub budget_remaining: f64,
    /// Per-model totals
    pub models_used: BTreeMap<String, UsageTotals>,
    /// Per-provider totals
    pub providers_used: BTreeMap<String, UsageTotals>,
    /// Per-day totals
    #[serde(deserialize_with = "deserialize_daily_usage")]
    pub daily_usage: DailyUsage,
}

impl UserStats {
    /// Share of the monthly budget spent, in percent (0 with no budget)
    #[must_use]
    pub fn budget_percentage(&self) -> f64 {
        if self.monthly_budget > 0.0 {
            self.current_month_usage * 100.0 / self.monthly_budget
        } else {
            0.0
        }
    }

    /// Dashboard view of these figures
    #[must_use]
    pub fn dashboard(&self) -> DashboardData {
        DashboardData {
            daily_usage: self.daily_usage.clone(),
            budget_percentage: self.budget_percentage(),
        }
    }
}

/// Inputs of the dashboard view
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DashboardData {
    /// Usage per day
    pub daily_usage: DailyUsage,
    /// Budget used, in percent
    pub budget_percentage: f64,
}

impl DashboardData {
    /// Aligned chart series
    #[must_use]
    pub fn usage_series(&self) -> UsageSeries {
        usage_series(&self.daily_usage)
    }

    /// Budget warning, if one is due
    #[must_use]
    pub fn budget_warning(&self) -> Option<String> {
        budget_warning(self.budget_percentage)
    }
}

/// Per-day series with one entry per label
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageSeries {
    /// Dates, ascending
    pub labels: Vec<String>,
    /// Daily cost, aligned with `labels`
    pub costs: Vec<f64>,
    /// Daily request count, aligned with `labels`
    pub requests: Vec<u64>,
}

impl UsageSeries {
    /// Number of days
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether there is no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Build chart series from daily usage
#[must_use]
pub fn usage_series(daily: &DailyUsage) -> UsageSeries {
    let mut series = UsageSeries::default();
    for (date, totals) in daily {
        series.labels.push(date.clone());
        series.costs.push(totals.cost);
        series.requests.push(totals.requests);
    }
    series
}

/// Warning text when more than [`BUDGET_WARNING_THRESHOLD`] percent is used
#[must_use]
pub fn budget_warning(percentage: f64) -> Option<String> {
    (percentage > BUDGET_WARNING_THRESHOLD).then(|| {
        format!("Budget warning: you have used {percentage:.1}% of your monthly budget.")
    })
}

/// Progress-bar width in percent, clamped to `0..=100`
#[must_use]
pub fn progress_width(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Indicator label for a service
#[must_use]
pub fn indicator_label(online: bool) -> &'static str {
    if online {
        "Online"
    } else {
        "Offline"
    }
}

/// Missing or null day entries count as zero usage
fn daily_usage_from_value(value: Value) -> Option<DailyUsage> {
    let Value::Object(map) = value else {
        return None;
    };
    Some(
        map.into_iter()
            .map(|(date, entry)| {
                let totals = serde_json::from_value::<UsageTotals>(entry).unwrap_or_default();
                (date, totals)
            })
            .collect(),
    )
}

/// Unusable `daily_usage` falls back to no data rather than failing the
/// whole response
fn deserialize_daily_usage<'de, D>(deserializer: D) -> Result<DailyUsage, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(DailyUsage::new());
    }
    Ok(daily_usage_from_value(value).unwrap_or_else(|| {
        tracing::warn!("Error parsing daily usage data, using empty data");
        DailyUsage::new()
    }))
}
