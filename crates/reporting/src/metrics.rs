//! Derived-metric calculator: ratios and growth over raw campaign counters.
//!
//! All ratio functions are total: a zero denominator yields `0.0`, never
//! `NaN` or infinity. Rounding happens only at the serialization edge;
//! sums always run over unrounded values.

use campaign_core::{CampaignError, CampaignResult, MetricRecord};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::AddAssign;
use std::str::FromStr;

/// Value reported in place of a ratio whose denominator is zero.
pub const DIVISION_UNDEFINED: f64 = 0.0;

/// `numerator / denominator * 100`, or [`DIVISION_UNDEFINED`].
pub fn percentage(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        DIVISION_UNDEFINED
    } else {
        numerator / denominator * 100.0
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        DIVISION_UNDEFINED
    } else {
        numerator / denominator
    }
}

pub fn ctr(clicks: u64, impressions: u64) -> f64 {
    percentage(clicks as f64, impressions as f64)
}

pub fn conversion_rate(conversions: u64, clicks: u64) -> f64 {
    percentage(conversions as f64, clicks as f64)
}

pub fn cpc(cost: f64, clicks: u64) -> f64 {
    ratio(cost, clicks as f64)
}

pub fn cpa(cost: f64, conversions: u64) -> f64 {
    ratio(cost, conversions as f64)
}

pub fn roas(revenue: f64, cost: f64) -> f64 {
    ratio(revenue, cost)
}

/// Period-over-period change in percent.
///
/// With no previous value the result is `100` if anything happened this
/// period and `0` otherwise. Dashboards rely on this convention.
pub fn growth(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

/// Round to two decimal places for display.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Fails if a value leaked through a division guard.
pub fn ensure_finite(name: &str, value: f64) -> CampaignResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CampaignError::Computation(format!(
            "{name} evaluated to {value}"
        )))
    }
}

// ─── Aggregated metrics ─────────────────────────────────────────────────────

/// Summed base counters. Derived ratios are methods, computed on every read
/// from the totals, and only materialized when serialized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedMetrics {
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: u64,
    pub spent: f64,
    pub revenue: f64,
    #[serde(default)]
    pub budget: f64,
}

impl AggregatedMetrics {
    pub fn from_record(record: &MetricRecord, revenue_per_conversion: f64) -> Self {
        Self {
            impressions: record.impressions,
            clicks: record.clicks,
            conversions: record.conversions,
            spent: record.cost,
            revenue: record.revenue_or_estimate(revenue_per_conversion),
            budget: 0.0,
        }
    }

    pub fn from_records<'a>(
        records: impl IntoIterator<Item = &'a MetricRecord>,
        revenue_per_conversion: f64,
    ) -> Self {
        records
            .into_iter()
            .map(|r| Self::from_record(r, revenue_per_conversion))
            .sum()
    }

    pub fn with_budget(mut self, budget: f64) -> Self {
        self.budget = budget;
        self
    }

    pub fn ctr(&self) -> f64 {
        ctr(self.clicks, self.impressions)
    }

    pub fn conversion_rate(&self) -> f64 {
        conversion_rate(self.conversions, self.clicks)
    }

    pub fn cpc(&self) -> f64 {
        cpc(self.spent, self.clicks)
    }

    pub fn cpa(&self) -> f64 {
        cpa(self.spent, self.conversions)
    }

    pub fn roas(&self) -> f64 {
        roas(self.revenue, self.spent)
    }

    pub fn budget_utilization(&self) -> f64 {
        percentage(self.spent, self.budget)
    }

    pub fn is_empty(&self) -> bool {
        self.impressions == 0 && self.clicks == 0 && self.conversions == 0 && self.spent == 0.0
    }

    pub fn value(&self, field: MetricField) -> f64 {
        match field {
            MetricField::Impressions => self.impressions as f64,
            MetricField::Clicks => self.clicks as f64,
            MetricField::Conversions => self.conversions as f64,
            MetricField::Spent => self.spent,
            MetricField::Revenue => self.revenue,
            MetricField::Ctr => self.ctr(),
            MetricField::ConversionRate => self.conversion_rate(),
            MetricField::Cpc => self.cpc(),
            MetricField::Cpa => self.cpa(),
            MetricField::Roas => self.roas(),
            MetricField::BudgetUtilization => self.budget_utilization(),
        }
    }

    /// Rounded display value. Counters stay exact; money and ratios round.
    pub fn display_value(&self, field: MetricField) -> serde_json::Value {
        match field {
            MetricField::Impressions => self.impressions.into(),
            MetricField::Clicks => self.clicks.into(),
            MetricField::Conversions => self.conversions.into(),
            other => round2(self.value(other)).into(),
        }
    }
}

impl AddAssign for AggregatedMetrics {
    fn add_assign(&mut self, rhs: Self) {
        self.impressions = self.impressions.saturating_add(rhs.impressions);
        self.clicks = self.clicks.saturating_add(rhs.clicks);
        self.conversions = self.conversions.saturating_add(rhs.conversions);
        self.spent += rhs.spent;
        self.revenue += rhs.revenue;
        self.budget += rhs.budget;
    }
}

impl Sum for AggregatedMetrics {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), |mut acc, m| {
            acc += m;
            acc
        })
    }
}

impl<'a> Sum<&'a AggregatedMetrics> for AggregatedMetrics {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricsView {
    impressions: u64,
    clicks: u64,
    conversions: u64,
    spent: f64,
    revenue: f64,
    budget: f64,
    ctr: f64,
    conversion_rate: f64,
    cpc: f64,
    cpa: f64,
    roas: f64,
    budget_utilization: f64,
}

impl Serialize for AggregatedMetrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        MetricsView {
            impressions: self.impressions,
            clicks: self.clicks,
            conversions: self.conversions,
            spent: round2(self.spent),
            revenue: round2(self.revenue),
            budget: round2(self.budget),
            ctr: round2(self.ctr()),
            conversion_rate: round2(self.conversion_rate()),
            cpc: round2(self.cpc()),
            cpa: round2(self.cpa()),
            roas: round2(self.roas()),
            budget_utilization: round2(self.budget_utilization()),
        }
        .serialize(serializer)
    }
}

/// Period-over-period growth for each base counter, in percent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrowthMetrics {
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub spent: f64,
    pub revenue: f64,
}

impl GrowthMetrics {
    pub fn between(current: &AggregatedMetrics, previous: &AggregatedMetrics) -> Self {
        Self {
            impressions: round2(growth(
                current.impressions as f64,
                previous.impressions as f64,
            )),
            clicks: round2(growth(current.clicks as f64, previous.clicks as f64)),
            conversions: round2(growth(
                current.conversions as f64,
                previous.conversions as f64,
            )),
            spent: round2(growth(current.spent, previous.spent)),
            revenue: round2(growth(current.revenue, previous.revenue)),
        }
    }
}

// ─── Metric names ───────────────────────────────────────────────────────────

/// Metric names callers may request in custom reports and comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricField {
    Impressions,
    Clicks,
    Conversions,
    #[serde(alias = "cost")]
    Spent,
    Revenue,
    Ctr,
    ConversionRate,
    Cpc,
    Cpa,
    Roas,
    BudgetUtilization,
}

impl MetricField {
    pub const ALL: [MetricField; 11] = [
        MetricField::Impressions,
        MetricField::Clicks,
        MetricField::Conversions,
        MetricField::Spent,
        MetricField::Revenue,
        MetricField::Ctr,
        MetricField::ConversionRate,
        MetricField::Cpc,
        MetricField::Cpa,
        MetricField::Roas,
        MetricField::BudgetUtilization,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricField::Impressions => "impressions",
            MetricField::Clicks => "clicks",
            MetricField::Conversions => "conversions",
            MetricField::Spent => "spent",
            MetricField::Revenue => "revenue",
            MetricField::Ctr => "ctr",
            MetricField::ConversionRate => "conversionRate",
            MetricField::Cpc => "cpc",
            MetricField::Cpa => "cpa",
            MetricField::Roas => "roas",
            MetricField::BudgetUtilization => "budgetUtilization",
        }
    }

    /// Parse a list of requested metric names, rejecting unknown ones.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> CampaignResult<Vec<MetricField>> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let field = name.as_ref().parse::<MetricField>()?;
            if !fields.contains(&field) {
                fields.push(field);
            }
        }
        Ok(fields)
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricField {
    type Err = CampaignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // "cost" is accepted as an alias for spend.
        if s == "cost" {
            return Ok(MetricField::Spent);
        }
        MetricField::ALL
            .iter()
            .copied()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| CampaignError::validation(format!("unknown metric '{s}'")))
    }
}
