//! The canonical query plan.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metrics::COGS_APPROXIMATION_RATIO;

/// Identity of a plan lineage. Every candidate query carries the id of the
/// plan it was generated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanId(Uuid);

impl PlanId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The closed set of metrics the generator can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Revenue,
    OrderCount,
    AverageOrderValue,
    GrossMargin,
    UnitsSold,
}

impl Metric {
    pub const ALL: [Metric; 5] =
        [Self::Revenue, Self::OrderCount, Self::AverageOrderValue, Self::GrossMargin, Self::UnitsSold];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Revenue => "revenue",
            Self::OrderCount => "order_count",
            Self::AverageOrderValue => "average_order_value",
            Self::GrossMargin => "gross_margin",
            Self::UnitsSold => "units_sold",
        }
    }

    /// Human label used in answer sentences.
    pub fn label(self) -> &'static str {
        match self {
            Self::Revenue => "Revenue",
            Self::OrderCount => "Order count",
            Self::AverageOrderValue => "Average order value",
            Self::GrossMargin => "Gross margin",
            Self::UnitsSold => "Units sold",
        }
    }

    /// Monetary metrics are rounded and formatted as currency.
    pub fn is_monetary(self) -> bool {
        matches!(self, Self::Revenue | Self::AverageOrderValue | Self::GrossMargin)
    }

    pub fn formula(self) -> &'static str {
        match self {
            Self::Revenue => "SUM(unit_price * quantity * (1 - discount))",
            Self::OrderCount => "COUNT(DISTINCT order_id)",
            Self::AverageOrderValue => {
                "SUM(unit_price * quantity * (1 - discount)) / COUNT(DISTINCT order_id)"
            }
            Self::GrossMargin => "SUM((unit_price - cost_of_goods) * quantity * (1 - discount))",
            Self::UnitsSold => "SUM(quantity)",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Metric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s.trim().to_lowercase().replace([' ', '-'], "_");
        match key.as_str() {
            "revenue" | "sales" => Ok(Self::Revenue),
            "order_count" | "orders" => Ok(Self::OrderCount),
            "average_order_value" | "aov" => Ok(Self::AverageOrderValue),
            "gross_margin" | "margin" | "gm" => Ok(Self::GrossMargin),
            "units_sold" | "quantity" | "units" => Ok(Self::UnitsSold),
            other => Err(format!("unknown metric '{other}'")),
        }
    }
}

/// Categorical dimensions a plan can filter or group on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Category,
    Product,
    Customer,
    /// Customer country.
    Region,
}

impl Dimension {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Product => "product",
            Self::Customer => "customer",
            Self::Region => "region",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Category => "categories",
            Self::Product => "products",
            Self::Customer => "customers",
            Self::Region => "regions",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

/// Inclusive calendar range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    /// The phrase the range was read from ("summer 1997", "last quarter").
    pub label: String,
}

impl TimeRange {
    pub fn new(start: NaiveDate, end: NaiveDate, label: impl Into<String>) -> Self {
        Self { start, end, label: label.into() }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// Where a plan element came from, when it was not read directly off the question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Gross margin uses `ratio * unit_price` as cost of goods.
    CostApproximation { ratio: f64 },
    /// Gross margin uses a cost column found in the schema.
    CostColumn { table: String, column: String },
    /// The time range was taken from a retrieved passage.
    TimeRangeFromDocument { doc_id: String },
    /// A relative period resolved against the reference date.
    RelativePeriod { phrase: String, as_of: NaiveDate },
    /// The metric was named by the language model.
    MetricInferredByModel { model_id: String },
    /// No metric could be identified.
    UnresolvedMetric,
    /// A filter on the grouped dimension was dropped so the ranking stays meaningful.
    FilterDroppedForGrouping { dimension: Dimension, value: String },
}

impl Provenance {
    pub fn cost_approximation() -> Self {
        Self::CostApproximation { ratio: COGS_APPROXIMATION_RATIO }
    }
}

/// Structured parameters extracted from one question.
///
/// Plans are not modified after the planner returns them; the generator and
/// repair loop only read them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub id: PlanId,
    /// `None` when no metric could be identified.
    pub metric: Option<Metric>,
    pub entities: BTreeSet<String>,
    pub filters: BTreeMap<Dimension, String>,
    pub time_range: Option<TimeRange>,
    pub group_by: Option<Dimension>,
    pub limit: Option<u32>,
    pub order: SortOrder,
    pub provenance: Vec<Provenance>,
}

impl QueryPlan {
    pub fn new(metric: Option<Metric>) -> Self {
        Self {
            id: PlanId::new(),
            metric,
            entities: BTreeSet::new(),
            filters: BTreeMap::new(),
            time_range: None,
            group_by: None,
            limit: None,
            order: SortOrder::Desc,
            provenance: Vec::new(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.metric.is_some()
    }

    /// The cost-of-goods ratio in effect, when gross margin is approximated.
    pub fn cost_approximation(&self) -> Option<f64> {
        self.provenance.iter().find_map(|p| match p {
            Provenance::CostApproximation { ratio } => Some(*ratio),
            _ => None,
        })
    }

    /// Short description of the filters and period, for answer sentences.
    pub fn scope_description(&self) -> String {
        let mut parts: Vec<String> =
            self.filters.iter().map(|(dim, value)| format!("{dim} {value}")).collect();
        if let Some(range) = &self.time_range {
            parts.push(format!("{} to {}", range.start, range.end));
        }
        parts.join(", ")
    }
}
