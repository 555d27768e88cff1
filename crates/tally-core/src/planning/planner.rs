//! Extracts a [`QueryPlan`] from question text.
//!
//! Extraction is lexical: metric cue phrases, schema value lists for entity
//! filters, period patterns for the time range, and a few grouping patterns
//! ("top 3 products", "which category", "by customer"). Only when no metric
//! cue is present is the language model asked to name one.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use tally_abstraction::{CompletionParameters, LanguageModel};
use tracing::{debug, warn};

use super::error::{PlanError, PlanResult};
use super::plan::{Dimension, Metric, Provenance, QueryPlan, SortOrder};
use super::time::{find_iso_range, parse_period, PeriodMatch};
use crate::question::Question;
use crate::retrieval::RetrievalResult;
use crate::routing::RouteDecision;
use crate::storage::SchemaMetadata;
use crate::text::{contains_phrase, words};

/// Checked in order; the first metric with a matching cue wins.
const METRIC_CUES: &[(Metric, &[&str])] = &[
    (Metric::GrossMargin, &["gross margin", "margin", "gm", "profit", "profitability"]),
    (
        Metric::AverageOrderValue,
        &["average order value", "aov", "avg order value", "average order size", "average basket"],
    ),
    (
        Metric::OrderCount,
        &["how many orders", "number of orders", "order count", "count of orders", "orders placed", "total orders"],
    ),
    (Metric::UnitsSold, &["units sold", "units", "quantity", "quantities", "items sold", "volume"]),
    (Metric::Revenue, &["revenue", "sales", "turnover", "income"]),
];

/// Entity values made only of these words are never matched.
const STOPWORDS: &[&str] = &[
    "a", "all", "an", "and", "any", "as", "at", "by", "for", "from", "in", "is", "it", "of", "on", "or", "the", "to",
    "us", "we",
];

const ASCENDING_CUES: &[&str] = &["lowest", "least", "worst", "bottom", "fewest", "smallest"];

const DIM: &str = r"(categor(?:y|ies)|products?|customers?|countr(?:y|ies)|regions?)";

static TOP_N: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(top|bottom)\s+(\d+)\s+(?:[a-z-]+\s+)?{DIM}\b")).expect("top-n regex should be valid")
});

static SINGLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(which|what|best|worst|top)\s+(?:[a-z-]+\s+)?{DIM}\b"))
        .expect("single-group regex should be valid")
});

static PER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(?:by|per|each|across)\s+{DIM}\b")).expect("per-group regex should be valid")
});

pub struct Planner {
    schema: Arc<SchemaMetadata>,
    as_of: NaiveDate,
    model: Option<Arc<dyn LanguageModel>>,
}

impl Planner {
    pub fn new(schema: Arc<SchemaMetadata>, as_of: NaiveDate) -> Self {
        Self { schema, as_of, model: None }
    }

    /// Enables model inference for questions without a metric cue.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Plans a question routed to the database.
    ///
    /// `retrieval` is consulted for a period when the question names none.
    pub async fn plan(
        &self,
        question: &Question,
        route: &RouteDecision,
        retrieval: Option<&RetrievalResult>,
    ) -> PlanResult<QueryPlan> {
        let mut plan = self.plan_lexical(question, route, retrieval)?;
        if plan.is_resolved() {
            return Ok(plan);
        }

        if let Some(model) = &self.model {
            if let Some(metric) = self.infer_metric(model.as_ref(), question).await {
                plan.metric = Some(metric);
                plan.provenance.retain(|p| *p != Provenance::UnresolvedMetric);
                plan.provenance.push(Provenance::MetricInferredByModel { model_id: model.model_id().to_string() });
                self.annotate_cost(&mut plan);
            }
        }
        Ok(plan)
    }

    /// Everything except model inference.
    pub fn plan_lexical(
        &self,
        question: &Question,
        route: &RouteDecision,
        retrieval: Option<&RetrievalResult>,
    ) -> PlanResult<QueryPlan> {
        if !route.mode.needs_query() {
            return Err(PlanError::NotQueryRoute(route.mode));
        }
        let text = question.text();
        if text.trim().is_empty() {
            return Err(PlanError::EmptyQuestion);
        }

        let tokens = words(text);
        let lower = text.to_lowercase();

        let metric = METRIC_CUES
            .iter()
            .find(|(_, cues)| cues.iter().any(|cue| contains_phrase(&tokens, cue)))
            .map(|(metric, _)| *metric);
        let mut plan = QueryPlan::new(metric);
        if metric.is_none() {
            plan.provenance.push(Provenance::UnresolvedMetric);
        }

        self.extract_entities(&tokens, &mut plan);
        Self::extract_grouping(&lower, &tokens, &mut plan);

        if let Some(group) = plan.group_by {
            if let Some(value) = plan.filters.remove(&group) {
                plan.provenance.push(Provenance::FilterDroppedForGrouping { dimension: group, value });
            }
        }

        self.extract_period(text, retrieval, &mut plan);
        self.annotate_cost(&mut plan);

        debug!(
            question_id = %question.id(),
            plan_id = %plan.id,
            metric = ?plan.metric,
            filters = plan.filters.len(),
            group_by = ?plan.group_by,
            has_period = plan.time_range.is_some(),
            "Planned question"
        );
        Ok(plan)
    }

    fn extract_entities(&self, tokens: &[String], plan: &mut QueryPlan) {
        let lists: [(Dimension, &[String]); 4] = [
            (Dimension::Category, &self.schema.categories),
            (Dimension::Product, &self.schema.products),
            (Dimension::Customer, &self.schema.customers),
            (Dimension::Region, &self.schema.regions),
        ];

        for (dimension, values) in lists {
            let best = values
                .iter()
                .filter(|v| !is_stopword_phrase(v) && contains_phrase(tokens, v))
                .max_by(|a, b| words(a).len().cmp(&words(b).len()).then(a.len().cmp(&b.len())).then(b.cmp(a)));
            if let Some(value) = best {
                plan.entities.insert(value.clone());
                plan.filters.insert(dimension, value.clone());
            }
        }
    }

    fn extract_grouping(lower: &str, tokens: &[String], plan: &mut QueryPlan) {
        let ascending = ASCENDING_CUES.iter().any(|cue| contains_phrase(tokens, cue));

        if let Some(caps) = TOP_N.captures(lower) {
            plan.group_by = dimension_of(&caps[3]);
            plan.limit = caps[2].parse().ok();
            plan.order = if &caps[1] == "bottom" || ascending { SortOrder::Asc } else { SortOrder::Desc };
        } else if let Some(caps) = SINGLE.captures(lower) {
            plan.group_by = dimension_of(&caps[2]);
            plan.limit = Some(1);
            plan.order = if &caps[1] == "worst" || ascending { SortOrder::Asc } else { SortOrder::Desc };
        } else if let Some(caps) = PER.captures(lower) {
            plan.group_by = dimension_of(&caps[1]);
            plan.order = if ascending { SortOrder::Asc } else { SortOrder::Desc };
        }
    }

    fn extract_period(&self, text: &str, retrieval: Option<&RetrievalResult>, plan: &mut QueryPlan) {
        let found = parse_period(text, self.as_of);

        match found {
            Some(PeriodMatch::Explicit(range)) => plan.time_range = Some(range),
            Some(PeriodMatch::Relative(range)) => {
                plan.provenance.push(Provenance::RelativePeriod { phrase: range.label.clone(), as_of: self.as_of });
                plan.time_range = Some(range);
            }
            Some(PeriodMatch::Year(year_range)) => {
                let year = year_range.start.year();
                let from_doc = retrieval.and_then(|r| document_range(r, Some(year)));
                match from_doc {
                    Some((doc_id, range)) => {
                        plan.provenance.push(Provenance::TimeRangeFromDocument { doc_id });
                        plan.time_range = Some(range);
                    }
                    None => plan.time_range = Some(year_range),
                }
            }
            None => {
                if let Some((doc_id, range)) = retrieval.and_then(|r| document_range(r, None)) {
                    plan.provenance.push(Provenance::TimeRangeFromDocument { doc_id });
                    plan.time_range = Some(range);
                }
            }
        }
    }

    fn annotate_cost(&self, plan: &mut QueryPlan) {
        if plan.metric != Some(Metric::GrossMargin) {
            return;
        }
        let note = match &self.schema.cost_column {
            Some(cost) => Provenance::CostColumn { table: cost.table_key.clone(), column: cost.column.clone() },
            None => Provenance::cost_approximation(),
        };
        if !plan.provenance.contains(&note) {
            plan.provenance.push(note);
        }
    }

    async fn infer_metric(&self, model: &dyn LanguageModel, question: &Question) -> Option<Metric> {
        let options: Vec<&str> = Metric::ALL.iter().map(|m| m.as_str()).collect();
        let prompt = format!(
            "Classify the business metric this question asks for.\n\
             Answer with exactly one of: {}, unknown.\n\
             Question: {}\nMetric:",
            options.join(", "),
            question.text()
        );

        match model.complete(&prompt, Some(CompletionParameters::with_temperature(0.0))).await {
            Ok(completion) => {
                let first = completion
                    .text
                    .lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
                let cleaned = first.trim_matches(|c: char| !c.is_alphanumeric() && c != '_');
                let metric = cleaned.parse::<Metric>().ok();
                debug!(question_id = %question.id(), reply = %cleaned, metric = ?metric, "Model metric inference");
                metric
            }
            Err(e) => {
                warn!(question_id = %question.id(), error = %e, "Metric inference failed; plan stays unresolved");
                None
            }
        }
    }
}

fn dimension_of(word: &str) -> Option<Dimension> {
    if word.starts_with("categor") {
        Some(Dimension::Category)
    } else if word.starts_with("product") {
        Some(Dimension::Product)
    } else if word.starts_with("customer") {
        Some(Dimension::Customer)
    } else if word.starts_with("countr") || word.starts_with("region") {
        Some(Dimension::Region)
    } else {
        None
    }
}

/// First passage, in rank order, naming an ISO date range, optionally restricted
/// to ranges touching `year`.
fn document_range(retrieval: &RetrievalResult, year: Option<i32>) -> Option<(String, super::plan::TimeRange)> {
    retrieval.passages.iter().find_map(|passage| {
        let range = find_iso_range(&passage.text)?;
        let fits = year.is_none_or(|y| range.start.year() == y || range.end.year() == y);
        fits.then(|| (passage.id.clone(), range))
    })
}

fn is_stopword_phrase(value: &str) -> bool {
    words(value).iter().all(|w| STOPWORDS.contains(&w.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::ScoredPassage;
    use crate::routing::{RouteMode, Router};
    use crate::storage::CostColumn;
    use tally_models::ScriptedModel;

    fn schema() -> Arc<SchemaMetadata> {
        Arc::new(SchemaMetadata {
            categories: vec!["Beverages".into(), "Dairy Products".into(), "Seafood".into()],
            products: vec!["Chai".into(), "Chang".into(), "Pavlova".into()],
            customers: vec!["Around the Horn".into(), "Ernst Handel".into()],
            regions: vec!["Germany".into(), "UK".into(), "USA".into()],
            ..SchemaMetadata::default()
        })
    }

    fn planner() -> Planner {
        Planner::new(schema(), NaiveDate::from_ymd_opt(1998, 5, 6).unwrap())
    }

    fn sql_route() -> RouteDecision {
        RouteDecision { mode: RouteMode::Sql, rationale: String::new(), sql_cues: vec![], doc_cues: vec![] }
    }

    fn plan(text: &str) -> QueryPlan {
        planner().plan_lexical(&Question::new("q", text), &sql_route(), None).unwrap()
    }

    #[test]
    fn test_metric_and_category_filter() {
        let plan = plan("Total revenue from the Beverages category in Q3 1997");
        assert_eq!(plan.metric, Some(Metric::Revenue));
        assert_eq!(plan.filters.get(&Dimension::Category).map(String::as_str), Some("Beverages"));
        assert_eq!(plan.time_range.unwrap().start, NaiveDate::from_ymd_opt(1997, 7, 1).unwrap());
    }

    #[test]
    fn test_longest_value_wins() {
        let plan = plan("Units sold of Dairy Products");
        assert_eq!(plan.metric, Some(Metric::UnitsSold));
        assert_eq!(plan.filters.get(&Dimension::Category).map(String::as_str), Some("Dairy Products"));
    }

    #[test]
    fn test_short_entity_names_match() {
        let plan = plan("Revenue from customers in the UK during 1997");
        assert_eq!(plan.filters.get(&Dimension::Region).map(String::as_str), Some("UK"));
        assert!(plan.entities.contains("UK"));
    }

    #[test]
    fn test_stopword_entity_is_ignored() {
        let planner = Planner::new(
            Arc::new(SchemaMetadata { products: vec!["The".into(), "Chai".into()], ..SchemaMetadata::default() }),
            NaiveDate::from_ymd_opt(1998, 5, 6).unwrap(),
        );
        let plan = planner.plan_lexical(&Question::new("q", "Units sold of the Chai"), &sql_route(), None).unwrap();
        assert_eq!(plan.filters.get(&Dimension::Product).map(String::as_str), Some("Chai"));

        let plan = planner.plan_lexical(&Question::new("q", "Units sold in the spring"), &sql_route(), None).unwrap();
        assert!(plan.filters.is_empty());
    }

    #[test]
    fn test_top_n_grouping() {
        let plan = plan("Top 3 products by revenue all-time");
        assert_eq!(plan.group_by, Some(Dimension::Product));
        assert_eq!(plan.limit, Some(3));
        assert_eq!(plan.order, SortOrder::Desc);
        assert!(plan.time_range.is_none());
    }

    #[test]
    fn test_which_category_groups_with_limit_one() {
        let plan = plan("Which product category had the highest revenue in 1997?");
        assert_eq!(plan.group_by, Some(Dimension::Category));
        assert_eq!(plan.limit, Some(1));
    }

    #[test]
    fn test_filter_on_grouped_dimension_is_dropped() {
        let plan = plan("Which category sold the most units, Beverages or Seafood?");
        assert_eq!(plan.group_by, Some(Dimension::Category));
        assert!(plan.filters.is_empty());
        assert!(plan.provenance.iter().any(|p| matches!(p, Provenance::FilterDroppedForGrouping { .. })));
    }

    #[test]
    fn test_gross_margin_records_cost_approximation() {
        let plan = plan("Who was the top customer by gross margin in 1997?");
        assert_eq!(plan.metric, Some(Metric::GrossMargin));
        assert_eq!(plan.group_by, Some(Dimension::Customer));
        assert_eq!(plan.cost_approximation(), Some(0.7));
    }

    #[test]
    fn test_gross_margin_with_cost_column() {
        let mut schema = (*schema()).clone();
        schema.cost_column = Some(CostColumn { table_key: "products".into(), column: "UnitCost".into() });
        let planner = Planner::new(Arc::new(schema), NaiveDate::from_ymd_opt(1998, 1, 1).unwrap());
        let plan = planner.plan_lexical(&Question::new("q", "gross margin 1997"), &sql_route(), None).unwrap();
        assert_eq!(plan.cost_approximation(), None);
        assert!(plan.provenance.iter().any(|p| matches!(p, Provenance::CostColumn { .. })));
    }

    #[test]
    fn test_unresolved_metric_is_marked() {
        let plan = plan("Tell me about Chai in 1997");
        assert!(!plan.is_resolved());
        assert!(plan.provenance.contains(&Provenance::UnresolvedMetric));
    }

    #[test]
    fn test_doc_route_is_rejected() {
        let route = Router::new().classify(&Question::new("q", "What is the return policy?"));
        let err = planner().plan_lexical(&Question::new("q", "What is the return policy?"), &route, None);
        assert_eq!(err.unwrap_err(), PlanError::NotQueryRoute(RouteMode::Doc));
    }

    #[test]
    fn test_document_range_fills_campaign_period() {
        let retrieval = RetrievalResult {
            passages: vec![ScoredPassage {
                id: "marketing_calendar::chunk1".into(),
                score: 0.8,
                text: "Summer Beverages 1997: 1997-06-01 to 1997-06-30".into(),
            }],
        };
        let question = Question::new("q", "Revenue from Beverages during Summer Beverages 1997 per the calendar");
        let plan = planner().plan_lexical(&question, &sql_route(), Some(&retrieval)).unwrap();
        let range = plan.time_range.unwrap();
        assert_eq!(range.end, NaiveDate::from_ymd_opt(1997, 6, 30).unwrap());
        assert!(plan.provenance.contains(&Provenance::TimeRangeFromDocument {
            doc_id: "marketing_calendar::chunk1".into()
        }));
    }

    #[test]
    fn test_relative_period_provenance() {
        let plan = plan("Revenue last quarter");
        assert!(plan.provenance.iter().any(|p| matches!(p, Provenance::RelativePeriod { .. })));
        assert_eq!(plan.time_range.unwrap().start, NaiveDate::from_ymd_opt(1998, 1, 1).unwrap());
    }

    #[tokio::test]
    async fn test_model_names_missing_metric() {
        let model = Arc::new(ScriptedModel::new("m".into(), vec!["  Revenue.\n".into()]));
        let planner = planner().with_model(model.clone());
        let plan = planner.plan(&Question::new("q", "How did Chai do in 1997?"), &sql_route(), None).await.unwrap();
        assert_eq!(plan.metric, Some(Metric::Revenue));
        assert!(!plan.provenance.contains(&Provenance::UnresolvedMetric));
        assert!(plan.provenance.iter().any(|p| matches!(p, Provenance::MetricInferredByModel { .. })));
        assert_eq!(model.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_model_failure_keeps_plan_unresolved() {
        let planner = planner().with_model(Arc::new(ScriptedModel::silent()));
        let plan = planner.plan(&Question::new("q", "How did Chai do?"), &sql_route(), None).await.unwrap();
        assert!(!plan.is_resolved());
    }
}
