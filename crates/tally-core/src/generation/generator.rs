//! Candidate query generation.
//!
//! Strategies are tried in order, and a strategy is skipped when it would
//! reproduce SQL that already failed for this plan:
//!
//! 1. the template for the plan, with identifiers remapped after
//!    unknown-identifier failures;
//! 2. the previous query with the unknown identifier substituted by its
//!    closest schema name;
//! 3. the language model, prompted with schema, exemplars, document
//!    constraints and the failure history.

use std::fmt::Write as _;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tally_abstraction::{CompletionParameters, LanguageModel};
use tally_training::{ident, ExemplarSet, GenerationParams};
use tracing::{debug, warn};

use super::template;
use super::types::{CandidateQuery, Strategy};
use crate::execution::{ExecutionFailure, FailureKind};
use crate::planning::QueryPlan;
use crate::question::Question;
use crate::repair::AttemptRecord;
use crate::storage::{quote_ident, SchemaMetadata};

/// Quoted identifiers, string literals and bare words of a SQL statement.
static SQL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""(?:[^"]|"")*"|'(?:[^']|'')*'|[A-Za-z_][A-Za-z0-9_]*"#).expect("SQL token regex should be valid")
});

/// Everything the generator reads for one question.
#[derive(Clone, Copy)]
pub struct GenerationContext<'a> {
    pub question: &'a Question,
    pub plan: &'a QueryPlan,
    pub schema: &'a SchemaMetadata,
    /// Retrieved passage text in scope for hybrid questions, empty otherwise.
    pub constraints: &'a str,
}

pub struct QueryGenerator {
    exemplars: Arc<ExemplarSet>,
    model: Option<Arc<dyn LanguageModel>>,
}

impl QueryGenerator {
    pub fn new(exemplars: Arc<ExemplarSet>) -> Self {
        Self { exemplars, model: None }
    }

    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn exemplars(&self) -> &ExemplarSet {
        &self.exemplars
    }

    pub fn model(&self) -> Option<&Arc<dyn LanguageModel>> {
        self.model.as_ref()
    }

    /// Produces the candidate for attempt `prior.len()`.
    pub async fn generate(&self, ctx: GenerationContext<'_>, prior: &[AttemptRecord]) -> CandidateQuery {
        let attempt = prior.len() as u32;
        let plan_id = ctx.plan.id;
        let failures: Vec<(&CandidateQuery, &ExecutionFailure)> = prior
            .iter()
            .filter_map(|r| r.outcome.failure().map(|f| (&r.candidate, f)))
            .collect();
        let tried = |sql: &str| prior.iter().any(|r| r.candidate.sql.trim() == sql.trim());

        let params = corrected_params(&self.exemplars.params, ctx.schema, &failures);
        if let Some(sql) = template::render(ctx.plan, &params, ctx.schema.cost_column.as_ref()) {
            if !tried(&sql) {
                let strategy = if attempt == 0 { Strategy::Template } else { Strategy::CorrectedTemplate };
                debug!(plan_id = %plan_id, attempt, ?strategy, "Generated templated query");
                return CandidateQuery::new(sql, plan_id, attempt, strategy);
            }
        }

        if let Some((previous, failure)) = failures.last() {
            if let Some(sql) = substitute_identifier(&previous.sql, failure, ctx.schema) {
                if !tried(&sql) {
                    debug!(plan_id = %plan_id, attempt, "Substituted unknown identifier");
                    return CandidateQuery::new(sql, plan_id, attempt, Strategy::IdentifierSubstitution);
                }
            }
        }

        let Some(model) = &self.model else {
            return CandidateQuery::unavailable(plan_id, attempt, "no template applies and no model is configured");
        };

        let prompt = self.prompt(ctx, &failures);
        let parameters = CompletionParameters::with_temperature(self.exemplars.params.temperature);
        match model.complete(&prompt, Some(parameters)).await {
            Ok(completion) => {
                let sql = clean_sql(&completion.text);
                if sql.is_empty() {
                    CandidateQuery::unavailable(plan_id, attempt, "model returned no query")
                } else if tried(&sql) {
                    CandidateQuery::unavailable(plan_id, attempt, "model repeated a failed query")
                } else {
                    debug!(plan_id = %plan_id, attempt, model_id = model.model_id(), "Model produced query");
                    CandidateQuery::new(sql, plan_id, attempt, Strategy::ModelAssisted)
                }
            }
            Err(e) => {
                warn!(plan_id = %plan_id, attempt, error = %e, "Model generation failed");
                CandidateQuery::unavailable(plan_id, attempt, format!("model unavailable: {e}"))
            }
        }
    }

    fn prompt(&self, ctx: GenerationContext<'_>, failures: &[(&CandidateQuery, &ExecutionFailure)]) -> String {
        let params = &self.exemplars.params;
        let mut prompt = String::from(
            "You write exactly one SQLite SELECT statement. Quote identifiers with double quotes, \
             e.g. \"Order Details\". Revenue is SUM(UnitPrice * Quantity * (1 - Discount)). \
             Return only the SQL.\n\nSchema:\n",
        );
        prompt.push_str(&ctx.schema.describe());

        let examples = self.exemplars.select_exemplars(ctx.question.text(), params.max_exemplars);
        if !examples.is_empty() {
            prompt.push_str("\nExamples:\n");
            for ex in examples {
                let _ = writeln!(prompt, "Question: {}\nSQL: {}\n", ex.question, ex.sql);
            }
        }

        if let Some(metric) = ctx.plan.metric {
            let _ = writeln!(prompt, "\nMetric: {} = {}", metric.label(), metric.formula());
        }
        if let Some(range) = &ctx.plan.time_range {
            let _ = writeln!(prompt, "Period: {range} (inclusive, compare with date(OrderDate))");
        }
        if !ctx.constraints.trim().is_empty() {
            let _ = writeln!(prompt, "\nContext from documents:\n{}", ctx.constraints.trim());
        }

        for (candidate, failure) in failures {
            let _ = writeln!(
                prompt,
                "\nPrevious attempt failed:\n{}\nError ({}): {}",
                candidate.sql.trim(),
                failure.kind,
                failure.message
            );
        }
        if !failures.is_empty() {
            prompt.push_str("Write a corrected query.\n");
        }

        let _ = write!(prompt, "\nQuestion: {}\nSQL:", ctx.question.text());
        prompt
    }
}

/// Remaps every logical identifier whose physical name was reported unknown
/// and does not exist where the template expects it.
fn corrected_params(
    base: &GenerationParams,
    schema: &SchemaMetadata,
    failures: &[(&CandidateQuery, &ExecutionFailure)],
) -> GenerationParams {
    let mut params = base.clone();
    let unknown = failures
        .iter()
        .filter(|(_, f)| f.kind == FailureKind::UnknownIdentifier)
        .filter_map(|(_, f)| f.identifier.as_deref());

    for name in unknown {
        let keys: Vec<&str> = ident::NORTHWIND
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| params.identifier(key).eq_ignore_ascii_case(name))
            .collect();

        for key in keys {
            let replacement = if key.contains('.') {
                let table = params.identifier(ident::table_of(key)).to_string();
                if schema.has_column(&table, name) {
                    continue;
                }
                schema.closest_column(&table, name)
            } else {
                if schema.has_table(name) {
                    continue;
                }
                schema.closest_table(name)
            };

            if let Some(replacement) = replacement.filter(|r| !r.eq_ignore_ascii_case(name)) {
                debug!(key, from = name, to = replacement, "Remapped identifier");
                params = params.with_identifier(key, replacement);
            }
        }
    }
    params
}

/// The previous SQL with the unknown identifier replaced by the closest
/// schema name, or `None` when nothing close enough exists.
fn substitute_identifier(sql: &str, failure: &ExecutionFailure, schema: &SchemaMetadata) -> Option<String> {
    if failure.kind != FailureKind::UnknownIdentifier {
        return None;
    }
    let name = failure.identifier.as_deref()?;
    let replacement = schema.closest_identifier(name).filter(|r| !r.eq_ignore_ascii_case(name))?;
    let target = quote_ident(replacement);

    // Whole quoted identifiers and bare words only; string literals are left alone.
    let substituted = SQL_TOKEN
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            let token = &caps[0];
            let matches = if let Some(quoted) = token.strip_prefix('"').and_then(|t| t.strip_suffix('"')) {
                quoted.replace("\"\"", "\"").eq_ignore_ascii_case(name)
            } else {
                !token.starts_with('\'') && token.eq_ignore_ascii_case(name)
            };
            if matches { target.clone() } else { token.to_string() }
        })
        .into_owned();
    (substituted != sql).then_some(substituted)
}

/// Strips markdown fences and a leading `SQL:` label and keeps the first statement.
pub fn clean_sql(text: &str) -> String {
    let mut body = text.trim();
    if let Some(start) = body.find("```") {
        let after = &body[start + 3..];
        let after = after.find('\n').map_or(after, |nl| &after[nl + 1..]);
        body = after.find("```").map_or(after, |end| &after[..end]);
    }

    let body = body.trim();
    let body = body
        .strip_prefix("SQL:")
        .or_else(|| body.strip_prefix("sql:"))
        .unwrap_or(body)
        .trim();
    first_statement(body).trim().to_string()
}

/// Text up to the first `;` outside quotes.
fn first_statement(sql: &str) -> &str {
    let mut quote: Option<char> = None;
    for (idx, c) in sql.char_indices() {
        match (quote, c) {
            (None, '\'' | '"') => quote = Some(c),
            (Some(open), _) if c == open => quote = None,
            (None, ';') => return &sql[..idx],
            _ => {}
        }
    }
    sql
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionOutcome;
    use crate::planning::{Metric, PlanId};
    use crate::storage::TableInfo;
    use tally_models::ScriptedModel;

    fn schema() -> SchemaMetadata {
        let table = |name: &str, cols: &[&str]| TableInfo {
            name: name.to_string(),
            columns: cols.iter().map(|c| (*c).to_string()).collect(),
        };
        SchemaMetadata {
            tables: vec![
                table("Order Details", &["OrderID", "ProductID", "UnitPrice", "Quantity", "Discnt"]),
                table("Orders", &["OrderID", "CustomerID", "OrderDate"]),
            ],
            ..SchemaMetadata::default()
        }
    }

    fn failed(candidate: CandidateQuery, kind: FailureKind, identifier: Option<&str>) -> AttemptRecord {
        let mut failure = ExecutionFailure::new(kind, "boom");
        failure.identifier = identifier.map(str::to_string);
        AttemptRecord { candidate, outcome: ExecutionOutcome::Failure(failure) }
    }

    #[tokio::test]
    async fn test_first_attempt_uses_template() {
        let generator = QueryGenerator::new(Arc::new(ExemplarSet::baseline()));
        let question = Question::new("q1", "total revenue");
        let plan = QueryPlan::new(Some(Metric::Revenue));
        let schema = schema();
        let ctx = GenerationContext { question: &question, plan: &plan, schema: &schema, constraints: "" };

        let candidate = generator.generate(ctx, &[]).await;
        assert_eq!(candidate.attempt, 0);
        assert_eq!(candidate.strategy, Strategy::Template);
        assert!(candidate.sql.contains("od.\"Discount\""));
    }

    #[tokio::test]
    async fn test_unknown_column_is_remapped_on_retry() {
        let generator = QueryGenerator::new(Arc::new(ExemplarSet::baseline()));
        let question = Question::new("q1", "total revenue");
        let plan = QueryPlan::new(Some(Metric::Revenue));
        let schema = schema();
        let ctx = GenerationContext { question: &question, plan: &plan, schema: &schema, constraints: "" };

        let first = generator.generate(ctx, &[]).await;
        let prior = vec![failed(first.clone(), FailureKind::UnknownIdentifier, Some("Discount"))];
        let second = generator.generate(ctx, &prior).await;

        assert_eq!(second.attempt, 1);
        assert_eq!(second.strategy, Strategy::CorrectedTemplate);
        assert!(second.sql.contains("od.\"Discnt\""));
        assert_ne!(second.sql, first.sql);
    }

    #[tokio::test]
    async fn test_unknown_spaced_table_is_remapped_on_retry() {
        let mut exemplars = ExemplarSet::baseline();
        exemplars.params = exemplars.params.with_identifier(ident::LINE_ITEMS, "Order Detail");
        let generator = QueryGenerator::new(Arc::new(exemplars));
        let question = Question::new("q1", "total revenue");
        let plan = QueryPlan::new(Some(Metric::Revenue));
        let schema = schema();
        let ctx = GenerationContext { question: &question, plan: &plan, schema: &schema, constraints: "" };

        let first = generator.generate(ctx, &[]).await;
        assert!(first.sql.contains("FROM \"Order Detail\" od"));
        let prior = vec![failed(first, FailureKind::UnknownIdentifier, Some("Order Detail"))];
        let second = generator.generate(ctx, &prior).await;

        assert_eq!(second.strategy, Strategy::CorrectedTemplate);
        assert!(second.sql.contains("FROM \"Order Details\" od"));
        assert!(!second.sql.contains("\"\""));
    }

    #[tokio::test]
    async fn test_repeated_failure_falls_back_to_model_with_error_context() {
        let model = Arc::new(ScriptedModel::new(
            "m".into(),
            vec!["```sql\nSELECT COUNT(*) FROM \"Orders\";\n```".into()],
        ));
        let generator = QueryGenerator::new(Arc::new(ExemplarSet::baseline())).with_model(model.clone());
        let question = Question::new("q1", "how many orders");
        let plan = QueryPlan::new(Some(Metric::OrderCount));
        let schema = schema();
        let ctx = GenerationContext { question: &question, plan: &plan, schema: &schema, constraints: "" };

        let first = generator.generate(ctx, &[]).await;
        let prior = vec![failed(first, FailureKind::Syntax, None)];
        let second = generator.generate(ctx, &prior).await;

        assert_eq!(second.strategy, Strategy::ModelAssisted);
        assert_eq!(second.sql, "SELECT COUNT(*) FROM \"Orders\"");
        let prompt = &model.prompts()[0];
        assert!(prompt.contains("Error (syntax): boom"));
        assert!(prompt.contains("Table: \"Order Details\""));
    }

    #[tokio::test]
    async fn test_unresolved_plan_without_model_is_unavailable() {
        let generator = QueryGenerator::new(Arc::new(ExemplarSet::baseline()));
        let question = Question::new("q1", "tell me things");
        let plan = QueryPlan::new(None);
        let schema = schema();
        let ctx = GenerationContext { question: &question, plan: &plan, schema: &schema, constraints: "" };

        let candidate = generator.generate(ctx, &[]).await;
        assert_eq!(candidate.strategy, Strategy::Unavailable);
        assert!(candidate.sql.is_empty());
    }

    #[tokio::test]
    async fn test_model_error_is_unavailable() {
        let generator =
            QueryGenerator::new(Arc::new(ExemplarSet::baseline())).with_model(Arc::new(ScriptedModel::silent()));
        let question = Question::new("q1", "tell me things");
        let plan = QueryPlan::new(None);
        let schema = schema();
        let ctx = GenerationContext { question: &question, plan: &plan, schema: &schema, constraints: "" };

        let candidate = generator.generate(ctx, &[]).await;
        assert_eq!(candidate.strategy, Strategy::Unavailable);
        assert!(candidate.note.unwrap().starts_with("model unavailable"));
    }

    #[test]
    fn test_substitute_identifier_in_model_sql() {
        let mut failure = ExecutionFailure::new(FailureKind::UnknownIdentifier, "no such column: Discount");
        failure.identifier = Some("Discount".into());
        let sql = "SELECT SUM(\"Discount\") + SUM(Discount) FROM \"Order Details\"";
        let fixed = substitute_identifier(sql, &failure, &schema()).unwrap();
        assert_eq!(fixed, "SELECT SUM(\"Discnt\") + SUM(\"Discnt\") FROM \"Order Details\"");
    }

    #[test]
    fn test_clean_sql() {
        assert_eq!(clean_sql("SQL: SELECT 1; SELECT 2"), "SELECT 1");
        assert_eq!(clean_sql("Here:\n```sql\nSELECT 2\n```\nthanks"), "SELECT 2");
        assert_eq!(clean_sql("   "), "");
        assert_eq!(
            clean_sql("SELECT COUNT(*) FROM \"Products\" WHERE \"ProductName\" = 'a;b'; DROP TABLE x"),
            "SELECT COUNT(*) FROM \"Products\" WHERE \"ProductName\" = 'a;b'"
        );
        assert_eq!(clean_sql("SELECT \"odd;name\" FROM t;"), "SELECT \"odd;name\" FROM t");
    }

    #[test]
    fn test_substitute_spaced_table_name() {
        let mut failure = ExecutionFailure::new(FailureKind::UnknownIdentifier, "no such table: Order Detail");
        failure.identifier = Some("Order Detail".into());
        let sql = "SELECT SUM(od.\"Quantity\") FROM \"Order Detail\" od WHERE od.\"OrderID\" > 0";
        let fixed = substitute_identifier(sql, &failure, &schema()).unwrap();
        assert_eq!(fixed, "SELECT SUM(od.\"Quantity\") FROM \"Order Details\" od WHERE od.\"OrderID\" > 0");
    }

    #[test]
    fn test_substitute_skips_words_inside_quotes_and_literals() {
        let mut failure = ExecutionFailure::new(FailureKind::UnknownIdentifier, "no such table: Order");
        failure.identifier = Some("Order".into());
        let sql = "SELECT 1 FROM \"Order Details\" WHERE 'Order' = 'x'";
        assert_eq!(substitute_identifier(sql, &failure, &schema()), None);
    }

    #[test]
    fn test_corrected_params_leaves_existing_columns() {
        let plan_id = PlanId::new();
        let candidate = CandidateQuery::new("SELECT 1", plan_id, 0, Strategy::Template);
        let mut failure = ExecutionFailure::new(FailureKind::UnknownIdentifier, "x");
        failure.identifier = Some("OrderID".into());
        let params = corrected_params(&GenerationParams::default(), &schema(), &[(&candidate, &failure)]);
        assert_eq!(params, GenerationParams::default());
    }
}
