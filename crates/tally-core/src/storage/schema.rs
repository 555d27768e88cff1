//! Schema metadata read from the store once at startup.
//!
//! Besides table and column names this records the categorical values the
//! planner resolves entities against, and whether any cost column exists
//! (gross margin falls back to an approximation without one).

use std::fmt::Write as _;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tally_training::{ident, GenerationParams};
use tracing::{info, warn};

use crate::storage::database::RelationalStore;
use crate::storage::error::StorageResult;

/// Minimum similarity for a fuzzy identifier match.
const MATCH_THRESHOLD: f64 = 0.6;

/// Column names that carry a per-unit cost.
const COST_COLUMN_NAMES: &[&str] = &[
    "cost", "unitcost", "costprice", "costofgoods", "standardcost", "cogs", "purchaseprice",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
}

/// A column holding per-unit cost of goods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostColumn {
    /// Logical table key (`line_items` or `products`).
    pub table_key: String,
    pub column: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    pub tables: Vec<TableInfo>,
    pub categories: Vec<String>,
    pub products: Vec<String>,
    pub customers: Vec<String>,
    pub regions: Vec<String>,
    pub cost_column: Option<CostColumn>,
}

impl SchemaMetadata {
    /// Reads tables, columns and categorical values through `store`.
    ///
    /// Only a failure to list tables is an error. Missing categorical tables
    /// leave the corresponding value list empty.
    pub fn introspect(
        store: &dyn RelationalStore,
        params: &GenerationParams,
        budget: Duration,
    ) -> StorageResult<Self> {
        let listing = store.execute(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
            budget,
        )?;

        let mut tables = Vec::new();
        for name in listing.rows.iter().filter_map(|row| row.first().and_then(Value::as_str)) {
            let columns = store
                .execute(&format!("SELECT name FROM pragma_table_info({})", quote_literal(name)), budget)?
                .rows
                .iter()
                .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
                .collect();
            tables.push(TableInfo { name: name.to_string(), columns });
        }

        let mut schema = Self { tables, ..Self::default() };
        schema.categories =
            schema.distinct_values(store, params, ident::CATEGORIES, ident::CATEGORIES_NAME, budget);
        schema.products = schema.distinct_values(store, params, ident::PRODUCTS, ident::PRODUCTS_NAME, budget);
        schema.customers =
            schema.distinct_values(store, params, ident::CUSTOMERS, ident::CUSTOMERS_NAME, budget);
        schema.regions =
            schema.distinct_values(store, params, ident::CUSTOMERS, ident::CUSTOMERS_COUNTRY, budget);
        schema.cost_column = schema.detect_cost_column(params);

        info!(
            tables = schema.tables.len(),
            categories = schema.categories.len(),
            products = schema.products.len(),
            customers = schema.customers.len(),
            has_cost_column = schema.cost_column.is_some(),
            "Schema introspected"
        );
        Ok(schema)
    }

    fn distinct_values(
        &self,
        store: &dyn RelationalStore,
        params: &GenerationParams,
        table_key: &str,
        column_key: &str,
        budget: Duration,
    ) -> Vec<String> {
        let table = params.identifier(table_key);
        let column = params.identifier(column_key);
        if !self.has_column(table, column) {
            return Vec::new();
        }

        let sql = format!(
            "SELECT DISTINCT {col} FROM {tbl} WHERE {col} IS NOT NULL ORDER BY 1",
            col = quote_ident(column),
            tbl = quote_ident(table)
        );
        match store.execute(&sql, budget) {
            Ok(rows) => rows
                .rows
                .iter()
                .filter_map(|row| row.first().and_then(Value::as_str).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(table, column, error = %e, "Could not read categorical values");
                Vec::new()
            }
        }
    }

    fn detect_cost_column(&self, params: &GenerationParams) -> Option<CostColumn> {
        [ident::LINE_ITEMS, ident::PRODUCTS].into_iter().find_map(|table_key| {
            let table = self.table(params.identifier(table_key))?;
            table
                .columns
                .iter()
                .find(|c| COST_COLUMN_NAMES.contains(&normalize(c).as_str()))
                .map(|c| CostColumn { table_key: table_key.to_string(), column: c.clone() })
        })
    }

    /// Case-insensitive table lookup.
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.table(name).is_some()
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.table(table).is_some_and(|t| t.columns.iter().any(|c| c.eq_ignore_ascii_case(column)))
    }

    /// The existing table name closest to `name`, if any is close enough.
    pub fn closest_table(&self, name: &str) -> Option<&str> {
        closest(name, self.tables.iter().map(|t| t.name.as_str()))
    }

    /// The column of `table` closest to `name`, if any is close enough.
    pub fn closest_column(&self, table: &str, name: &str) -> Option<&str> {
        let table = self.table(table)?;
        closest(name, table.columns.iter().map(String::as_str))
    }

    /// The table or column name anywhere in the schema closest to `name`.
    pub fn closest_identifier(&self, name: &str) -> Option<&str> {
        let names = self
            .tables
            .iter()
            .flat_map(|t| std::iter::once(t.name.as_str()).chain(t.columns.iter().map(String::as_str)));
        closest(name, names)
    }

    /// Compact schema listing used in model prompts.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for table in &self.tables {
            let _ = writeln!(out, "Table: {}", quote_ident(&table.name));
            let _ = writeln!(out, "Columns: {}", table.columns.join(", "));
        }
        if !self.categories.is_empty() {
            let _ = writeln!(out, "-- categories: {}", self.categories.join(", "));
        }
        if let Some(cost) = &self.cost_column {
            let _ = writeln!(out, "-- cost of goods: {}.{}", cost.table_key, cost.column);
        }
        out
    }
}

/// Best match above [`MATCH_THRESHOLD`], comparing names with case, spaces and
/// underscores ignored. Ties keep the earlier candidate.
fn closest<'a>(name: &str, candidates: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    let target = normalize(name);
    let mut best: Option<(&str, f64)> = None;
    for candidate in candidates {
        let score = strsim::normalized_levenshtein(&target, &normalize(candidate));
        if score >= MATCH_THRESHOLD && best.is_none_or(|(_, top)| score > top) {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

fn normalize(name: &str) -> String {
    name.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// Double-quoted SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Single-quoted SQL string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> SchemaMetadata {
        SchemaMetadata {
            tables: vec![
                TableInfo {
                    name: "Order Details".to_string(),
                    columns: vec!["OrderID".into(), "ProductID".into(), "UnitPrice".into(), "Quantity".into(), "Discount".into()],
                },
                TableInfo { name: "Orders".to_string(), columns: vec!["OrderID".into(), "OrderDate".into()] },
            ],
            ..SchemaMetadata::default()
        }
    }

    #[test]
    fn test_closest_column_ignores_case_and_spacing() {
        let schema = schema();
        assert_eq!(schema.closest_column("Order Details", "Discnt"), Some("Discount"));
        assert_eq!(schema.closest_column("order details", "unit_price"), Some("UnitPrice"));
        assert_eq!(schema.closest_column("Order Details", "Shipper"), None);
    }

    #[test]
    fn test_closest_table() {
        let schema = schema();
        assert_eq!(schema.closest_table("OrderDetails"), Some("Order Details"));
        assert_eq!(schema.closest_table("Employees"), None);
    }

    #[test]
    fn test_describe_lists_quoted_tables() {
        let text = schema().describe();
        assert!(text.contains("Table: \"Order Details\"\nColumns: OrderID, ProductID"));
    }

    #[test]
    fn test_quoting_escapes() {
        assert_eq!(quote_literal("O'Hara"), "'O''Hara'");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
