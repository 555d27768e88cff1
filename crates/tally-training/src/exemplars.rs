use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// Logical identifier keys the query generator resolves through [`GenerationParams`].
pub mod ident {
    pub const ORDERS: &str = "orders";
    pub const ORDERS_ID: &str = "orders.id";
    pub const ORDERS_DATE: &str = "orders.date";
    pub const ORDERS_CUSTOMER_ID: &str = "orders.customer_id";
    pub const LINE_ITEMS: &str = "line_items";
    pub const LINE_ITEMS_ORDER_ID: &str = "line_items.order_id";
    pub const LINE_ITEMS_PRODUCT_ID: &str = "line_items.product_id";
    pub const LINE_ITEMS_UNIT_PRICE: &str = "line_items.unit_price";
    pub const LINE_ITEMS_QUANTITY: &str = "line_items.quantity";
    pub const LINE_ITEMS_DISCOUNT: &str = "line_items.discount";
    pub const PRODUCTS: &str = "products";
    pub const PRODUCTS_ID: &str = "products.id";
    pub const PRODUCTS_NAME: &str = "products.name";
    pub const PRODUCTS_CATEGORY_ID: &str = "products.category_id";
    pub const CATEGORIES: &str = "categories";
    pub const CATEGORIES_ID: &str = "categories.id";
    pub const CATEGORIES_NAME: &str = "categories.name";
    pub const CUSTOMERS: &str = "customers";
    pub const CUSTOMERS_ID: &str = "customers.id";
    pub const CUSTOMERS_NAME: &str = "customers.name";
    pub const CUSTOMERS_COUNTRY: &str = "customers.country";

    /// Every logical key paired with its Northwind physical name.
    pub const NORTHWIND: &[(&str, &str)] = &[
        (ORDERS, "Orders"),
        (ORDERS_ID, "OrderID"),
        (ORDERS_DATE, "OrderDate"),
        (ORDERS_CUSTOMER_ID, "CustomerID"),
        (LINE_ITEMS, "Order Details"),
        (LINE_ITEMS_ORDER_ID, "OrderID"),
        (LINE_ITEMS_PRODUCT_ID, "ProductID"),
        (LINE_ITEMS_UNIT_PRICE, "UnitPrice"),
        (LINE_ITEMS_QUANTITY, "Quantity"),
        (LINE_ITEMS_DISCOUNT, "Discount"),
        (PRODUCTS, "Products"),
        (PRODUCTS_ID, "ProductID"),
        (PRODUCTS_NAME, "ProductName"),
        (PRODUCTS_CATEGORY_ID, "CategoryID"),
        (CATEGORIES, "Categories"),
        (CATEGORIES_ID, "CategoryID"),
        (CATEGORIES_NAME, "CategoryName"),
        (CUSTOMERS, "Customers"),
        (CUSTOMERS_ID, "CustomerID"),
        (CUSTOMERS_NAME, "CompanyName"),
        (CUSTOMERS_COUNTRY, "Country"),
    ];

    /// The table a logical key belongs to (`"orders.date"` -> `"orders"`).
    pub fn table_of(key: &str) -> &str {
        key.split_once('.').map_or(key, |(table, _)| table)
    }
}

/// Stable identifier for an exemplar set (content hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExemplarSetId(pub String);

impl ExemplarSetId {
    /// First eight hex characters, for log lines and version tags.
    pub fn short(&self) -> &str {
        self.0.get(..8).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for ExemplarSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A question paired with a reference query.
///
/// Validation files reuse this shape and may leave `sql` empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exemplar {
    pub question: String,
    #[serde(default)]
    pub sql: String,
    /// Document-derived constraints that were in scope when the query was written.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub constraints: String,
}

impl Exemplar {
    pub fn new(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self { question: question.into(), sql: sql.into(), constraints: String::new() }
    }
}

/// Tunable knobs of the query generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    /// Logical identifier -> physical table/column name. Missing keys fall back to Northwind.
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
    #[serde(default = "default_round_digits")]
    pub round_digits: u32,
    /// Row limit for grouped questions that do not name one ("revenue by category").
    #[serde(default = "default_top_n")]
    pub default_top_n: u32,
    /// Few-shot exemplars included in model-assisted prompts.
    #[serde(default = "default_max_exemplars")]
    pub max_exemplars: usize,
    #[serde(default)]
    pub temperature: f32,
}

fn default_round_digits() -> u32 {
    2
}

fn default_top_n() -> u32 {
    10
}

fn default_max_exemplars() -> usize {
    4
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            identifiers: ident::NORTHWIND
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            round_digits: default_round_digits(),
            default_top_n: default_top_n(),
            max_exemplars: default_max_exemplars(),
            temperature: 0.0,
        }
    }
}

impl GenerationParams {
    /// Physical name for a logical identifier.
    pub fn identifier<'a>(&'a self, key: &'a str) -> &'a str {
        self.identifiers.get(key).map(String::as_str).unwrap_or_else(|| {
            ident::NORTHWIND.iter().find(|(k, _)| *k == key).map_or(key, |(_, v)| v)
        })
    }

    /// Returns a copy with one identifier remapped.
    #[must_use]
    pub fn with_identifier(mut self, key: &str, physical: &str) -> Self {
        self.identifiers.insert(key.to_string(), physical.to_string());
        self
    }
}

/// The versioned parameter set consumed by the query generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExemplarSet {
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub exemplars: Vec<Exemplar>,
}

impl Default for ExemplarSet {
    fn default() -> Self {
        Self::baseline()
    }
}

impl ExemplarSet {
    /// Hand-written starting point for the Northwind schema.
    pub fn baseline() -> Self {
        let exemplars = vec![
            Exemplar::new(
                "List ProductName and UnitPrice for products in Beverages category.",
                "SELECT p.\"ProductName\", p.\"UnitPrice\" FROM \"Products\" p JOIN \"Categories\" c ON c.\"CategoryID\" = p.\"CategoryID\" WHERE c.\"CategoryName\" = 'Beverages' LIMIT 10",
            ),
            Exemplar::new(
                "What is the total revenue all-time?",
                "SELECT ROUND(SUM(od.\"UnitPrice\" * od.\"Quantity\" * (1 - od.\"Discount\")), 2) AS revenue FROM \"Order Details\" od",
            ),
            Exemplar::new(
                "Top 3 products by revenue all-time.",
                "SELECT p.\"ProductName\" AS product, ROUND(SUM(od.\"UnitPrice\" * od.\"Quantity\" * (1 - od.\"Discount\")), 2) AS revenue FROM \"Order Details\" od JOIN \"Products\" p ON p.\"ProductID\" = od.\"ProductID\" GROUP BY p.\"ProductName\" ORDER BY revenue DESC LIMIT 3",
            ),
            Exemplar::new(
                "Average Order Value for Summer 1997 (Jun-Aug).",
                "SELECT ROUND(SUM(od.\"UnitPrice\" * od.\"Quantity\" * (1 - od.\"Discount\")) / COUNT(DISTINCT od.\"OrderID\"), 2) AS aov FROM \"Order Details\" od JOIN \"Orders\" o ON o.\"OrderID\" = od.\"OrderID\" WHERE date(o.\"OrderDate\") BETWEEN '1997-06-01' AND '1997-08-31'",
            ),
        ];

        Self {
            version: "baseline-1".to_string(),
            description: "Hand-written Northwind exemplars".to_string(),
            params: GenerationParams::default(),
            exemplars,
        }
    }

    /// Content hash of this set.
    pub fn id(&self) -> TrainingResult<ExemplarSetId> {
        compute_set_id(self)
    }

    /// The `n` exemplars most similar to `question` by token overlap.
    ///
    /// Ties keep the order of the set, so selection is deterministic.
    pub fn select_exemplars(&self, question: &str, n: usize) -> Vec<&Exemplar> {
        let query_tokens = tokens(question);
        let mut scored: Vec<(usize, f64, &Exemplar)> = self
            .exemplars
            .iter()
            .enumerate()
            .map(|(idx, ex)| (idx, jaccard(&query_tokens, &tokens(&ex.question)), ex))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.into_iter().take(n).map(|(_, _, ex)| ex).collect()
    }
}

pub fn compute_set_id(set: &ExemplarSet) -> TrainingResult<ExemplarSetId> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(&set.params)?);
    hasher.update(b"\n");

    for ex in &set.exemplars {
        hasher.update(serde_json::to_vec(ex)?);
        hasher.update(b"\n");
    }

    Ok(ExemplarSetId(hex::encode(hasher.finalize())))
}

pub fn validate_set(set: &ExemplarSet) -> TrainingResult<()> {
    if set.version.trim().is_empty() {
        return Err(TrainingError::InvalidSet("version must not be empty".to_string()));
    }
    if set.params.default_top_n == 0 {
        return Err(TrainingError::InvalidSet("default_top_n must be at least 1".to_string()));
    }
    for (idx, ex) in set.exemplars.iter().enumerate() {
        if ex.question.trim().is_empty() {
            return Err(TrainingError::InvalidSet(format!("exemplar[{idx}] question is empty")));
        }
        if ex.sql.trim().is_empty() {
            return Err(TrainingError::InvalidSet(format!("exemplar[{idx}] sql is empty")));
        }
    }
    for (key, physical) in &set.params.identifiers {
        if physical.trim().is_empty() {
            return Err(TrainingError::InvalidSet(format!("identifier '{key}' maps to an empty name")));
        }
    }
    Ok(())
}

fn tokens(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2)
        .map(str::to_lowercase)
        .collect()
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
