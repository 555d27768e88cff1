//! Deterministic SQL for resolved plans.
//!
//! Aliases are fixed: `od` line items, `o` orders, `p` products,
//! `c` categories, `cu` customers. Physical names come from the exemplar
//! set's identifier map, so remapping a logical key changes the SQL without
//! touching this code.

use tally_training::{ident, GenerationParams};

use crate::planning::metrics::COGS_APPROXIMATION_RATIO;
use crate::planning::{Dimension, Metric, QueryPlan, SortOrder};
use crate::storage::{quote_ident, quote_literal, CostColumn};

struct Names<'a> {
    params: &'a GenerationParams,
}

impl Names<'_> {
    fn table(&self, key: &str) -> String {
        quote_ident(self.params.identifier(key))
    }

    fn col(&self, alias: &str, key: &str) -> String {
        format!("{alias}.{}", quote_ident(self.params.identifier(key)))
    }
}

/// Output column alias for a metric.
pub fn metric_alias(metric: Metric) -> &'static str {
    metric.as_str()
}

/// SQL for `plan`, or `None` when the plan names no metric.
pub fn render(plan: &QueryPlan, params: &GenerationParams, cost: Option<&CostColumn>) -> Option<String> {
    let metric = plan.metric?;
    let n = Names { params };

    let dims: Vec<Dimension> = plan.filters.keys().copied().chain(plan.group_by).collect();
    let uses = |d: Dimension| dims.contains(&d);
    let cost_on_products = cost.is_some_and(|c| c.table_key == ident::PRODUCTS) && metric == Metric::GrossMargin;

    let need_customers = uses(Dimension::Customer) || uses(Dimension::Region);
    let need_orders = plan.time_range.is_some() || need_customers;
    let need_categories = uses(Dimension::Category);
    let need_products = need_categories || uses(Dimension::Product) || cost_on_products;

    let mut from = format!("FROM {} od", n.table(ident::LINE_ITEMS));
    if need_orders {
        from.push_str(&format!(
            " JOIN {} o ON o.{} = {}",
            n.table(ident::ORDERS),
            quote_ident(params.identifier(ident::ORDERS_ID)),
            n.col("od", ident::LINE_ITEMS_ORDER_ID)
        ));
    }
    if need_products {
        from.push_str(&format!(
            " JOIN {} p ON p.{} = {}",
            n.table(ident::PRODUCTS),
            quote_ident(params.identifier(ident::PRODUCTS_ID)),
            n.col("od", ident::LINE_ITEMS_PRODUCT_ID)
        ));
    }
    if need_categories {
        from.push_str(&format!(
            " JOIN {} c ON c.{} = {}",
            n.table(ident::CATEGORIES),
            quote_ident(params.identifier(ident::CATEGORIES_ID)),
            n.col("p", ident::PRODUCTS_CATEGORY_ID)
        ));
    }
    if need_customers {
        from.push_str(&format!(
            " JOIN {} cu ON cu.{} = {}",
            n.table(ident::CUSTOMERS),
            quote_ident(params.identifier(ident::CUSTOMERS_ID)),
            n.col("o", ident::ORDERS_CUSTOMER_ID)
        ));
    }

    let mut conditions: Vec<String> = plan
        .filters
        .iter()
        .map(|(dim, value)| format!("{} = {}", dimension_expr(&n, *dim), quote_literal(value)))
        .collect();
    if let Some(range) = &plan.time_range {
        conditions.push(format!(
            "date({}) BETWEEN '{}' AND '{}'",
            n.col("o", ident::ORDERS_DATE),
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        ));
    }

    let alias = metric_alias(metric);
    let value = format!("{} AS {alias}", metric_expr(&n, metric, params.round_digits, cost));

    let mut sql = match plan.group_by {
        Some(dim) => format!("SELECT {} AS {}, {value} {from}", dimension_expr(&n, dim), dim.as_str()),
        None => format!("SELECT {value} {from}"),
    };
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    if let Some(dim) = plan.group_by {
        let direction = match plan.order {
            SortOrder::Desc => "DESC",
            SortOrder::Asc => "ASC",
        };
        let limit = plan.limit.unwrap_or(params.default_top_n);
        sql.push_str(&format!(
            " GROUP BY {expr} ORDER BY {alias} {direction}, {expr} ASC LIMIT {limit}",
            expr = dimension_expr(&n, dim)
        ));
    }
    Some(sql)
}

fn dimension_expr(n: &Names<'_>, dim: Dimension) -> String {
    match dim {
        Dimension::Category => n.col("c", ident::CATEGORIES_NAME),
        Dimension::Product => n.col("p", ident::PRODUCTS_NAME),
        Dimension::Customer => n.col("cu", ident::CUSTOMERS_NAME),
        Dimension::Region => n.col("cu", ident::CUSTOMERS_COUNTRY),
    }
}

fn metric_expr(n: &Names<'_>, metric: Metric, digits: u32, cost: Option<&CostColumn>) -> String {
    let price = n.col("od", ident::LINE_ITEMS_UNIT_PRICE);
    let qty = n.col("od", ident::LINE_ITEMS_QUANTITY);
    let discount = n.col("od", ident::LINE_ITEMS_DISCOUNT);
    let order_id = n.col("od", ident::LINE_ITEMS_ORDER_ID);
    let revenue = format!("SUM({price} * {qty} * (1 - {discount}))");

    match metric {
        Metric::Revenue => format!("ROUND({revenue}, {digits})"),
        Metric::UnitsSold => format!("SUM({qty})"),
        Metric::OrderCount => format!("COUNT(DISTINCT {order_id})"),
        Metric::AverageOrderValue => {
            format!("ROUND({revenue} * 1.0 / COUNT(DISTINCT {order_id}), {digits})")
        }
        Metric::GrossMargin => {
            let cogs = match cost {
                Some(c) if c.table_key == ident::PRODUCTS => format!("p.{}", quote_ident(&c.column)),
                Some(c) => format!("od.{}", quote_ident(&c.column)),
                None => format!("{COGS_APPROXIMATION_RATIO} * {price}"),
            };
            format!("ROUND(SUM(({price} - {cogs}) * {qty} * (1 - {discount})), {digits})")
        }
    }
}
