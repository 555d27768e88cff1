//! Reference formulas for the built-in metrics.
//!
//! The generator emits SQL for these; the functions here compute the same
//! quantities over in-memory line items and pin the formulas down in tests.

use std::collections::BTreeSet;

/// Cost of goods as a fraction of unit price when the store has no cost data.
pub const COGS_APPROXIMATION_RATIO: f64 = 0.7;

/// One order line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineItem {
    pub order_id: i64,
    pub unit_price: f64,
    pub quantity: f64,
    pub discount: f64,
    /// Per-unit cost when known.
    pub unit_cost: Option<f64>,
}

impl LineItem {
    pub fn new(order_id: i64, unit_price: f64, quantity: f64, discount: f64) -> Self {
        Self { order_id, unit_price, quantity, discount, unit_cost: None }
    }

    pub fn revenue(&self) -> f64 {
        self.unit_price * self.quantity * (1.0 - self.discount)
    }

    /// Cost of goods per unit, approximated when no cost is recorded.
    pub fn cost_of_goods(&self) -> f64 {
        self.unit_cost.unwrap_or(COGS_APPROXIMATION_RATIO * self.unit_price)
    }

    pub fn margin(&self) -> f64 {
        (self.unit_price - self.cost_of_goods()) * self.quantity * (1.0 - self.discount)
    }
}

pub fn revenue(items: &[LineItem]) -> f64 {
    items.iter().map(LineItem::revenue).sum()
}

pub fn distinct_orders(items: &[LineItem]) -> usize {
    items.iter().map(|i| i.order_id).collect::<BTreeSet<_>>().len()
}

/// Revenue over distinct orders; `None` when there are no orders.
pub fn average_order_value(items: &[LineItem]) -> Option<f64> {
    let orders = distinct_orders(items);
    (orders > 0).then(|| revenue(items) / orders as f64)
}

pub fn gross_margin(items: &[LineItem]) -> f64 {
    items.iter().map(LineItem::margin).sum()
}

pub fn units_sold(items: &[LineItem]) -> f64 {
    items.iter().map(|i| i.quantity).sum()
}
