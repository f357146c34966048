use std::collections::HashMap;

use crate::aggregate::{AggregateMap, IngredientKey};

/// One pantry row as seen by reconciliation: name, quantity, unit only.
#[derive(Debug, Clone)]
pub struct StockRow {
    pub name: String,
    pub quantity: f64,
    pub unit: String,
}

/// Quantity still needed for one ingredient after subtracting pantry stock.
#[derive(Debug, Clone, PartialEq)]
pub struct NeededItem {
    pub name: String,
    pub unit: String,
    pub quantity: f64,
}

/// Subtract pantry stock from aggregated demand.
///
/// Matching is by the same lowercased-name + literal-unit key as aggregation,
/// so pantry "500 g" never satisfies a recipe's "2 cups". Fully covered
/// ingredients are dropped; pantry stock with no matching demand is ignored.
/// If the pantry holds several rows for one key, the last row read wins.
#[must_use]
pub fn reconcile(demand: &AggregateMap, stock: &[StockRow]) -> Vec<NeededItem> {
    let mut stock_by_key: HashMap<IngredientKey, f64> = HashMap::new();
    for row in stock {
        let qty = if row.quantity.is_finite() {
            row.quantity
        } else {
            0.0
        };
        stock_by_key.insert(IngredientKey::new(&row.name, &row.unit), qty);
    }

    let mut needed = Vec::new();
    for d in demand {
        let key = IngredientKey::new(&d.name, &d.unit);
        let on_hand = stock_by_key.get(&key).copied().unwrap_or(0.0);
        let quantity = (d.quantity - on_hand).max(0.0);
        if quantity > 0.0 {
            needed.push(NeededItem {
                name: d.name.clone(),
                unit: d.unit.clone(),
                quantity,
            });
        }
    }
    needed
}
