//! Conversion of target weights into purchasable unit counts.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscreteAllocation {
    /// Quantity of each coin to hold, a multiple of the unit size.
    pub units: BTreeMap<String, f64>,
    pub leftover: f64,
    pub leftover_fraction: f64,
}

struct Slot {
    symbol: String,
    weight: f64,
    unit_cost: f64,
    lots: u64,
}

/// Greedy discrete allocation of `total_value` across `weights`.
///
/// Each asset first receives as many whole lots as fit under its target
/// value, heaviest weight first. Remaining cash then buys one lot at a time
/// for the affordable asset furthest below its target, until no lot is
/// affordable. Returns `None` when a weighted symbol has no positive price or
/// the inputs cannot be allocated.
pub fn greedy_allocation(
    weights: &BTreeMap<String, f64>,
    prices: &HashMap<String, f64>,
    total_value: f64,
    unit_size: f64,
) -> Option<DiscreteAllocation> {
    if !(total_value.is_finite() && total_value > 0.0 && unit_size.is_finite() && unit_size > 0.0)
    {
        return None;
    }

    let mut slots = Vec::with_capacity(weights.len());
    for (symbol, weight) in weights {
        match prices.get(symbol) {
            Some(price) if price.is_finite() && *price > 0.0 => slots.push(Slot {
                symbol: symbol.clone(),
                weight: *weight,
                unit_cost: price * unit_size,
                lots: 0,
            }),
            _ => {
                warn!("No live price for {}, skipping allocation", symbol);
                return None;
            }
        }
    }
    slots.sort_by(|a, b| b.weight.total_cmp(&a.weight));

    let mut cash = total_value;
    for slot in slots.iter_mut() {
        let lots = (slot.weight * total_value / slot.unit_cost).floor().max(0.0);
        let cost = lots * slot.unit_cost;
        if cost > cash {
            continue;
        }
        slot.lots = lots as u64;
        cash -= cost;
    }

    loop {
        let next = slots
            .iter_mut()
            .filter(|s| s.unit_cost <= cash)
            .map(|s| {
                let deficit = s.weight * total_value - s.lots as f64 * s.unit_cost;
                (deficit, s)
            })
            .max_by(|a, b| a.0.total_cmp(&b.0));
        let Some((_, slot)) = next else {
            break;
        };
        slot.lots += 1;
        cash -= slot.unit_cost;
    }

    let units = slots
        .iter()
        .map(|s| (s.symbol.clone(), s.lots as f64 * unit_size))
        .collect();
    debug!(leftover = cash, "Discrete allocation done");
    Some(DiscreteAllocation {
        units,
        leftover: cash,
        leftover_fraction: cash / total_value,
    })
}
