//! Food and luxury consumption, and the deficit the population engine
//! feeds on.

use crate::config::ConsumptionConfig;
use crate::events::EventModifiers;
use crate::goods::{GoodDefinition, GoodId};
use crate::island::IslandState;
use std::collections::BTreeMap;

/// What one island consumed this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsumptionOutcome {
    pub food_needed: f64,
    pub food_consumed: f64,
    pub food_deficit: f64,
    pub grain_consumed: f64,
    pub fish_consumed: f64,
    pub luxury_consumed: f64,
}

impl ConsumptionOutcome {
    /// Per-good totals, for the market's consumption-velocity EMA.
    pub fn per_good(&self) -> BTreeMap<GoodId, f64> {
        let mut map = BTreeMap::new();
        map.insert(GoodId::Grain, self.grain_consumed);
        map.insert(GoodId::Fish, self.fish_consumed);
        map.insert(GoodId::Luxuries, self.luxury_consumed);
        map
    }
}

/// Demand response to price: `(base / current)^elasticity`, clamped so a
/// market dislocation cannot zero out or explode consumption.
fn price_response(base: f64, current: f64, elasticity: f64, lo: f64, hi: f64) -> f64 {
    if base <= 0.0 || current <= 0.0 {
        return 1.0;
    }
    (base / current).powf(elasticity).clamp(lo, hi)
}

/// Consumes food and luxuries from an island's inventory.
///
/// Grain is eaten first (it keeps better in the granary than fish does on
/// the rack); fish substitutes the shortfall up to the substitution
/// elasticity. Demand bends with local prices and with population health
/// (the sick eat less). Luxuries are optional comfort, capped by inventory.
pub fn consume(
    island: &mut IslandState,
    modifiers: &EventModifiers,
    goods: &BTreeMap<GoodId, GoodDefinition>,
    config: &ConsumptionConfig,
    dt: f64,
) -> ConsumptionOutcome {
    let population = island.population.size;
    let base_price =
        |good: GoodId| goods.get(&good).map(|d| d.base_price).unwrap_or(0.0);

    let food_price = (island.market.price(GoodId::Grain) + island.market.price(GoodId::Fish))
        / 2.0;
    let base_food_price = (base_price(GoodId::Grain) + base_price(GoodId::Fish)) / 2.0;
    let food_price_factor =
        price_response(base_food_price, food_price, config.food_price_elasticity, 0.5, 1.5);
    let health_factor =
        1.0 - config.health_consumption_factor * (1.0 - island.population.health);
    let food_needed = population
        * config.food_per_capita
        * dt
        * modifiers.food_demand_multiplier
        * food_price_factor
        * health_factor;

    let grain_available = island.inventory_of(GoodId::Grain);
    let grain_consumed = food_needed.min(grain_available);
    let remaining_need = food_needed - grain_consumed;
    let fish_available = island.inventory_of(GoodId::Fish);
    let fish_consumed =
        (remaining_need * config.food_substitution_elasticity.clamp(0.0, 1.0))
            .min(fish_available);

    island.add_inventory(GoodId::Grain, -grain_consumed);
    island.add_inventory(GoodId::Fish, -fish_consumed);

    let food_consumed = grain_consumed + fish_consumed;
    let food_deficit = (food_needed - food_consumed).max(0.0);

    let luxury_price_factor = price_response(
        base_price(GoodId::Luxuries),
        island.market.price(GoodId::Luxuries),
        config.luxury_price_elasticity,
        0.25,
        2.0,
    );
    let luxury_wanted = population
        * config.luxury_per_capita
        * dt
        * modifiers.luxury_demand_multiplier
        * luxury_price_factor;
    let luxury_consumed = luxury_wanted.min(island.inventory_of(GoodId::Luxuries));
    island.add_inventory(GoodId::Luxuries, -luxury_consumed);

    ConsumptionOutcome {
        food_needed,
        food_consumed,
        food_deficit,
        grain_consumed,
        fish_consumed,
        luxury_consumed,
    }
}
