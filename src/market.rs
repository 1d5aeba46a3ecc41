//! Local price formation, market depth, and price-impact trade execution.
//!
//! Prices come from inventory pressure and consumption velocity, smoothed
//! by an EMA and clamped to a band around base price. Liquidity is modeled
//! as per-good buy/sell depth that trades consume and that regenerates each
//! tick; execution prices slip against the quoted price as order size
//! approaches available depth.

use crate::config::{MarketConfig, MarketDepthConfig};
use crate::events::EventModifiers;
use crate::goods::{GoodDefinition, GoodId};
use crate::island::{BuildingKind, IslandState};
use crate::ship::ShipState;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const STOCK_EPSILON: f64 = 1e-6;

/// Price band for a good: `[max(min, 0.2*base), min(max, 20*base)]`.
pub fn price_band(definition: &GoodDefinition, config: &MarketConfig) -> (f64, f64) {
    let floor = config.min_price.max(0.2 * definition.base_price);
    let ceiling = config.max_price.min(20.0 * definition.base_price);
    (floor, ceiling)
}

/// Updates an island's quoted prices and consumption-velocity EMAs from
/// this tick's consumption.
pub fn update_prices(
    island: &mut IslandState,
    consumed: &BTreeMap<GoodId, f64>,
    modifiers: &EventModifiers,
    goods: &BTreeMap<GoodId, GoodDefinition>,
    config: &MarketConfig,
    stabilization_per_level: f64,
) {
    let market_level = island.building_level(BuildingKind::Market);
    let stabilization = (market_level * stabilization_per_level).clamp(0.0, 0.9);

    for (good, definition) in goods {
        let category_cfg = config.for_category(good.category());

        // Velocity EMA first so this tick's consumption feeds this tick's price.
        let consumed_now = consumed.get(good).copied().unwrap_or(0.0);
        let velocity_entry = island.market.consumption_velocity.entry(*good).or_insert(0.0);
        *velocity_entry += config.velocity_lambda * (consumed_now - *velocity_entry);
        let velocity_ema = *velocity_entry;

        let stock = island.inventory_of(*good).max(STOCK_EPSILON);
        let ideal = island.market.ideal_stock(*good).max(STOCK_EPSILON);
        let pressure = (ideal / stock).powf(category_cfg.price_elasticity);

        let reference = island
            .market
            .reference_consumption
            .get(good)
            .copied()
            .unwrap_or(0.0)
            .max(STOCK_EPSILON);
        let velocity = 1.0 + category_cfg.velocity_coefficient * (velocity_ema / reference);

        let event_mod = match good.category() {
            crate::goods::GoodCategory::Luxury => modifiers.luxury_demand_multiplier,
            crate::goods::GoodCategory::Food => modifiers.food_demand_multiplier,
            _ => 1.0,
        };

        let raw = definition.base_price * pressure * velocity * event_mod;
        let stabilized = raw * (1.0 - stabilization) + definition.base_price * stabilization;

        let old_price = island.market.price(*good);
        let smoothed = old_price + config.price_lambda * (stabilized - old_price);
        let (floor, ceiling) = price_band(definition, config);
        let new_price = smoothed.clamp(floor, ceiling);

        island.market.prices.insert(*good, new_price);
        island.market.momentum.insert(*good, new_price - old_price);
    }
}

/// Regenerates both depth sides toward their targets.
pub fn regenerate_depth(island: &mut IslandState, config: &MarketDepthConfig) {
    let targets: Vec<(GoodId, f64)> = island
        .market
        .ideal_stocks
        .iter()
        .map(|(good, ideal)| {
            (*good, (ideal * config.base_depth_multiplier).max(config.min_depth))
        })
        .collect();
    for (good, target) in targets {
        for depth_side in [&mut island.market.buy_depth, &mut island.market.sell_depth] {
            let depth = depth_side.entry(good).or_insert(config.min_depth);
            *depth += (target - *depth) * config.depth_recovery_rate;
            *depth = depth.max(config.min_depth);
        }
    }
}

/// Relative price impact of an order of absolute size `quantity` against
/// available depth. Linear up to full depth, quadratic beyond, capped at 0.5.
pub fn price_impact(quantity: f64, depth: f64, config: &MarketDepthConfig) -> f64 {
    let ratio = quantity / depth.max(config.min_depth);
    let k = config.price_impact_coefficient;
    let impact = if ratio <= 1.0 { ratio * k } else { k + (ratio - 1.0).powi(2) * 2.0 * k };
    impact.min(0.5)
}

/// One signed line of a trade order: positive buys from the island,
/// negative sells to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLine {
    pub good: GoodId,
    pub quantity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    /// Ship buys, island exports.
    Buy,
    /// Ship sells, island imports.
    Sell,
}

/// Execution record for a single line, including observability fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFill {
    pub good: GoodId,
    pub side: TradeSide,
    pub requested: f64,
    pub filled: f64,
    pub quoted_price: f64,
    pub execution_price: f64,
    /// Relative slippage against the quote.
    pub impact: f64,
    pub tax: f64,
}

/// Result of an atomic multi-line order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport {
    pub fills: Vec<LineFill>,
    /// Set when the whole order was rejected; nothing was committed.
    pub rejected: Option<String>,
    pub tax_destroyed: f64,
    /// Gross value moved across all fills.
    pub volume: f64,
}

impl TradeReport {
    fn rejected(reason: String) -> Self {
        TradeReport { fills: Vec::new(), rejected: Some(reason), tax_destroyed: 0.0, volume: 0.0 }
    }
}

/// Purchasing-power policy for the island side of an order.
#[derive(Debug, Clone, Copy)]
pub struct PurchasingPower {
    pub enforce: bool,
    pub max_spend_ratio: f64,
}

/// Executes a multi-line order of one ship against one island.
///
/// Lines are processed in order; each is clamped to feasible quantities
/// (inventory, cargo, cargo volume, cash, import budget) and dropped when
/// nothing remains. All accepted lines commit together: the function works
/// on scratch copies and writes back only if no invariant would break.
pub fn execute_order(
    island: &mut IslandState,
    ship: &mut ShipState,
    lines: &[TradeLine],
    goods: &BTreeMap<GoodId, GoodDefinition>,
    tax_rate: f64,
    purchasing: PurchasingPower,
    depth_config: &MarketDepthConfig,
) -> TradeReport {
    let mut inventory = island.inventory.clone();
    let mut buy_depth = island.market.buy_depth.clone();
    let mut sell_depth = island.market.sell_depth.clone();
    let mut treasury_balance = island.treasury.as_ref().map(|t| t.balance);
    let mut cash = ship.cash;
    let mut cargo = ship.cargo.clone();
    let mut exports = 0.0;
    let mut imports = 0.0;

    let volume_of = |cargo: &BTreeMap<GoodId, f64>| -> f64 {
        cargo
            .iter()
            .map(|(g, q)| q * goods.get(g).map(|d| d.bulkiness).unwrap_or(1.0))
            .sum()
    };

    let import_budget = treasury_balance
        .filter(|_| purchasing.enforce)
        .map(|balance| balance * purchasing.max_spend_ratio);
    let mut spent_from_budget = 0.0;

    let mut fills = Vec::new();
    let mut tax_destroyed = 0.0;
    let mut volume = 0.0;

    for line in lines {
        let Some(definition) = goods.get(&line.good) else {
            return TradeReport::rejected(format!("unknown good {:?}", line.good));
        };
        let quoted = island.market.price(line.good);
        if quoted <= 0.0 {
            return TradeReport::rejected(format!("no quoted price for {}", line.good));
        }

        if line.quantity > 0.0 {
            // Ship buys from island (island exports).
            let available = inventory.get(&line.good).copied().unwrap_or(0.0);
            let mut quantity = line.quantity.min(available);

            let free_volume = (ship.cargo_capacity - volume_of(&cargo)).max(0.0);
            quantity = quantity.min(free_volume / definition.bulkiness.max(1e-9));

            let depth = buy_depth.get(&line.good).copied().unwrap_or(depth_config.min_depth);
            let mut impact = price_impact(quantity, depth, depth_config);
            let mut execution_price = quoted * (1.0 + impact);
            let affordable = cash / (execution_price * (1.0 + tax_rate));
            if quantity > affordable {
                quantity = affordable;
                impact = price_impact(quantity, depth, depth_config);
                execution_price = quoted * (1.0 + impact);
            }
            if quantity <= 1e-9 {
                fills.push(LineFill {
                    good: line.good,
                    side: TradeSide::Buy,
                    requested: line.quantity,
                    filled: 0.0,
                    quoted_price: quoted,
                    execution_price: quoted,
                    impact: 0.0,
                    tax: 0.0,
                });
                continue;
            }

            let cost = execution_price * quantity;
            let tax = cost * tax_rate;
            cash -= cost + tax;
            *inventory.entry(line.good).or_insert(0.0) -= quantity;
            *cargo.entry(line.good).or_insert(0.0) += quantity;
            if let Some(balance) = treasury_balance.as_mut() {
                *balance += cost;
            }
            exports += cost;
            let depth_entry = buy_depth.entry(line.good).or_insert(depth_config.min_depth);
            *depth_entry = (*depth_entry - quantity).max(depth_config.min_depth);

            tax_destroyed += tax;
            volume += cost;
            fills.push(LineFill {
                good: line.good,
                side: TradeSide::Buy,
                requested: line.quantity,
                filled: quantity,
                quoted_price: quoted,
                execution_price,
                impact,
                tax,
            });
        } else if line.quantity < 0.0 {
            // Ship sells to island (island imports).
            let held = cargo.get(&line.good).copied().unwrap_or(0.0);
            let mut quantity = (-line.quantity).min(held);

            let depth = sell_depth.get(&line.good).copied().unwrap_or(depth_config.min_depth);
            let mut impact = price_impact(quantity, depth, depth_config);
            let mut execution_price = quoted * (1.0 - impact);

            if let Some(budget) = import_budget {
                let remaining = (budget - spent_from_budget).max(0.0);
                if execution_price * quantity > remaining {
                    quantity = remaining / execution_price.max(1e-9);
                    impact = price_impact(quantity, depth, depth_config);
                    execution_price = quoted * (1.0 - impact);
                    // Impact shrank, so the gross may exceed the budget again.
                    quantity = quantity.min(remaining / execution_price.max(1e-9));
                }
            }
            if quantity <= 1e-9 {
                fills.push(LineFill {
                    good: line.good,
                    side: TradeSide::Sell,
                    requested: line.quantity,
                    filled: 0.0,
                    quoted_price: quoted,
                    execution_price: quoted,
                    impact: 0.0,
                    tax: 0.0,
                });
                continue;
            }

            let gross = execution_price * quantity;
            let tax = gross * tax_rate;
            cash += gross - tax;
            *cargo.entry(line.good).or_insert(0.0) -= quantity;
            *inventory.entry(line.good).or_insert(0.0) += quantity;
            if let Some(balance) = treasury_balance.as_mut() {
                *balance = (*balance - gross).max(0.0);
            }
            imports += gross;
            spent_from_budget += gross;
            let depth_entry = sell_depth.entry(line.good).or_insert(depth_config.min_depth);
            *depth_entry = (*depth_entry - quantity).max(depth_config.min_depth);

            tax_destroyed += tax;
            volume += gross;
            fills.push(LineFill {
                good: line.good,
                side: TradeSide::Sell,
                requested: line.quantity,
                filled: quantity,
                quoted_price: quoted,
                execution_price,
                impact,
                tax,
            });
        }
    }

    // Atomicity gate: commit only if every hard invariant held up.
    if cash < -1e-6 {
        return TradeReport::rejected(format!("order would leave ship cash negative ({:.4})", cash));
    }
    if volume_of(&cargo) > ship.cargo_capacity + 1e-6 {
        return TradeReport::rejected("order would overflow cargo capacity".to_string());
    }
    if inventory.values().any(|q| *q < -1e-6) {
        return TradeReport::rejected("order would drive island inventory negative".to_string());
    }

    ship.cash = cash.max(0.0);
    ship.cargo = cargo;
    ship.cargo.retain(|_, q| *q > 1e-9);
    island.inventory = inventory;
    for q in island.inventory.values_mut() {
        *q = q.max(0.0);
    }
    island.market.buy_depth = buy_depth;
    island.market.sell_depth = sell_depth;
    if let (Some(treasury), Some(balance)) = (island.treasury.as_mut(), treasury_balance) {
        treasury.balance = balance;
        treasury.income_this_tick += exports;
        treasury.expenses_this_tick += imports;
        treasury.total_exports += exports;
        treasury.total_imports += imports;
    }

    debug!(
        "trade {} @ {}: {} fills, volume {:.2}, tax {:.2}",
        ship.id,
        island.id,
        fills.len(),
        volume,
        tax_destroyed
    );
    TradeReport { fills, rejected: None, tax_destroyed, volume }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::goods::default_goods;
    use crate::world::initialize_world;

    fn setup() -> (SimulationConfig, IslandState, ShipState) {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        let island_id = world.island_ids()[0].clone();
        let ship_id = world.ship_ids()[0].clone();
        (config.clone(), world.islands[&island_id].clone(), world.ships[&ship_id].clone())
    }

    fn no_budget() -> PurchasingPower {
        PurchasingPower { enforce: false, max_spend_ratio: 1.0 }
    }

    #[test]
    fn test_scarcity_raises_price() {
        let (config, mut island, _) = setup();
        island.inventory.insert(GoodId::Grain, 1.0);
        let goods = default_goods();
        let before = island.market.price(GoodId::Grain);
        update_prices(
            &mut island,
            &BTreeMap::new(),
            &EventModifiers::default(),
            &goods,
            &config.market,
            0.0,
        );
        assert!(island.market.price(GoodId::Grain) > before);
    }

    #[test]
    fn test_glut_lowers_price() {
        let (config, mut island, _) = setup();
        let ideal = island.market.ideal_stock(GoodId::Grain);
        island.inventory.insert(GoodId::Grain, ideal * 50.0);
        let goods = default_goods();
        let before = island.market.price(GoodId::Grain);
        update_prices(
            &mut island,
            &BTreeMap::new(),
            &EventModifiers::default(),
            &goods,
            &config.market,
            0.0,
        );
        assert!(island.market.price(GoodId::Grain) < before);
    }

    #[test]
    fn test_price_stays_in_band() {
        let (config, mut island, _) = setup();
        let goods = default_goods();
        island.inventory.insert(GoodId::Grain, 0.0);
        for _ in 0..500 {
            update_prices(
                &mut island,
                &BTreeMap::new(),
                &EventModifiers::default(),
                &goods,
                &config.market,
                0.0,
            );
        }
        let (floor, ceiling) = price_band(&goods[&GoodId::Grain], &config.market);
        let price = island.market.price(GoodId::Grain);
        assert!(price >= floor && price <= ceiling, "price {} outside band", price);
    }

    #[test]
    fn test_market_building_dampens_swing() {
        let (config, island, _) = setup();
        let goods = default_goods();
        let mut stabilized = island.clone();
        let mut free = island;
        stabilized.inventory.insert(GoodId::Grain, 1.0);
        free.inventory.insert(GoodId::Grain, 1.0);
        update_prices(
            &mut stabilized,
            &BTreeMap::new(),
            &EventModifiers::default(),
            &goods,
            &config.market,
            0.5,
        );
        update_prices(
            &mut free,
            &BTreeMap::new(),
            &EventModifiers::default(),
            &goods,
            &config.market,
            0.0,
        );
        assert!(
            stabilized.market.price(GoodId::Grain) < free.market.price(GoodId::Grain),
            "stabilized market should swing less"
        );
    }

    #[test]
    fn test_depth_regenerates_toward_target() {
        let (config, mut island, _) = setup();
        island.market.buy_depth.insert(GoodId::Grain, config.depth.min_depth);
        let before = island.market.buy_depth[&GoodId::Grain];
        regenerate_depth(&mut island, &config.depth);
        assert!(island.market.buy_depth[&GoodId::Grain] > before);
    }

    #[test]
    fn test_price_impact_shape() {
        let config = MarketDepthConfig::default();
        let k = config.price_impact_coefficient;
        assert!((price_impact(50.0, 100.0, &config) - 0.5 * k).abs() < 1e-12);
        assert!((price_impact(100.0, 100.0, &config) - k).abs() < 1e-12);
        // Beyond full depth the penalty grows quadratically.
        let over = price_impact(200.0, 100.0, &config);
        assert!((over - (k + 2.0 * k)).abs() < 1e-12);
        // Hard cap at 0.5.
        assert_eq!(price_impact(10_000.0, 100.0, &config), 0.5);
    }

    #[test]
    fn test_buy_moves_goods_and_cash() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        let inventory_before = island.inventory_of(GoodId::Grain);
        let cash_before = ship.cash;
        let treasury_before = island.treasury.as_ref().unwrap().balance;
        let report = execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Grain, quantity: 10.0 }],
            &goods,
            config.tax_rate,
            no_budget(),
            &config.depth,
        );
        assert!(report.rejected.is_none());
        let fill = &report.fills[0];
        assert!((fill.filled - 10.0).abs() < 1e-9);
        assert!(fill.execution_price > fill.quoted_price, "buys pay slippage");
        assert!((island.inventory_of(GoodId::Grain) - (inventory_before - 10.0)).abs() < 1e-9);
        assert!((ship.cargo_of(GoodId::Grain) - 10.0).abs() < 1e-9);
        assert!(ship.cash < cash_before);
        // Treasury receives the pre-tax proceeds.
        let treasury_after = island.treasury.as_ref().unwrap().balance;
        assert!((treasury_after - treasury_before - fill.execution_price * 10.0).abs() < 1e-6);
        assert!(report.tax_destroyed > 0.0);
    }

    #[test]
    fn test_sell_respects_import_budget() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        island.treasury.as_mut().unwrap().balance = 100.0;
        ship.cargo.insert(GoodId::Grain, 100.0);
        island.market.prices.insert(GoodId::Grain, 5.0);
        let report = execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Grain, quantity: -100.0 }],
            &goods,
            0.0,
            PurchasingPower { enforce: true, max_spend_ratio: 0.1 },
            &config.depth,
        );
        assert!(report.rejected.is_none());
        let fill = &report.fills[0];
        // Budget is 10 coin; at ~5/unit that is about 2 units.
        assert!(fill.filled <= 10.0 / fill.execution_price + 1e-6);
        assert!(ship.cargo_of(GoodId::Grain) > 90.0);
        assert!(island.treasury.as_ref().unwrap().balance >= 90.0 - 1e-6);
    }

    #[test]
    fn test_buy_clamped_to_inventory() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        island.inventory.insert(GoodId::Fish, 5.0);
        let report = execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Fish, quantity: 50.0 }],
            &goods,
            config.tax_rate,
            no_budget(),
            &config.depth,
        );
        assert!((report.fills[0].filled - 5.0).abs() < 1e-9);
        assert_eq!(island.inventory_of(GoodId::Fish), 0.0);
    }

    #[test]
    fn test_buy_clamped_to_cash() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        ship.cash = 20.0;
        let report = execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Grain, quantity: 100.0 }],
            &goods,
            config.tax_rate,
            no_budget(),
            &config.depth,
        );
        assert!(report.rejected.is_none());
        assert!(ship.cash >= 0.0);
        assert!(report.fills[0].filled < 100.0);
    }

    #[test]
    fn test_buy_clamped_to_cargo_volume() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        ship.cargo_capacity = 10.0;
        island.inventory.insert(GoodId::Timber, 1000.0);
        ship.cash = 1_000_000.0;
        let report = execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Timber, quantity: 1000.0 }],
            &goods,
            0.0,
            no_budget(),
            &config.depth,
        );
        // Timber bulkiness 2.0 -> at most 5 units fit.
        assert!((report.fills[0].filled - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_sell_clamped_to_cargo() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        ship.cargo.insert(GoodId::Fish, 3.0);
        let report = execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Fish, quantity: -10.0 }],
            &goods,
            0.0,
            no_budget(),
            &config.depth,
        );
        assert!((report.fills[0].filled - 3.0).abs() < 1e-9);
        assert!(ship.cargo.get(&GoodId::Fish).is_none());
    }

    #[test]
    fn test_depth_floor_after_trade() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        island.inventory.insert(GoodId::Grain, 1_000_000.0);
        ship.cash = 10_000_000.0;
        ship.cargo_capacity = 100_000.0;
        execute_order(
            &mut island,
            &mut ship,
            &[TradeLine { good: GoodId::Grain, quantity: 50_000.0 }],
            &goods,
            0.0,
            no_budget(),
            &config.depth,
        );
        assert!(island.market.buy_depth[&GoodId::Grain] >= config.depth.min_depth);
    }

    #[test]
    fn test_multi_line_order_is_atomic_per_line_clamped() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        ship.cargo.insert(GoodId::Fish, 10.0);
        let report = execute_order(
            &mut island,
            &mut ship,
            &[
                TradeLine { good: GoodId::Fish, quantity: -10.0 },
                TradeLine { good: GoodId::Grain, quantity: 5.0 },
            ],
            &goods,
            config.tax_rate,
            no_budget(),
            &config.depth,
        );
        assert!(report.rejected.is_none());
        assert_eq!(report.fills.len(), 2);
        assert!(report.fills.iter().all(|f| f.filled > 0.0));
    }

    #[test]
    fn test_zero_feasible_line_dropped_others_proceed() {
        let (config, mut island, mut ship) = setup();
        let goods = default_goods();
        island.inventory.insert(GoodId::Luxuries, 0.0);
        let report = execute_order(
            &mut island,
            &mut ship,
            &[
                TradeLine { good: GoodId::Luxuries, quantity: 5.0 },
                TradeLine { good: GoodId::Grain, quantity: 5.0 },
            ],
            &goods,
            config.tax_rate,
            no_budget(),
            &config.depth,
        );
        assert!(report.rejected.is_none());
        assert_eq!(report.fills[0].filled, 0.0);
        assert!(report.fills[1].filled > 0.0);
    }

    #[test]
    fn test_velocity_feeds_price() {
        let (config, island, _) = setup();
        let goods = default_goods();
        let mut hot = island.clone();
        let mut quiet = island;
        let mut heavy_consumption = BTreeMap::new();
        heavy_consumption
            .insert(GoodId::Grain, hot.market.reference_consumption[&GoodId::Grain] * 10.0);
        update_prices(
            &mut hot,
            &heavy_consumption,
            &EventModifiers::default(),
            &goods,
            &config.market,
            0.0,
        );
        update_prices(
            &mut quiet,
            &BTreeMap::new(),
            &EventModifiers::default(),
            &goods,
            &config.market,
            0.0,
        );
        assert!(hot.market.price(GoodId::Grain) > quiet.market.price(GoodId::Grain));
    }
}
