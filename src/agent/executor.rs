//! Rule-based conversion of a strategy into concrete ship actions.
//!
//! Per owned docked ship the cascade is: sell cargo worth selling here,
//! else buy into a profitable route, else sail somewhere useful, else
//! wait. At most one action per ship per tick; at-sea ships are left to
//! the shipping engine.

use crate::agent::observation::{IslandView, ObservableState};
use crate::agent::{Action, AgentMemory, PrimaryGoal, RiskTolerance, Strategy};
use crate::config::SimulationConfig;
use crate::goods::{GoodDefinition, GoodId};
use crate::island::IslandId;
use crate::market::price_impact;
use crate::ship::ShipState;
use crate::shipping::estimate_transport_cost;
use log::trace;
use std::collections::BTreeMap;

/// Ignore trade lines smaller than this; they churn ticks without moving
/// the economics.
const MIN_TRADE_QUANTITY: f64 = 0.5;

/// Stateless planner; all inputs arrive per call.
#[derive(Debug, Default, Clone)]
pub struct Executor;

struct BuyCandidate {
    good: GoodId,
    destination: IslandId,
    quantity: f64,
    margin: f64,
    score: f64,
}

impl Executor {
    /// Plans this tick's actions for every owned, docked ship.
    pub fn plan_actions(
        observation: &ObservableState,
        memory: &AgentMemory,
        config: &SimulationConfig,
        goods: &BTreeMap<GoodId, GoodDefinition>,
    ) -> Vec<Action> {
        let strategy = memory.strategy.as_ref();
        let risk_scale = match strategy.map(|s| s.risk_tolerance) {
            Some(RiskTolerance::Low) => config.agents.risk_scale_low,
            Some(RiskTolerance::High) => config.agents.risk_scale_high,
            _ => config.agents.risk_scale_medium,
        };

        let mut actions = Vec::new();
        for (ship_view, here) in observation.docked_ships() {
            let ship = &ship_view.ship;
            let Some(here_view) = observation.islands.get(here) else { continue };

            if let Some(action) =
                Self::plan_sell(ship, here_view, observation, strategy, risk_scale, config)
            {
                actions.push(action);
                continue;
            }
            if let Some(action) = Self::plan_buy(
                ship,
                here_view,
                observation,
                strategy,
                risk_scale,
                config,
                goods,
            ) {
                actions.push(action);
                continue;
            }
            if let Some(action) =
                Self::plan_navigation(ship, here_view, observation, strategy, config)
            {
                actions.push(action);
                continue;
            }
            actions.push(Action::Wait { ship_id: ship.id.clone(), duration: 1 });
        }
        actions
    }

    fn cross_island_prices(
        observation: &ObservableState,
        good: GoodId,
    ) -> (f64, f64) {
        let mut min_p = f64::INFINITY;
        let mut max_p = f64::NEG_INFINITY;
        for view in observation.islands.values() {
            if let Some(price) = view.prices.get(&good) {
                min_p = min_p.min(*price);
                max_p = max_p.max(*price);
            }
        }
        (min_p, max_p)
    }

    fn plan_sell(
        ship: &ShipState,
        here: &IslandView,
        observation: &ObservableState,
        strategy: Option<&Strategy>,
        risk_scale: f64,
        config: &SimulationConfig,
    ) -> Option<Action> {
        let agents = &config.agents;
        let urgent = ship.debt_ratio() > 0.8 * agents.max_acceptable_debt_ratio;
        let mut lines = Vec::new();

        for (good, held) in &ship.cargo {
            let price_here = here.prices.get(good).copied().unwrap_or(0.0);
            if price_here <= 0.0 {
                continue;
            }
            let (min_p, max_p) = Self::cross_island_prices(observation, *good);
            let strategy_destination = strategy
                .map(|s| {
                    s.target_routes
                        .iter()
                        .any(|r| r.to == here.id && r.goods.contains(good))
                })
                .unwrap_or(false);
            let in_top_of_range =
                max_p > min_p && price_here >= min_p + 0.4 * (max_p - min_p);
            let above_floor_margin = price_here >= min_p * (1.0 + agents.min_profit_margin);

            if !(strategy_destination || in_top_of_range || above_floor_margin || urgent) {
                continue;
            }

            let mut quantity = held * risk_scale;
            if let Some(budget) = here.import_budget {
                quantity = quantity.min(budget * agents.max_treasury_fraction / price_here);
            }
            // Dumping more than twice the standing depth invites ruinous slippage.
            let depth = here.sell_depth.get(good).copied().unwrap_or(0.0);
            quantity = quantity.min(2.0 * depth);

            if quantity >= MIN_TRADE_QUANTITY {
                lines.push(crate::market::TradeLine { good: *good, quantity: -quantity });
            }
        }

        if lines.is_empty() {
            None
        } else {
            Some(Action::Trade {
                ship_id: ship.id.clone(),
                island_id: here.id.clone(),
                lines,
            })
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn plan_buy(
        ship: &ShipState,
        here: &IslandView,
        observation: &ObservableState,
        strategy: Option<&Strategy>,
        risk_scale: f64,
        config: &SimulationConfig,
        goods: &BTreeMap<GoodId, GoodDefinition>,
    ) -> Option<Action> {
        let agents = &config.agents;
        if ship.debt_ratio() > agents.max_acceptable_debt_ratio {
            return None;
        }

        // Candidate (good, destination, priority) triples: strategy routes
        // starting here, otherwise the best global arbitrage if it starts here.
        let mut raw_candidates: Vec<(GoodId, IslandId, u8)> = Vec::new();
        if let Some(strategy) = strategy {
            for route in &strategy.target_routes {
                if route.from == here.id {
                    for good in &route.goods {
                        raw_candidates.push((*good, route.to.clone(), route.priority.max(1)));
                    }
                }
            }
        }
        if raw_candidates.is_empty() {
            if let Some(arb) = &observation.best_arbitrage {
                if arb.buy_island == here.id {
                    raw_candidates.push((arb.good, arb.sell_island.clone(), 1));
                }
            }
        }
        if raw_candidates.is_empty() {
            return None;
        }

        let free_volume = (ship.cargo_capacity - ship.cargo_volume(goods)).max(0.0);
        let spendable = ship.cash + 0.5 * ship.available_credit();

        let mut candidates = Vec::new();
        for (good, destination, priority) in raw_candidates {
            let Some(dest_view) = observation.islands.get(&destination) else { continue };
            let Some(definition) = goods.get(&good) else { continue };
            let buy_price = here.prices.get(&good).copied().unwrap_or(0.0);
            let sell_price = dest_view.prices.get(&good).copied().unwrap_or(0.0);
            if buy_price <= 0.0 || sell_price <= buy_price {
                continue;
            }

            let mut quantity = free_volume / definition.bulkiness.max(1e-9);
            quantity = quantity.min(spendable / (buy_price * (1.0 + config.tax_rate)));
            let dest_depth = dest_view.sell_depth.get(&good).copied().unwrap_or(0.0);
            quantity = quantity.min(dest_depth / agents.min_depth_ratio.max(1e-9));
            if let Some(budget) = dest_view.import_budget {
                quantity =
                    quantity.min(budget * agents.max_treasury_fraction / sell_price);
            }
            quantity *= risk_scale;
            if quantity < MIN_TRADE_QUANTITY {
                continue;
            }

            let distance = here.position.distance_to(&dest_view.position);
            let trip_hours = distance / ship.base_speed.max(1e-9);
            let gross = (sell_price - buy_price) * quantity;

            let transport = estimate_transport_cost(
                distance,
                quantity * definition.bulkiness,
                &config.shipping,
            ) * (1.0 + config.shipping.empty_return_multiplier);
            let operating =
                agents.operating_cost_per_day * (2.0 * trip_hours) / 24.0;
            let interest = ship
                .debt
                .as_ref()
                .map(|d| d.principal * d.interest_rate * trip_hours)
                .unwrap_or(0.0);
            let spoilage_loss = quantity
                * (definition.spoilage_rate * trip_hours).min(1.0)
                * (buy_price + sell_price)
                / 2.0;
            let slippage =
                sell_price * price_impact(quantity, dest_depth, &config.depth) * quantity;
            let max_age = here
                .effective_age(observation.tick)
                .max(dest_view.effective_age(observation.tick));
            let stale_discount = gross * max_age as f64 * agents.stale_discount_per_tick;

            let net = gross - transport - operating - interest - spoilage_loss - slippage
                - stale_discount;
            let margin = net / (buy_price * quantity);
            if margin < agents.min_profit_margin {
                trace!(
                    "{}: rejecting {}->{} {} (margin {:.3})",
                    ship.id,
                    here.id,
                    destination,
                    good,
                    margin
                );
                continue;
            }

            let both_fresh = !here.is_stale(agents) && !dest_view.is_stale(agents);
            let either_stale = here.is_stale(agents) || dest_view.is_stale(agents);
            let freshness = if both_fresh {
                1.2
            } else if either_stale {
                0.8
            } else {
                1.0
            };
            let score = margin * (1.0 / priority as f64) * freshness;
            candidates.push(BuyCandidate { good, destination, quantity, margin, score });
        }

        candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

        let mut remaining_volume = free_volume;
        let mut remaining_cash = spendable;
        let mut lines = Vec::new();
        for candidate in candidates {
            let definition = &goods[&candidate.good];
            let buy_price = here.prices.get(&candidate.good).copied().unwrap_or(0.0);
            let mut quantity = candidate.quantity;
            quantity = quantity.min(remaining_volume / definition.bulkiness.max(1e-9));
            quantity = quantity.min(remaining_cash / (buy_price * (1.0 + config.tax_rate)));
            if quantity < MIN_TRADE_QUANTITY {
                continue;
            }
            remaining_volume -= quantity * definition.bulkiness;
            remaining_cash -= quantity * buy_price * (1.0 + config.tax_rate);
            trace!(
                "{}: buying {:.1} {} toward {} (margin {:.3})",
                ship.id,
                quantity,
                candidate.good,
                candidate.destination,
                candidate.margin
            );
            lines.push(crate::market::TradeLine { good: candidate.good, quantity });
        }

        if lines.is_empty() {
            None
        } else {
            Some(Action::Trade {
                ship_id: ship.id.clone(),
                island_id: here.id.clone(),
                lines,
            })
        }
    }

    fn plan_navigation(
        ship: &ShipState,
        here: &IslandView,
        observation: &ObservableState,
        strategy: Option<&Strategy>,
        config: &SimulationConfig,
    ) -> Option<Action> {
        let agents = &config.agents;
        let has_cargo = !ship.cargo.is_empty();

        let destination = if has_cargo {
            // A loaded ship heads for its strategy's sell destination, or
            // the best-paying island for what it carries.
            let strategic = strategy.and_then(|s| {
                s.target_routes
                    .iter()
                    .find(|r| r.to != here.id && r.goods.iter().any(|g| ship.cargo.contains_key(g)))
                    .map(|r| r.to.clone())
            });
            strategic.or_else(|| {
                observation
                    .islands
                    .values()
                    .filter(|v| v.id != here.id)
                    .map(|v| {
                        let value: f64 = ship
                            .cargo
                            .iter()
                            .map(|(good, quantity)| {
                                let price = v.prices.get(good).copied().unwrap_or(0.0);
                                let age_discount = 1.0
                                    - (v.effective_age(observation.tick) as f64
                                        * agents.stale_discount_per_tick)
                                        .min(0.9);
                                quantity * price * age_discount
                            })
                            .sum();
                        let solvency_bonus =
                            if v.import_budget.unwrap_or(0.0) > 0.0 { 1.1 } else { 1.0 };
                        (v.id.clone(), value * solvency_bonus)
                    })
                    .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
                    .map(|(id, _)| id)
            })
        } else {
            let all_stale = observation.stale_fraction(agents) >= 1.0;
            let exploring = strategy
                .map(|s| s.primary_goal == PrimaryGoal::Explore)
                .unwrap_or(false);
            if all_stale || exploring {
                observation
                    .islands
                    .values()
                    .filter(|v| v.id != here.id)
                    .max_by_key(|v| v.effective_age(observation.tick))
                    .map(|v| v.id.clone())
            } else {
                strategy.and_then(|s| {
                    s.target_routes.first().map(|r| {
                        if r.from == here.id {
                            r.to.clone()
                        } else {
                            r.from.clone()
                        }
                    })
                })
            }
        };

        destination
            .filter(|d| *d != here.id)
            .map(|destination| Action::Navigate { ship_id: ship.id.clone(), destination })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::observation::observe;
    use crate::agent::TargetRoute;
    use crate::goods::default_goods;
    use crate::world::{initialize_world, WorldState};

    fn setup_two_price_world() -> (SimulationConfig, WorldState, String, String) {
        let config = SimulationConfig::default();
        let mut world = initialize_world(&config).unwrap();
        let ids = world.island_ids();
        let cheap = ids[0].clone();
        let dear = ids[1].clone();
        world.islands.get_mut(&cheap).unwrap().market.prices.insert(GoodId::Grain, 5.0);
        world.islands.get_mut(&cheap).unwrap().inventory.insert(GoodId::Grain, 500.0);
        world.islands.get_mut(&dear).unwrap().market.prices.insert(GoodId::Grain, 20.0);
        world.islands.get_mut(&dear).unwrap().inventory.insert(GoodId::Grain, 10.0);
        (config, world, cheap, dear)
    }

    fn dock_first_ship_at(world: &mut WorldState, island: &str) -> String {
        let ship_id = world.ship_ids()[0].clone();
        let ship = world.ships.get_mut(&ship_id).unwrap();
        ship.location = crate::ship::ShipLocation::AtIsland { island_id: island.to_string() };
        ship_id
    }

    fn strategy_route(from: &str, to: &str, good: GoodId, tick: u64) -> Strategy {
        Strategy {
            created_at: tick,
            primary_goal: PrimaryGoal::Profit,
            target_routes: vec![TargetRoute {
                from: from.to_string(),
                to: to.to_string(),
                goods: vec![good],
                priority: 1,
            }],
            risk_tolerance: RiskTolerance::High,
            analysis: String::new(),
            reasoning: String::new(),
            valid_until: tick + 96,
        }
    }

    #[test]
    fn test_buys_into_arbitrage_at_origin() {
        let (config, mut world, cheap, dear) = setup_two_price_world();
        let ship_id = dock_first_ship_at(&mut world, &cheap);
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let mut memory = AgentMemory::default();
        memory.adopt_strategy(strategy_route(&cheap, &dear, GoodId::Grain, 0));
        let observation = observe(&world, &agent, &mut memory, &config.agents);
        let goods = default_goods();
        let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
        let buy = actions.iter().find(|a| matches!(a, Action::Trade { .. }));
        let Some(Action::Trade { island_id, lines, .. }) = buy else {
            panic!("expected a buy trade, got {:?}", actions);
        };
        assert_eq!(island_id, &cheap);
        assert!(lines.iter().all(|l| l.quantity > 0.0));
    }

    #[test]
    fn test_sells_at_strategy_destination() {
        let (config, mut world, cheap, dear) = setup_two_price_world();
        let ship_id = dock_first_ship_at(&mut world, &dear);
        world.ships.get_mut(&ship_id).unwrap().cargo.insert(GoodId::Grain, 50.0);
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let mut memory = AgentMemory::default();
        memory.adopt_strategy(strategy_route(&cheap, &dear, GoodId::Grain, 0));
        let observation = observe(&world, &agent, &mut memory, &config.agents);
        let goods = default_goods();
        let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
        let Some(Action::Trade { island_id, lines, .. }) =
            actions.iter().find(|a| matches!(a, Action::Trade { .. }))
        else {
            panic!("expected a sell trade, got {:?}", actions);
        };
        assert_eq!(island_id, &dear);
        assert!(lines.iter().all(|l| l.quantity < 0.0));
    }

    #[test]
    fn test_loaded_ship_navigates_to_sell_destination() {
        let (config, mut world, cheap, dear) = setup_two_price_world();
        let ship_id = dock_first_ship_at(&mut world, &cheap);
        world.ships.get_mut(&ship_id).unwrap().cargo.insert(GoodId::Grain, 50.0);
        // Drain the ship's cash so it cannot keep buying at the origin.
        world.ships.get_mut(&ship_id).unwrap().cash = 0.0;
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let mut memory = AgentMemory::default();
        memory.adopt_strategy(strategy_route(&cheap, &dear, GoodId::Grain, 0));
        let observation = observe(&world, &agent, &mut memory, &config.agents);
        let goods = default_goods();
        let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
        let Some(Action::Navigate { destination, .. }) =
            actions.iter().find(|a| matches!(a, Action::Navigate { .. }))
        else {
            panic!("expected navigation, got {:?}", actions);
        };
        assert_eq!(destination, &dear);
    }

    #[test]
    fn test_high_debt_blocks_buying() {
        let (config, mut world, cheap, dear) = setup_two_price_world();
        let ship_id = dock_first_ship_at(&mut world, &cheap);
        {
            let ship = world.ships.get_mut(&ship_id).unwrap();
            ship.cash = 100.0;
            ship.debt = Some(crate::ship::DebtState {
                principal: 10_000.0,
                interest_rate: 0.0001,
                credit_limit: 10_000.0,
            });
        }
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let mut memory = AgentMemory::default();
        memory.adopt_strategy(strategy_route(&cheap, &dear, GoodId::Grain, 0));
        let observation = observe(&world, &agent, &mut memory, &config.agents);
        let goods = default_goods();
        let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
        assert!(
            !actions
                .iter()
                .any(|a| matches!(a, Action::Trade { lines, .. } if lines.iter().any(|l| l.quantity > 0.0))),
            "over-indebted ship must not buy: {:?}",
            actions
        );
    }

    #[test]
    fn test_wait_when_nothing_to_do() {
        let config = SimulationConfig::default();
        let mut world = initialize_world(&config).unwrap();
        // Flatten all prices so there is no spread anywhere.
        let island_ids = world.island_ids();
        for id in &island_ids {
            let island = world.islands.get_mut(id).unwrap();
            for good in GoodId::all() {
                island.market.prices.insert(good, 10.0);
            }
        }
        let ship_id = world.ship_ids()[0].clone();
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let mut memory = AgentMemory::default();
        let observation = observe(&world, &agent, &mut memory, &config.agents);
        let goods = default_goods();
        let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::Wait { .. }) || matches!(a, Action::Navigate { .. })));
    }

    #[test]
    fn test_risk_tolerance_scales_quantity() {
        let (config, mut world, cheap, dear) = setup_two_price_world();
        let ship_id = dock_first_ship_at(&mut world, &cheap);
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let goods = default_goods();

        let quantity_for = |risk: RiskTolerance| -> f64 {
            let mut memory = AgentMemory::default();
            let mut strategy = strategy_route(&cheap, &dear, GoodId::Grain, 0);
            strategy.risk_tolerance = risk;
            memory.adopt_strategy(strategy);
            let observation = observe(&world, &agent, &mut memory, &config.agents);
            let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
            actions
                .iter()
                .find_map(|a| match a {
                    Action::Trade { lines, .. } => {
                        lines.iter().find(|l| l.quantity > 0.0).map(|l| l.quantity)
                    }
                    _ => None,
                })
                .unwrap_or(0.0)
        };

        let low = quantity_for(RiskTolerance::Low);
        let high = quantity_for(RiskTolerance::High);
        assert!(low > 0.0 && high > 0.0);
        assert!(high > low, "high risk should buy more (low {}, high {})", low, high);
    }

    #[test]
    fn test_explore_strategy_navigates_to_stalest() {
        let (config, mut world, cheap, _) = setup_two_price_world();
        let ship_id = dock_first_ship_at(&mut world, &cheap);
        {
            let ship = world.ships.get_mut(&ship_id).unwrap();
            ship.cargo.clear();
            // Penniless, so the arbitrage at this island cannot tempt it.
            ship.cash = 0.0;
        }
        world.tick = 200;
        let agent_id = world.ships[&ship_id].owner_id.clone();
        let agent = world.agents[&agent_id].clone();
        let mut memory = AgentMemory::default();
        let mut strategy = strategy_route(&cheap, &cheap, GoodId::Grain, 200);
        strategy.primary_goal = PrimaryGoal::Explore;
        strategy.target_routes.clear();
        memory.adopt_strategy(strategy);
        let observation = observe(&world, &agent, &mut memory, &config.agents);
        let goods = default_goods();
        let actions = Executor::plan_actions(&observation, &memory, &config, &goods);
        assert!(
            actions.iter().any(|a| matches!(a, Action::Navigate { .. })),
            "exploring ship should sail: {:?}",
            actions
        );
    }
}
