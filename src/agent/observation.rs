//! Building the per-agent view of the world.
//!
//! Market state is public, but freshness is not: an agent only re-stamps
//! its price observations for islands where one of its ships is docked.
//! Everything downstream (triggers, strategist, executor) discounts data
//! by its observed age.

use crate::agent::{AgentMemory, AgentState};
use crate::config::AgentConfig;
use crate::events::{ProductionShock, WorldEvent};
use crate::goods::GoodId;
use crate::island::{IslandId, Position};
use crate::ship::{ShipId, ShipState};
use crate::world::WorldState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One island as an agent sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandView {
    pub id: IslandId,
    pub name: String,
    pub position: Position,
    pub prices: BTreeMap<GoodId, f64>,
    pub inventory: BTreeMap<GoodId, f64>,
    pub sell_depth: BTreeMap<GoodId, f64>,
    pub buy_depth: BTreeMap<GoodId, f64>,
    pub treasury_balance: Option<f64>,
    /// Currency the island will spend on imports in one transaction.
    pub import_budget: Option<f64>,
    /// Ticks since this agent last had a ship here; `None` = never.
    pub price_age: Option<u64>,
    pub prices_realtime: bool,
    pub production_shocks: BTreeMap<GoodId, ProductionShock>,
}

impl IslandView {
    /// Age for staleness math; unknown islands count as very stale.
    pub fn effective_age(&self, tick: u64) -> u64 {
        self.price_age.unwrap_or(tick.max(1))
    }

    pub fn is_stale(&self, config: &AgentConfig) -> bool {
        match self.price_age {
            Some(age) => age >= config.stale_price_age,
            None => true,
        }
    }
}

/// One ship as an agent sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipView {
    pub ship: ShipState,
    pub is_owned: bool,
}

/// The best cross-island spread found this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbitrageOpportunity {
    pub good: GoodId,
    pub buy_island: IslandId,
    pub sell_island: IslandId,
    pub buy_price: f64,
    pub sell_price: f64,
    /// Relative spread `(sell - buy) / buy`.
    pub margin: f64,
}

/// Everything one agent can see in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservableState {
    pub tick: u64,
    pub islands: BTreeMap<IslandId, IslandView>,
    pub ships: BTreeMap<ShipId, ShipView>,
    pub self_cash: f64,
    pub owned_ship_ids: Vec<ShipId>,
    pub best_arbitrage: Option<ArbitrageOpportunity>,
    pub active_events: Vec<WorldEvent>,
}

impl ObservableState {
    /// Average debt ratio across owned ships; zero with no ships.
    pub fn average_debt_ratio(&self) -> f64 {
        let owned: Vec<&ShipView> = self.ships.values().filter(|s| s.is_owned).collect();
        if owned.is_empty() {
            return 0.0;
        }
        owned.iter().map(|s| s.ship.debt_ratio()).sum::<f64>() / owned.len() as f64
    }

    /// Fraction of islands whose prices are stale for this agent.
    pub fn stale_fraction(&self, config: &AgentConfig) -> f64 {
        if self.islands.is_empty() {
            return 0.0;
        }
        let stale = self.islands.values().filter(|v| v.is_stale(config)).count();
        stale as f64 / self.islands.len() as f64
    }

    /// Owned ships currently docked, with their islands, in id order.
    pub fn docked_ships(&self) -> Vec<(&ShipView, &IslandId)> {
        self.ships
            .values()
            .filter(|s| s.is_owned)
            .filter_map(|s| s.ship.location.docked_island().map(|island| (s, island)))
            .collect()
    }
}

/// Finds the best relative spread across all goods and island pairs.
fn best_arbitrage(islands: &BTreeMap<IslandId, IslandView>) -> Option<ArbitrageOpportunity> {
    let mut best: Option<ArbitrageOpportunity> = None;
    for good in GoodId::all() {
        let mut low: Option<(&IslandId, f64)> = None;
        let mut high: Option<(&IslandId, f64)> = None;
        for (id, view) in islands {
            let Some(price) = view.prices.get(&good).copied() else { continue };
            if price <= 0.0 {
                continue;
            }
            if low.map(|(_, p)| price < p).unwrap_or(true) {
                low = Some((id, price));
            }
            if high.map(|(_, p)| price > p).unwrap_or(true) {
                high = Some((id, price));
            }
        }
        if let (Some((buy_island, buy_price)), Some((sell_island, sell_price))) = (low, high) {
            if buy_island == sell_island {
                continue;
            }
            let margin = (sell_price - buy_price) / buy_price;
            if best.as_ref().map(|b| margin > b.margin).unwrap_or(true) {
                best = Some(ArbitrageOpportunity {
                    good,
                    buy_island: buy_island.clone(),
                    sell_island: sell_island.clone(),
                    buy_price,
                    sell_price,
                    margin,
                });
            }
        }
    }
    best
}

/// Builds an agent's observation of the committed world, re-stamping its
/// memory's price observations wherever one of its ships is docked.
pub fn observe(
    world: &WorldState,
    agent: &AgentState,
    memory: &mut AgentMemory,
    config: &AgentConfig,
) -> ObservableState {
    let tick = world.tick;

    // Islands with an owned ship docked give real-time prices.
    let mut docked_islands: Vec<&IslandId> = Vec::new();
    for ship_id in &agent.assets.ship_ids {
        if let Some(ship) = world.ships.get(ship_id) {
            if let Some(island_id) = ship.location.docked_island() {
                docked_islands.push(island_id);
            }
        }
    }
    for island_id in &docked_islands {
        if let Some(island) = world.islands.get(*island_id) {
            for (good, price) in &island.market.prices {
                memory.observe_price(island_id, *good, *price, tick);
            }
        }
    }

    let mut islands = BTreeMap::new();
    for (id, island) in &world.islands {
        let realtime = docked_islands.iter().any(|d| *d == id);
        let price_age = if realtime { Some(0) } else { memory.price_age(id, tick) };
        islands.insert(
            id.clone(),
            IslandView {
                id: id.clone(),
                name: island.name.clone(),
                position: island.position,
                prices: island.market.prices.clone(),
                inventory: island.inventory.clone(),
                sell_depth: island.market.sell_depth.clone(),
                buy_depth: island.market.buy_depth.clone(),
                treasury_balance: island.treasury.as_ref().map(|t| t.balance),
                import_budget: island.import_budget(config.max_spend_ratio),
                price_age,
                prices_realtime: realtime,
                production_shocks: island.production_shocks.clone(),
            },
        );
    }

    let ships = world
        .ships
        .iter()
        .map(|(id, ship)| {
            (
                id.clone(),
                ShipView { ship: ship.clone(), is_owned: ship.owner_id == agent.id },
            )
        })
        .collect();

    let best = best_arbitrage(&islands);
    ObservableState {
        tick,
        islands,
        ships,
        self_cash: agent.assets.cash,
        owned_ship_ids: agent.assets.ship_ids.clone(),
        best_arbitrage: best,
        active_events: world.events.clone(),
    }
}
