//! The world root: all shared simulation state, rebuilt once per tick.

use crate::agent::{AgentAssets, AgentState, AgentType};
use crate::config::SimulationConfig;
use crate::error::{Result, SimulationError};
use crate::events::WorldEvent;
use crate::goods::{default_goods, GoodDefinition, GoodId, LaborSector};
use crate::hash::StateHasher;
use crate::island::{
    Building, BuildingKind, EcosystemParams, EcosystemState, IslandId, IslandState, MarketState,
    Position, PopulationState, ProductionParams, Treasury,
};
use crate::rng::SeededRng;
use crate::ship::{AgentId, CrewState, ShipId, ShipLocation, ShipState};
use crate::shipyard::{BuildOrder, ShipBlueprint, Shipyard, ShipyardId};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Derived game-clock values for a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameTime {
    pub tick: u64,
    pub hour_of_day: u64,
    pub day: u64,
}

impl GameTime {
    /// One tick is one game-hour; twenty-four ticks are one game-day.
    pub fn from_tick(tick: u64) -> Self {
        GameTime { tick, hour_of_day: tick % 24, day: tick / 24 }
    }
}

/// World-level currency sinks and aggregate counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EconomyMetrics {
    /// Transaction tax burned on every trade.
    pub tax_destroyed: f64,
    /// Transport costs charged on arrival and burned.
    pub transport_cost_destroyed: f64,
    /// Crew wages paid out of ship cash and burned.
    pub wages_destroyed: f64,
    /// Coin spent on hull repairs and burned.
    pub repair_cost_destroyed: f64,
    /// Cash that went down with sunk ships.
    pub sunk_cash_destroyed: f64,
    /// Gross value of all executed trade lines.
    pub total_trade_volume: f64,
    pub ships_sunk: u64,
    pub ships_built: u64,
}

/// Root of all shared state. Mutated only by producing a successor through
/// the tick pipeline; the orchestrator owns the in-flight copy exclusively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    pub tick: u64,
    pub time: GameTime,
    /// Serialized RNG state, reloaded at the start of each tick.
    pub rng_state: u64,
    pub islands: BTreeMap<IslandId, IslandState>,
    pub ships: BTreeMap<ShipId, ShipState>,
    pub shipyards: BTreeMap<ShipyardId, Shipyard>,
    /// Active events, kept sorted by id.
    pub events: Vec<WorldEvent>,
    pub agents: BTreeMap<AgentId, AgentState>,
    pub goods: BTreeMap<GoodId, GoodDefinition>,
    pub metrics: EconomyMetrics,
}

impl WorldState {
    pub fn island_ids(&self) -> Vec<IslandId> {
        self.islands.keys().cloned().collect()
    }

    pub fn ship_ids(&self) -> Vec<ShipId> {
        self.ships.keys().cloned().collect()
    }

    /// Total currency currently held by ships, agents, and treasuries.
    pub fn circulating_currency(&self) -> f64 {
        let ship_cash: f64 = self.ships.values().map(|s| s.cash).sum();
        let agent_cash: f64 = self.agents.values().map(|a| a.assets.cash).sum();
        let treasuries: f64 = self
            .islands
            .values()
            .filter_map(|i| i.treasury.as_ref().map(|t| t.balance))
            .sum();
        ship_cash + agent_cash + treasuries
    }

    /// Currency removed from circulation by the configured sinks.
    pub fn destroyed_currency(&self) -> f64 {
        self.metrics.tax_destroyed
            + self.metrics.transport_cost_destroyed
            + self.metrics.wages_destroyed
            + self.metrics.repair_cost_destroyed
            + self.metrics.sunk_cash_destroyed
    }

    /// Canonical fingerprint over shared state. Agent memory is private and
    /// excluded; map iteration is sorted by construction.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = StateHasher::new();
        hasher.write_u64(self.tick);
        for island in self.islands.values() {
            island.hash_into(&mut hasher);
        }
        for ship in self.ships.values() {
            ship.hash_into(&mut hasher);
        }
        let mut event_ids: Vec<&WorldEvent> = self.events.iter().collect();
        event_ids.sort_by(|a, b| a.id.cmp(&b.id));
        for event in event_ids {
            hasher.write_str(&event.id);
            hasher.write_u64(event.start_tick);
            hasher.write_u64(event.end_tick);
        }
        hasher.write_f64(self.metrics.tax_destroyed);
        hasher.write_f64(self.metrics.transport_cost_destroyed);
        hasher.write_f64(self.metrics.wages_destroyed);
        hasher.write_f64(self.metrics.repair_cost_destroyed);
        hasher.write_f64(self.metrics.sunk_cash_destroyed);
        hasher.write_f64(self.metrics.total_trade_volume);
        hasher.write_u64(self.metrics.ships_sunk);
        hasher.write_u64(self.metrics.ships_built);
        hasher.finish()
    }
}

const ISLAND_NAMES: &[&str] = &[
    "Shoalhold",
    "Saltmere",
    "Emberwick",
    "Gullcrest",
    "Thornquay",
    "Windrow",
    "Mistral Rock",
    "Foamreach",
    "Harrowgate",
    "Cinderbar",
    "Lowtide",
    "Pellew",
];

const AGENT_NAMES: &[&str] = &[
    "Meridian Trading Co.",
    "Tradewind Partners",
    "Gullwing Freight",
    "Ironquay Merchants",
    "Saltrose Company",
    "Farwater Exchange",
];

const SHIP_NAMES: &[&str] = &[
    "Petrel",
    "Kestrel",
    "Cormorant",
    "Albatross",
    "Sandpiper",
    "Tern",
    "Gannet",
    "Skua",
    "Fulmar",
    "Curlew",
    "Plover",
    "Osprey",
];

fn slugify(name: &str) -> String {
    name.to_lowercase().replace([' ', '.'], "-").replace("--", "-")
}

/// Expected per-hour consumption of a good for a population; anchors ideal
/// stocks and the velocity normalization.
pub fn reference_consumption(good: GoodId, population: f64, config: &SimulationConfig) -> f64 {
    let c = &config.consumption;
    match good {
        GoodId::Grain => population * c.food_per_capita * 0.6,
        GoodId::Fish => population * c.food_per_capita * 0.4,
        GoodId::Timber => population * 0.003,
        GoodId::Tools => population * 0.0015,
        GoodId::Luxuries => population * c.luxury_per_capita * 0.5,
    }
}

fn build_island(
    name: &str,
    position: Position,
    config: &SimulationConfig,
    goods: &BTreeMap<GoodId, GoodDefinition>,
    rng: &mut SeededRng,
) -> IslandState {
    let fish_capacity = rng.next_float_range(800.0, 1200.0);
    let forest_capacity = rng.next_float_range(600.0, 1000.0);
    let ecosystem = EcosystemState {
        fish_stock: fish_capacity * rng.next_float_range(0.85, 0.95),
        forest_biomass: forest_capacity * rng.next_float_range(0.85, 0.95),
        soil_fertility: rng.next_float_range(0.7, 0.9),
    };
    let population_size = rng.next_float_range(300.0, 800.0);
    let population = PopulationState {
        size: population_size,
        health: rng.next_float_range(0.75, 0.9),
        labor_shares: config.population.base_shares.clone(),
    };

    let mut base_rates = BTreeMap::new();
    for (good, rate) in &config.production.base_rates {
        // Islands specialize: each good's base rate varies around the global one.
        base_rates.insert(*good, rate * rng.next_float_range(0.8, 1.3));
    }
    let production = ProductionParams {
        base_rates,
        tool_sensitivity: config.production.tool_sensitivity,
        ecosystem_sensitivity: config.production.ecosystem_sensitivity.clone(),
    };

    let mut prices = BTreeMap::new();
    let mut ideal_stocks = BTreeMap::new();
    let mut momentum = BTreeMap::new();
    let mut consumption_velocity = BTreeMap::new();
    let mut ref_consumption = BTreeMap::new();
    let mut buy_depth = BTreeMap::new();
    let mut sell_depth = BTreeMap::new();
    let mut inventory = BTreeMap::new();
    for (good, definition) in goods {
        let market_cfg = config.market.for_category(good.category());
        let reference = reference_consumption(*good, population_size, config);
        let ideal = (reference * market_cfg.ideal_stock_days * 24.0).max(1.0);
        let depth = (ideal * config.depth.base_depth_multiplier).max(config.depth.min_depth);
        prices.insert(*good, definition.base_price);
        ideal_stocks.insert(*good, ideal);
        momentum.insert(*good, 0.0);
        consumption_velocity.insert(*good, reference * config.time_scale);
        ref_consumption.insert(*good, reference);
        buy_depth.insert(*good, depth);
        sell_depth.insert(*good, depth);
        inventory.insert(*good, ideal);
    }

    let mut buildings = BTreeMap::new();
    if rng.next_float_unit() < 0.5 {
        buildings.insert(
            BuildingKind::Market,
            Building { kind: BuildingKind::Market, level: 1, condition: 1.0 },
        );
    }
    if rng.next_float_unit() < 0.4 {
        buildings.insert(
            BuildingKind::Workshop,
            Building { kind: BuildingKind::Workshop, level: 1, condition: 1.0 },
        );
    }
    if rng.next_float_unit() < 0.4 {
        buildings.insert(
            BuildingKind::Warehouse,
            Building { kind: BuildingKind::Warehouse, level: 1, condition: 1.0 },
        );
    }

    IslandState {
        id: slugify(name),
        name: name.to_string(),
        position,
        ecosystem,
        ecosystem_params: EcosystemParams { fish_capacity, forest_capacity },
        population,
        inventory,
        market: MarketState {
            prices,
            ideal_stocks,
            momentum,
            consumption_velocity,
            reference_consumption: ref_consumption,
            buy_depth,
            sell_depth,
        },
        production,
        buildings,
        treasury: Some(Treasury::new(config.initial_treasury)),
        production_shocks: BTreeMap::new(),
        discovered: false,
    }
}

/// Creates the initial world from a validated configuration.
///
/// Fails loudly on any config or initial-state inconsistency; a world that
/// starts broken can never satisfy the invariants.
pub fn initialize_world(config: &SimulationConfig) -> Result<WorldState> {
    config.validate()?;
    let mut rng = SeededRng::new(config.seed);
    let goods = default_goods();

    // Islands
    let mut islands = BTreeMap::new();
    let mut ordered_island_ids = Vec::new();
    for index in 0..config.island_count {
        let name = if index < ISLAND_NAMES.len() {
            ISLAND_NAMES[index].to_string()
        } else {
            format!("Isle {}", index + 1)
        };
        let position =
            Position::new(rng.next_float_range(0.0, 100.0), rng.next_float_range(0.0, 100.0));
        let island = build_island(&name, position, config, &goods, &mut rng);
        if islands.contains_key(&island.id) {
            return Err(SimulationError::WorldInit(format!(
                "duplicate island id '{}'",
                island.id
            )));
        }
        ordered_island_ids.push(island.id.clone());
        islands.insert(island.id.clone(), island);
    }

    // Shipyards: the first island always hosts one, then every fourth.
    let mut shipyards = BTreeMap::new();
    for (index, island_id) in ordered_island_ids.iter().enumerate() {
        if index == 0 || index % 4 == 0 {
            let id: ShipyardId = format!("yard-{}", island_id);
            shipyards
                .insert(id.clone(), Shipyard { id, island_id: island_id.clone(), active_order: None });
        }
    }
    // The first yard starts with a sloop on the slip for the first trader.
    if config.agent_count >= 1 {
        if let Some(yard) = shipyards.values_mut().next() {
            yard.active_order = Some(BuildOrder {
                owner_id: "trader-1".to_string(),
                ship_name: format!("{} Gull", ISLAND_NAMES[0]),
                blueprint: ShipBlueprint::sloop(),
                progress: 0.0,
            });
        }
    }

    // Agents and their ships
    let mut agents = BTreeMap::new();
    let mut ships = BTreeMap::new();
    let mut ship_ordinal = 0usize;
    for agent_index in 0..config.agent_count {
        let agent_id: AgentId = format!("trader-{}", agent_index + 1);
        let agent_name = AGENT_NAMES
            .get(agent_index)
            .map(|n| n.to_string())
            .unwrap_or_else(|| format!("Trading House {}", agent_index + 1));
        let mut ship_ids = Vec::new();
        for _ in 0..config.ships_per_agent {
            let base_name = SHIP_NAMES[ship_ordinal % SHIP_NAMES.len()];
            let ship_name = if ship_ordinal < SHIP_NAMES.len() {
                base_name.to_string()
            } else {
                format!("{} {}", base_name, ship_ordinal / SHIP_NAMES.len() + 1)
            };
            let ship_id: ShipId = slugify(&ship_name);
            let home = &ordered_island_ids[ship_ordinal % ordered_island_ids.len()];
            let ship = ShipState {
                id: ship_id.clone(),
                name: ship_name,
                owner_id: agent_id.clone(),
                cargo_capacity: 100.0,
                base_speed: 8.0,
                cash: config.initial_ship_cash,
                cargo: BTreeMap::new(),
                location: ShipLocation::AtIsland { island_id: home.clone() },
                last_voyage_cost: 0.0,
                cumulative_transport_cost: 0.0,
                crew: CrewState {
                    count: 10,
                    capacity: 10,
                    morale: 0.8,
                    wage_rate: config.crew.default_wage_rate,
                    unpaid_ticks: 0,
                },
                condition: 1.0,
                total_distance_traveled: 0.0,
                debt: None,
            };
            if ships.contains_key(&ship.id) {
                return Err(SimulationError::WorldInit(format!("duplicate ship id '{}'", ship.id)));
            }
            ship_ids.push(ship.id.clone());
            ships.insert(ship.id.clone(), ship);
            ship_ordinal += 1;
        }
        agents.insert(
            agent_id.clone(),
            AgentState {
                id: agent_id,
                agent_type: AgentType::Trader,
                name: agent_name,
                assets: AgentAssets { cash: config.initial_agent_cash, ship_ids },
            },
        );
    }

    let world = WorldState {
        tick: 0,
        time: GameTime::from_tick(0),
        rng_state: rng.state(),
        islands,
        ships,
        shipyards,
        events: Vec::new(),
        agents,
        goods,
        metrics: EconomyMetrics::default(),
    };
    info!(
        "initialized world: {} islands, {} ships, {} agents, seed {}",
        world.islands.len(),
        world.ships.len(),
        world.agents.len(),
        config.seed
    );
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_game_time_derivation() {
        let time = GameTime::from_tick(49);
        assert_eq!(time.day, 2);
        assert_eq!(time.hour_of_day, 1);
    }

    #[test]
    fn test_initialize_world_counts() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        assert_eq!(world.islands.len(), config.island_count);
        assert_eq!(world.agents.len(), config.agent_count);
        assert_eq!(world.ships.len(), config.agent_count * config.ships_per_agent);
        assert!(!world.shipyards.is_empty());
        assert_eq!(world.tick, 0);
    }

    #[test]
    fn test_initialize_world_is_deterministic() {
        let config = SimulationConfig::default();
        let world_a = initialize_world(&config).unwrap();
        let world_b = initialize_world(&config).unwrap();
        assert_eq!(world_a.state_hash(), world_b.state_hash());
        assert_eq!(world_a, world_b);
    }

    #[test]
    fn test_initialize_world_seed_changes_hash() {
        let config_a = SimulationConfig::default();
        let config_b = SimulationConfig { seed: 43, ..SimulationConfig::default() };
        let world_a = initialize_world(&config_a).unwrap();
        let world_b = initialize_world(&config_b).unwrap();
        assert_ne!(world_a.state_hash(), world_b.state_hash());
    }

    #[test]
    fn test_initialize_world_rejects_invalid_config() {
        let config = SimulationConfig { island_count: 0, ..SimulationConfig::default() };
        assert!(initialize_world(&config).is_err());
    }

    #[test]
    fn test_ships_owned_by_agents() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        for ship in world.ships.values() {
            let owner = world.agents.get(&ship.owner_id).expect("owner exists");
            assert!(owner.assets.ship_ids.contains(&ship.id));
        }
    }

    #[test]
    fn test_islands_start_at_ideal_stock() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        for island in world.islands.values() {
            for (good, ideal) in &island.market.ideal_stocks {
                assert!((island.inventory_of(*good) - ideal).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_circulating_currency_matches_config() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        let expected = config.initial_treasury * config.island_count as f64
            + config.initial_agent_cash * config.agent_count as f64
            + config.initial_ship_cash * (config.agent_count * config.ships_per_agent) as f64;
        assert!((world.circulating_currency() - expected).abs() < 1e-6);
    }
}
