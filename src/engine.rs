//! The tick orchestrator: fixed-order stage composition, metrics emission,
//! and the command boundary.
//!
//! Stage order is load-bearing. Production precedes ecology because ecology
//! consumes the harvest computed inside production; consumption precedes
//! population because health depends on the deficit; prices follow
//! consumption because velocity feeds pressure; ship movement precedes the
//! crew update because the at-sea morale penalty depends on the current
//! location.

use crate::agent::manager::{AgentManager, AgentPhaseReport};
use crate::agent::strategist::Strategist;
use crate::agent::triggers::TickHappenings;
use crate::config::{ConfigOverrides, SimulationConfig};
use crate::consumption;
use crate::crew::{self, CrewTickOutcome};
use crate::ecology;
use crate::error::Result;
use crate::events::{self, EventId, modifiers_for_island, modifiers_for_ship, storm_hits_ship};
use crate::goods::GoodId;
use crate::island::{BuildingKind, IslandId, Position};
use crate::market;
use crate::population;
use crate::production;
use crate::rng::SeededRng;
use crate::ship::ShipId;
use crate::shipping::{self, Arrival};
use crate::shipyard::{self, ShipyardTickOutcome};
use crate::world::{initialize_world, GameTime, WorldState};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-island consumption digest carried in the tick metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    pub food_needed: f64,
    pub food_consumed: f64,
    pub food_deficit: f64,
    pub luxury_consumed: f64,
}

/// Everything observable about one tick, emitted for downstream consumers
/// (UI, persistence, analysts) without re-walking the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickMetrics {
    pub tick: u64,
    pub state_hash: u64,
    pub production: BTreeMap<IslandId, BTreeMap<GoodId, f64>>,
    pub consumption: BTreeMap<IslandId, ConsumptionSummary>,
    /// Price deltas (momentum) per island per good after the market stage.
    pub price_changes: BTreeMap<IslandId, BTreeMap<GoodId, f64>>,
    pub arrivals: Vec<Arrival>,
    pub new_events: Vec<EventId>,
    pub expired_events: Vec<EventId>,
    pub ships_sunk: Vec<ShipId>,
    pub shipyard_deliveries: Vec<ShipId>,
    pub crew: BTreeMap<ShipId, CrewTickOutcome>,
    pub wages_paid: f64,
    pub transport_charged: f64,
    pub agent_report: AgentPhaseReport,
}

/// The simulation engine: owns the world, the agent layer, and the clock.
pub struct SimulationEngine {
    config: SimulationConfig,
    world: WorldState,
    manager: AgentManager,
    tick_history: Vec<u64>,
    paused: bool,
    speed_multiplier: f64,
    /// When present, every committed tick is checked against the world
    /// invariants and a violation panics with entity and tick.
    invariant_checker: Option<crate::invariant::InvariantChecker>,
}

impl SimulationEngine {
    /// Engine with the deterministic rule-based strategist.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let world = initialize_world(&config)?;
        Ok(SimulationEngine {
            config,
            world,
            manager: AgentManager::new(),
            tick_history: Vec::new(),
            paused: false,
            speed_multiplier: 1.0,
            invariant_checker: None,
        })
    }

    /// Engine with an injected strategist (advisor-backed or scripted).
    pub fn with_strategist(
        config: SimulationConfig,
        strategist: Box<dyn Strategist>,
    ) -> Result<Self> {
        let world = initialize_world(&config)?;
        Ok(SimulationEngine {
            config,
            world,
            manager: AgentManager::with_strategist(strategist),
            tick_history: Vec::new(),
            paused: false,
            speed_multiplier: 1.0,
            invariant_checker: None,
        })
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Mutable access to the committed world, applied between ticks.
    /// Intended for scenario setup and external state injection.
    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn tick_history(&self) -> &[u64] {
        &self.tick_history
    }

    pub fn manager(&self) -> &AgentManager {
        &self.manager
    }

    /// Enables per-tick invariant enforcement (tests and debug runs).
    /// The conservation baseline is taken from the world as it stands now.
    pub fn enable_strict_invariants(&mut self) {
        self.invariant_checker =
            Some(crate::invariant::InvariantChecker::standard(&self.world));
    }

    // Command boundary. All commands apply between ticks.

    pub fn start(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_speed(&mut self, multiplier: f64) {
        self.speed_multiplier = multiplier.max(0.0);
    }

    pub fn speed_multiplier(&self) -> f64 {
        self.speed_multiplier
    }

    pub fn set_advisor_enabled(&mut self, enabled: bool) {
        self.config.agents.advisor_enabled = enabled;
        if !enabled {
            self.manager.set_strategist(Box::new(
                crate::agent::strategist::RuleBasedStrategist,
            ));
        } else {
            // Re-enabling requires an injected channel; without one the
            // rule-based strategist keeps serving.
            warn!("advisor enabled, but strategies stay rule-based until a channel is injected");
        }
    }

    /// Rebuilds the world from a fresh seed, dropping all agent memory.
    pub fn reset(&mut self, seed: u64) -> Result<()> {
        self.config.seed = seed;
        self.world = initialize_world(&self.config)?;
        self.manager.clear();
        self.tick_history.clear();
        info!("world reset with seed {}", seed);
        Ok(())
    }

    pub fn apply_config_overrides(&mut self, overrides: &ConfigOverrides) {
        self.config.apply_overrides(overrides);
    }

    /// Advances the world by one tick and runs the agent layer against the
    /// committed successor.
    pub fn step(&mut self) -> TickMetrics {
        // Ownership barrier: the successor is built on a deep clone and
        // nothing outside this function sees it until commit.
        let mut next = self.world.clone();
        next.tick += 1;
        next.time = GameTime::from_tick(next.tick);
        let tick = next.tick;
        let dt = self.config.time_scale;
        let goods = next.goods.clone();
        let mut rng = SeededRng::from_state(next.rng_state);
        let mut metrics = TickMetrics { tick, ..TickMetrics::default() };

        // --- Events ---
        metrics.expired_events =
            next.events.iter().filter(|e| !e.is_active(tick)).map(|e| e.id.clone()).collect();
        next.events.retain(|e| e.is_active(tick));
        for island in next.islands.values_mut() {
            let expired: Vec<GoodId> = island
                .production_shocks
                .iter_mut()
                .filter_map(|(good, shock)| {
                    if shock.ticks_remaining <= 1 {
                        Some(*good)
                    } else {
                        shock.ticks_remaining -= 1;
                        None
                    }
                })
                .collect();
            for good in expired {
                island.production_shocks.remove(&good);
            }
        }

        let island_ids: Vec<IslandId> = next.islands.keys().cloned().collect();
        let ship_ids: Vec<ShipId> = next.ships.keys().cloned().collect();
        let spawned =
            events::generate_events(&self.config.events, tick, &island_ids, &ship_ids, &mut rng);
        for event in spawned {
            debug!("event {} ({}) until tick {}", event.id, event.event_type, event.end_tick);
            if event.event_type == events::EventType::Discovery {
                if let events::EventTarget::Island { island_id } = &event.target {
                    if let Some(island) = next.islands.get_mut(island_id) {
                        island.discovered = true;
                    }
                }
            }
            metrics.new_events.push(event.id.clone());
            next.events.push(event);
        }
        next.events.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some((island_id, good, shock)) = events::generate_shock(
            &self.config.events,
            &island_ids,
            &GoodId::all(),
            &mut rng,
        ) {
            debug!("supply shock on {} {} x{:.2}", island_id, good, shock.multiplier);
            if let Some(island) = next.islands.get_mut(&island_id) {
                island.production_shocks.insert(good, shock);
            }
        }

        // --- Per-island stages ---
        let workshop_bonus = self.config.buildings.workshop_tool_bonus
            * self.config.buildings.level_effect_multiplier;
        let market_stabilization = self.config.buildings.market_stabilization
            * self.config.buildings.level_effect_multiplier;
        for island_id in &island_ids {
            let modifiers = modifiers_for_island(&next.events, island_id);
            let island = next.islands.get_mut(island_id).expect("island exists");
            if let Some(treasury) = island.treasury.as_mut() {
                treasury.begin_tick();
            }

            let global_grain_rate = self
                .config
                .production
                .base_rates
                .get(&GoodId::Grain)
                .copied()
                .unwrap_or(1.0)
                .max(1e-9);
            let grain_rate_ratio = island
                .production
                .base_rates
                .get(&GoodId::Grain)
                .copied()
                .unwrap_or(0.0)
                / global_grain_rate;

            let produced = production::produce(
                island,
                &modifiers,
                &self.config.production,
                &self.config.population,
                &self.config.ecology,
                workshop_bonus,
                &mut rng,
                dt,
            );
            ecology::update_ecosystem(
                island,
                produced.harvests,
                &modifiers,
                grain_rate_ratio,
                &self.config.ecology,
                dt,
            );
            let consumed =
                consumption::consume(island, &modifiers, &goods, &self.config.consumption, dt);
            population::update_population(
                island,
                &consumed,
                &self.config.population,
                self.config.consumption.luxury_per_capita,
                dt,
            );
            population::reallocate_labor(
                island,
                &self.config.population,
                &self.config.production,
                dt,
            );
            market::update_prices(
                island,
                &consumed.per_good(),
                &modifiers,
                &goods,
                &self.config.market,
                market_stabilization,
            );
            market::regenerate_depth(island, &self.config.depth);

            metrics.production.insert(island_id.clone(), produced.outputs.clone());
            metrics.consumption.insert(
                island_id.clone(),
                ConsumptionSummary {
                    food_needed: consumed.food_needed,
                    food_consumed: consumed.food_consumed,
                    food_deficit: consumed.food_deficit,
                    luxury_consumed: consumed.luxury_consumed,
                },
            );
            metrics.price_changes.insert(island_id.clone(), island.market.momentum.clone());
        }
        ecology::migrate_fish(&mut next.islands, &self.config.ecology, dt);

        // --- Building maintenance ---
        for island in next.islands.values_mut() {
            for building in island.buildings.values_mut() {
                building.condition =
                    (building.condition - self.config.buildings.condition_decay_rate * dt)
                        .max(0.0);
            }
        }

        // --- Ships: spoilage, movement, wear, cost, arrival, repair ---
        let positions: BTreeMap<IslandId, Position> =
            next.islands.iter().map(|(id, i)| (id.clone(), i.position)).collect();
        for ship_id in &ship_ids {
            let ship_modifiers = modifiers_for_ship(&next.events, ship_id);
            let in_storm = storm_hits_ship(&next.events, ship_id);
            let docked_island = next.ships[ship_id].location.docked_island().cloned();
            let warehouse_multiplier = docked_island
                .as_ref()
                .and_then(|id| next.islands.get(id))
                .filter(|island| island.building_level(BuildingKind::Warehouse) > 0.0)
                .map(|_| self.config.buildings.warehouse_spoilage_multiplier)
                .unwrap_or(1.0);
            let crew_eff = crew::crew_efficiency(&next.ships[ship_id], &self.config.crew);

            let ship = next.ships.get_mut(ship_id).expect("ship exists");
            shipping::apply_spoilage(
                ship,
                &goods,
                ship_modifiers.spoilage_multiplier,
                warehouse_multiplier,
                dt,
            );

            if ship.is_at_sea() {
                let (distance, arrival) = shipping::advance_voyage(
                    ship,
                    &positions,
                    ship_modifiers.ship_speed_multiplier,
                    crew_eff,
                    &self.config.maintenance,
                    dt,
                );
                shipping::apply_wear(ship, distance, in_storm, &self.config.maintenance, dt);
                if let Some(arrival) = arrival {
                    let charged = shipping::charge_transport_cost(
                        ship,
                        arrival.distance,
                        &goods,
                        &self.config.shipping,
                    );
                    next.metrics.transport_cost_destroyed += charged;
                    metrics.transport_charged += charged;
                    metrics.arrivals.push(arrival);
                }
            } else if let Some(island_id) = &docked_island {
                let island = next.islands.get_mut(island_id).expect("island exists");
                let points =
                    shipping::repair_ship(ship, island, &self.config.maintenance, dt);
                next.metrics.repair_cost_destroyed +=
                    points * self.config.maintenance.coin_cost_per_point;
            }
        }

        // --- Sinking ---
        let mut sunk: Vec<ShipId> = Vec::new();
        for ship_id in &ship_ids {
            if let Some(ship) = next.ships.get(ship_id) {
                if shipping::check_sinking(ship, &self.config.maintenance, &mut rng) {
                    sunk.push(ship_id.clone());
                }
            }
        }
        for ship_id in sunk {
            if let Some(ship) = next.ships.remove(&ship_id) {
                if let Some(owner) = next.agents.get_mut(&ship.owner_id) {
                    owner.assets.ship_ids.retain(|id| *id != ship_id);
                }
                next.metrics.ships_sunk += 1;
                next.metrics.sunk_cash_destroyed += ship.cash;
                metrics.ships_sunk.push(ship_id);
            }
        }

        // --- Crew ---
        let surviving_ships: Vec<ShipId> = next.ships.keys().cloned().collect();
        for ship_id in &surviving_ships {
            let docked_island = next.ships[ship_id].location.docked_island().cloned();
            let ship = next.ships.get_mut(ship_id).expect("ship exists");
            let outcome = crew::tick_crew(ship, docked_island.is_some(), &self.config.crew, dt);
            next.metrics.wages_destroyed += outcome.wages_paid;
            metrics.wages_paid += outcome.wages_paid;
            if outcome.deserters > 0 {
                if let Some(island_id) = &docked_island {
                    if let Some(island) = next.islands.get_mut(island_id) {
                        island.population.size += outcome.deserters as f64;
                    }
                }
            }
            metrics.crew.insert(ship_id.clone(), outcome);
        }

        // --- Shipyards ---
        let yard_ids: Vec<String> = next.shipyards.keys().cloned().collect();
        for yard_id in &yard_ids {
            let yard = next.shipyards.get_mut(yard_id).expect("shipyard exists");
            let Some(island) = next.islands.get_mut(&yard.island_id) else { continue };
            let ordinal = (next.metrics.ships_built + 1) as usize;
            match shipyard::tick_shipyard(
                yard,
                &mut island.inventory,
                ordinal,
                self.config.crew.default_wage_rate,
            ) {
                ShipyardTickOutcome::Completed(ship) => {
                    let ship_id = ship.id.clone();
                    if let Some(owner) = next.agents.get_mut(&ship.owner_id) {
                        owner.assets.ship_ids.push(ship_id.clone());
                    }
                    next.ships.insert(ship_id.clone(), ship);
                    next.metrics.ships_built += 1;
                    metrics.shipyard_deliveries.push(ship_id);
                }
                ShipyardTickOutcome::Idle
                | ShipyardTickOutcome::Progressed(_)
                | ShipyardTickOutcome::Stalled => {}
            }
        }

        // --- Commit ---
        next.rng_state = rng.state();
        metrics.state_hash = next.state_hash();
        self.tick_history.push(metrics.state_hash);
        self.world = next;

        if let Some(checker) = &self.invariant_checker {
            checker.enforce(&self.world, &self.config);
        }

        // --- Agent phase against the committed world ---
        let happenings = TickHappenings {
            arrivals: metrics
                .arrivals
                .iter()
                .map(|a| (a.ship_id.clone(), a.island_id.clone()))
                .collect(),
            new_event_ids: metrics.new_events.clone(),
            expired_event_ids: metrics.expired_events.clone(),
        };
        metrics.agent_report = self.manager.run_tick(&mut self.world, &happenings, &self.config);

        metrics
    }

    /// Runs to `max_ticks`, invoking `on_tick` after each step.
    pub fn run_with<F: FnMut(&TickMetrics)>(&mut self, mut on_tick: F) -> u64 {
        while self.world.tick < self.config.max_ticks {
            if self.paused {
                break;
            }
            let metrics = self.step();
            on_tick(&metrics);
        }
        self.world.tick
    }

    /// Headless run to `max_ticks`.
    pub fn run(&mut self) -> u64 {
        self.run_with(|_| {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quick_config() -> SimulationConfig {
        SimulationConfig {
            max_ticks: 50,
            island_count: 3,
            agent_count: 1,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_step_advances_tick() {
        let mut engine = SimulationEngine::new(quick_config()).unwrap();
        let metrics = engine.step();
        assert_eq!(metrics.tick, 1);
        assert_eq!(engine.world().tick, 1);
        assert_eq!(engine.tick_history().len(), 1);
    }

    #[test]
    fn test_run_reaches_max_ticks() {
        let mut engine = SimulationEngine::new(quick_config()).unwrap();
        let final_tick = engine.run();
        assert_eq!(final_tick, 50);
        assert_eq!(engine.tick_history().len(), 50);
    }

    #[test]
    fn test_pause_stops_run() {
        let mut engine = SimulationEngine::new(quick_config()).unwrap();
        engine.pause();
        let final_tick = engine.run();
        assert_eq!(final_tick, 0);
        engine.resume();
        assert!(engine.run() > 0);
    }

    #[test]
    fn test_metrics_cover_all_islands() {
        let config = quick_config();
        let island_count = config.island_count;
        let mut engine = SimulationEngine::new(config).unwrap();
        let metrics = engine.step();
        assert_eq!(metrics.production.len(), island_count);
        assert_eq!(metrics.consumption.len(), island_count);
        assert_eq!(metrics.price_changes.len(), island_count);
    }

    #[test]
    fn test_reset_restores_initial_hash() {
        let mut engine = SimulationEngine::new(quick_config()).unwrap();
        let initial_hash = engine.world().state_hash();
        engine.step();
        engine.step();
        engine.reset(engine.config().seed).unwrap();
        assert_eq!(engine.world().state_hash(), initial_hash);
        assert!(engine.tick_history().is_empty());
    }

    #[test]
    fn test_deterministic_two_engines() {
        let mut engine_a = SimulationEngine::new(quick_config()).unwrap();
        let mut engine_b = SimulationEngine::new(quick_config()).unwrap();
        for _ in 0..50 {
            engine_a.step();
            engine_b.step();
        }
        assert_eq!(engine_a.tick_history(), engine_b.tick_history());
    }

    #[test]
    fn test_invariants_hold_over_run() {
        let mut engine = SimulationEngine::new(quick_config()).unwrap();
        engine.enable_strict_invariants();
        engine.run();
    }

    #[test]
    fn test_apply_overrides_between_ticks() {
        let mut engine = SimulationEngine::new(quick_config()).unwrap();
        engine.step();
        let overrides = ConfigOverrides { tax_rate: Some(0.2), ..ConfigOverrides::default() };
        engine.apply_config_overrides(&overrides);
        assert_eq!(engine.config().tax_rate, 0.2);
        engine.step();
    }
}
