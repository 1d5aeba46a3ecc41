//! Invariant checking framework for simulation validation.
//!
//! Invariants are conditions that must hold in every committed world;
//! a violation is a bug in a stage, not a runtime condition, so strict
//! runs panic with the offending entity and tick.

use crate::config::SimulationConfig;
use crate::market::price_band;
use crate::ship::ShipLocation;
use crate::world::WorldState;
use std::fmt;

/// A single failed check, with enough context to debug the offending tick.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Which invariant tripped.
    pub invariant_name: String,
    /// What went wrong, naming the entity involved.
    pub description: String,
    /// Tick of the committed world that failed the check.
    pub tick: u64,
    /// Value the check demanded, where the check has one.
    pub expected: Option<String>,
    /// Value the world actually held.
    pub actual: Option<String>,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tick {}: invariant '{}' broken: {}",
            self.tick, self.invariant_name, self.description
        )?;
        match (&self.expected, &self.actual) {
            (Some(expected), Some(actual)) => {
                write!(f, " (expected {}, got {})", expected, actual)
            }
            _ => Ok(()),
        }
    }
}

impl std::error::Error for InvariantViolation {}

fn violation(name: &str, world: &WorldState, description: String) -> InvariantViolation {
    InvariantViolation {
        invariant_name: name.to_string(),
        description,
        tick: world.tick,
        expected: None,
        actual: None,
    }
}

/// A condition every committed world must satisfy.
///
/// Checks run against whole worlds rather than individual stages, so a
/// violation points at the first tick whose composed result broke the
/// rule, not at the stage that caused it.
pub trait Invariant: Send + Sync {
    /// Short identifier used in violation reports and logs.
    fn name(&self) -> &str;

    /// Checks the invariant, returning the violation if any.
    fn check(
        &self,
        world: &WorldState,
        config: &SimulationConfig,
    ) -> Result<(), InvariantViolation>;
}

/// Currency is conserved up to the configured sinks: ship cash plus agent
/// cash plus treasuries plus everything destroyed (tax, transport, wages,
/// repairs, sunk hulls) equals the baseline total.
#[derive(Debug, Clone)]
pub struct CurrencyConservationInvariant {
    baseline_total: f64,
    tolerance: f64,
}

impl CurrencyConservationInvariant {
    /// Baseline taken from a world snapshot: circulating plus already
    /// destroyed currency at that point.
    pub fn from_world(world: &WorldState) -> Self {
        let baseline_total = world.circulating_currency() + world.destroyed_currency();
        let tolerance = (baseline_total * 1e-6).max(0.01);
        Self { baseline_total, tolerance }
    }
}

impl Invariant for CurrencyConservationInvariant {
    fn name(&self) -> &str {
        "CurrencyConservation"
    }

    fn check(
        &self,
        world: &WorldState,
        _config: &SimulationConfig,
    ) -> Result<(), InvariantViolation> {
        let current = world.circulating_currency() + world.destroyed_currency();
        if (current - self.baseline_total).abs() > self.tolerance {
            return Err(InvariantViolation {
                invariant_name: self.name().to_string(),
                description: "currency leaked outside the configured sinks".to_string(),
                tick: world.tick,
                expected: Some(format!("{:.4}", self.baseline_total)),
                actual: Some(format!("{:.4}", current)),
            });
        }
        Ok(())
    }
}

/// Inventories, cargo, cash, treasuries, and ecosystem stocks never go
/// negative.
#[derive(Debug, Clone, Default)]
pub struct NonNegativityInvariant;

impl Invariant for NonNegativityInvariant {
    fn name(&self) -> &str {
        "NonNegativity"
    }

    fn check(
        &self,
        world: &WorldState,
        _config: &SimulationConfig,
    ) -> Result<(), InvariantViolation> {
        for (id, island) in &world.islands {
            for (good, quantity) in &island.inventory {
                if *quantity < 0.0 {
                    return Err(violation(
                        self.name(),
                        world,
                        format!("island {} has negative {} inventory: {}", id, good, quantity),
                    ));
                }
            }
            if island.ecosystem.fish_stock < 0.0 || island.ecosystem.forest_biomass < 0.0 {
                return Err(violation(
                    self.name(),
                    world,
                    format!("island {} has a negative ecosystem stock", id),
                ));
            }
            if let Some(treasury) = &island.treasury {
                if treasury.balance < 0.0 {
                    return Err(violation(
                        self.name(),
                        world,
                        format!("island {} treasury is negative: {}", id, treasury.balance),
                    ));
                }
            }
            if island.population.size < 0.0 {
                return Err(violation(
                    self.name(),
                    world,
                    format!("island {} population is negative", id),
                ));
            }
        }
        for (id, ship) in &world.ships {
            if ship.cash < 0.0 {
                return Err(violation(
                    self.name(),
                    world,
                    format!("ship {} has negative cash: {}", id, ship.cash),
                ));
            }
            for (good, quantity) in &ship.cargo {
                if *quantity < 0.0 {
                    return Err(violation(
                        self.name(),
                        world,
                        format!("ship {} has negative {} cargo: {}", id, good, quantity),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Health, morale, condition, soil fertility, and voyage progress stay in
/// [0, 1]; labor shares sum to one.
#[derive(Debug, Clone, Default)]
pub struct BoundedRatiosInvariant;

impl Invariant for BoundedRatiosInvariant {
    fn name(&self) -> &str {
        "BoundedRatios"
    }

    fn check(
        &self,
        world: &WorldState,
        _config: &SimulationConfig,
    ) -> Result<(), InvariantViolation> {
        let unit = 0.0..=1.0;
        for (id, island) in &world.islands {
            if !unit.contains(&island.population.health) {
                return Err(violation(
                    self.name(),
                    world,
                    format!("island {} health out of range: {}", id, island.population.health),
                ));
            }
            if !unit.contains(&island.ecosystem.soil_fertility) {
                return Err(violation(
                    self.name(),
                    world,
                    format!("island {} soil fertility out of range", id),
                ));
            }
            let share_sum: f64 = island.population.labor_shares.values().sum();
            if (share_sum - 1.0).abs() > 1e-6 {
                return Err(InvariantViolation {
                    invariant_name: self.name().to_string(),
                    description: format!("island {} labor shares do not sum to 1", id),
                    tick: world.tick,
                    expected: Some("1.0".to_string()),
                    actual: Some(format!("{}", share_sum)),
                });
            }
        }
        for (id, ship) in &world.ships {
            if !unit.contains(&ship.condition) {
                return Err(violation(
                    self.name(),
                    world,
                    format!("ship {} condition out of range: {}", id, ship.condition),
                ));
            }
            if !unit.contains(&ship.crew.morale) {
                return Err(violation(
                    self.name(),
                    world,
                    format!("ship {} morale out of range: {}", id, ship.crew.morale),
                ));
            }
            if let ShipLocation::AtSea { route, .. } = &ship.location {
                if !(0.0..=1.0).contains(&route.progress) {
                    return Err(violation(
                        self.name(),
                        world,
                        format!("ship {} voyage progress out of range: {}", id, route.progress),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Every quoted price stays inside its configured band.
#[derive(Debug, Clone, Default)]
pub struct PriceBandInvariant;

impl Invariant for PriceBandInvariant {
    fn name(&self) -> &str {
        "PriceBand"
    }

    fn check(
        &self,
        world: &WorldState,
        config: &SimulationConfig,
    ) -> Result<(), InvariantViolation> {
        for (id, island) in &world.islands {
            for (good, price) in &island.market.prices {
                let Some(definition) = world.goods.get(good) else { continue };
                let (floor, ceiling) = price_band(definition, &config.market);
                if *price < floor - 1e-9 || *price > ceiling + 1e-9 {
                    return Err(InvariantViolation {
                        invariant_name: self.name().to_string(),
                        description: format!("island {} price of {} outside band", id, good),
                        tick: world.tick,
                        expected: Some(format!("[{:.3}, {:.3}]", floor, ceiling)),
                        actual: Some(format!("{:.3}", price)),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Market depth never drops below the configured floor.
#[derive(Debug, Clone, Default)]
pub struct DepthFloorInvariant;

impl Invariant for DepthFloorInvariant {
    fn name(&self) -> &str {
        "DepthFloor"
    }

    fn check(
        &self,
        world: &WorldState,
        config: &SimulationConfig,
    ) -> Result<(), InvariantViolation> {
        for (id, island) in &world.islands {
            for (good, depth) in
                island.market.buy_depth.iter().chain(island.market.sell_depth.iter())
            {
                if *depth < config.depth.min_depth - 1e-9 {
                    return Err(InvariantViolation {
                        invariant_name: self.name().to_string(),
                        description: format!("island {} depth for {} below floor", id, good),
                        tick: world.tick,
                        expected: Some(format!(">= {}", config.depth.min_depth)),
                        actual: Some(format!("{}", depth)),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Runs a set of invariants against each committed world.
pub struct InvariantChecker {
    invariants: Vec<Box<dyn Invariant>>,
}

impl InvariantChecker {
    pub fn new(invariants: Vec<Box<dyn Invariant>>) -> Self {
        InvariantChecker { invariants }
    }

    /// The standard set, with the conservation baseline taken from `world`.
    pub fn standard(world: &WorldState) -> Self {
        InvariantChecker {
            invariants: vec![
                Box::new(CurrencyConservationInvariant::from_world(world)),
                Box::new(NonNegativityInvariant),
                Box::new(BoundedRatiosInvariant),
                Box::new(PriceBandInvariant),
                Box::new(DepthFloorInvariant),
            ],
        }
    }

    /// Collects all violations without interrupting the run.
    pub fn check_all(
        &self,
        world: &WorldState,
        config: &SimulationConfig,
    ) -> Vec<InvariantViolation> {
        self.invariants
            .iter()
            .filter_map(|inv| inv.check(world, config).err())
            .collect()
    }

    /// Panics on the first violation. A violated invariant is a bug in a
    /// stage, never a recoverable runtime condition.
    pub fn enforce(&self, world: &WorldState, config: &SimulationConfig) {
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(world, config) {
                panic!("{}", violation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goods::GoodId;
    use crate::world::initialize_world;

    fn setup() -> (SimulationConfig, WorldState) {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        (config, world)
    }

    #[test]
    fn test_fresh_world_passes_standard_set() {
        let (config, world) = setup();
        let checker = InvariantChecker::standard(&world);
        assert!(checker.check_all(&world, &config).is_empty());
    }

    #[test]
    fn test_negative_inventory_detected() {
        let (config, mut world) = setup();
        let id = world.island_ids()[0].clone();
        world.islands.get_mut(&id).unwrap().inventory.insert(GoodId::Grain, -5.0);
        let result = NonNegativityInvariant.check(&world, &config);
        let violation = result.unwrap_err();
        assert!(violation.description.contains(&id));
    }

    #[test]
    fn test_currency_leak_detected() {
        let (config, mut world) = setup();
        let checker = CurrencyConservationInvariant::from_world(&world);
        let ship_id = world.ship_ids()[0].clone();
        world.ships.get_mut(&ship_id).unwrap().cash += 1000.0;
        assert!(checker.check(&world, &config).is_err());
    }

    #[test]
    fn test_sinks_do_not_break_conservation() {
        let (config, mut world) = setup();
        let checker = CurrencyConservationInvariant::from_world(&world);
        // Move 50 coin from a ship into the wage sink: still conserved.
        let ship_id = world.ship_ids()[0].clone();
        world.ships.get_mut(&ship_id).unwrap().cash -= 50.0;
        world.metrics.wages_destroyed += 50.0;
        assert!(checker.check(&world, &config).is_ok());
    }

    #[test]
    fn test_labor_share_drift_detected() {
        let (config, mut world) = setup();
        let id = world.island_ids()[0].clone();
        world
            .islands
            .get_mut(&id)
            .unwrap()
            .population
            .labor_shares
            .insert(crate::goods::LaborSector::Farming, 0.9);
        assert!(BoundedRatiosInvariant.check(&world, &config).is_err());
    }

    #[test]
    fn test_price_band_violation_detected() {
        let (config, mut world) = setup();
        let id = world.island_ids()[0].clone();
        world
            .islands
            .get_mut(&id)
            .unwrap()
            .market
            .prices
            .insert(GoodId::Grain, 100_000.0);
        assert!(PriceBandInvariant.check(&world, &config).is_err());
    }

    #[test]
    fn test_depth_floor_violation_detected() {
        let (config, mut world) = setup();
        let id = world.island_ids()[0].clone();
        world
            .islands
            .get_mut(&id)
            .unwrap()
            .market
            .buy_depth
            .insert(GoodId::Grain, 0.1);
        assert!(DepthFloorInvariant.check(&world, &config).is_err());
    }

    #[test]
    fn test_violation_display_includes_tick() {
        let violation = InvariantViolation {
            invariant_name: "Test".to_string(),
            description: "broke".to_string(),
            tick: 7,
            expected: Some("1".to_string()),
            actual: Some("2".to_string()),
        };
        let text = violation.to_string();
        assert!(text.contains("tick 7"));
        assert!(text.contains("expected 1"));
        assert!(text.contains("got 2"));
    }
}
