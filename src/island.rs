//! Island state: the persistent trading locales of the archipelago.
//!
//! An island owns its ecosystem, population, inventory, local market and
//! treasury. All per-good maps are `BTreeMap` keyed by [`GoodId`] so state
//! hashing and iteration stay deterministic.

use crate::events::ProductionShock;
use crate::goods::{GoodId, LaborSector};
use crate::hash::StateHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type alias for island identifiers (readable slugs, e.g. "shoalhold").
pub type IslandId = String;

/// 2-D position in world units. Distances are straight-line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Linear interpolation toward `other` by fraction `t` in [0, 1].
    pub fn lerp(&self, other: &Position, t: f64) -> Position {
        let t = t.clamp(0.0, 1.0);
        Position { x: self.x + (other.x - self.x) * t, y: self.y + (other.y - self.y) * t }
    }
}

/// The living stocks an island's extractive production draws down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcosystemState {
    pub fish_stock: f64,
    pub forest_biomass: f64,
    /// Soil fertility in [0, 1].
    pub soil_fertility: f64,
}

/// Fixed carrying capacities for an island's ecosystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcosystemParams {
    pub fish_capacity: f64,
    pub forest_capacity: f64,
}

impl EcosystemState {
    pub fn fish_ratio(&self, params: &EcosystemParams) -> f64 {
        if params.fish_capacity <= 0.0 {
            0.0
        } else {
            self.fish_stock / params.fish_capacity
        }
    }

    pub fn forest_ratio(&self, params: &EcosystemParams) -> f64 {
        if params.forest_capacity <= 0.0 {
            0.0
        } else {
            self.forest_biomass / params.forest_capacity
        }
    }
}

/// Continuous population with health and a labor split across sectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationState {
    pub size: f64,
    /// Health in [0, 1]; drives production, growth, and consumption.
    pub health: f64,
    /// Shares per sector, each within configured bounds, summing to 1.
    pub labor_shares: BTreeMap<LaborSector, f64>,
}

impl PopulationState {
    pub fn labor_share(&self, sector: LaborSector) -> f64 {
        self.labor_shares.get(&sector).copied().unwrap_or(0.0)
    }
}

/// Kinds of buildings an island can host.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    /// Blends quoted prices toward base price (stabilization).
    Market,
    /// Boosts tool production.
    Workshop,
    /// Reduces spoilage for docked ships.
    Warehouse,
}

impl BuildingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildingKind::Market => "market",
            BuildingKind::Workshop => "workshop",
            BuildingKind::Warehouse => "warehouse",
        }
    }
}

/// A standing building. Effects scale with `level * condition`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Building {
    pub kind: BuildingKind,
    pub level: u32,
    /// Structural condition in [0, 1]; decays each tick.
    pub condition: f64,
}

impl Building {
    pub fn effective_level(&self) -> f64 {
        self.level as f64 * self.condition
    }
}

/// Island treasury with per-tick flow tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treasury {
    pub balance: f64,
    pub income_this_tick: f64,
    pub expenses_this_tick: f64,
    pub total_exports: f64,
    pub total_imports: f64,
}

impl Treasury {
    pub fn new(balance: f64) -> Self {
        Treasury {
            balance,
            income_this_tick: 0.0,
            expenses_this_tick: 0.0,
            total_exports: 0.0,
            total_imports: 0.0,
        }
    }

    /// Clears the per-tick flow counters at the start of a tick.
    pub fn begin_tick(&mut self) {
        self.income_this_tick = 0.0;
        self.expenses_this_tick = 0.0;
    }
}

/// Local market state: prices, liquidity, and consumption tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub prices: BTreeMap<GoodId, f64>,
    pub ideal_stocks: BTreeMap<GoodId, f64>,
    /// Last tick's price change per good (observability only).
    pub momentum: BTreeMap<GoodId, f64>,
    /// EMA of per-tick consumption per good.
    pub consumption_velocity: BTreeMap<GoodId, f64>,
    /// Expected per-tick consumption used to normalize velocity.
    pub reference_consumption: BTreeMap<GoodId, f64>,
    pub buy_depth: BTreeMap<GoodId, f64>,
    pub sell_depth: BTreeMap<GoodId, f64>,
}

impl MarketState {
    pub fn price(&self, good: GoodId) -> f64 {
        self.prices.get(&good).copied().unwrap_or(0.0)
    }

    pub fn ideal_stock(&self, good: GoodId) -> f64 {
        self.ideal_stocks.get(&good).copied().unwrap_or(0.0)
    }
}

/// Per-island production tuning. Initialized from the global config with
/// island-specific specialization multipliers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionParams {
    pub base_rates: BTreeMap<GoodId, f64>,
    pub tool_sensitivity: f64,
    pub ecosystem_sensitivity: BTreeMap<GoodId, f64>,
}

/// A persistent trading locale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandState {
    pub id: IslandId,
    pub name: String,
    pub position: Position,
    pub ecosystem: EcosystemState,
    pub ecosystem_params: EcosystemParams,
    pub population: PopulationState,
    pub inventory: BTreeMap<GoodId, f64>,
    pub market: MarketState,
    pub production: ProductionParams,
    pub buildings: BTreeMap<BuildingKind, Building>,
    /// None means the island trades without budget constraints.
    pub treasury: Option<Treasury>,
    /// Sparse boom/bust table; entries expire by tick.
    pub production_shocks: BTreeMap<GoodId, ProductionShock>,
    /// Set by discovery events; observable by agents.
    pub discovered: bool,
}

impl IslandState {
    pub fn inventory_of(&self, good: GoodId) -> f64 {
        self.inventory.get(&good).copied().unwrap_or(0.0)
    }

    pub fn add_inventory(&mut self, good: GoodId, amount: f64) {
        let entry = self.inventory.entry(good).or_insert(0.0);
        *entry = (*entry + amount).max(0.0);
    }

    /// Effective level of a building kind, zero if absent.
    pub fn building_level(&self, kind: BuildingKind) -> f64 {
        self.buildings.get(&kind).map(|b| b.effective_level()).unwrap_or(0.0)
    }

    /// The currency an island will spend on imports in one transaction.
    pub fn import_budget(&self, max_spend_ratio: f64) -> Option<f64> {
        self.treasury.as_ref().map(|t| t.balance * max_spend_ratio)
    }

    /// Feeds this island's canonical fields into the state hasher.
    /// Field order is fixed; maps iterate sorted by key.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.write_str(&self.id);
        hasher.write_f64(self.position.x);
        hasher.write_f64(self.position.y);
        hasher.write_f64(self.ecosystem.fish_stock);
        hasher.write_f64(self.ecosystem.forest_biomass);
        hasher.write_f64(self.ecosystem.soil_fertility);
        hasher.write_f64(self.population.size);
        hasher.write_f64(self.population.health);
        for (sector, share) in &self.population.labor_shares {
            hasher.write_str(sector.as_str());
            hasher.write_f64(*share);
        }
        for (good, quantity) in &self.inventory {
            hasher.write_str(good.as_str());
            hasher.write_f64(*quantity);
        }
        for (good, price) in &self.market.prices {
            hasher.write_str(good.as_str());
            hasher.write_f64(*price);
        }
        for (good, depth) in &self.market.buy_depth {
            hasher.write_str(good.as_str());
            hasher.write_f64(*depth);
        }
        for (good, depth) in &self.market.sell_depth {
            hasher.write_str(good.as_str());
            hasher.write_f64(*depth);
        }
        match &self.treasury {
            Some(t) => {
                hasher.write_bool(true);
                hasher.write_f64(t.balance);
                hasher.write_f64(t.total_exports);
                hasher.write_f64(t.total_imports);
            }
            None => hasher.write_bool(false),
        }
        for (kind, building) in &self.buildings {
            hasher.write_str(kind.as_str());
            hasher.write_u64(building.level as u64);
            hasher.write_f64(building.condition);
        }
        for (good, shock) in &self.production_shocks {
            hasher.write_str(good.as_str());
            hasher.write_f64(shock.multiplier);
            hasher.write_u64(shock.ticks_remaining);
        }
        hasher.write_bool(self.discovered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_distance() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(3.0, 4.0);
        assert!((a.distance_to(&b) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_position_lerp_clamps() {
        let a = Position::new(0.0, 0.0);
        let b = Position::new(10.0, 0.0);
        assert_eq!(a.lerp(&b, 0.5).x, 5.0);
        assert_eq!(a.lerp(&b, 1.5).x, 10.0);
        assert_eq!(a.lerp(&b, -0.5).x, 0.0);
    }

    #[test]
    fn test_ecosystem_ratios() {
        let eco = EcosystemState { fish_stock: 500.0, forest_biomass: 250.0, soil_fertility: 0.8 };
        let params = EcosystemParams { fish_capacity: 1000.0, forest_capacity: 1000.0 };
        assert!((eco.fish_ratio(&params) - 0.5).abs() < 1e-12);
        assert!((eco.forest_ratio(&params) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_ecosystem_ratio_zero_capacity() {
        let eco = EcosystemState { fish_stock: 10.0, forest_biomass: 10.0, soil_fertility: 0.5 };
        let params = EcosystemParams { fish_capacity: 0.0, forest_capacity: 0.0 };
        assert_eq!(eco.fish_ratio(&params), 0.0);
    }

    #[test]
    fn test_building_effective_level() {
        let building = Building { kind: BuildingKind::Market, level: 2, condition: 0.5 };
        assert!((building.effective_level() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_treasury_begin_tick_resets_flows() {
        let mut treasury = Treasury::new(100.0);
        treasury.income_this_tick = 5.0;
        treasury.expenses_this_tick = 3.0;
        treasury.begin_tick();
        assert_eq!(treasury.income_this_tick, 0.0);
        assert_eq!(treasury.expenses_this_tick, 0.0);
        assert_eq!(treasury.balance, 100.0);
    }

    #[test]
    fn test_add_inventory_floors_at_zero() {
        let mut island = test_island();
        island.add_inventory(GoodId::Grain, 10.0);
        island.add_inventory(GoodId::Grain, -25.0);
        assert_eq!(island.inventory_of(GoodId::Grain), 0.0);
    }

    fn test_island() -> IslandState {
        IslandState {
            id: "testholm".to_string(),
            name: "Testholm".to_string(),
            position: Position::new(0.0, 0.0),
            ecosystem: EcosystemState {
                fish_stock: 900.0,
                forest_biomass: 700.0,
                soil_fertility: 0.8,
            },
            ecosystem_params: EcosystemParams { fish_capacity: 1000.0, forest_capacity: 800.0 },
            population: PopulationState {
                size: 500.0,
                health: 0.8,
                labor_shares: BTreeMap::new(),
            },
            inventory: BTreeMap::new(),
            market: MarketState {
                prices: BTreeMap::new(),
                ideal_stocks: BTreeMap::new(),
                momentum: BTreeMap::new(),
                consumption_velocity: BTreeMap::new(),
                reference_consumption: BTreeMap::new(),
                buy_depth: BTreeMap::new(),
                sell_depth: BTreeMap::new(),
            },
            production: ProductionParams {
                base_rates: BTreeMap::new(),
                tool_sensitivity: 1.0,
                ecosystem_sensitivity: BTreeMap::new(),
            },
            buildings: BTreeMap::new(),
            treasury: Some(Treasury::new(1000.0)),
            production_shocks: BTreeMap::new(),
            discovered: true,
        }
    }

    #[test]
    fn test_import_budget() {
        let island = test_island();
        assert_eq!(island.import_budget(0.1), Some(100.0));
        let mut no_treasury = test_island();
        no_treasury.treasury = None;
        assert_eq!(no_treasury.import_budget(0.1), None);
    }

    #[test]
    fn test_hash_changes_with_inventory() {
        let island_a = {
            let mut i = test_island();
            i.add_inventory(GoodId::Grain, 10.0);
            i
        };
        let island_b = {
            let mut i = test_island();
            i.add_inventory(GoodId::Grain, 11.0);
            i
        };
        let mut ha = StateHasher::new();
        island_a.hash_into(&mut ha);
        let mut hb = StateHasher::new();
        island_b.hash_into(&mut hb);
        assert_ne!(ha.finish(), hb.finish());
    }
}
