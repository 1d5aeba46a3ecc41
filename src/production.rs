//! Per-good production from labor, ecosystem yield, tools, health, events,
//! and supply shocks.

use crate::config::{EcologyConfig, PopulationConfig, ProductionConfig};
use crate::ecology::{yield_multiplier, HarvestAmounts};
use crate::events::EventModifiers;
use crate::goods::{GoodId, LaborSector};
use crate::island::{BuildingKind, IslandState};
use crate::rng::SeededRng;
use rand::RngExt;
use rand_distr::{Distribution, LogNormal};
use std::collections::BTreeMap;

/// What one island produced this tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductionOutcome {
    /// Realized output added to inventory, per good.
    pub outputs: BTreeMap<GoodId, f64>,
    /// Biomass extracted, for the ecology stage.
    pub harvests: HarvestAmounts,
    /// Goods whose desired output was capped by sustainable harvest.
    pub shortfalls: BTreeMap<GoodId, bool>,
}

fn labor_modifier(
    island: &IslandState,
    good: GoodId,
    population: &PopulationConfig,
    alpha: f64,
) -> f64 {
    let sector = good.sector();
    let share = island.population.labor_share(sector);
    let reference = population.base_shares.get(&sector).copied().unwrap_or(0.2);
    if reference <= 0.0 {
        return 0.0;
    }
    (share / reference).powf(alpha).min(2.0)
}

fn ecosystem_modifier(island: &IslandState, good: GoodId) -> f64 {
    let sensitivity =
        island.production.ecosystem_sensitivity.get(&good).copied().unwrap_or(0.0);
    let ratio = match good {
        GoodId::Fish => island.ecosystem.fish_ratio(&island.ecosystem_params),
        GoodId::Timber => island.ecosystem.forest_ratio(&island.ecosystem_params),
        GoodId::Grain => island.ecosystem.soil_fertility,
        GoodId::Tools | GoodId::Luxuries => return 1.0,
    };
    0.05 + 0.95 * (ratio * sensitivity).min(1.0)
}

fn tool_modifier(
    island: &IslandState,
    config: &ProductionConfig,
    tool_boost: f64,
) -> f64 {
    let population = island.population.size.max(1.0);
    let tools = island.inventory_of(GoodId::Tools);
    let base =
        1.0 + config.tool_beta * (1.0 + tools * island.production.tool_sensitivity / population).ln();
    base * (1.0 + tool_boost)
}

fn event_modifier(good: GoodId, modifiers: &EventModifiers) -> f64 {
    match good {
        GoodId::Grain => modifiers.grain_production_multiplier,
        _ => 1.0,
    }
}

fn building_modifier(island: &IslandState, good: GoodId, workshop_bonus: f64) -> f64 {
    if good == GoodId::Tools {
        1.0 + workshop_bonus * island.building_level(BuildingKind::Workshop)
    } else {
        1.0
    }
}

fn shock_modifier(island: &IslandState, good: GoodId) -> f64 {
    island.production_shocks.get(&good).map(|s| s.multiplier).unwrap_or(1.0)
}

/// Runs production for one island, incrementing its inventory and returning
/// the realized outputs plus the implied biomass harvests.
#[allow(clippy::too_many_arguments)]
pub fn produce(
    island: &mut IslandState,
    modifiers: &EventModifiers,
    production: &ProductionConfig,
    population_cfg: &PopulationConfig,
    ecology: &EcologyConfig,
    workshop_bonus: f64,
    rng: &mut SeededRng,
    dt: f64,
) -> ProductionOutcome {
    let mut outcome = ProductionOutcome::default();
    let health_mod = 0.2 + 0.8 * island.population.health;
    let tool_mod = tool_modifier(island, production, modifiers.tool_efficiency_boost);

    for good in GoodId::all() {
        let base_rate = island.production.base_rates.get(&good).copied().unwrap_or(0.0);
        if base_rate <= 0.0 {
            continue;
        }
        let mut desired = base_rate
            * labor_modifier(island, good, population_cfg, production.labour_alpha)
            * ecosystem_modifier(island, good)
            * tool_mod
            * health_mod
            * event_modifier(good, modifiers)
            * building_modifier(island, good, workshop_bonus)
            * shock_modifier(island, good)
            * dt;

        if let Some(sigma) = production.supply_volatility {
            if sigma > 0.0 {
                // Mean-one log-normal noise on top of the deterministic output.
                let noise = LogNormal::new(-sigma * sigma / 2.0, sigma)
                    .map(|dist| dist.sample(rng))
                    .unwrap_or(1.0);
                desired *= noise;
            } else {
                // Keep the draw count stable so toggling volatility to zero
                // still consumes the same RNG stream.
                let _: f64 = rng.random_range(0.0..1.0);
            }
        }

        let actual = if good.is_extractive() {
            let (stock, ratio) = match good {
                GoodId::Fish => (
                    island.ecosystem.fish_stock,
                    island.ecosystem.fish_ratio(&island.ecosystem_params),
                ),
                _ => (
                    island.ecosystem.forest_biomass,
                    island.ecosystem.forest_ratio(&island.ecosystem_params),
                ),
            };
            let sustainable = stock * yield_multiplier(ratio, ecology) * 0.1 * dt;
            let capped = desired.min(sustainable).max(0.0);
            outcome.shortfalls.insert(good, desired > sustainable + 1e-12);
            let harvest = capped / ecology.harvest_efficiency;
            match good {
                GoodId::Fish => outcome.harvests.fish += harvest,
                _ => outcome.harvests.timber += harvest,
            }
            capped
        } else {
            desired.max(0.0)
        };

        island.add_inventory(good, actual);
        outcome.outputs.insert(good, actual);
    }
    outcome
}
