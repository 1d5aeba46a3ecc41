//! Population dynamics: health, growth and decline, and wage-driven labor
//! reallocation.

use crate::config::{PopulationConfig, ProductionConfig};
use crate::consumption::ConsumptionOutcome;
use crate::goods::LaborSector;
use crate::island::IslandState;
use std::collections::BTreeMap;

const HOURS_PER_YEAR: f64 = 24.0 * 365.0;

/// Updates health from the tick's consumption outcome, then compounds the
/// population size by the health-driven growth rate.
pub fn update_population(
    island: &mut IslandState,
    consumption: &ConsumptionOutcome,
    config: &PopulationConfig,
    luxury_per_capita: f64,
    dt: f64,
) {
    let mut delta = 0.0;
    if consumption.food_needed > 0.0 {
        let relative_deficit = consumption.food_deficit / consumption.food_needed;
        delta -= config.health_penalty_rate * relative_deficit * dt;
        if consumption.food_consumed <= 0.0 {
            delta -= config.starvation_penalty * dt;
        }
    }
    if consumption.food_deficit <= 0.0 && island.population.health < 1.0 {
        delta += config.health_recovery_rate * dt;
    }
    if consumption.luxury_consumed > 0.0 && island.population.size > 0.0 {
        let satisfaction = (consumption.luxury_consumed
            / (island.population.size * luxury_per_capita * dt).max(1e-9))
        .min(1.0);
        delta += config.luxury_health_bonus * satisfaction * dt;
    }
    island.population.health = (island.population.health + delta).clamp(0.0, 1.0);

    let multiplier = growth_multiplier(island.population.health, config);
    let annual_rate = if multiplier >= 0.0 {
        multiplier * config.max_growth_rate
    } else {
        multiplier * config.max_decline_rate
    };
    let per_tick = (1.0 + annual_rate).powf(dt / HOURS_PER_YEAR);
    island.population.size = (island.population.size * per_tick).max(0.0);
}

/// Piecewise-linear growth multiplier in [-1, 1] over health.
///
/// Full decline at or below the crisis threshold, easing to zero at the
/// decline threshold, flat through the stable band, rising to full growth
/// at the optimal threshold.
pub fn growth_multiplier(health: f64, config: &PopulationConfig) -> f64 {
    if health <= config.crisis_health_threshold {
        -1.0
    } else if health < config.population_decline_threshold {
        let t = (health - config.crisis_health_threshold)
            / (config.population_decline_threshold - config.crisis_health_threshold);
        -1.0 + t
    } else if health < config.stable_health_threshold {
        0.0
    } else if health < config.optimal_health_threshold {
        (health - config.stable_health_threshold)
            / (config.optimal_health_threshold - config.stable_health_threshold)
    } else {
        1.0
    }
}

/// Implied hourly wage per worker in each sector at current prices.
fn sector_wages(
    island: &IslandState,
    config: &PopulationConfig,
    production: &ProductionConfig,
) -> BTreeMap<LaborSector, f64> {
    let population = island.population.size.max(1.0);
    let price_sum: f64 = island.market.prices.values().sum();
    let avg_price = price_sum / island.market.prices.len().max(1) as f64;

    let mut wages = BTreeMap::new();
    for sector in LaborSector::all() {
        let wage = if sector == LaborSector::Services {
            avg_price * (0.5 + 0.5 * island.population.health)
        } else {
            let effective_labor = (island.population.labor_share(sector) * population).max(1e-6);
            sector
                .goods()
                .iter()
                .map(|good| {
                    let price = island.market.price(*good);
                    let base_rate =
                        island.production.base_rates.get(good).copied().unwrap_or(0.0);
                    price * production.labour_alpha * base_rate / effective_labor
                })
                .sum::<f64>()
        };
        wages.insert(sector, wage.max(1e-9));
    }
    wages
}

/// Moves labor shares toward wage-implied targets, bounded per tick.
///
/// Targets are `base_share * (wage / avg_wage)^responsiveness`, clamped to
/// the configured band and renormalized until they sum to one.
pub fn reallocate_labor(
    island: &mut IslandState,
    config: &PopulationConfig,
    production: &ProductionConfig,
    dt: f64,
) {
    let wages = sector_wages(island, config, production);
    let total_share: f64 = island.population.labor_shares.values().sum();
    if total_share <= 0.0 {
        return;
    }
    let avg_wage: f64 = LaborSector::all()
        .iter()
        .map(|s| island.population.labor_share(*s) / total_share * wages[s])
        .sum();
    if avg_wage <= 0.0 {
        return;
    }

    // Raw wage-driven targets.
    let mut targets = BTreeMap::new();
    for sector in LaborSector::all() {
        let base = config.base_shares.get(&sector).copied().unwrap_or(0.2);
        let target = base * (wages[&sector] / avg_wage).powf(config.wage_responsiveness);
        targets.insert(sector, target);
    }

    // Clamp-and-redistribute until the shares sum to one.
    for _ in 0..8 {
        let sum: f64 = targets.values().sum();
        if (sum - 1.0).abs() < 1e-9 {
            break;
        }
        for target in targets.values_mut() {
            *target = (*target / sum).clamp(config.min_sector_share, config.max_sector_share);
        }
    }
    let sum: f64 = targets.values().sum();
    for target in targets.values_mut() {
        *target /= sum;
    }

    // Bounded move toward targets, then renormalize residual drift.
    let max_step = config.reallocation_rate * dt;
    for sector in LaborSector::all() {
        let current = island.population.labor_share(sector);
        let step = (targets[&sector] - current).clamp(-max_step, max_step);
        island
            .population
            .labor_shares
            .insert(sector, (current + step).clamp(config.min_sector_share, config.max_sector_share));
    }
    let sum: f64 = island.population.labor_shares.values().sum();
    if sum > 0.0 {
        for share in island.population.labor_shares.values_mut() {
            *share /= sum;
        }
    }
}
