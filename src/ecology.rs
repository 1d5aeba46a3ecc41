//! Ecological feedback: regeneration with hysteresis, soil dynamics, the
//! yield curve, and fish migration.
//!
//! The central asymmetry: damaged stocks regenerate more slowly than
//! healthy ones degrade. A fishery pushed below the critical band does not
//! bounce back when fishing stops; it crawls back through the impaired and
//! collapsed recovery multipliers.

use crate::config::EcologyConfig;
use crate::events::EventModifiers;
use crate::island::{IslandId, IslandState};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Hysteresis band of a resource, classified by stock ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceBand {
    Healthy,
    Stressed,
    Degraded,
    Collapsed,
    Dead,
}

/// Classifies a stock ratio into its hysteresis band.
pub fn classify_band(ratio: f64, config: &EcologyConfig) -> ResourceBand {
    if ratio >= config.healthy_threshold {
        ResourceBand::Healthy
    } else if ratio >= config.critical_threshold {
        ResourceBand::Stressed
    } else if ratio >= config.collapse_threshold {
        ResourceBand::Degraded
    } else if ratio >= config.dead_threshold {
        ResourceBand::Collapsed
    } else {
        ResourceBand::Dead
    }
}

/// Multiplier on the logistic growth term for a band. `None` means the
/// stock is dead and regrows only at the flat `dead_recovery_rate`.
fn recovery_multiplier(band: ResourceBand, config: &EcologyConfig) -> Option<f64> {
    match band {
        ResourceBand::Healthy | ResourceBand::Stressed => Some(1.0),
        ResourceBand::Degraded => Some(config.impaired_recovery_multiplier),
        ResourceBand::Collapsed => Some(config.collapsed_recovery_multiplier),
        ResourceBand::Dead => None,
    }
}

/// Stock-ratio-driven cap on extractive production.
///
/// Zero below the dead threshold, linear up to `collapse_floor` at the
/// collapse threshold, quadratic up to `critical_yield` at the critical
/// threshold, then linear to 1.0 at the healthy threshold.
pub fn yield_multiplier(ratio: f64, config: &EcologyConfig) -> f64 {
    if ratio < config.dead_threshold {
        0.0
    } else if ratio < config.collapse_threshold {
        let t = (ratio - config.dead_threshold)
            / (config.collapse_threshold - config.dead_threshold);
        t * config.collapse_floor
    } else if ratio < config.critical_threshold {
        let t = (ratio - config.collapse_threshold)
            / (config.critical_threshold - config.collapse_threshold);
        config.collapse_floor + (config.critical_yield - config.collapse_floor) * t * t
    } else if ratio < config.healthy_threshold {
        let t = (ratio - config.critical_threshold)
            / (config.healthy_threshold - config.critical_threshold);
        config.critical_yield + (1.0 - config.critical_yield) * t
    } else {
        1.0
    }
}

/// Advances one stock through its logistic update with hysteresis.
fn regenerate_stock(
    stock: f64,
    capacity: f64,
    regen_rate: f64,
    harvest: f64,
    config: &EcologyConfig,
    dt: f64,
) -> f64 {
    if capacity <= 0.0 {
        return 0.0;
    }
    let ratio = stock / capacity;
    let growth = match recovery_multiplier(classify_band(ratio, config), config) {
        Some(mult) => regen_rate * stock * (1.0 - stock / capacity) * mult,
        None => config.dead_recovery_rate,
    };
    (stock + dt * (growth - harvest)).clamp(0.0, capacity)
}

/// Biomass drawn out of the ecosystem by this tick's production.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HarvestAmounts {
    pub fish: f64,
    pub timber: f64,
}

/// Updates an island's ecosystem given the tick's harvests: fish and
/// forest logistic regeneration, then soil depletion/recovery driven by
/// farming intensity.
pub fn update_ecosystem(
    island: &mut IslandState,
    harvest: HarvestAmounts,
    modifiers: &EventModifiers,
    grain_rate_ratio: f64,
    config: &EcologyConfig,
    dt: f64,
) {
    let params = island.ecosystem_params.clone();
    island.ecosystem.fish_stock = regenerate_stock(
        island.ecosystem.fish_stock,
        params.fish_capacity,
        config.fish_regen_rate,
        harvest.fish,
        config,
        dt,
    );
    island.ecosystem.forest_biomass = regenerate_stock(
        island.ecosystem.forest_biomass,
        params.forest_capacity,
        config.forest_regen_rate,
        harvest.timber,
        config,
        dt,
    );

    let farming_share = island.population.labor_share(crate::goods::LaborSector::Farming);
    let depletion = config.soil_depletion_rate * farming_share * grain_rate_ratio;
    let fallow = if farming_share < 0.1 { config.fallow_bonus } else { 1.0 };
    let regen =
        config.soil_regen_rate * (1.0 - farming_share) * fallow * modifiers.soil_regen_multiplier;
    island.ecosystem.soil_fertility =
        (island.ecosystem.soil_fertility + dt * (regen - depletion)).clamp(0.0, 1.0);
}

/// Moves fish from depleted fisheries to healthy ones.
///
/// Islands below the depleted threshold shed a fraction of stock scaled by
/// depletion severity; the outflow is split across healthy islands weighted
/// by `ratio * available_capacity` and capped by each destination's
/// headroom. Total fish is conserved: anything the recipients cannot absorb
/// stays at the source.
pub fn migrate_fish(islands: &mut BTreeMap<IslandId, IslandState>, config: &EcologyConfig, dt: f64) {
    let migration = &config.fish_migration;

    // Planning pass over an immutable view; islands iterate in id order.
    let mut outflows: Vec<(IslandId, f64)> = Vec::new();
    for (id, island) in islands.iter() {
        let ratio = island.ecosystem.fish_ratio(&island.ecosystem_params);
        if ratio >= migration.depleted_threshold {
            continue;
        }
        let severity = (migration.depleted_threshold - ratio) / migration.depleted_threshold;
        let amount = island.ecosystem.fish_stock * migration.migration_rate * severity * dt;
        if amount >= migration.min_migration_amount {
            outflows.push((id.clone(), amount));
        }
    }

    for (source_id, outflow) in outflows {
        let recipients: Vec<(IslandId, f64, f64)> = islands
            .iter()
            .filter(|(id, island)| {
                **id != source_id
                    && island.ecosystem.fish_ratio(&island.ecosystem_params)
                        > migration.healthy_threshold
            })
            .map(|(id, island)| {
                let ratio = island.ecosystem.fish_ratio(&island.ecosystem_params);
                let headroom =
                    island.ecosystem_params.fish_capacity - island.ecosystem.fish_stock;
                (id.clone(), ratio * headroom.max(0.0), headroom.max(0.0))
            })
            .filter(|(_, weight, _)| *weight > 0.0)
            .collect();
        let total_weight: f64 = recipients.iter().map(|(_, w, _)| w).sum();
        if total_weight <= 0.0 {
            continue;
        }

        let mut transferred = 0.0;
        for (dest_id, weight, headroom) in recipients {
            let allocated = outflow * weight / total_weight;
            let accepted = allocated.min(headroom);
            if accepted <= 0.0 {
                continue;
            }
            let dest = islands.get_mut(&dest_id).expect("recipient island exists");
            dest.ecosystem.fish_stock = (dest.ecosystem.fish_stock + accepted)
                .min(dest.ecosystem_params.fish_capacity);
            transferred += accepted;
        }
        let source = islands.get_mut(&source_id).expect("source island exists");
        source.ecosystem.fish_stock = (source.ecosystem.fish_stock - transferred).max(0.0);
    }
}
