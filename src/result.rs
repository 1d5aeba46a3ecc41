//! Run results: summary statistics and JSON output.

use crate::config::SimulationConfig;
use crate::engine::TickMetrics;
use crate::error::{Result, SimulationError};
use crate::goods::GoodId;
use crate::world::{EconomyMetrics, WorldState};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Gini coefficient over a set of non-negative values. Zero is perfect
/// equality, one is maximal concentration.
pub fn calculate_gini_coefficient(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len() as f64;
    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let weighted: f64 =
        sorted.iter().enumerate().map(|(i, v)| (i as f64 + 1.0) * v).sum();
    (2.0 * weighted) / (n * total) - (n + 1.0) / n
}

/// Rolling counters a runner accumulates from the per-tick metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub trade_volume_per_tick: Vec<f64>,
    pub arrivals: usize,
    pub events_spawned: usize,
    pub ships_sunk: usize,
    pub actions_failed: usize,
}

impl RunStats {
    pub fn new() -> Self {
        RunStats::default()
    }

    pub fn absorb(&mut self, metrics: &TickMetrics) {
        self.trade_volume_per_tick.push(metrics.agent_report.trade_volume);
        self.arrivals += metrics.arrivals.len();
        self.events_spawned += metrics.new_events.len();
        self.ships_sunk += metrics.ships_sunk.len();
        self.actions_failed += metrics.agent_report.actions_failed;
    }
}

/// Final condition of one island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandDigest {
    pub id: String,
    pub population: f64,
    pub health: f64,
    pub fish_stock: f64,
    pub forest_biomass: f64,
    pub soil_fertility: f64,
    pub treasury_balance: Option<f64>,
}

/// Final condition of one ship.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipDigest {
    pub id: String,
    pub owner_id: String,
    pub cash: f64,
    pub condition: f64,
    pub at_sea: bool,
}

/// Summary of a finished run, written as (optionally compressed) JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub ticks_run: u64,
    pub finished_at: DateTime<Utc>,
    pub final_state_hash: u64,
    /// Last few fingerprints for quick replay comparison.
    pub hash_tail: Vec<u64>,
    pub islands: Vec<IslandDigest>,
    pub ships: Vec<ShipDigest>,
    pub metrics: EconomyMetrics,
    /// Mean quoted price per good across islands at the end of the run.
    pub mean_prices: BTreeMap<GoodId, f64>,
    /// Gini coefficient over ship and agent cash.
    pub cash_gini: f64,
    pub stats: RunStats,
}

const HASH_TAIL_LEN: usize = 16;

impl SimulationResult {
    pub fn build(
        world: &WorldState,
        config: &SimulationConfig,
        tick_history: &[u64],
        stats: RunStats,
    ) -> Self {
        let islands = world
            .islands
            .values()
            .map(|island| IslandDigest {
                id: island.id.clone(),
                population: island.population.size,
                health: island.population.health,
                fish_stock: island.ecosystem.fish_stock,
                forest_biomass: island.ecosystem.forest_biomass,
                soil_fertility: island.ecosystem.soil_fertility,
                treasury_balance: island.treasury.as_ref().map(|t| t.balance),
            })
            .collect();
        let ships = world
            .ships
            .values()
            .map(|ship| ShipDigest {
                id: ship.id.clone(),
                owner_id: ship.owner_id.clone(),
                cash: ship.cash,
                condition: ship.condition,
                at_sea: ship.is_at_sea(),
            })
            .collect();

        let mut mean_prices = BTreeMap::new();
        for good in GoodId::all() {
            let prices: Vec<f64> = world
                .islands
                .values()
                .filter_map(|i| i.market.prices.get(&good).copied())
                .collect();
            if !prices.is_empty() {
                mean_prices.insert(good, prices.iter().sum::<f64>() / prices.len() as f64);
            }
        }

        let cash_holdings: Vec<f64> = world
            .ships
            .values()
            .map(|s| s.cash)
            .chain(world.agents.values().map(|a| a.assets.cash))
            .collect();

        SimulationResult {
            seed: config.seed,
            ticks_run: world.tick,
            finished_at: Utc::now(),
            final_state_hash: tick_history.last().copied().unwrap_or(world.state_hash()),
            hash_tail: tick_history
                .iter()
                .rev()
                .take(HASH_TAIL_LEN)
                .rev()
                .copied()
                .collect(),
            islands,
            ships,
            metrics: world.metrics.clone(),
            mean_prices,
            cash_gini: calculate_gini_coefficient(&cash_holdings),
            stats,
        }
    }

    /// Writes the result as pretty JSON; `.gz` output when `compress`.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, compress: bool) -> Result<()> {
        let file = File::create(path)?;
        let mut writer: Box<dyn Write> = if compress {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(|e| SimulationError::JsonSerialize(e.to_string()))?;
        writer.flush()?;
        Ok(())
    }
}
