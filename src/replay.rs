//! Action logging and replay verification for debugging.
//!
//! The log records the seed, the world dimensions, and every notable
//! happening (trades with slippage, voyages, arrivals, sinkings, shipyard
//! deliveries, event lifecycles, per-tick hashes). Re-running the same seed
//! and configuration must reproduce the same log; `verify_against` finds
//! the first divergence.

use crate::error::{Result, SimulationError};
use crate::goods::GoodId;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// One recorded happening.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordedAction {
    Trade {
        tick: u64,
        ship_id: String,
        island_id: String,
        good: GoodId,
        /// Positive bought, negative sold.
        quantity: f64,
        execution_price: f64,
        slippage: f64,
    },
    VoyageStarted { tick: u64, ship_id: String, from: String, to: String },
    Arrival { tick: u64, ship_id: String, island_id: String },
    ShipSunk { tick: u64, ship_id: String },
    ShipDelivered { tick: u64, ship_id: String, shipyard_id: String },
    EventStarted { tick: u64, event_id: String },
    EventEnded { tick: u64, event_id: String },
    TickHash { tick: u64, state_hash: u64 },
}

impl RecordedAction {
    pub fn tick(&self) -> u64 {
        match self {
            RecordedAction::Trade { tick, .. }
            | RecordedAction::VoyageStarted { tick, .. }
            | RecordedAction::Arrival { tick, .. }
            | RecordedAction::ShipSunk { tick, .. }
            | RecordedAction::ShipDelivered { tick, .. }
            | RecordedAction::EventStarted { tick, .. }
            | RecordedAction::EventEnded { tick, .. }
            | RecordedAction::TickHash { tick, .. } => *tick,
        }
    }
}

/// Replay log for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLog {
    pub seed: u64,
    pub island_count: usize,
    pub agent_count: usize,
    pub max_ticks: u64,
    pub actions: Vec<RecordedAction>,
}

impl ActionLog {
    pub fn new(seed: u64, island_count: usize, agent_count: usize, max_ticks: u64) -> Self {
        ActionLog { seed, island_count, agent_count, max_ticks, actions: Vec::new() }
    }

    pub fn record(&mut self, action: RecordedAction) {
        self.actions.push(action);
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions recorded for one tick, in recording order.
    pub fn actions_at(&self, tick: u64) -> Vec<&RecordedAction> {
        self.actions.iter().filter(|a| a.tick() == tick).collect()
    }

    /// Compares two logs entry-wise; returns the index of the first
    /// divergence, if any.
    pub fn verify_against(&self, other: &ActionLog) -> Option<usize> {
        if self.seed != other.seed {
            return Some(0);
        }
        let shared = self.actions.len().min(other.actions.len());
        for index in 0..shared {
            if self.actions[index] != other.actions[index] {
                return Some(index);
            }
        }
        if self.actions.len() != other.actions.len() {
            return Some(shared);
        }
        None
    }

    /// Saves the log to a JSON file.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path).map_err(SimulationError::ReplayLogWrite)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)
            .map_err(SimulationError::ReplayLogSerialize)?;
        writer.flush().map_err(SimulationError::ReplayLogWrite)?;
        Ok(())
    }

    /// Loads a log from a JSON file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path).map_err(SimulationError::ReplayLogRead)?;
        let reader = BufReader::new(file);
        let log =
            serde_json::from_reader(reader).map_err(SimulationError::ReplayLogDeserialize)?;
        Ok(log)
    }
}
