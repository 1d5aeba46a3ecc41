//! Ship state: the mobile, trader-controlled vessels.

use crate::goods::{GoodDefinition, GoodId};
use crate::hash::StateHasher;
use crate::island::{IslandId, Position};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type alias for ship identifiers.
pub type ShipId = String;

/// Type alias for agent identifiers.
pub type AgentId = String;

/// An in-progress voyage between two islands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub origin: IslandId,
    pub destination: IslandId,
    pub total_distance: f64,
    pub remaining_eta_hours: f64,
    /// Fraction of the voyage completed, monotone non-decreasing.
    pub progress: f64,
}

/// Where a ship currently is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ShipLocation {
    AtIsland { island_id: IslandId },
    AtSea { position: Position, route: Route },
}

impl ShipLocation {
    pub fn docked_island(&self) -> Option<&IslandId> {
        match self {
            ShipLocation::AtIsland { island_id } => Some(island_id),
            ShipLocation::AtSea { .. } => None,
        }
    }
}

/// Crew complement and its disposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewState {
    pub count: u32,
    pub capacity: u32,
    /// Morale in [0, 1].
    pub morale: f64,
    /// Coin owed per crew member per game-hour.
    pub wage_rate: f64,
    /// Consecutive ticks wages went fully or partly unpaid.
    pub unpaid_ticks: u32,
}

/// Optional debt descriptor observable by the owning agent's executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebtState {
    pub principal: f64,
    /// Interest rate per game-hour.
    pub interest_rate: f64,
    pub credit_limit: f64,
}

/// A mobile trader-controlled vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipState {
    pub id: ShipId,
    pub name: String,
    pub owner_id: AgentId,
    /// Cargo volume capacity (units of quantity x bulkiness).
    pub cargo_capacity: f64,
    /// Distance units per game-hour in calm conditions at full condition.
    pub base_speed: f64,
    pub cash: f64,
    pub cargo: BTreeMap<GoodId, f64>,
    pub location: ShipLocation,
    pub last_voyage_cost: f64,
    pub cumulative_transport_cost: f64,
    pub crew: CrewState,
    /// Hull integrity in [0, 1].
    pub condition: f64,
    pub total_distance_traveled: f64,
    pub debt: Option<DebtState>,
}

impl ShipState {
    pub fn cargo_of(&self, good: GoodId) -> f64 {
        self.cargo.get(&good).copied().unwrap_or(0.0)
    }

    pub fn add_cargo(&mut self, good: GoodId, amount: f64) {
        let entry = self.cargo.entry(good).or_insert(0.0);
        *entry = (*entry + amount).max(0.0);
        if *entry <= 1e-9 {
            self.cargo.remove(&good);
        }
    }

    /// Total cargo volume given the good definitions.
    pub fn cargo_volume(&self, goods: &BTreeMap<GoodId, GoodDefinition>) -> f64 {
        self.cargo
            .iter()
            .map(|(good, quantity)| {
                quantity * goods.get(good).map(|d| d.bulkiness).unwrap_or(1.0)
            })
            .sum()
    }

    pub fn is_docked_at(&self, island_id: &str) -> bool {
        matches!(&self.location, ShipLocation::AtIsland { island_id: here } if here == island_id)
    }

    pub fn is_at_sea(&self) -> bool {
        matches!(self.location, ShipLocation::AtSea { .. })
    }

    /// Debt as a fraction of debt plus liquid cash; zero when debt-free.
    pub fn debt_ratio(&self) -> f64 {
        match &self.debt {
            Some(debt) if debt.principal > 0.0 => {
                debt.principal / (debt.principal + self.cash.max(0.0))
            }
            _ => 0.0,
        }
    }

    /// Credit the executor may count on top of cash when planning buys.
    pub fn available_credit(&self) -> f64 {
        self.debt
            .as_ref()
            .map(|d| (d.credit_limit - d.principal).max(0.0))
            .unwrap_or(0.0)
    }

    /// Feeds this ship's canonical fields into the state hasher.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.write_str(&self.id);
        hasher.write_str(&self.owner_id);
        hasher.write_f64(self.cash);
        hasher.write_f64(self.condition);
        hasher.write_f64(self.total_distance_traveled);
        for (good, quantity) in &self.cargo {
            hasher.write_str(good.as_str());
            hasher.write_f64(*quantity);
        }
        match &self.location {
            ShipLocation::AtIsland { island_id } => {
                hasher.write_u8(0);
                hasher.write_str(island_id);
            }
            ShipLocation::AtSea { position, route } => {
                hasher.write_u8(1);
                hasher.write_f64(position.x);
                hasher.write_f64(position.y);
                hasher.write_str(&route.origin);
                hasher.write_str(&route.destination);
                hasher.write_f64(route.progress);
                hasher.write_f64(route.remaining_eta_hours);
            }
        }
        hasher.write_u64(self.crew.count as u64);
        hasher.write_f64(self.crew.morale);
        hasher.write_u64(self.crew.unpaid_ticks as u64);
    }
}
