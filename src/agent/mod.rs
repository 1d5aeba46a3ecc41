//! The two-tier agent layer: a triggered strategist over a rule-based
//! executor.
//!
//! Shared world state only ever sees [`AgentState`] (identity and assets).
//! Everything an agent learns or plans lives in its private [`AgentMemory`],
//! which is serializable for persistence but deliberately excluded from the
//! canonical world hash.

pub mod actions;
pub mod executor;
pub mod manager;
pub mod observation;
pub mod strategist;
pub mod triggers;

pub use actions::{Action, ActionFailure, ActionOutcome};
pub use executor::Executor;
pub use manager::AgentManager;
pub use observation::ObservableState;
pub use strategist::{AdvisorChannel, AdvisorPoll, RuleBasedStrategist, Strategist};
pub use triggers::{Trigger, TriggerKind};

use crate::goods::GoodId;
use crate::island::IslandId;
use crate::ship::{AgentId, ShipId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of actor behind an agent id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Trader,
    Observer,
}

/// Publicly visible holdings of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentAssets {
    pub cash: f64,
    pub ship_ids: Vec<ShipId>,
}

/// Shared-world agent record: identity and assets only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub id: AgentId,
    pub agent_type: AgentType,
    pub name: String,
    pub assets: AgentAssets,
}

/// Declared intent of a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryGoal {
    Profit,
    Stabilize,
    Explore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    Medium,
    High,
}

/// One prioritized trade lane inside a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRoute {
    pub from: IslandId,
    pub to: IslandId,
    pub goods: Vec<GoodId>,
    /// Lower numbers are considered first.
    pub priority: u8,
}

/// A strategy: a goal plus ordered target routes, valid for a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub created_at: u64,
    pub primary_goal: PrimaryGoal,
    pub target_routes: Vec<TargetRoute>,
    pub risk_tolerance: RiskTolerance,
    pub analysis: String,
    pub reasoning: String,
    pub valid_until: u64,
}

impl Strategy {
    pub fn is_stale(&self, tick: u64) -> bool {
        tick > self.valid_until
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// One concrete step of a plan. The action payload is what the executor
/// emitted; the manager stamps statuses from application results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub description: String,
    pub status: StepStatus,
}

/// A concrete sequence of steps derived from a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub created_at: u64,
    pub status: PlanStatus,
    pub steps: Vec<PlanStep>,
    pub current_step: usize,
    pub failure_reason: Option<String>,
}

/// A price an agent saw, and when.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub price: f64,
    pub observed_at: u64,
}

/// A trade the agent executed (memory only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub tick: u64,
    pub ship_id: ShipId,
    pub island_id: IslandId,
    pub good: GoodId,
    /// Positive bought, negative sold.
    pub quantity: f64,
    pub unit_price: f64,
}

/// A voyage the agent ordered (memory only).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoyageRecord {
    pub tick: u64,
    pub ship_id: ShipId,
    pub from: IslandId,
    pub to: IslandId,
}

/// An advisor request in flight, awaiting its reply or deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAdvisorCall {
    pub issued_at: u64,
}

const HISTORY_CAP: usize = 256;

/// Private per-agent memory. Deterministic given identical inputs, but
/// never part of the world hash.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMemory {
    pub strategy: Option<Strategy>,
    pub strategy_history: Vec<Strategy>,
    pub trade_history: Vec<TradeRecord>,
    pub voyage_history: Vec<VoyageRecord>,
    /// Last price seen per island per good, stamped with the tick.
    pub price_observations: BTreeMap<IslandId, BTreeMap<GoodId, PriceObservation>>,
    pub plan: Option<Plan>,
    pub last_reasoning_tick: Option<u64>,
    pub pending_advisor: Option<PendingAdvisorCall>,
    /// Monotone counter naming plans.
    pub plans_created: u64,
}

impl AgentMemory {
    /// Installs a new strategy, archiving the previous one.
    pub fn adopt_strategy(&mut self, strategy: Strategy) {
        if let Some(old) = self.strategy.take() {
            self.strategy_history.push(old);
            if self.strategy_history.len() > HISTORY_CAP {
                self.strategy_history.remove(0);
            }
        }
        self.strategy = Some(strategy);
    }

    pub fn record_trade(&mut self, record: TradeRecord) {
        self.trade_history.push(record);
        if self.trade_history.len() > HISTORY_CAP {
            self.trade_history.remove(0);
        }
    }

    pub fn record_voyage(&mut self, record: VoyageRecord) {
        self.voyage_history.push(record);
        if self.voyage_history.len() > HISTORY_CAP {
            self.voyage_history.remove(0);
        }
    }

    pub fn observe_price(&mut self, island: &str, good: GoodId, price: f64, tick: u64) {
        self.price_observations
            .entry(island.to_string())
            .or_default()
            .insert(good, PriceObservation { price, observed_at: tick });
    }

    /// Age in ticks of the freshest observation for an island, if any.
    pub fn price_age(&self, island: &str, tick: u64) -> Option<u64> {
        self.price_observations.get(island).map(|prices| {
            prices
                .values()
                .map(|obs| tick.saturating_sub(obs.observed_at))
                .min()
                .unwrap_or(tick)
        })
    }

    pub fn ticks_since_reasoning(&self, tick: u64) -> u64 {
        match self.last_reasoning_tick {
            Some(last) => tick.saturating_sub(last),
            None => u64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_staleness() {
        let strategy = Strategy {
            created_at: 0,
            primary_goal: PrimaryGoal::Profit,
            target_routes: vec![],
            risk_tolerance: RiskTolerance::Medium,
            analysis: String::new(),
            reasoning: String::new(),
            valid_until: 96,
        };
        assert!(!strategy.is_stale(96));
        assert!(strategy.is_stale(97));
    }

    #[test]
    fn test_adopt_strategy_archives_old() {
        let mut memory = AgentMemory::default();
        let make = |created_at| Strategy {
            created_at,
            primary_goal: PrimaryGoal::Profit,
            target_routes: vec![],
            risk_tolerance: RiskTolerance::Low,
            analysis: String::new(),
            reasoning: String::new(),
            valid_until: created_at + 48,
        };
        memory.adopt_strategy(make(0));
        memory.adopt_strategy(make(50));
        assert_eq!(memory.strategy.as_ref().unwrap().created_at, 50);
        assert_eq!(memory.strategy_history.len(), 1);
        assert_eq!(memory.strategy_history[0].created_at, 0);
    }

    #[test]
    fn test_price_age_tracks_freshest() {
        let mut memory = AgentMemory::default();
        memory.observe_price("shoalhold", GoodId::Grain, 10.0, 5);
        memory.observe_price("shoalhold", GoodId::Fish, 8.0, 20);
        assert_eq!(memory.price_age("shoalhold", 30), Some(10));
        assert_eq!(memory.price_age("saltmere", 30), None);
    }

    #[test]
    fn test_ticks_since_reasoning_without_history() {
        let memory = AgentMemory::default();
        assert_eq!(memory.ticks_since_reasoning(100), u64::MAX);
    }

    #[test]
    fn test_trade_history_bounded() {
        let mut memory = AgentMemory::default();
        for tick in 0..(HISTORY_CAP as u64 + 10) {
            memory.record_trade(TradeRecord {
                tick,
                ship_id: "petrel".to_string(),
                island_id: "shoalhold".to_string(),
                good: GoodId::Grain,
                quantity: 1.0,
                unit_price: 10.0,
            });
        }
        assert_eq!(memory.trade_history.len(), HISTORY_CAP);
        assert_eq!(memory.trade_history[0].tick, 10);
    }
}
