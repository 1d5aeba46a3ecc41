//! The agent manager: per-agent observation, triggered reasoning,
//! execution, and action application.
//!
//! Agents run in sorted id order and apply actions sequentially, so a later
//! agent observes the mutations committed by earlier ones in the same tick.

use crate::agent::actions::{apply_action, validate_action, Action, ActionFailure};
use crate::agent::executor::Executor;
use crate::agent::observation::observe;
use crate::agent::strategist::{RuleBasedStrategist, Strategist, StrategySource};
use crate::agent::triggers::{evaluate_triggers, top_priority, TickHappenings};
use crate::agent::{
    ActionOutcome, AgentMemory, AgentType, Plan, PlanStatus, PlanStep, PrimaryGoal, StepStatus,
    TradeRecord, VoyageRecord,
};
use crate::config::SimulationConfig;
use crate::market::TradeSide;
use crate::ship::AgentId;
use crate::world::WorldState;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-tick record of what the agent layer did, for the tick metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentPhaseReport {
    pub actions_applied: usize,
    pub actions_failed: usize,
    /// Gross value moved by this tick's trades.
    pub trade_volume: f64,
    pub agents_reasoned: Vec<AgentId>,
    pub failures: Vec<ActionFailure>,
}

/// Owns every agent's private memory and the shared strategist.
pub struct AgentManager {
    memories: BTreeMap<AgentId, AgentMemory>,
    strategist: Box<dyn Strategist>,
}

impl AgentManager {
    /// Manager with the deterministic rule-based strategist.
    pub fn new() -> Self {
        AgentManager { memories: BTreeMap::new(), strategist: Box::new(RuleBasedStrategist) }
    }

    /// Manager with an injected strategist (advisor-backed or scripted).
    pub fn with_strategist(strategist: Box<dyn Strategist>) -> Self {
        AgentManager { memories: BTreeMap::new(), strategist }
    }

    pub fn memory(&self, agent_id: &str) -> Option<&AgentMemory> {
        self.memories.get(agent_id)
    }

    /// Swaps the strategist; agent memories are preserved.
    pub fn set_strategist(&mut self, strategist: Box<dyn Strategist>) {
        self.strategist = strategist;
    }

    /// Drops all private memory (used by `reset`).
    pub fn clear(&mut self) {
        self.memories.clear();
    }

    /// Whether this agent engages deep reasoning this tick.
    fn should_reason(
        memory: &AgentMemory,
        tick: u64,
        highest_priority: u8,
        average_debt: f64,
        stale_fraction: f64,
        config: &SimulationConfig,
    ) -> bool {
        let agents = &config.agents;
        let since = memory.ticks_since_reasoning(tick);

        // Cooldown is an absolute gate while a strategy exists.
        if since < agents.min_reasoning_cooldown && memory.strategy.is_some() {
            return false;
        }
        let Some(strategy) = &memory.strategy else {
            return true;
        };
        if strategy.is_stale(tick) {
            return true;
        }
        if highest_priority >= 8 {
            return true;
        }
        if average_debt > agents.high_debt_ratio {
            return true;
        }
        if stale_fraction >= agents.stale_price_fraction
            && since >= 2 * agents.min_reasoning_cooldown
        {
            return true;
        }
        // Goal/situation mismatch: chasing profit while drowning in debt.
        if strategy.primary_goal == PrimaryGoal::Profit
            && average_debt > agents.goal_mismatch_debt_ratio
        {
            return true;
        }
        false
    }

    /// Runs every agent against the committed world: observe, classify
    /// triggers, maybe re-strategize, execute, validate, apply.
    pub fn run_tick(
        &mut self,
        world: &mut WorldState,
        happenings: &TickHappenings,
        config: &SimulationConfig,
    ) -> AgentPhaseReport {
        let mut report = AgentPhaseReport::default();
        let agent_ids: Vec<AgentId> = world
            .agents
            .iter()
            .filter(|(_, a)| a.agent_type == AgentType::Trader)
            .map(|(id, _)| id.clone())
            .collect();

        for agent_id in agent_ids {
            let agent = world.agents[&agent_id].clone();
            let memory = self.memories.entry(agent_id.clone()).or_default();

            let observation = observe(world, &agent, memory, &config.agents);
            let triggers = evaluate_triggers(&observation, memory, happenings, &config.agents);
            let highest = top_priority(&triggers, &config.agents);

            let reason = Self::should_reason(
                memory,
                world.tick,
                highest,
                observation.average_debt_ratio(),
                observation.stale_fraction(&config.agents),
                config,
            );
            if reason {
                let outcome =
                    self.strategist.generate(&observation, &triggers, memory, &config.agents);
                match &outcome.source {
                    StrategySource::Advisor => {
                        info!("{}: adopted advisor strategy", agent_id)
                    }
                    StrategySource::Fallback(why) => {
                        debug!("{}: fallback strategy ({})", agent_id, why)
                    }
                }
                memory.adopt_strategy(outcome.strategy);
                memory.last_reasoning_tick = Some(world.tick);
            }

            let actions = Executor::plan_actions(&observation, memory, config, &world.goods);
            if actions.is_empty() {
                continue;
            }

            // A fresh plan mirrors this decision's actions.
            memory.plans_created += 1;
            let mut plan = Plan {
                id: format!("plan-{}-{}", agent_id, memory.plans_created),
                created_at: world.tick,
                status: PlanStatus::Active,
                steps: actions
                    .iter()
                    .map(|a| PlanStep { description: a.describe(), status: StepStatus::Pending })
                    .collect(),
                current_step: 0,
                failure_reason: None,
            };

            for (index, action) in actions.iter().enumerate() {
                // Sunk ships take their queued actions down with them.
                if !world.ships.contains_key(action.ship_id()) {
                    plan.steps[index].status = StepStatus::Failed;
                    continue;
                }
                plan.current_step = index;
                plan.steps[index].status = StepStatus::InProgress;

                let applied = validate_action(action, world, &agent_id)
                    .and_then(|_| apply_action(action, world, config));
                match applied {
                    Ok(outcome) => {
                        plan.steps[index].status = StepStatus::Completed;
                        report.actions_applied += 1;
                        if let ActionOutcome::Traded(trade) = &outcome {
                            report.trade_volume += trade.volume;
                        }
                        Self::record_outcome(memory, world.tick, action, &outcome);
                    }
                    Err(reason) => {
                        plan.steps[index].status = StepStatus::Failed;
                        plan.status = PlanStatus::Failed;
                        plan.failure_reason = Some(reason.clone());
                        report.actions_failed += 1;
                        report.failures.push(ActionFailure {
                            agent_id: agent_id.clone(),
                            description: action.describe(),
                            reason,
                        });
                        // No retry this tick; later actions still run.
                    }
                }
            }
            if plan.status == PlanStatus::Active
                && plan.steps.iter().all(|s| s.status == StepStatus::Completed)
            {
                plan.status = PlanStatus::Completed;
            }
            memory.plan = Some(plan);
            if reason {
                report.agents_reasoned.push(agent_id.clone());
            }
        }
        report
    }

    fn record_outcome(memory: &mut AgentMemory, tick: u64, action: &Action, outcome: &ActionOutcome) {
        match (action, outcome) {
            (Action::Trade { ship_id, island_id, .. }, ActionOutcome::Traded(trade)) => {
                for fill in &trade.fills {
                    if fill.filled <= 0.0 {
                        continue;
                    }
                    let signed = match fill.side {
                        TradeSide::Buy => fill.filled,
                        TradeSide::Sell => -fill.filled,
                    };
                    memory.record_trade(TradeRecord {
                        tick,
                        ship_id: ship_id.clone(),
                        island_id: island_id.clone(),
                        good: fill.good,
                        quantity: signed,
                        unit_price: fill.execution_price,
                    });
                }
            }
            (Action::Navigate { ship_id, .. }, ActionOutcome::VoyageStarted { from, to }) => {
                memory.record_voyage(VoyageRecord {
                    tick,
                    ship_id: ship_id.clone(),
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            _ => {}
        }
    }
}

impl Default for AgentManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goods::GoodId;
    use crate::world::initialize_world;

    fn gap_world() -> (SimulationConfig, WorldState) {
        let config = SimulationConfig::default();
        let mut world = initialize_world(&config).unwrap();
        let ids = world.island_ids();
        world.islands.get_mut(&ids[0]).unwrap().market.prices.insert(GoodId::Grain, 5.0);
        world.islands.get_mut(&ids[1]).unwrap().market.prices.insert(GoodId::Grain, 20.0);
        (config, world)
    }

    #[test]
    fn test_first_tick_reasons_and_plans() {
        let (config, mut world) = gap_world();
        let mut manager = AgentManager::new();
        let report = manager.run_tick(&mut world, &TickHappenings::default(), &config);
        assert!(!report.agents_reasoned.is_empty());
        for agent_id in world.agents.keys() {
            let memory = manager.memory(agent_id).unwrap();
            assert!(memory.strategy.is_some());
            assert!(memory.plan.is_some());
        }
    }

    #[test]
    fn test_cooldown_blocks_immediate_rereasoning() {
        let (config, mut world) = gap_world();
        let mut manager = AgentManager::new();
        manager.run_tick(&mut world, &TickHappenings::default(), &config);
        world.tick += 1;
        let report = manager.run_tick(&mut world, &TickHappenings::default(), &config);
        assert!(
            report.agents_reasoned.is_empty(),
            "cooldown must gate reasoning even with hot triggers"
        );
    }

    #[test]
    fn test_reasoning_cooldown_property() {
        // Property: no agent reasons twice within min_reasoning_cooldown.
        let (config, mut world) = gap_world();
        let mut manager = AgentManager::new();
        let mut last_reasoned: BTreeMap<AgentId, u64> = BTreeMap::new();
        for tick in 0..120 {
            world.tick = tick;
            let report = manager.run_tick(&mut world, &TickHappenings::default(), &config);
            for agent_id in &report.agents_reasoned {
                if let Some(previous) = last_reasoned.get(agent_id) {
                    assert!(
                        tick - previous >= config.agents.min_reasoning_cooldown,
                        "{} reasoned at {} and {}",
                        agent_id,
                        previous,
                        tick
                    );
                }
                last_reasoned.insert(agent_id.clone(), tick);
            }
        }
    }

    #[test]
    fn test_unknown_ship_action_fails_validation() {
        let (_, world) = gap_world();
        let agent_id = world.agents.keys().next().unwrap().clone();
        let bogus = Action::Navigate {
            ship_id: "ghost-ship".to_string(),
            destination: "nowhere".to_string(),
        };
        assert!(validate_action(&bogus, &world, &agent_id).is_err());
    }

    #[test]
    fn test_sequential_agents_see_prior_mutations() {
        let config = SimulationConfig {
            agent_count: 2,
            ..SimulationConfig::default()
        };
        let mut world = initialize_world(&config).unwrap();
        let ids = world.island_ids();
        world.islands.get_mut(&ids[0]).unwrap().market.prices.insert(GoodId::Grain, 5.0);
        world.islands.get_mut(&ids[1]).unwrap().market.prices.insert(GoodId::Grain, 20.0);
        let mut manager = AgentManager::new();
        let report = manager.run_tick(&mut world, &TickHappenings::default(), &config);
        // Both agents ran; the world carries all their mutations.
        assert!(report.actions_applied > 0);
    }
}
