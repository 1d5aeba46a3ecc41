//! Strategy generation: the external-advisor channel and the rule-based
//! fallback, behind one capability trait.
//!
//! The simulation clock never waits for the advisor. A request is submitted
//! during one reasoning turn and its reply, if it has arrived, is consumed
//! at the next one; until then (and on any rate limit, timeout, parse error
//! or schema violation) the fallback produces the strategy.

use crate::agent::observation::ObservableState;
use crate::agent::triggers::Trigger;
use crate::agent::{
    AgentMemory, PendingAdvisorCall, PrimaryGoal, RiskTolerance, Strategy, TargetRoute,
};
use crate::config::AgentConfig;
use crate::goods::GoodId;
use log::{debug, warn};
use serde::Deserialize;
use std::str::FromStr;

/// Where a strategy came from.
#[derive(Debug, Clone, PartialEq)]
pub enum StrategySource {
    Advisor,
    Fallback(String),
}

/// A generated strategy plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub strategy: Strategy,
    pub source: StrategySource,
}

/// The strategist capability: observation + triggers + memory in, strategy
/// out. Inject the advisor-backed implementation or the deterministic
/// fallback depending on the run.
pub trait Strategist {
    fn generate(
        &mut self,
        observation: &ObservableState,
        triggers: &[Trigger],
        memory: &mut AgentMemory,
        config: &AgentConfig,
    ) -> StrategyOutcome;
}

/// Deterministic fallback strategist.
#[derive(Debug, Default, Clone)]
pub struct RuleBasedStrategist;

impl RuleBasedStrategist {
    fn choose_goal(observation: &ObservableState, config: &AgentConfig) -> PrimaryGoal {
        if observation.average_debt_ratio() > 0.5 {
            PrimaryGoal::Stabilize
        } else if observation.stale_fraction(config) >= config.explore_stale_fraction {
            PrimaryGoal::Explore
        } else {
            PrimaryGoal::Profit
        }
    }

    fn pick_routes(
        observation: &ObservableState,
        memory: &AgentMemory,
        goal: PrimaryGoal,
        config: &AgentConfig,
    ) -> Vec<TargetRoute> {
        let mut routes = Vec::new();

        if goal != PrimaryGoal::Explore {
            if let Some(arb) = &observation.best_arbitrage {
                let fresh = |island: &str| {
                    observation
                        .islands
                        .get(island)
                        .map(|v| v.effective_age(observation.tick) < config.stale_price_age)
                        .unwrap_or(false)
                };
                if fresh(&arb.buy_island) && fresh(&arb.sell_island) {
                    routes.push(TargetRoute {
                        from: arb.buy_island.clone(),
                        to: arb.sell_island.clone(),
                        goods: vec![arb.good],
                        priority: 1,
                    });
                }
            }
        }

        // Carry forward up to two non-duplicate routes from the old strategy.
        if let Some(previous) = &memory.strategy {
            let mut carried = 0;
            for route in &previous.target_routes {
                if carried >= 2 {
                    break;
                }
                let duplicate = routes
                    .iter()
                    .any(|r: &TargetRoute| r.from == route.from && r.to == route.to);
                if !duplicate {
                    routes.push(TargetRoute { priority: route.priority.max(2), ..route.clone() });
                    carried += 1;
                }
            }
        }

        if goal == PrimaryGoal::Explore {
            // Send a docked ship toward the stalest island we can reach.
            let docked = observation.docked_ships();
            if let Some((_, from)) = docked.first() {
                let stalest = observation
                    .islands
                    .values()
                    .filter(|v| v.id != **from)
                    .max_by_key(|v| v.effective_age(observation.tick));
                if let Some(target) = stalest {
                    routes.push(TargetRoute {
                        from: (*from).clone(),
                        to: target.id.clone(),
                        goods: Vec::new(),
                        priority: 1,
                    });
                }
            }
        }
        routes
    }
}

impl Strategist for RuleBasedStrategist {
    fn generate(
        &mut self,
        observation: &ObservableState,
        _triggers: &[Trigger],
        memory: &mut AgentMemory,
        config: &AgentConfig,
    ) -> StrategyOutcome {
        let goal = Self::choose_goal(observation, config);
        let routes = Self::pick_routes(observation, memory, goal, config);
        let risk = if goal == PrimaryGoal::Stabilize {
            RiskTolerance::Low
        } else {
            RiskTolerance::Medium
        };
        let strategy = Strategy {
            created_at: observation.tick,
            primary_goal: goal,
            target_routes: routes,
            risk_tolerance: risk,
            analysis: format!(
                "rule-based: debt {:.2}, stale {:.0}%",
                observation.average_debt_ratio(),
                observation.stale_fraction(config) * 100.0
            ),
            reasoning: "fallback heuristics".to_string(),
            // Fallback strategies expire twice as fast as advisor ones.
            valid_until: observation.tick + config.strategy_validity_ticks / 2,
        };
        StrategyOutcome { strategy, source: StrategySource::Fallback("rule-based".to_string()) }
    }
}

/// Poll result of an advisor channel.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisorPoll {
    /// A reply arrived; payload is the raw response text.
    Ready(String),
    /// The request is still in flight.
    Pending,
    /// The channel refused the request (rate limit).
    RateLimited,
}

/// Transport capability to the external advisor. Implementations must be
/// cancellable; the strategist enforces the per-call deadline.
pub trait AdvisorChannel: Send {
    /// Submits a prompt. Returns false when saturated.
    fn submit(&mut self, prompt: &str) -> bool;
    /// Polls for the response to the in-flight request.
    fn poll(&mut self) -> AdvisorPoll;
    /// Abandons the in-flight request.
    fn cancel(&mut self);
}

/// Wire schema of an advisor reply.
#[derive(Debug, Deserialize)]
struct AdvisorResponse {
    analysis: String,
    strategy: AdvisorStrategy,
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct AdvisorStrategy {
    #[serde(rename = "primaryGoal")]
    primary_goal: String,
    #[serde(rename = "targetRoutes")]
    target_routes: Vec<AdvisorRoute>,
    #[serde(rename = "riskTolerance")]
    risk_tolerance: String,
}

#[derive(Debug, Deserialize)]
struct AdvisorRoute {
    from: String,
    to: String,
    goods: Vec<String>,
    priority: u8,
}

/// Parses and validates an advisor reply against the observed world.
/// Unknown island or good ids fail the whole reply.
fn parse_advisor_response(
    raw: &str,
    observation: &ObservableState,
    config: &AgentConfig,
) -> Result<Strategy, String> {
    let response: AdvisorResponse =
        serde_json::from_str(raw).map_err(|e| format!("invalid JSON: {}", e))?;
    let goal = match response.strategy.primary_goal.as_str() {
        "profit" => PrimaryGoal::Profit,
        "stabilize" => PrimaryGoal::Stabilize,
        "explore" => PrimaryGoal::Explore,
        other => return Err(format!("unknown primaryGoal '{}'", other)),
    };
    let risk = match response.strategy.risk_tolerance.as_str() {
        "low" => RiskTolerance::Low,
        "medium" => RiskTolerance::Medium,
        "high" => RiskTolerance::High,
        other => return Err(format!("unknown riskTolerance '{}'", other)),
    };
    let mut routes = Vec::new();
    for route in response.strategy.target_routes {
        if !observation.islands.contains_key(&route.from) {
            return Err(format!("unknown island '{}'", route.from));
        }
        if !observation.islands.contains_key(&route.to) {
            return Err(format!("unknown island '{}'", route.to));
        }
        let mut goods = Vec::new();
        for name in route.goods {
            let good =
                GoodId::from_str(&name).map_err(|_| format!("unknown good '{}'", name))?;
            goods.push(good);
        }
        routes.push(TargetRoute { from: route.from, to: route.to, goods, priority: route.priority });
    }
    Ok(Strategy {
        created_at: observation.tick,
        primary_goal: goal,
        target_routes: routes,
        risk_tolerance: risk,
        analysis: response.analysis,
        reasoning: response.reasoning,
        valid_until: observation.tick + config.strategy_validity_ticks,
    })
}

/// Builds the textual prompt for the advisor: market summary, finances,
/// price freshness, ship status, triggers, and the reply schema.
fn build_prompt(observation: &ObservableState, triggers: &[Trigger], memory: &AgentMemory) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("tick: {}\n", observation.tick));
    prompt.push_str(&format!("cash: {:.1}\n", observation.self_cash));
    prompt.push_str("islands:\n");
    for view in observation.islands.values() {
        let age = view
            .price_age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "never-seen".to_string());
        prompt.push_str(&format!("  {} (price age {}):", view.id, age));
        for (good, price) in &view.prices {
            prompt.push_str(&format!(" {}={:.1}", good, price));
        }
        prompt.push('\n');
    }
    prompt.push_str("ships:\n");
    for view in observation.ships.values().filter(|s| s.is_owned) {
        prompt.push_str(&format!(
            "  {} cash={:.1} condition={:.2} morale={:.2}\n",
            view.ship.id, view.ship.cash, view.ship.condition, view.ship.crew.morale
        ));
    }
    prompt.push_str(&format!("triggers: {}\n", triggers.len()));
    for trigger in triggers {
        prompt.push_str(&format!("  priority {}: {:?}\n", trigger.priority, trigger.kind));
    }
    if let Some(strategy) = &memory.strategy {
        prompt.push_str(&format!(
            "current goal: {:?}, valid until {}\n",
            strategy.primary_goal, strategy.valid_until
        ));
    }
    prompt.push_str(
        "Reply with JSON only: {\"analysis\": str, \"strategy\": {\"primaryGoal\": \
         \"profit\"|\"stabilize\"|\"explore\", \"targetRoutes\": [{\"from\": str, \"to\": str, \
         \"goods\": [str], \"priority\": int}], \"riskTolerance\": \"low\"|\"medium\"|\"high\"}, \
         \"reasoning\": str}\n",
    );
    prompt
}

/// Advisor-backed strategist with the rule-based fallback underneath.
pub struct AdvisorStrategist {
    channel: Box<dyn AdvisorChannel>,
    fallback: RuleBasedStrategist,
}

impl AdvisorStrategist {
    pub fn new(channel: Box<dyn AdvisorChannel>) -> Self {
        AdvisorStrategist { channel, fallback: RuleBasedStrategist }
    }

    fn fall_back(
        &mut self,
        reason: &str,
        observation: &ObservableState,
        triggers: &[Trigger],
        memory: &mut AgentMemory,
        config: &AgentConfig,
    ) -> StrategyOutcome {
        debug!("advisor fallback: {}", reason);
        let mut outcome = self.fallback.generate(observation, triggers, memory, config);
        outcome.source = StrategySource::Fallback(reason.to_string());
        outcome
    }
}

impl Strategist for AdvisorStrategist {
    fn generate(
        &mut self,
        observation: &ObservableState,
        triggers: &[Trigger],
        memory: &mut AgentMemory,
        config: &AgentConfig,
    ) -> StrategyOutcome {
        // Consume an in-flight request first.
        if let Some(pending) = memory.pending_advisor.clone() {
            match self.channel.poll() {
                AdvisorPoll::Ready(raw) => {
                    memory.pending_advisor = None;
                    match parse_advisor_response(&raw, observation, config) {
                        Ok(strategy) => {
                            return StrategyOutcome { strategy, source: StrategySource::Advisor }
                        }
                        Err(reason) => {
                            warn!("advisor reply rejected: {}", reason);
                            return self.fall_back(
                                &format!("schema violation: {}", reason),
                                observation,
                                triggers,
                                memory,
                                config,
                            );
                        }
                    }
                }
                AdvisorPoll::Pending => {
                    if observation.tick.saturating_sub(pending.issued_at)
                        >= config.advisor_deadline_ticks
                    {
                        self.channel.cancel();
                        memory.pending_advisor = None;
                        return self.fall_back(
                            "advisor timeout",
                            observation,
                            triggers,
                            memory,
                            config,
                        );
                    }
                    return self.fall_back(
                        "awaiting advisor",
                        observation,
                        triggers,
                        memory,
                        config,
                    );
                }
                AdvisorPoll::RateLimited => {
                    memory.pending_advisor = None;
                    return self.fall_back("rate limited", observation, triggers, memory, config);
                }
            }
        }

        // No request in flight: issue one and bridge with the fallback.
        let prompt = build_prompt(observation, triggers, memory);
        if self.channel.submit(&prompt) {
            memory.pending_advisor = Some(PendingAdvisorCall { issued_at: observation.tick });
            self.fall_back("advisor consulted, reply pending", observation, triggers, memory, config)
        } else {
            self.fall_back("rate limited", observation, triggers, memory, config)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::observation::observe;
    use crate::config::SimulationConfig;
    use crate::world::initialize_world;

    fn observation() -> (SimulationConfig, ObservableState) {
        let config = SimulationConfig::default();
        let mut world = initialize_world(&config).unwrap();
        let ids = world.island_ids();
        world.islands.get_mut(&ids[0]).unwrap().market.prices.insert(GoodId::Grain, 5.0);
        world.islands.get_mut(&ids[1]).unwrap().market.prices.insert(GoodId::Grain, 20.0);
        let agent = world.agents.values().next().unwrap().clone();
        let mut memory = AgentMemory::default();
        let obs = observe(&world, &agent, &mut memory, &config.agents);
        (config, obs)
    }

    /// Scripted advisor used across the agent tests.
    pub struct ScriptedAdvisor {
        pub responses: Vec<AdvisorPoll>,
        pub submitted: Vec<String>,
        pub accept: bool,
    }

    impl AdvisorChannel for ScriptedAdvisor {
        fn submit(&mut self, prompt: &str) -> bool {
            if self.accept {
                self.submitted.push(prompt.to_string());
            }
            self.accept
        }
        fn poll(&mut self) -> AdvisorPoll {
            if self.responses.is_empty() {
                AdvisorPoll::Pending
            } else {
                self.responses.remove(0)
            }
        }
        fn cancel(&mut self) {}
    }

    #[test]
    fn test_fallback_profit_goal_with_fresh_books() {
        let (config, obs) = observation();
        let mut memory = AgentMemory::default();
        let mut strategist = RuleBasedStrategist;
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert_eq!(outcome.strategy.primary_goal, PrimaryGoal::Profit);
        assert!(matches!(outcome.source, StrategySource::Fallback(_)));
    }

    #[test]
    fn test_fallback_picks_arbitrage_route() {
        let (config, obs) = observation();
        let mut memory = AgentMemory::default();
        let mut strategist = RuleBasedStrategist;
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        let arb = obs.best_arbitrage.as_ref().unwrap();
        let top = &outcome.strategy.target_routes[0];
        assert_eq!(top.from, arb.buy_island);
        assert_eq!(top.to, arb.sell_island);
        assert_eq!(top.priority, 1);
    }

    #[test]
    fn test_fallback_validity_is_halved() {
        let (config, obs) = observation();
        let mut memory = AgentMemory::default();
        let mut strategist = RuleBasedStrategist;
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert_eq!(
            outcome.strategy.valid_until,
            obs.tick + config.agents.strategy_validity_ticks / 2
        );
    }

    #[test]
    fn test_advisor_reply_consumed() {
        let (config, obs) = observation();
        let ids: Vec<&String> = obs.islands.keys().collect();
        let raw = format!(
            r#"{{"analysis": "gap", "strategy": {{"primaryGoal": "profit",
                "targetRoutes": [{{"from": "{}", "to": "{}", "goods": ["grain"], "priority": 1}}],
                "riskTolerance": "high"}}, "reasoning": "buy low"}}"#,
            ids[0], ids[1]
        );
        let mut memory = AgentMemory::default();
        memory.pending_advisor = Some(PendingAdvisorCall { issued_at: 0 });
        let channel = ScriptedAdvisor {
            responses: vec![AdvisorPoll::Ready(raw)],
            submitted: vec![],
            accept: true,
        };
        let mut strategist = AdvisorStrategist::new(Box::new(channel));
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert_eq!(outcome.source, StrategySource::Advisor);
        assert_eq!(outcome.strategy.risk_tolerance, RiskTolerance::High);
        assert_eq!(outcome.strategy.target_routes.len(), 1);
        assert!(memory.pending_advisor.is_none());
    }

    #[test]
    fn test_invalid_json_falls_back() {
        let (config, obs) = observation();
        let mut memory = AgentMemory::default();
        memory.pending_advisor = Some(PendingAdvisorCall { issued_at: 0 });
        let channel = ScriptedAdvisor {
            responses: vec![AdvisorPoll::Ready("not json at all".to_string())],
            submitted: vec![],
            accept: true,
        };
        let mut strategist = AdvisorStrategist::new(Box::new(channel));
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert!(matches!(outcome.source, StrategySource::Fallback(_)));
    }

    #[test]
    fn test_unknown_island_falls_back() {
        let (config, obs) = observation();
        let raw = r#"{"analysis": "", "strategy": {"primaryGoal": "profit",
            "targetRoutes": [{"from": "atlantis", "to": "lemuria", "goods": ["grain"], "priority": 1}],
            "riskTolerance": "low"}, "reasoning": ""}"#;
        let mut memory = AgentMemory::default();
        memory.pending_advisor = Some(PendingAdvisorCall { issued_at: 0 });
        let channel = ScriptedAdvisor {
            responses: vec![AdvisorPoll::Ready(raw.to_string())],
            submitted: vec![],
            accept: true,
        };
        let mut strategist = AdvisorStrategist::new(Box::new(channel));
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert!(matches!(outcome.source, StrategySource::Fallback(_)));
    }

    #[test]
    fn test_rate_limited_falls_back_silently() {
        let (config, obs) = observation();
        let mut memory = AgentMemory::default();
        let channel = ScriptedAdvisor { responses: vec![], submitted: vec![], accept: false };
        let mut strategist = AdvisorStrategist::new(Box::new(channel));
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert!(matches!(outcome.source, StrategySource::Fallback(_)));
        assert!(memory.pending_advisor.is_none());
    }

    #[test]
    fn test_submit_records_pending() {
        let (config, obs) = observation();
        let mut memory = AgentMemory::default();
        let channel = ScriptedAdvisor { responses: vec![], submitted: vec![], accept: true };
        let mut strategist = AdvisorStrategist::new(Box::new(channel));
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        // Bridged by the fallback while the request is in flight.
        assert!(matches!(outcome.source, StrategySource::Fallback(_)));
        assert!(memory.pending_advisor.is_some());
    }

    #[test]
    fn test_pending_past_deadline_times_out() {
        let (config, mut obs) = observation();
        obs.tick = 100;
        let mut memory = AgentMemory::default();
        memory.pending_advisor = Some(PendingAdvisorCall { issued_at: 0 });
        let channel = ScriptedAdvisor { responses: vec![], submitted: vec![], accept: true };
        let mut strategist = AdvisorStrategist::new(Box::new(channel));
        let outcome = strategist.generate(&obs, &[], &mut memory, &config.agents);
        assert!(matches!(outcome.source, StrategySource::Fallback(_)));
        assert!(memory.pending_advisor.is_none());
    }
}
