//! Observation-to-trigger classification.
//!
//! Triggers are cheap, deterministic signals extracted from an agent's
//! observation each tick. The manager uses the highest surviving priority
//! to decide whether the agent engages deep reasoning at all.

use crate::agent::observation::ObservableState;
use crate::agent::{AgentMemory, PlanStatus};
use crate::config::AgentConfig;
use crate::events::EventId;
use crate::goods::GoodId;
use crate::island::IslandId;
use crate::ship::ShipId;
use serde::{Deserialize, Serialize};

/// What fired, with enough payload to act on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerKind {
    PriceDivergence {
        good: GoodId,
        low_island: IslandId,
        high_island: IslandId,
        divergence: f64,
    },
    ShipArrival { ship_id: ShipId, island_id: IslandId },
    EventStarted { event_id: EventId },
    EventEnded { event_id: EventId },
    PlanCompleted,
    PlanFailed,
    ResourceThreshold { island_id: IslandId, concern: String },
    TimeElapsed,
    NoPlan,
}

/// A classified trigger with its priority (0..=10, higher is hotter).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub kind: TriggerKind,
    pub priority: u8,
}

/// Tick-level happenings the engine hands the agent layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickHappenings {
    /// (ship id, island id) pairs that completed a voyage this tick.
    pub arrivals: Vec<(ShipId, IslandId)>,
    pub new_event_ids: Vec<EventId>,
    pub expired_event_ids: Vec<EventId>,
}

/// Food stocks below one day of need flag a resource concern.
const FOOD_ALERT_DAYS: f64 = 1.0;
/// Treasuries below this balance flag a resource concern.
const TREASURY_ALERT_FLOOR: f64 = 100.0;

/// Evaluates all triggers for one agent, sorted by descending priority.
pub fn evaluate_triggers(
    observation: &ObservableState,
    memory: &AgentMemory,
    happenings: &TickHappenings,
    config: &AgentConfig,
) -> Vec<Trigger> {
    let mut triggers = Vec::new();

    // PRICE_DIVERGENCE per good across islands.
    for good in GoodId::all() {
        let mut low: Option<(&IslandId, f64)> = None;
        let mut high: Option<(&IslandId, f64)> = None;
        for (id, view) in &observation.islands {
            let Some(price) = view.prices.get(&good).copied() else { continue };
            if price <= 0.0 {
                continue;
            }
            if low.map(|(_, p)| price < p).unwrap_or(true) {
                low = Some((id, price));
            }
            if high.map(|(_, p)| price > p).unwrap_or(true) {
                high = Some((id, price));
            }
        }
        if let (Some((low_island, low_price)), Some((high_island, high_price))) = (low, high) {
            if low_island == high_island {
                continue;
            }
            let divergence = (high_price - low_price) / low_price;
            if divergence >= config.price_divergence_threshold {
                // Priority scales with how far past the threshold the gap is.
                let excess = divergence / config.price_divergence_threshold;
                let priority = (4.0 + excess.min(5.0)).floor() as u8;
                triggers.push(Trigger {
                    kind: TriggerKind::PriceDivergence {
                        good,
                        low_island: low_island.clone(),
                        high_island: high_island.clone(),
                        divergence,
                    },
                    priority,
                });
            }
        }
    }

    // Arrivals of owned ships.
    for (ship_id, island_id) in &happenings.arrivals {
        if observation.owned_ship_ids.contains(ship_id) {
            triggers.push(Trigger {
                kind: TriggerKind::ShipArrival {
                    ship_id: ship_id.clone(),
                    island_id: island_id.clone(),
                },
                priority: 5,
            });
        }
    }

    for event_id in &happenings.new_event_ids {
        triggers.push(Trigger {
            kind: TriggerKind::EventStarted { event_id: event_id.clone() },
            priority: 6,
        });
    }
    for event_id in &happenings.expired_event_ids {
        triggers.push(Trigger {
            kind: TriggerKind::EventEnded { event_id: event_id.clone() },
            priority: 4,
        });
    }

    // Plan state.
    match memory.plan.as_ref().map(|p| p.status) {
        Some(PlanStatus::Completed) => {
            triggers.push(Trigger { kind: TriggerKind::PlanCompleted, priority: 8 })
        }
        Some(PlanStatus::Failed) => {
            triggers.push(Trigger { kind: TriggerKind::PlanFailed, priority: 9 })
        }
        Some(PlanStatus::Active) => {}
        None => triggers.push(Trigger { kind: TriggerKind::NoPlan, priority: 8 }),
    }

    // Resource thresholds: islands near food deficit or an empty treasury.
    for (id, view) in &observation.islands {
        let food_stock = view.inventory.get(&GoodId::Grain).copied().unwrap_or(0.0)
            + view.inventory.get(&GoodId::Fish).copied().unwrap_or(0.0);
        let daily_need: f64 = 24.0; // conservative floor; islands need tens per day
        if food_stock < daily_need * FOOD_ALERT_DAYS {
            triggers.push(Trigger {
                kind: TriggerKind::ResourceThreshold {
                    island_id: id.clone(),
                    concern: "food stocks near deficit".to_string(),
                },
                priority: 6,
            });
        }
        if let Some(balance) = view.treasury_balance {
            if balance < TREASURY_ALERT_FLOOR {
                triggers.push(Trigger {
                    kind: TriggerKind::ResourceThreshold {
                        island_id: id.clone(),
                        concern: "treasury near zero".to_string(),
                    },
                    priority: 6,
                });
            }
        }
    }

    // TIME_ELAPSED only fires into silence.
    if triggers.is_empty()
        && memory.ticks_since_reasoning(observation.tick) >= config.periodic_review_ticks
    {
        triggers.push(Trigger { kind: TriggerKind::TimeElapsed, priority: 2 });
    }

    triggers.sort_by(|a, b| b.priority.cmp(&a.priority));
    triggers
}

/// Highest priority among triggers that clear the escalation gate.
pub fn top_priority(triggers: &[Trigger], config: &AgentConfig) -> u8 {
    triggers
        .iter()
        .map(|t| t.priority)
        .filter(|p| *p >= config.min_trigger_priority)
        .max()
        .unwrap_or(0)
}
