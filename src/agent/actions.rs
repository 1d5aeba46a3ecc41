//! Concrete agent actions: validation and application against the world.
//!
//! Failed actions surface as per-action failure records; they never roll
//! back earlier successful actions in the same decision.

use crate::config::SimulationConfig;
use crate::events::modifiers_for_ship;
use crate::island::{IslandId, Position};
use crate::market::{self, PurchasingPower, TradeLine, TradeReport};
use crate::ship::ShipId;
use crate::shipping;
use crate::world::WorldState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What an agent can do with one ship in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Trade { ship_id: ShipId, island_id: IslandId, lines: Vec<TradeLine> },
    Navigate { ship_id: ShipId, destination: IslandId },
    Wait { ship_id: ShipId, duration: u64 },
}

impl Action {
    pub fn ship_id(&self) -> &ShipId {
        match self {
            Action::Trade { ship_id, .. }
            | Action::Navigate { ship_id, .. }
            | Action::Wait { ship_id, .. } => ship_id,
        }
    }

    /// Short human-readable label for plans and logs.
    pub fn describe(&self) -> String {
        match self {
            Action::Trade { ship_id, island_id, lines } => {
                format!("trade {} lines with {} at {}", lines.len(), ship_id, island_id)
            }
            Action::Navigate { ship_id, destination } => {
                format!("sail {} to {}", ship_id, destination)
            }
            Action::Wait { ship_id, duration } => format!("hold {} for {}h", ship_id, duration),
        }
    }
}

/// A validation or application failure, kept for the tick metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFailure {
    pub agent_id: String,
    pub description: String,
    pub reason: String,
}

/// Result of applying one validated action.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome {
    Traded(TradeReport),
    VoyageStarted { from: IslandId, to: IslandId },
    Waited,
}

/// Validates an action against the current world for a given agent.
pub fn validate_action(action: &Action, world: &WorldState, agent_id: &str) -> Result<(), String> {
    let ship = world
        .ships
        .get(action.ship_id())
        .ok_or_else(|| format!("unknown ship '{}'", action.ship_id()))?;
    if ship.owner_id != agent_id {
        return Err(format!("ship '{}' is not owned by {}", ship.id, agent_id));
    }
    match action {
        Action::Trade { island_id, lines, .. } => {
            if !world.islands.contains_key(island_id) {
                return Err(format!("unknown island '{}'", island_id));
            }
            if !ship.is_docked_at(island_id) {
                return Err(format!("ship '{}' is not docked at {}", ship.id, island_id));
            }
            if lines.is_empty() {
                return Err("trade order has no lines".to_string());
            }
            for line in lines {
                if !world.goods.contains_key(&line.good) {
                    return Err(format!("unknown good '{}'", line.good));
                }
            }
            Ok(())
        }
        Action::Navigate { destination, .. } => {
            let here = ship
                .location
                .docked_island()
                .ok_or_else(|| format!("ship '{}' is at sea", ship.id))?;
            if !world.islands.contains_key(destination) {
                return Err(format!("unknown island '{}'", destination));
            }
            if here == destination {
                return Err(format!("ship '{}' is already at {}", ship.id, destination));
            }
            Ok(())
        }
        Action::Wait { .. } => Ok(()),
    }
}

/// Applies a validated action, mutating the world. Trade failures inside a
/// line (insufficient inventory, cash, budget) are soft and reported in the
/// returned trade report, not as errors.
pub fn apply_action(
    action: &Action,
    world: &mut WorldState,
    config: &SimulationConfig,
) -> Result<ActionOutcome, String> {
    match action {
        Action::Trade { ship_id, island_id, lines } => {
            let goods = world.goods.clone();
            let ship = world.ships.get_mut(ship_id).ok_or("ship vanished")?;
            let island = world.islands.get_mut(island_id).ok_or("island vanished")?;
            let report = market::execute_order(
                island,
                ship,
                lines,
                &goods,
                config.tax_rate,
                PurchasingPower {
                    enforce: config.agents.enforce_purchasing_power,
                    max_spend_ratio: config.agents.max_spend_ratio,
                },
                &config.depth,
            );
            if let Some(reason) = &report.rejected {
                return Err(reason.clone());
            }
            world.metrics.tax_destroyed += report.tax_destroyed;
            world.metrics.total_trade_volume += report.volume;
            Ok(ActionOutcome::Traded(report))
        }
        Action::Navigate { ship_id, destination } => {
            let positions: BTreeMap<IslandId, Position> =
                world.islands.iter().map(|(id, i)| (id.clone(), i.position)).collect();
            let speed_multiplier =
                modifiers_for_ship(&world.events, ship_id).ship_speed_multiplier;
            let ship = world.ships.get_mut(ship_id).ok_or("ship vanished")?;
            let from = ship
                .location
                .docked_island()
                .cloned()
                .ok_or_else(|| format!("ship '{}' is at sea", ship_id))?;
            shipping::start_voyage(ship, &positions, destination, speed_multiplier)?;
            Ok(ActionOutcome::VoyageStarted { from, to: destination.clone() })
        }
        Action::Wait { .. } => Ok(ActionOutcome::Waited),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::goods::GoodId;
    use crate::world::initialize_world;

    fn setup() -> (SimulationConfig, WorldState) {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        (config, world)
    }

    fn owned_ship(world: &WorldState) -> (String, String, String) {
        let ship = world.ships.values().next().unwrap();
        let island = ship.location.docked_island().unwrap().clone();
        (ship.owner_id.clone(), ship.id.clone(), island)
    }

    #[test]
    fn test_validate_rejects_unknown_ship() {
        let (_, world) = setup();
        let action = Action::Wait { ship_id: "flying-dutchman".to_string(), duration: 1 };
        assert!(validate_action(&action, &world, "trader-1").is_err());
    }

    #[test]
    fn test_validate_rejects_foreign_ship() {
        let (_, world) = setup();
        let (_, ship_id, _) = owned_ship(&world);
        let action = Action::Wait { ship_id, duration: 1 };
        assert!(validate_action(&action, &world, "trader-99").is_err());
    }

    #[test]
    fn test_validate_trade_requires_docked_at_island() {
        let (_, world) = setup();
        let (owner, ship_id, island) = owned_ship(&world);
        let other_island =
            world.islands.keys().find(|id| **id != island).unwrap().clone();
        let action = Action::Trade {
            ship_id,
            island_id: other_island,
            lines: vec![TradeLine { good: GoodId::Grain, quantity: 1.0 }],
        };
        assert!(validate_action(&action, &world, &owner).is_err());
    }

    #[test]
    fn test_validate_navigate_rejects_same_island() {
        let (_, world) = setup();
        let (owner, ship_id, island) = owned_ship(&world);
        let action = Action::Navigate { ship_id, destination: island };
        assert!(validate_action(&action, &world, &owner).is_err());
    }

    #[test]
    fn test_apply_trade_updates_metrics() {
        let (config, mut world) = setup();
        let (owner, ship_id, island) = owned_ship(&world);
        let action = Action::Trade {
            ship_id,
            island_id: island,
            lines: vec![TradeLine { good: GoodId::Grain, quantity: 5.0 }],
        };
        validate_action(&action, &world, &owner).unwrap();
        let outcome = apply_action(&action, &mut world, &config).unwrap();
        assert!(matches!(outcome, ActionOutcome::Traded(_)));
        assert!(world.metrics.tax_destroyed > 0.0);
        assert!(world.metrics.total_trade_volume > 0.0);
    }

    #[test]
    fn test_apply_navigate_puts_ship_to_sea() {
        let (config, mut world) = setup();
        let (owner, ship_id, island) = owned_ship(&world);
        let destination =
            world.islands.keys().find(|id| **id != island).unwrap().clone();
        let action = Action::Navigate { ship_id: ship_id.clone(), destination };
        validate_action(&action, &world, &owner).unwrap();
        apply_action(&action, &mut world, &config).unwrap();
        assert!(world.ships[&ship_id].is_at_sea());
    }
}
