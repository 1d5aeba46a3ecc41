//! Shipyards: build orders and delivery of new ships.

use crate::goods::GoodId;
use crate::island::IslandId;
use crate::ship::{AgentId, CrewState, ShipId, ShipLocation, ShipState};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Type alias for shipyard identifiers.
pub type ShipyardId = String;

/// Static description of a buildable hull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipBlueprint {
    pub name: String,
    pub cargo_capacity: f64,
    pub base_speed: f64,
    pub crew_capacity: u32,
    /// Ticks of uninterrupted work to complete.
    pub build_ticks: u64,
    /// Total timber consumed over the build, drawn per tick.
    pub timber_required: f64,
    /// Total tools consumed over the build, drawn per tick.
    pub tools_required: f64,
}

impl ShipBlueprint {
    /// The standard coastal trader hull.
    pub fn sloop() -> Self {
        ShipBlueprint {
            name: "sloop".to_string(),
            cargo_capacity: 100.0,
            base_speed: 8.0,
            crew_capacity: 10,
            build_ticks: 240,
            timber_required: 120.0,
            tools_required: 24.0,
        }
    }
}

/// An active order occupying a shipyard's single slip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOrder {
    pub owner_id: AgentId,
    pub ship_name: String,
    pub blueprint: ShipBlueprint,
    /// Fraction complete in [0, 1].
    pub progress: f64,
}

/// A shipyard hosted by an island, holding at most one active order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipyard {
    pub id: ShipyardId,
    pub island_id: IslandId,
    pub active_order: Option<BuildOrder>,
}

/// Result of one shipyard tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ShipyardTickOutcome {
    Idle,
    /// Advanced by one increment.
    Progressed(f64),
    /// Host island lacked materials this tick.
    Stalled,
    /// Order finished; the new ship is ready to register.
    Completed(ShipState),
}

/// Advances a shipyard by one tick, drawing the per-tick material quota
/// from the host island's inventory. On completion the materialized ship
/// starts docked at the host with full condition, empty cargo, and no cash.
pub fn tick_shipyard(
    shipyard: &mut Shipyard,
    island_inventory: &mut BTreeMap<GoodId, f64>,
    next_ship_ordinal: usize,
    default_wage_rate: f64,
) -> ShipyardTickOutcome {
    let Some(order) = shipyard.active_order.as_mut() else {
        return ShipyardTickOutcome::Idle;
    };

    let increment = 1.0 / order.blueprint.build_ticks as f64;
    let timber_quota = order.blueprint.timber_required * increment;
    let tools_quota = order.blueprint.tools_required * increment;

    let timber_held = island_inventory.get(&GoodId::Timber).copied().unwrap_or(0.0);
    let tools_held = island_inventory.get(&GoodId::Tools).copied().unwrap_or(0.0);
    if timber_held < timber_quota || tools_held < tools_quota {
        debug!(
            "shipyard {} stalled: needs {:.2} timber / {:.2} tools",
            shipyard.id, timber_quota, tools_quota
        );
        return ShipyardTickOutcome::Stalled;
    }

    *island_inventory.get_mut(&GoodId::Timber).expect("timber entry checked above") -=
        timber_quota;
    *island_inventory.get_mut(&GoodId::Tools).expect("tools entry checked above") -= tools_quota;
    order.progress = (order.progress + increment).min(1.0);

    if order.progress < 1.0 - 1e-9 {
        return ShipyardTickOutcome::Progressed(order.progress);
    }

    let order = shipyard.active_order.take().expect("order present");
    let ship_id: ShipId = format!(
        "{}-{}",
        order.ship_name.to_lowercase().replace(' ', "-"),
        next_ship_ordinal
    );
    info!("shipyard {} delivered {} for {}", shipyard.id, ship_id, order.owner_id);
    ShipyardTickOutcome::Completed(ShipState {
        id: ship_id,
        name: order.ship_name,
        owner_id: order.owner_id,
        cargo_capacity: order.blueprint.cargo_capacity,
        base_speed: order.blueprint.base_speed,
        cash: 0.0,
        cargo: BTreeMap::new(),
        location: ShipLocation::AtIsland { island_id: shipyard.island_id.clone() },
        last_voyage_cost: 0.0,
        cumulative_transport_cost: 0.0,
        crew: CrewState {
            count: order.blueprint.crew_capacity,
            capacity: order.blueprint.crew_capacity,
            morale: 0.7,
            wage_rate: default_wage_rate,
            unpaid_ticks: 0,
        },
        condition: 1.0,
        total_distance_traveled: 0.0,
        debt: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yard_with_order(build_ticks: u64) -> Shipyard {
        Shipyard {
            id: "yard-shoalhold".to_string(),
            island_id: "shoalhold".to_string(),
            active_order: Some(BuildOrder {
                owner_id: "trader-1".to_string(),
                ship_name: "Gannet".to_string(),
                blueprint: ShipBlueprint { build_ticks, ..ShipBlueprint::sloop() },
                progress: 0.0,
            }),
        }
    }

    fn rich_inventory() -> BTreeMap<GoodId, f64> {
        let mut inventory = BTreeMap::new();
        inventory.insert(GoodId::Timber, 1000.0);
        inventory.insert(GoodId::Tools, 1000.0);
        inventory
    }

    #[test]
    fn test_idle_without_order() {
        let mut yard = Shipyard {
            id: "yard".to_string(),
            island_id: "shoalhold".to_string(),
            active_order: None,
        };
        let mut inventory = rich_inventory();
        assert_eq!(
            tick_shipyard(&mut yard, &mut inventory, 0, 0.5),
            ShipyardTickOutcome::Idle
        );
    }

    #[test]
    fn test_stalls_without_materials() {
        let mut yard = yard_with_order(10);
        let mut inventory = BTreeMap::new();
        assert_eq!(
            tick_shipyard(&mut yard, &mut inventory, 0, 0.5),
            ShipyardTickOutcome::Stalled
        );
        // Progress untouched while stalled.
        assert_eq!(yard.active_order.as_ref().unwrap().progress, 0.0);
    }

    #[test]
    fn test_completes_after_build_ticks() {
        let mut yard = yard_with_order(4);
        let mut inventory = rich_inventory();
        let mut completed = None;
        for _ in 0..4 {
            if let ShipyardTickOutcome::Completed(ship) =
                tick_shipyard(&mut yard, &mut inventory, 7, 0.5)
            {
                completed = Some(ship);
            }
        }
        let ship = completed.expect("ship should complete after build_ticks");
        assert_eq!(ship.id, "gannet-7");
        assert_eq!(ship.owner_id, "trader-1");
        assert_eq!(ship.cash, 0.0);
        assert!(ship.cargo.is_empty());
        assert_eq!(ship.condition, 1.0);
        assert!(ship.is_docked_at("shoalhold"));
        assert!(yard.active_order.is_none());
    }

    #[test]
    fn test_materials_consumed_per_tick() {
        let mut yard = yard_with_order(4);
        let mut inventory = rich_inventory();
        tick_shipyard(&mut yard, &mut inventory, 0, 0.5);
        let timber = inventory[&GoodId::Timber];
        let tools = inventory[&GoodId::Tools];
        // One quarter of each requirement drawn.
        assert!((timber - (1000.0 - 120.0 / 4.0)).abs() < 1e-9);
        assert!((tools - (1000.0 - 24.0 / 4.0)).abs() < 1e-9);
    }
}
