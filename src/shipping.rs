//! The ship life-cycle at sea and in port: spoilage, movement, wear,
//! transport cost, sinking, voyage start, and repair.

use crate::config::{MaintenanceConfig, ShippingConfig};
use crate::goods::{GoodDefinition, GoodId};
use crate::island::{IslandId, IslandState, Position};
use crate::rng::SeededRng;
use crate::ship::{Route, ShipLocation, ShipState};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A completed voyage, reported up to the tick metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arrival {
    pub ship_id: String,
    pub island_id: IslandId,
    pub distance: f64,
}

/// Applies exponential spoilage to every perishable good in the hold.
///
/// `warehouse_multiplier` is below one only when the ship is docked at an
/// island with warehouse buildings; `weather_multiplier` comes from active
/// storm events.
pub fn apply_spoilage(
    ship: &mut ShipState,
    goods: &BTreeMap<GoodId, GoodDefinition>,
    weather_multiplier: f64,
    warehouse_multiplier: f64,
    dt: f64,
) {
    let decayed: Vec<(GoodId, f64)> = ship
        .cargo
        .iter()
        .filter_map(|(good, quantity)| {
            let rate = goods.get(good).map(|d| d.spoilage_rate).unwrap_or(0.0);
            if rate <= 0.0 {
                return None;
            }
            let kept = quantity * (-rate * dt * weather_multiplier * warehouse_multiplier).exp();
            Some((*good, kept))
        })
        .collect();
    for (good, kept) in decayed {
        if kept <= 1e-9 {
            ship.cargo.remove(&good);
        } else {
            ship.cargo.insert(good, kept);
        }
    }
}

/// Speed multiplier from hull condition.
pub fn condition_speed_multiplier(condition: f64, config: &MaintenanceConfig) -> f64 {
    1.0 - (1.0 - condition) * config.speed_condition_penalty
}

/// Advances an at-sea ship along its route. Returns the distance covered
/// and, when the voyage completes, the arrival. Docked ships are untouched.
pub fn advance_voyage(
    ship: &mut ShipState,
    positions: &BTreeMap<IslandId, Position>,
    event_speed_multiplier: f64,
    crew_efficiency: f64,
    config: &MaintenanceConfig,
    dt: f64,
) -> (f64, Option<Arrival>) {
    let ShipLocation::AtSea { position, route } = &mut ship.location else {
        return (0.0, None);
    };

    let speed = ship.base_speed
        * event_speed_multiplier
        * condition_speed_multiplier(ship.condition, config)
        * crew_efficiency;
    if speed <= 0.0 {
        // Becalmed: a ship without an operating crew drifts in place.
        return (0.0, None);
    }

    let remaining = route.total_distance * (1.0 - route.progress);
    let distance = (speed * dt).min(remaining);
    route.progress = (route.progress + distance / route.total_distance.max(1e-9)).min(1.0);
    route.remaining_eta_hours = (route.total_distance * (1.0 - route.progress)) / speed;

    let origin = positions.get(&route.origin).copied();
    let destination_pos = positions.get(&route.destination).copied();
    if let (Some(origin), Some(destination_pos)) = (origin, destination_pos) {
        *position = origin.lerp(&destination_pos, route.progress);
    }

    ship.total_distance_traveled += distance;

    if route.remaining_eta_hours <= 1e-9 || route.progress >= 1.0 - 1e-9 {
        let arrival = Arrival {
            ship_id: ship.id.clone(),
            island_id: route.destination.clone(),
            distance: route.total_distance,
        };
        debug!("{} arrived at {}", ship.id, arrival.island_id);
        ship.location = ShipLocation::AtIsland { island_id: arrival.island_id.clone() };
        return (distance, Some(arrival));
    }
    (distance, None)
}

/// Applies hull wear for one at-sea tick.
pub fn apply_wear(
    ship: &mut ShipState,
    distance: f64,
    in_storm: bool,
    config: &MaintenanceConfig,
    dt: f64,
) {
    let mut wear = config.base_wear_rate * dt + config.distance_wear_rate * distance;
    if in_storm {
        wear *= config.storm_wear_multiplier;
    }
    ship.condition = (ship.condition - wear).max(0.0);
}

/// Charges the arrival transport cost, clamped to available cash.
/// Returns the amount actually debited (and destroyed).
pub fn charge_transport_cost(
    ship: &mut ShipState,
    distance: f64,
    goods: &BTreeMap<GoodId, GoodDefinition>,
    config: &ShippingConfig,
) -> f64 {
    let cost = config.base_voyage_cost
        + distance * config.cost_per_distance_unit
        + ship.cargo_volume(goods) * config.per_volume_handling_cost;
    let charged = cost.min(ship.cash);
    ship.cash -= charged;
    ship.last_voyage_cost = cost;
    ship.cumulative_transport_cost += charged;
    charged
}

/// Estimated cost of a voyage of `distance` carrying `volume`, for planning.
pub fn estimate_transport_cost(distance: f64, volume: f64, config: &ShippingConfig) -> f64 {
    config.base_voyage_cost
        + distance * config.cost_per_distance_unit
        + volume * config.per_volume_handling_cost
}

/// Rolls the sinking check for a critically damaged at-sea ship.
pub fn check_sinking(ship: &ShipState, config: &MaintenanceConfig, rng: &mut SeededRng) -> bool {
    if !ship.is_at_sea() || ship.condition >= config.critical_condition_threshold {
        return false;
    }
    let chance = config.sinking_chance_per_tick
        * (1.0 - ship.condition / config.critical_condition_threshold);
    let sank = rng.next_float_unit() < chance;
    if sank {
        warn!("{} foundered at sea (condition {:.2})", ship.id, ship.condition);
    }
    sank
}

/// Puts a docked ship to sea toward `destination`.
pub fn start_voyage(
    ship: &mut ShipState,
    positions: &BTreeMap<IslandId, Position>,
    destination: &str,
    event_speed_multiplier: f64,
) -> Result<(), String> {
    let origin_id = match ship.location.docked_island() {
        Some(island_id) => island_id.clone(),
        None => return Err(format!("{} is not docked", ship.id)),
    };
    if origin_id == destination {
        return Err(format!("{} is already at {}", ship.id, destination));
    }
    let origin = positions
        .get(&origin_id)
        .copied()
        .ok_or_else(|| format!("unknown origin island '{}'", origin_id))?;
    let target = positions
        .get(destination)
        .copied()
        .ok_or_else(|| format!("unknown destination island '{}'", destination))?;

    let distance = origin.distance_to(&target);
    let speed = (ship.base_speed * event_speed_multiplier).max(1e-9);
    ship.location = ShipLocation::AtSea {
        position: origin,
        route: Route {
            origin: origin_id,
            destination: destination.to_string(),
            total_distance: distance,
            remaining_eta_hours: distance / speed,
            progress: 0.0,
        },
    };
    info!("{} set sail for {} ({:.1} units)", ship.id, destination, distance);
    Ok(())
}

/// Repairs a docked ship, consuming island timber and ship coin.
/// One repair point restores 0.01 condition. Returns points applied.
pub fn repair_ship(
    ship: &mut ShipState,
    island: &mut IslandState,
    config: &MaintenanceConfig,
    dt: f64,
) -> f64 {
    if ship.condition >= 1.0 {
        return 0.0;
    }
    let desired_condition = (config.repair_rate_at_island * dt).min(1.0 - ship.condition);
    let desired_points = desired_condition / 0.01;

    let timber_limit = if config.timber_cost_per_point > 0.0 {
        island.inventory_of(GoodId::Timber) / config.timber_cost_per_point
    } else {
        f64::INFINITY
    };
    let coin_limit = if config.coin_cost_per_point > 0.0 {
        ship.cash / config.coin_cost_per_point
    } else {
        f64::INFINITY
    };
    let points = desired_points.min(timber_limit).min(coin_limit).max(0.0);
    if points <= 0.0 {
        return 0.0;
    }

    island.add_inventory(GoodId::Timber, -points * config.timber_cost_per_point);
    ship.cash = (ship.cash - points * config.coin_cost_per_point).max(0.0);
    ship.condition = (ship.condition + points * 0.01).min(1.0);
    points
}
