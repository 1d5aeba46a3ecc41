//! World events: transient perturbations and supply shocks.
//!
//! Events are drawn each tick from the seeded RNG with weighted type and
//! target tables. Active events carry a modifier bag that downstream stages
//! (production, consumption, shipping, market) fold into their math.
//! Boom/bust production shocks are scheduled separately as sparse per-island
//! per-good entries that expire by tick countdown.

use crate::config::{DurationRange, EventConfig};
use crate::island::IslandId;
use crate::rng::SeededRng;
use crate::ship::ShipId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type alias for event identifiers.
pub type EventId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Storm,
    Blight,
    Festival,
    Discovery,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventType::Storm => "storm",
            EventType::Blight => "blight",
            EventType::Festival => "festival",
            EventType::Discovery => "discovery",
        };
        write!(f, "{}", s)
    }
}

/// What an event applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventTarget {
    Island { island_id: IslandId },
    Ship { ship_id: ShipId },
    Global,
}

/// Multiplier bag applied by downstream stages. Multipliers default to 1,
/// additive boosts to 0, so combining is multiply/add respectively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventModifiers {
    pub ship_speed_multiplier: f64,
    pub spoilage_multiplier: f64,
    pub soil_regen_multiplier: f64,
    pub grain_production_multiplier: f64,
    pub luxury_demand_multiplier: f64,
    pub food_demand_multiplier: f64,
    pub tool_efficiency_boost: f64,
}

impl Default for EventModifiers {
    fn default() -> Self {
        Self {
            ship_speed_multiplier: 1.0,
            spoilage_multiplier: 1.0,
            soil_regen_multiplier: 1.0,
            grain_production_multiplier: 1.0,
            luxury_demand_multiplier: 1.0,
            food_demand_multiplier: 1.0,
            tool_efficiency_boost: 0.0,
        }
    }
}

impl EventModifiers {
    /// Folds another modifier bag into this one.
    pub fn combine(&mut self, other: &EventModifiers) {
        self.ship_speed_multiplier *= other.ship_speed_multiplier;
        self.spoilage_multiplier *= other.spoilage_multiplier;
        self.soil_regen_multiplier *= other.soil_regen_multiplier;
        self.grain_production_multiplier *= other.grain_production_multiplier;
        self.luxury_demand_multiplier *= other.luxury_demand_multiplier;
        self.food_demand_multiplier *= other.food_demand_multiplier;
        self.tool_efficiency_boost += other.tool_efficiency_boost;
    }
}

/// A transient perturbation, active while `start_tick <= t < end_tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldEvent {
    pub id: EventId,
    pub event_type: EventType,
    pub target: EventTarget,
    pub start_tick: u64,
    /// Exclusive; the event is dropped in the tick it expires.
    pub end_tick: u64,
    pub modifiers: EventModifiers,
}

impl WorldEvent {
    pub fn is_active(&self, tick: u64) -> bool {
        self.start_tick <= tick && tick < self.end_tick
    }

    fn applies_to_island(&self, island_id: &str) -> bool {
        match &self.target {
            EventTarget::Global => true,
            EventTarget::Island { island_id: target } => target == island_id,
            EventTarget::Ship { .. } => false,
        }
    }

    fn applies_to_ship(&self, ship_id: &str) -> bool {
        match &self.target {
            EventTarget::Global => true,
            EventTarget::Ship { ship_id: target } => target == ship_id,
            EventTarget::Island { .. } => false,
        }
    }
}

/// Combined modifiers from all events touching an island this tick.
pub fn modifiers_for_island(events: &[WorldEvent], island_id: &str) -> EventModifiers {
    let mut combined = EventModifiers::default();
    for event in events.iter().filter(|e| e.applies_to_island(island_id)) {
        combined.combine(&event.modifiers);
    }
    combined
}

/// Combined modifiers from all events touching a ship this tick.
pub fn modifiers_for_ship(events: &[WorldEvent], ship_id: &str) -> EventModifiers {
    let mut combined = EventModifiers::default();
    for event in events.iter().filter(|e| e.applies_to_ship(ship_id)) {
        combined.combine(&event.modifiers);
    }
    combined
}

/// True if a storm targets this ship or is global.
pub fn storm_hits_ship(events: &[WorldEvent], ship_id: &str) -> bool {
    events
        .iter()
        .any(|e| e.event_type == EventType::Storm && e.applies_to_ship(ship_id))
}

/// Boom or bust entry in an island's sparse shock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShockKind {
    Boom,
    Bust,
}

/// A supply shock on one good of one island.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionShock {
    pub kind: ShockKind,
    pub multiplier: f64,
    pub ticks_remaining: u64,
}

fn draw_duration(rng: &mut SeededRng, range: DurationRange) -> u64 {
    if range.max <= range.min {
        range.min
    } else {
        range.min + rng.next_u64() % (range.max - range.min + 1)
    }
}

/// Draws this tick's new events from the weighted type and target tables.
///
/// Island and ship id slices must be in sorted order; the generator indexes
/// into them with RNG draws, so order is part of the deterministic contract.
pub fn generate_events(
    config: &EventConfig,
    tick: u64,
    island_ids: &[IslandId],
    ship_ids: &[ShipId],
    rng: &mut SeededRng,
) -> Vec<WorldEvent> {
    let mut spawned = Vec::new();
    if island_ids.is_empty() || rng.next_float_unit() >= config.event_chance_per_tick {
        return spawned;
    }

    let total_weight = config.storm_weight
        + config.blight_weight
        + config.festival_weight
        + config.discovery_weight;
    if total_weight <= 0.0 {
        return spawned;
    }
    let mut draw = rng.next_float_unit() * total_weight;
    let event_type = if draw < config.storm_weight {
        EventType::Storm
    } else {
        draw -= config.storm_weight;
        if draw < config.blight_weight {
            EventType::Blight
        } else {
            draw -= config.blight_weight;
            if draw < config.festival_weight {
                EventType::Festival
            } else {
                EventType::Discovery
            }
        }
    };

    let (target, duration, modifiers) = match event_type {
        EventType::Storm => {
            // Storms hit a ship at sea when one exists, otherwise blow globally.
            let target = if !ship_ids.is_empty() && rng.next_float_unit() < 0.5 {
                EventTarget::Ship { ship_id: ship_ids[rng.next_index(ship_ids.len())].clone() }
            } else {
                EventTarget::Global
            };
            let duration = draw_duration(rng, config.storm_duration);
            let modifiers = EventModifiers {
                ship_speed_multiplier: config.storm_speed_multiplier,
                spoilage_multiplier: config.storm_spoilage_multiplier,
                ..EventModifiers::default()
            };
            (target, duration, modifiers)
        }
        EventType::Blight => {
            let island = island_ids[rng.next_index(island_ids.len())].clone();
            let duration = draw_duration(rng, config.blight_duration);
            let modifiers = EventModifiers {
                grain_production_multiplier: config.blight_grain_multiplier,
                soil_regen_multiplier: config.blight_soil_regen_multiplier,
                ..EventModifiers::default()
            };
            (EventTarget::Island { island_id: island }, duration, modifiers)
        }
        EventType::Festival => {
            let island = island_ids[rng.next_index(island_ids.len())].clone();
            let duration = draw_duration(rng, config.festival_duration);
            let modifiers = EventModifiers {
                luxury_demand_multiplier: config.festival_luxury_demand,
                food_demand_multiplier: config.festival_food_demand,
                ..EventModifiers::default()
            };
            (EventTarget::Island { island_id: island }, duration, modifiers)
        }
        EventType::Discovery => {
            let island = island_ids[rng.next_index(island_ids.len())].clone();
            let duration = draw_duration(rng, config.discovery_duration);
            let modifiers = EventModifiers {
                tool_efficiency_boost: config.discovery_tool_boost,
                ..EventModifiers::default()
            };
            (EventTarget::Island { island_id: island }, duration, modifiers)
        }
    };

    spawned.push(WorldEvent {
        id: format!("evt-{:08}-{}", tick, event_type),
        event_type,
        target,
        start_tick: tick,
        end_tick: tick + duration.max(1),
        modifiers,
    });
    spawned
}

/// Rolls for a new boom/bust shock. Returns the chosen island, good, and
/// shock; the caller installs it into the island's sparse table.
pub fn generate_shock(
    config: &EventConfig,
    island_ids: &[IslandId],
    goods: &[crate::goods::GoodId],
    rng: &mut SeededRng,
) -> Option<(IslandId, crate::goods::GoodId, ProductionShock)> {
    if island_ids.is_empty() || goods.is_empty() {
        return None;
    }
    if rng.next_float_unit() >= config.shock_chance_per_tick {
        return None;
    }
    let island = island_ids[rng.next_index(island_ids.len())].clone();
    let good = goods[rng.next_index(goods.len())];
    let kind = if rng.next_float_unit() < 0.5 { ShockKind::Boom } else { ShockKind::Bust };
    let (lo, hi) = match kind {
        ShockKind::Boom => config.boom_multiplier_range,
        ShockKind::Bust => config.bust_multiplier_range,
    };
    let multiplier = rng.next_float_range(lo, hi);
    let ticks_remaining = draw_duration(rng, config.shock_duration);
    Some((island, good, ProductionShock { kind, multiplier, ticks_remaining }))
}
