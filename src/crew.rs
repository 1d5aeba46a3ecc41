//! Crew economics: wages, morale, desertion, and the efficiency multiplier
//! the shipping engine applies to speed.
//!
//! Per ship per tick the order is fixed: pay wages, update morale, then
//! process desertion. Wages leave the economy (they are a sink tracked in
//! the world metrics).

use crate::config::CrewConfig;
use crate::ship::ShipState;
use log::debug;
use serde::{Deserialize, Serialize};

/// What happened to one ship's crew this tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrewTickOutcome {
    pub wages_paid: f64,
    pub fully_paid: bool,
    pub deserters: u32,
    pub morale: f64,
}

/// Minimum crew needed to work the ship at all.
pub fn minimum_operating_crew(capacity: u32, config: &CrewConfig) -> u32 {
    (capacity as f64 * config.min_crew_fraction).ceil() as u32
}

/// Pays wages, updates morale, and processes desertion for one ship.
///
/// `docked` controls the at-sea morale penalty and where deserters go:
/// dockside deserters rejoin the island population (the caller credits
/// them), at-sea deserters are simply lost.
pub fn tick_crew(ship: &mut ShipState, docked: bool, config: &CrewConfig, dt: f64) -> CrewTickOutcome {
    let crew = &mut ship.crew;
    if crew.count == 0 {
        return CrewTickOutcome { morale: crew.morale, ..CrewTickOutcome::default() };
    }

    // Wages
    let owed = crew.count as f64 * crew.wage_rate * dt;
    let paid = owed.min(ship.cash);
    ship.cash -= paid;
    let fully_paid = owed - paid < 1e-9;
    if fully_paid {
        crew.unpaid_ticks = 0;
    } else {
        crew.unpaid_ticks += 1;
    }

    // Morale
    let mut delta = 0.0;
    if fully_paid {
        delta += config.morale_recovery_rate * dt;
        if docked {
            delta += 0.5 * config.morale_recovery_rate * dt;
        }
    } else {
        let mut decay = config.morale_decay_rate;
        if crew.unpaid_ticks as f64 > config.unpaid_desertion_threshold as f64 / 2.0 {
            decay *= 2.0;
        }
        delta -= decay * dt;
    }
    if !docked {
        delta -= config.at_sea_morale_penalty * dt;
    }
    if crew.count < crew.capacity / 2 {
        delta -= config.low_crew_morale_penalty * dt;
    }
    if crew.count < minimum_operating_crew(crew.capacity, config) {
        delta -= 2.0 * config.morale_decay_rate * dt;
    }
    crew.morale = (crew.morale + delta).clamp(0.0, 1.0);

    // Desertion
    let morale_broken = crew.morale < config.desertion_morale_threshold;
    let unpaid_too_long = crew.unpaid_ticks >= config.unpaid_desertion_threshold;
    let mut deserters = 0u32;
    if morale_broken || unpaid_too_long {
        let multiplier = morale_broken as u32 + unpaid_too_long as u32;
        deserters =
            (crew.count as f64 * config.desertion_rate * multiplier as f64 * dt).floor() as u32;
        deserters = deserters.min(crew.count);
        crew.count -= deserters;
        if deserters > 0 {
            debug!(
                "{}: {} crew deserted ({})",
                ship.id,
                deserters,
                if docked { "returned ashore" } else { "lost at sea" }
            );
        }
    }

    CrewTickOutcome { wages_paid: paid, fully_paid, deserters, morale: crew.morale }
}

/// Crew-driven speed multiplier: 0.5 at the minimum operating crew, 1.0 at
/// full complement, scaled by morale at the extremes. Zero below the
/// minimum crew, which leaves the ship unable to move.
pub fn crew_efficiency(ship: &ShipState, config: &CrewConfig) -> f64 {
    let crew = &ship.crew;
    let min_crew = minimum_operating_crew(crew.capacity, config);
    if crew.count < min_crew {
        return 0.0;
    }
    let span = (crew.capacity - min_crew).max(1) as f64;
    let base = 0.5 + 0.5 * ((crew.count - min_crew) as f64 / span).min(1.0);
    let morale_factor = if crew.morale > config.morale_bonus_threshold {
        1.0 + config.efficiency_morale_bonus
    } else if crew.morale < config.morale_penalty_threshold {
        1.0 - config.efficiency_morale_penalty
    } else {
        1.0
    };
    base * morale_factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ship::{CrewState, ShipLocation, ShipState};
    use std::collections::BTreeMap;

    fn ship_with(cash: f64, count: u32, morale: f64) -> ShipState {
        ShipState {
            id: "petrel".to_string(),
            name: "Petrel".to_string(),
            owner_id: "trader-1".to_string(),
            cargo_capacity: 100.0,
            base_speed: 8.0,
            cash,
            cargo: BTreeMap::new(),
            location: ShipLocation::AtIsland { island_id: "shoalhold".to_string() },
            last_voyage_cost: 0.0,
            cumulative_transport_cost: 0.0,
            crew: CrewState { count, capacity: 10, morale, wage_rate: 1.0, unpaid_ticks: 0 },
            condition: 1.0,
            total_distance_traveled: 0.0,
            debt: None,
        }
    }

    #[test]
    fn test_wages_paid_from_cash() {
        let config = CrewConfig::default();
        let mut ship = ship_with(100.0, 10, 0.8);
        let outcome = tick_crew(&mut ship, true, &config, 1.0);
        assert!((outcome.wages_paid - 10.0).abs() < 1e-9);
        assert!(outcome.fully_paid);
        assert_eq!(ship.crew.unpaid_ticks, 0);
        assert!((ship.cash - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_unpaid_ticks_accumulate() {
        let config = CrewConfig::default();
        let mut ship = ship_with(0.0, 10, 0.8);
        for expected in 1..=5u32 {
            tick_crew(&mut ship, true, &config, 1.0);
            assert_eq!(ship.crew.unpaid_ticks, expected);
        }
    }

    #[test]
    fn test_morale_recovers_when_paid_at_dock() {
        let config = CrewConfig::default();
        let mut ship = ship_with(1000.0, 10, 0.5);
        tick_crew(&mut ship, true, &config, 1.0);
        let expected = 0.5 + 1.5 * config.morale_recovery_rate;
        assert!((ship.crew.morale - expected).abs() < 1e-9);
    }

    #[test]
    fn test_morale_decays_unpaid_and_at_sea() {
        let config = CrewConfig::default();
        let mut ship = ship_with(0.0, 10, 0.8);
        tick_crew(&mut ship, false, &config, 1.0);
        assert!(ship.crew.morale < 0.8);
    }

    #[test]
    fn test_unpaid_decay_doubles_past_half_threshold() {
        let config = CrewConfig::default();
        let mut early = ship_with(0.0, 10, 0.8);
        let mut late = ship_with(0.0, 10, 0.8);
        late.crew.unpaid_ticks = config.unpaid_desertion_threshold;
        tick_crew(&mut early, true, &config, 1.0);
        tick_crew(&mut late, true, &config, 1.0);
        let early_loss = 0.8 - early.crew.morale;
        let late_loss = 0.8 - late.crew.morale;
        assert!((late_loss / early_loss - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_desertion_after_unpaid_threshold() {
        let config = CrewConfig::default();
        let mut ship = ship_with(0.0, 10, 0.8);
        let mut total_deserters = 0;
        for _ in 0..48 {
            let outcome = tick_crew(&mut ship, true, &config, 1.0);
            total_deserters += outcome.deserters;
        }
        assert!(total_deserters > 0, "unpaid crew should desert");
        assert!(ship.crew.count < 10);
    }

    #[test]
    fn test_desertion_multiplier_doubles_when_both_conditions() {
        let config = CrewConfig::default();
        // Large crew so floor() does not hide the difference.
        let mut one_condition = ship_with(0.0, 100, 0.1);
        one_condition.crew.capacity = 100;
        let mut both_conditions = ship_with(0.0, 100, 0.1);
        both_conditions.crew.capacity = 100;
        both_conditions.crew.unpaid_ticks = config.unpaid_desertion_threshold;
        let a = tick_crew(&mut one_condition, true, &config, 1.0);
        let b = tick_crew(&mut both_conditions, true, &config, 1.0);
        assert!(b.deserters > a.deserters);
    }

    #[test]
    fn test_efficiency_zero_below_minimum_crew() {
        let config = CrewConfig::default();
        let ship = ship_with(100.0, 2, 0.8);
        assert_eq!(crew_efficiency(&ship, &config), 0.0);
    }

    #[test]
    fn test_efficiency_range() {
        let config = CrewConfig::default();
        let full = ship_with(100.0, 10, 0.5);
        let min_crew = minimum_operating_crew(10, &config);
        let skeleton = ship_with(100.0, min_crew, 0.5);
        assert!((crew_efficiency(&full, &config) - 1.0).abs() < 1e-9);
        assert!((crew_efficiency(&skeleton, &config) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_morale_modifiers() {
        let config = CrewConfig::default();
        let cheerful = ship_with(100.0, 10, 0.9);
        let neutral = ship_with(100.0, 10, 0.5);
        let sullen = ship_with(100.0, 10, 0.2);
        assert!(crew_efficiency(&cheerful, &config) > crew_efficiency(&neutral, &config));
        assert!(crew_efficiency(&sullen, &config) < crew_efficiency(&neutral, &config));
    }

    #[test]
    fn test_morale_clamped_to_unit() {
        let config = CrewConfig::default();
        let mut ship = ship_with(1_000_000.0, 10, 0.99);
        for _ in 0..1000 {
            tick_crew(&mut ship, true, &config, 1.0);
        }
        assert!(ship.crew.morale <= 1.0);
    }
}
