//! Simulation configuration parameters.
//!
//! One [`SimulationConfig`] value is passed at startup and never mutated
//! during a run except through the command boundary's override merge, which
//! is applied between ticks. Every tunable the engine reads lives here,
//! grouped into serde sections so partial YAML/TOML files can override just
//! the knobs they care about.

use crate::error::{Result, SimulationError};
use crate::goods::{GoodCategory, GoodId, LaborSector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Preset configuration names for typical simulation scenarios
#[derive(Debug, Clone, PartialEq)]
pub enum PresetName {
    Default,
    SmallArchipelago,
    LargeArchipelago,
    Scarcity,
    StormSeason,
    QuickTest,
}

impl PresetName {
    /// Get all available preset names
    pub fn all() -> Vec<PresetName> {
        vec![
            PresetName::Default,
            PresetName::SmallArchipelago,
            PresetName::LargeArchipelago,
            PresetName::Scarcity,
            PresetName::StormSeason,
            PresetName::QuickTest,
        ]
    }

    /// Get the string identifier for this preset
    pub fn as_str(&self) -> &str {
        match self {
            PresetName::Default => "default",
            PresetName::SmallArchipelago => "small_archipelago",
            PresetName::LargeArchipelago => "large_archipelago",
            PresetName::Scarcity => "scarcity",
            PresetName::StormSeason => "storm_season",
            PresetName::QuickTest => "quick_test",
        }
    }

    /// Get a description of this preset
    pub fn description(&self) -> &str {
        match self {
            PresetName::Default => "Standard archipelago: 6 islands, 3 traders, 2000 ticks",
            PresetName::SmallArchipelago => "Three islands and one trader for quick studies",
            PresetName::LargeArchipelago => "Twelve islands, six traders, long horizon",
            PresetName::Scarcity => "Depleted ecosystems and thin treasuries",
            PresetName::StormSeason => "Frequent storms, high spoilage and wear",
            PresetName::QuickTest => "Tiny world for rapid testing (2 islands, 200 ticks)",
        }
    }
}

/// Implement FromStr trait for parsing preset names from strings
impl FromStr for PresetName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(PresetName::Default),
            "small_archipelago" | "small" => Ok(PresetName::SmallArchipelago),
            "large_archipelago" | "large" => Ok(PresetName::LargeArchipelago),
            "scarcity" => Ok(PresetName::Scarcity),
            "storm_season" | "storms" => Ok(PresetName::StormSeason),
            "quick_test" | "quick" => Ok(PresetName::QuickTest),
            _ => Err(format!("Unknown preset: '{}'", s)),
        }
    }
}

/// Per-category market tuning: price elasticity (the pressure exponent),
/// velocity coupling, and how many game-days of consumption the ideal
/// stock represents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GoodMarketConfig {
    pub price_elasticity: f64,
    pub velocity_coefficient: f64,
    pub ideal_stock_days: f64,
}

impl Default for GoodMarketConfig {
    fn default() -> Self {
        Self { price_elasticity: 0.8, velocity_coefficient: 0.3, ideal_stock_days: 15.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketConfig {
    /// EMA smoothing factor applied between the raw price and the quoted price.
    pub price_lambda: f64,
    /// Absolute price floor, further tightened by `0.2 * base_price` per good.
    pub min_price: f64,
    /// Absolute price ceiling, further tightened by `20 * base_price` per good.
    pub max_price: f64,
    /// EMA smoothing for the consumption-velocity estimate.
    pub velocity_lambda: f64,
    pub good_market_configs: BTreeMap<GoodCategory, GoodMarketConfig>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        let mut good_market_configs = BTreeMap::new();
        good_market_configs.insert(
            GoodCategory::Food,
            GoodMarketConfig {
                price_elasticity: 0.6,
                velocity_coefficient: 0.4,
                ideal_stock_days: 10.0,
            },
        );
        good_market_configs.insert(
            GoodCategory::Material,
            GoodMarketConfig {
                price_elasticity: 0.9,
                velocity_coefficient: 0.3,
                ideal_stock_days: 20.0,
            },
        );
        good_market_configs.insert(
            GoodCategory::Tool,
            GoodMarketConfig {
                price_elasticity: 0.8,
                velocity_coefficient: 0.2,
                ideal_stock_days: 30.0,
            },
        );
        good_market_configs.insert(
            GoodCategory::Luxury,
            GoodMarketConfig {
                price_elasticity: 1.4,
                velocity_coefficient: 0.5,
                ideal_stock_days: 15.0,
            },
        );
        Self {
            price_lambda: 0.25,
            min_price: 0.5,
            max_price: 1000.0,
            velocity_lambda: 0.1,
            good_market_configs,
        }
    }
}

impl MarketConfig {
    pub fn for_category(&self, category: GoodCategory) -> GoodMarketConfig {
        self.good_market_configs.get(&category).cloned().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarketDepthConfig {
    /// Floor below which neither side's depth can be consumed.
    pub min_depth: f64,
    /// Depth regenerates toward `ideal_stock * base_depth_multiplier`.
    pub base_depth_multiplier: f64,
    /// Fraction of the gap to target recovered per tick.
    pub depth_recovery_rate: f64,
    /// Linear price-impact coefficient `k`.
    pub price_impact_coefficient: f64,
}

impl Default for MarketDepthConfig {
    fn default() -> Self {
        Self {
            min_depth: 5.0,
            base_depth_multiplier: 0.2,
            depth_recovery_rate: 0.1,
            price_impact_coefficient: 0.15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsumptionConfig {
    /// Food units consumed per person per game-hour.
    pub food_per_capita: f64,
    /// Luxury units consumed per person per game-hour.
    pub luxury_per_capita: f64,
    pub food_price_elasticity: f64,
    pub luxury_price_elasticity: f64,
    pub food_substitution_elasticity: f64,
    pub health_consumption_factor: f64,
}

impl Default for ConsumptionConfig {
    fn default() -> Self {
        Self {
            food_per_capita: 0.02,
            luxury_per_capita: 0.01,
            food_price_elasticity: 0.3,
            luxury_price_elasticity: 1.2,
            food_substitution_elasticity: 1.0,
            health_consumption_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PopulationConfig {
    /// Maximum annual growth rate at optimal health.
    pub max_growth_rate: f64,
    /// Maximum annual decline rate at crisis health. Famine mortality runs
    /// much faster than healthy growth.
    pub max_decline_rate: f64,
    pub crisis_health_threshold: f64,
    pub stable_health_threshold: f64,
    pub optimal_health_threshold: f64,
    /// Health below which population size begins to decline.
    pub population_decline_threshold: f64,
    /// Health lost per unit of relative food deficit per tick.
    pub health_penalty_rate: f64,
    /// Health regained per tick when fully fed.
    pub health_recovery_rate: f64,
    /// Extra health penalty per tick when no food at all was consumed.
    pub starvation_penalty: f64,
    /// Health bonus per tick scaled by luxury consumption per capita.
    pub luxury_health_bonus: f64,
    /// Exponent on relative wage when computing target labor shares.
    pub wage_responsiveness: f64,
    /// Maximum share points a sector can gain or lose per game-hour.
    pub reallocation_rate: f64,
    pub min_sector_share: f64,
    pub max_sector_share: f64,
    /// Reference labor split used both at init and as the wage baseline.
    pub base_shares: BTreeMap<LaborSector, f64>,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        let mut base_shares = BTreeMap::new();
        base_shares.insert(LaborSector::Farming, 0.30);
        base_shares.insert(LaborSector::Fishing, 0.25);
        base_shares.insert(LaborSector::Forestry, 0.15);
        base_shares.insert(LaborSector::Crafts, 0.15);
        base_shares.insert(LaborSector::Services, 0.15);
        Self {
            max_growth_rate: 0.02,
            max_decline_rate: 0.15,
            crisis_health_threshold: 0.25,
            stable_health_threshold: 0.5,
            optimal_health_threshold: 0.8,
            population_decline_threshold: 0.4,
            health_penalty_rate: 0.15,
            health_recovery_rate: 0.01,
            starvation_penalty: 0.05,
            luxury_health_bonus: 0.002,
            wage_responsiveness: 0.5,
            reallocation_rate: 0.002,
            min_sector_share: 0.02,
            max_sector_share: 0.7,
            base_shares,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProductionConfig {
    /// Exponent on relative labor share (diminishing returns, capped at 2x).
    pub labour_alpha: f64,
    /// Coefficient on the logarithmic tool bonus.
    pub tool_beta: f64,
    /// Scales how strongly the tool stock registers per capita.
    pub tool_sensitivity: f64,
    /// Base output per game-hour at reference labor, full ecosystem, full health.
    pub base_rates: BTreeMap<GoodId, f64>,
    /// How strongly each good's output couples to its ecosystem ratio.
    pub ecosystem_sensitivity: BTreeMap<GoodId, f64>,
    /// Sigma of the per-good log-normal output noise. None disables noise.
    pub supply_volatility: Option<f64>,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        let mut base_rates = BTreeMap::new();
        base_rates.insert(GoodId::Grain, 14.0);
        base_rates.insert(GoodId::Fish, 10.0);
        base_rates.insert(GoodId::Timber, 6.0);
        base_rates.insert(GoodId::Tools, 2.0);
        base_rates.insert(GoodId::Luxuries, 1.0);
        let mut ecosystem_sensitivity = BTreeMap::new();
        ecosystem_sensitivity.insert(GoodId::Grain, 1.0);
        ecosystem_sensitivity.insert(GoodId::Fish, 1.2);
        ecosystem_sensitivity.insert(GoodId::Timber, 1.0);
        ecosystem_sensitivity.insert(GoodId::Tools, 0.0);
        ecosystem_sensitivity.insert(GoodId::Luxuries, 0.0);
        Self {
            labour_alpha: 0.7,
            tool_beta: 0.15,
            tool_sensitivity: 1.0,
            base_rates,
            ecosystem_sensitivity,
            supply_volatility: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FishMigrationConfig {
    /// Islands below this stock ratio shed fish.
    pub depleted_threshold: f64,
    /// Islands above this stock ratio receive migrants.
    pub healthy_threshold: f64,
    /// Fraction of stock migrating per hour at full depletion severity.
    pub migration_rate: f64,
    /// Outflows smaller than this are skipped entirely.
    pub min_migration_amount: f64,
}

impl Default for FishMigrationConfig {
    fn default() -> Self {
        Self {
            depleted_threshold: 0.25,
            healthy_threshold: 0.6,
            migration_rate: 0.01,
            min_migration_amount: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EcologyConfig {
    /// Stock ratio below which a resource is dead. Doubles as the floor of
    /// the collapsed hysteresis band.
    pub dead_threshold: f64,
    /// Yield-curve knee: ratio at which yield reaches `collapse_floor`.
    /// Doubles as the ceiling of the collapsed hysteresis band.
    pub collapse_threshold: f64,
    /// Yield multiplier at the collapse threshold.
    pub collapse_floor: f64,
    /// Yield-curve knee between the quadratic and linear segments.
    pub critical_threshold: f64,
    /// Yield multiplier at the critical threshold.
    pub critical_yield: f64,
    /// Ratio at which yield reaches 1.0.
    pub healthy_threshold: f64,
    /// Fraction of extracted biomass that becomes sellable product.
    pub harvest_efficiency: f64,
    pub impaired_recovery_multiplier: f64,
    pub collapsed_recovery_multiplier: f64,
    /// Flat absolute regrowth per hour for a dead stock.
    pub dead_recovery_rate: f64,
    /// Logistic regeneration rate for fish stocks.
    pub fish_regen_rate: f64,
    /// Logistic regeneration rate for forest biomass.
    pub forest_regen_rate: f64,
    /// Soil fertility lost per hour at full farming intensity.
    pub soil_depletion_rate: f64,
    /// Soil fertility regained per hour of rest.
    pub soil_regen_rate: f64,
    /// Regeneration multiplier when farming share drops below 0.1.
    pub fallow_bonus: f64,
    pub fish_migration: FishMigrationConfig,
}

impl Default for EcologyConfig {
    fn default() -> Self {
        Self {
            dead_threshold: 0.02,
            collapse_threshold: 0.1,
            collapse_floor: 0.2,
            critical_threshold: 0.3,
            critical_yield: 0.6,
            healthy_threshold: 0.6,
            harvest_efficiency: 0.9,
            impaired_recovery_multiplier: 0.5,
            collapsed_recovery_multiplier: 0.1,
            dead_recovery_rate: 0.05,
            fish_regen_rate: 0.004,
            forest_regen_rate: 0.002,
            soil_depletion_rate: 0.004,
            soil_regen_rate: 0.002,
            fallow_bonus: 2.0,
            fish_migration: FishMigrationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShippingConfig {
    /// Fixed cost charged once per completed voyage.
    pub base_voyage_cost: f64,
    pub cost_per_distance_unit: f64,
    pub per_volume_handling_cost: f64,
    /// Fraction of the outbound transport cost attributed to the return leg
    /// when the executor evaluates round trips.
    pub empty_return_multiplier: f64,
}

impl Default for ShippingConfig {
    fn default() -> Self {
        Self {
            base_voyage_cost: 5.0,
            cost_per_distance_unit: 0.2,
            per_volume_handling_cost: 0.05,
            empty_return_multiplier: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrewConfig {
    /// Coin per crew member per game-hour.
    pub default_wage_rate: f64,
    pub morale_decay_rate: f64,
    pub morale_recovery_rate: f64,
    pub at_sea_morale_penalty: f64,
    pub low_crew_morale_penalty: f64,
    pub desertion_morale_threshold: f64,
    /// Consecutive unpaid ticks after which desertion begins.
    pub unpaid_desertion_threshold: u32,
    /// Fraction of crew deserting per hour once triggered.
    pub desertion_rate: f64,
    /// Minimum operating crew as a fraction of capacity.
    pub min_crew_fraction: f64,
    pub morale_bonus_threshold: f64,
    pub morale_penalty_threshold: f64,
    pub efficiency_morale_bonus: f64,
    pub efficiency_morale_penalty: f64,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            default_wage_rate: 0.5,
            morale_decay_rate: 0.01,
            morale_recovery_rate: 0.005,
            at_sea_morale_penalty: 0.002,
            low_crew_morale_penalty: 0.003,
            desertion_morale_threshold: 0.3,
            unpaid_desertion_threshold: 24,
            desertion_rate: 0.25,
            min_crew_fraction: 0.3,
            morale_bonus_threshold: 0.7,
            morale_penalty_threshold: 0.4,
            efficiency_morale_bonus: 0.1,
            efficiency_morale_penalty: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Condition lost per hour at sea regardless of distance.
    pub base_wear_rate: f64,
    /// Condition lost per distance unit traveled.
    pub distance_wear_rate: f64,
    pub storm_wear_multiplier: f64,
    /// Speed penalty factor applied as `1 - (1 - condition) * penalty`.
    pub speed_condition_penalty: f64,
    /// Below this condition the ship risks sinking.
    pub critical_condition_threshold: f64,
    pub sinking_chance_per_tick: f64,
    /// Condition restored per hour when repairing at an island.
    pub repair_rate_at_island: f64,
    /// Timber consumed per repair point (one point = 0.01 condition).
    pub timber_cost_per_point: f64,
    /// Coin consumed per repair point.
    pub coin_cost_per_point: f64,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            base_wear_rate: 0.0005,
            distance_wear_rate: 0.0002,
            storm_wear_multiplier: 3.0,
            speed_condition_penalty: 0.5,
            critical_condition_threshold: 0.3,
            sinking_chance_per_tick: 0.01,
            repair_rate_at_island: 0.02,
            timber_cost_per_point: 0.5,
            coin_cost_per_point: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BuildingsConfig {
    /// Condition lost per hour by every standing building.
    pub condition_decay_rate: f64,
    /// How strongly building level scales each effect.
    pub level_effect_multiplier: f64,
    /// Price stabilization per effective market-building level.
    pub market_stabilization: f64,
    /// Tool output bonus per effective workshop level.
    pub workshop_tool_bonus: f64,
    /// Spoilage multiplier for ships docked where a warehouse stands.
    pub warehouse_spoilage_multiplier: f64,
}

impl Default for BuildingsConfig {
    fn default() -> Self {
        Self {
            condition_decay_rate: 0.0002,
            level_effect_multiplier: 0.5,
            market_stabilization: 0.15,
            workshop_tool_bonus: 0.25,
            warehouse_spoilage_multiplier: 0.5,
        }
    }
}

/// Inclusive tick-duration range for generated events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DurationRange {
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventConfig {
    /// Probability of spawning one candidate event per tick.
    pub event_chance_per_tick: f64,
    pub storm_weight: f64,
    pub blight_weight: f64,
    pub festival_weight: f64,
    pub discovery_weight: f64,
    pub storm_duration: DurationRange,
    pub storm_speed_multiplier: f64,
    pub storm_spoilage_multiplier: f64,
    pub blight_duration: DurationRange,
    pub blight_grain_multiplier: f64,
    pub blight_soil_regen_multiplier: f64,
    pub festival_duration: DurationRange,
    pub festival_luxury_demand: f64,
    pub festival_food_demand: f64,
    pub discovery_duration: DurationRange,
    pub discovery_tool_boost: f64,
    /// Probability of scheduling a boom/bust production shock per tick.
    pub shock_chance_per_tick: f64,
    pub shock_duration: DurationRange,
    pub boom_multiplier_range: (f64, f64),
    pub bust_multiplier_range: (f64, f64),
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            event_chance_per_tick: 0.02,
            storm_weight: 0.4,
            blight_weight: 0.2,
            festival_weight: 0.25,
            discovery_weight: 0.15,
            storm_duration: DurationRange { min: 3, max: 8 },
            storm_speed_multiplier: 0.4,
            storm_spoilage_multiplier: 2.0,
            blight_duration: DurationRange { min: 48, max: 120 },
            blight_grain_multiplier: 0.6,
            blight_soil_regen_multiplier: 0.7,
            festival_duration: DurationRange { min: 24, max: 48 },
            festival_luxury_demand: 2.0,
            festival_food_demand: 1.3,
            discovery_duration: DurationRange { min: 72, max: 72 },
            discovery_tool_boost: 0.2,
            shock_chance_per_tick: 0.01,
            shock_duration: DurationRange { min: 24, max: 96 },
            boom_multiplier_range: (1.5, 2.5),
            bust_multiplier_range: (0.3, 0.7),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// Minimum ticks between two deep-reasoning engagements per agent.
    pub min_reasoning_cooldown: u64,
    /// Ticks of quiet after which a TIME_ELAPSED trigger fires.
    pub periodic_review_ticks: u64,
    /// How long an advisor strategy stays valid; fallback gets half.
    pub strategy_validity_ticks: u64,
    /// Triggers below this priority do not count toward escalation.
    pub min_trigger_priority: u8,
    /// Cross-island relative price gap that fires PRICE_DIVERGENCE.
    pub price_divergence_threshold: f64,
    /// Price observations older than this many ticks count as stale.
    pub stale_price_age: u64,
    /// Fraction of stale islands that forces re-reasoning.
    pub stale_price_fraction: f64,
    /// Fraction of stale islands that flips the fallback goal to explore.
    pub explore_stale_fraction: f64,
    /// Average fleet debt ratio that forces re-reasoning.
    pub high_debt_ratio: f64,
    /// Debt ratio at which a profit goal is reconsidered.
    pub goal_mismatch_debt_ratio: f64,
    /// Net margin below which the executor refuses a round trip.
    pub min_profit_margin: f64,
    pub max_acceptable_debt_ratio: f64,
    /// Cap on the share of an island's import budget one trade may absorb.
    pub max_treasury_fraction: f64,
    /// Cap on the share of its treasury an island spends in one transaction.
    pub max_spend_ratio: f64,
    pub enforce_purchasing_power: bool,
    /// Margin discount per tick of price-observation age.
    pub stale_discount_per_tick: f64,
    /// Minimum destination sell-depth as a fraction of planned quantity.
    pub min_depth_ratio: f64,
    /// Coin per game-day a ship costs to operate (executor planning only).
    pub operating_cost_per_day: f64,
    /// Ticks the manager waits for an advisor reply before falling back.
    pub advisor_deadline_ticks: u64,
    /// Whether the external advisor channel is consulted at all.
    pub advisor_enabled: bool,
    /// Quantity scaling per strategy risk tolerance.
    pub risk_scale_low: f64,
    pub risk_scale_medium: f64,
    pub risk_scale_high: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            min_reasoning_cooldown: 20,
            periodic_review_ticks: 48,
            strategy_validity_ticks: 96,
            min_trigger_priority: 5,
            price_divergence_threshold: 0.25,
            stale_price_age: 48,
            stale_price_fraction: 0.8,
            explore_stale_fraction: 0.6,
            high_debt_ratio: 0.6,
            goal_mismatch_debt_ratio: 0.4,
            min_profit_margin: 0.08,
            max_acceptable_debt_ratio: 0.6,
            max_treasury_fraction: 0.5,
            max_spend_ratio: 0.1,
            enforce_purchasing_power: true,
            stale_discount_per_tick: 0.002,
            min_depth_ratio: 0.25,
            operating_cost_per_day: 2.0,
            advisor_deadline_ticks: 4,
            advisor_enabled: false,
            risk_scale_low: 0.5,
            risk_scale_medium: 0.75,
            risk_scale_high: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Ticks a headless run executes.
    pub max_ticks: u64,
    /// Wall-clock pacing hint for interactive frontends; unused headless.
    pub ticks_per_second: f64,
    /// Game-hours per tick.
    pub time_scale: f64,

    // World generation
    pub island_count: usize,
    pub agent_count: usize,
    pub ships_per_agent: usize,
    pub initial_ship_cash: f64,
    pub initial_agent_cash: f64,
    pub initial_treasury: f64,

    /// Transaction tax rate; tax is destroyed, not transferred.
    pub tax_rate: f64,

    pub market: MarketConfig,
    pub depth: MarketDepthConfig,
    pub consumption: ConsumptionConfig,
    pub population: PopulationConfig,
    pub production: ProductionConfig,
    pub ecology: EcologyConfig,
    pub shipping: ShippingConfig,
    pub crew: CrewConfig,
    pub maintenance: MaintenanceConfig,
    pub buildings: BuildingsConfig,
    pub events: EventConfig,
    pub agents: AgentConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_ticks: 2000,
            ticks_per_second: 10.0,
            time_scale: 1.0,
            island_count: 6,
            agent_count: 3,
            ships_per_agent: 1,
            initial_ship_cash: 1000.0,
            initial_agent_cash: 500.0,
            initial_treasury: 2000.0,
            tax_rate: 0.05,
            market: MarketConfig::default(),
            depth: MarketDepthConfig::default(),
            consumption: ConsumptionConfig::default(),
            population: PopulationConfig::default(),
            production: ProductionConfig::default(),
            ecology: EcologyConfig::default(),
            shipping: ShippingConfig::default(),
            crew: CrewConfig::default(),
            maintenance: MaintenanceConfig::default(),
            buildings: BuildingsConfig::default(),
            events: EventConfig::default(),
            agents: AgentConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Builds a configuration for a named preset.
    pub fn from_preset(preset: &PresetName) -> Self {
        let mut config = SimulationConfig::default();
        match preset {
            PresetName::Default => {}
            PresetName::SmallArchipelago => {
                config.island_count = 3;
                config.agent_count = 1;
                config.max_ticks = 1000;
            }
            PresetName::LargeArchipelago => {
                config.island_count = 12;
                config.agent_count = 6;
                config.ships_per_agent = 2;
                config.max_ticks = 5000;
            }
            PresetName::Scarcity => {
                config.initial_treasury = 300.0;
                config.initial_ship_cash = 300.0;
                config.ecology.fish_regen_rate = 0.002;
                config.ecology.forest_regen_rate = 0.001;
            }
            PresetName::StormSeason => {
                config.events.event_chance_per_tick = 0.08;
                config.events.storm_weight = 0.7;
                config.events.storm_spoilage_multiplier = 2.5;
            }
            PresetName::QuickTest => {
                config.island_count = 2;
                config.agent_count = 1;
                config.max_ticks = 200;
            }
        }
        config
    }

    /// Loads a configuration from a YAML or TOML file, dispatching on the
    /// file extension.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(SimulationError::ConfigFileRead)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let config: SimulationConfig = match extension {
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .map_err(|e| SimulationError::YamlParse(e.to_string()))?,
            "toml" => toml::from_str(&contents)
                .map_err(|e| SimulationError::TomlParse(e.to_string()))?,
            other => return Err(SimulationError::UnsupportedConfigFormat(other.to_string())),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates internal consistency. Called by `from_file` and again by
    /// `initialize_world`, which treats a failure as fatal.
    pub fn validate(&self) -> Result<()> {
        fn require(cond: bool, msg: &str) -> Result<()> {
            if cond {
                Ok(())
            } else {
                Err(SimulationError::ValidationError(msg.to_string()))
            }
        }

        require(self.time_scale > 0.0, "time_scale must be positive")?;
        require(self.island_count >= 1, "island_count must be at least 1")?;
        require(self.tax_rate >= 0.0 && self.tax_rate < 1.0, "tax_rate must be in [0, 1)")?;
        require(self.market.min_price > 0.0, "market.min_price must be positive")?;
        require(
            self.market.min_price < self.market.max_price,
            "market.min_price must be below market.max_price",
        )?;
        require(
            (0.0..=1.0).contains(&self.market.price_lambda),
            "market.price_lambda must be in [0, 1]",
        )?;
        require(self.depth.min_depth > 0.0, "depth.min_depth must be positive")?;
        require(
            self.ecology.dead_threshold < self.ecology.collapse_threshold
                && self.ecology.collapse_threshold < self.ecology.critical_threshold
                && self.ecology.critical_threshold < self.ecology.healthy_threshold,
            "ecology thresholds must be ordered dead < collapse < critical < healthy",
        )?;
        require(
            self.ecology.collapse_floor < self.ecology.critical_yield
                && self.ecology.critical_yield < 1.0,
            "ecology yield knees must be ordered collapse_floor < critical_yield < 1",
        )?;
        require(
            self.ecology.harvest_efficiency > 0.0 && self.ecology.harvest_efficiency <= 1.0,
            "ecology.harvest_efficiency must be in (0, 1]",
        )?;
        require(
            self.population.crisis_health_threshold < self.population.stable_health_threshold
                && self.population.stable_health_threshold
                    < self.population.optimal_health_threshold,
            "population health thresholds must be ordered crisis < stable < optimal",
        )?;
        let sectors = LaborSector::all().len() as f64;
        require(
            self.population.min_sector_share * sectors <= 1.0,
            "population.min_sector_share too large to sum shares to 1",
        )?;
        require(
            self.population.max_sector_share * sectors >= 1.0,
            "population.max_sector_share too small to sum shares to 1",
        )?;
        let share_sum: f64 = self.population.base_shares.values().sum();
        require(
            (share_sum - 1.0).abs() < 1e-6,
            "population.base_shares must sum to 1",
        )?;
        for sector in LaborSector::all() {
            require(
                self.population.base_shares.contains_key(&sector),
                "population.base_shares must cover every labor sector",
            )?;
        }
        require(
            (0.0..1.0).contains(&self.crew.min_crew_fraction),
            "crew.min_crew_fraction must be in [0, 1)",
        )?;
        require(
            self.maintenance.critical_condition_threshold > 0.0
                && self.maintenance.critical_condition_threshold < 1.0,
            "maintenance.critical_condition_threshold must be in (0, 1)",
        )?;
        require(
            self.events.storm_duration.min <= self.events.storm_duration.max
                && self.events.blight_duration.min <= self.events.blight_duration.max
                && self.events.festival_duration.min <= self.events.festival_duration.max
                && self.events.shock_duration.min <= self.events.shock_duration.max,
            "event duration ranges must have min <= max",
        )?;
        require(
            self.agents.max_spend_ratio > 0.0 && self.agents.max_spend_ratio <= 1.0,
            "agents.max_spend_ratio must be in (0, 1]",
        )?;
        Ok(())
    }

    /// Merges a partial override set into this configuration. Used by the
    /// command boundary between ticks.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(seed) = overrides.seed {
            self.seed = seed;
        }
        if let Some(max_ticks) = overrides.max_ticks {
            self.max_ticks = max_ticks;
        }
        if let Some(time_scale) = overrides.time_scale {
            self.time_scale = time_scale;
        }
        if let Some(tax_rate) = overrides.tax_rate {
            self.tax_rate = tax_rate;
        }
        if let Some(advisor_enabled) = overrides.advisor_enabled {
            self.agents.advisor_enabled = advisor_enabled;
        }
        if let Some(event_chance) = overrides.event_chance_per_tick {
            self.events.event_chance_per_tick = event_chance;
        }
        if let Some(min_profit_margin) = overrides.min_profit_margin {
            self.agents.min_profit_margin = min_profit_margin;
        }
    }
}

/// Partial configuration accepted by `apply_config_overrides` between ticks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigOverrides {
    pub seed: Option<u64>,
    pub max_ticks: Option<u64>,
    pub time_scale: Option<f64>,
    pub tax_rate: Option<f64>,
    pub advisor_enabled: Option<bool>,
    pub event_chance_per_tick: Option<f64>,
    pub min_profit_margin: Option<f64>,
}
