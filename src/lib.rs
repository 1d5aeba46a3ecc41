//! # Archipelago Economic Simulator
//!
//! A deterministic, tick-driven agent-based economic simulation of a
//! maritime archipelago. Islands produce and consume goods under
//! ecological constraints, ships haul cargo between local markets that
//! form prices from inventory pressure and consumption velocity, and
//! autonomous trader agents observe the world, plan voyages, and trade.
//!
//! ## Quick Start
//!
//! ```no_run
//! use archipelago_sim::{SimulationConfig, SimulationEngine};
//!
//! let config = SimulationConfig {
//!     max_ticks: 500,
//!     island_count: 6,
//!     seed: 42,
//!     ..Default::default()
//! };
//!
//! let mut engine = SimulationEngine::new(config).unwrap();
//! engine.run();
//!
//! println!("final hash: {:#x}", engine.world().state_hash());
//! ```
//!
//! ## Determinism
//!
//! One tick is one game-hour. Each tick composes a fixed stage sequence
//! (events, then per island production / ecology / consumption /
//! population / prices / depth, then ships, crew, shipyards) and commits a
//! successor world with a stable fingerprint. All randomness flows through
//! a single seeded generator whose state lives on the world, so equal
//! seeds and configurations produce byte-identical fingerprint sequences.
//!
//! ## Modules
//!
//! - [`agent`] - Two-tier trader agents: triggered strategist over a rule-based executor
//! - [`config`] - Simulation configuration, presets, file loading, overrides
//! - [`consumption`] - Food and luxury consumption and deficit computation
//! - [`crew`] - Wages, morale, desertion, and crew efficiency
//! - [`ecology`] - Regeneration with hysteresis, yield curve, fish migration
//! - [`engine`] - Tick orchestrator, metrics emission, command boundary
//! - [`error`] - Custom error types
//! - [`events`] - Storms, blights, festivals, discoveries, supply shocks
//! - [`goods`] - The closed good set and its definitions
//! - [`hash`] - Stable state fingerprinting
//! - [`invariant`] - Invariant checking framework
//! - [`island`] - Island state: ecosystem, population, market, treasury
//! - [`market`] - Price formation, market depth, trade execution
//! - [`population`] - Health, growth, wage-driven labor reallocation
//! - [`production`] - Per-good output from labor, ecology, tools, health
//! - [`replay`] - Action logging and replay verification
//! - [`result`] - Run summaries and statistics
//! - [`rng`] - Seeded deterministic random numbers
//! - [`ship`] - Ship state: cargo, crew, condition, voyages
//! - [`shipping`] - Voyage progression, spoilage, wear, repair, sinking
//! - [`shipyard`] - Build orders and ship delivery
//! - [`snapshot`] - Per-tick serializable snapshots
//! - [`world`] - The world root and initialization

pub mod agent;
pub mod config;
pub mod consumption;
pub mod crew;
pub mod ecology;
pub mod engine;
pub mod error;
pub mod events;
pub mod goods;
pub mod hash;
pub mod invariant;
pub mod island;
pub mod market;
pub mod population;
pub mod production;
pub mod replay;
pub mod result;
pub mod rng;
pub mod ship;
pub mod shipping;
pub mod shipyard;
pub mod snapshot;
pub mod world;

#[cfg(test)]
mod tests;

pub use agent::{
    Action, AgentManager, AgentMemory, AgentState, ObservableState, PrimaryGoal, RiskTolerance,
    Strategist, Strategy,
};
pub use config::{ConfigOverrides, PresetName, SimulationConfig};
pub use engine::{SimulationEngine, TickMetrics};
pub use error::{Result, SimulationError};
pub use events::{EventType, WorldEvent};
pub use goods::{GoodCategory, GoodDefinition, GoodId, LaborSector};
pub use invariant::{Invariant, InvariantChecker, InvariantViolation};
pub use island::IslandState;
pub use replay::{ActionLog, RecordedAction};
pub use result::{RunStats, SimulationResult};
pub use rng::SeededRng;
pub use ship::ShipState;
pub use snapshot::WorldSnapshot;
pub use world::{initialize_world, WorldState};
