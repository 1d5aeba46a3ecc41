//! Per-tick serializable snapshots for external consumers.
//!
//! Field order is stable (maps are sorted, vectors sorted by id) so that
//! downstream hashing of the serialized form is reproducible.

use crate::error::{Result, SimulationError};
use crate::goods::GoodId;
use crate::island::IslandId;
use crate::ship::{ShipId, ShipLocation};
use crate::world::{GameTime, EconomyMetrics, WorldState};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub size: f64,
    pub health: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EcosystemSnapshot {
    pub fish_stock: f64,
    pub forest_biomass: f64,
    pub soil_fertility: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreasurySnapshot {
    pub balance: f64,
    pub total_exports: f64,
    pub total_imports: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IslandSnapshot {
    pub id: IslandId,
    pub name: String,
    pub population: PopulationSnapshot,
    pub ecosystem: EcosystemSnapshot,
    pub prices: BTreeMap<GoodId, f64>,
    pub inventory: BTreeMap<GoodId, f64>,
    pub treasury: Option<TreasurySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrewSnapshot {
    pub count: u32,
    pub capacity: u32,
    pub morale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipSnapshot {
    pub id: ShipId,
    pub name: String,
    pub location: ShipLocation,
    pub cargo: BTreeMap<GoodId, f64>,
    pub cash: f64,
    pub crew: CrewSnapshot,
    pub condition: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub id: String,
    pub event_type: String,
    pub start_tick: u64,
    pub end_tick: u64,
}

/// One tick's externally visible state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub time: GameTime,
    pub state_hash: u64,
    pub islands: Vec<IslandSnapshot>,
    pub ships: Vec<ShipSnapshot>,
    pub events: Vec<EventSnapshot>,
    pub metrics: EconomyMetrics,
}

impl WorldSnapshot {
    pub fn from_world(world: &WorldState) -> Self {
        let islands = world
            .islands
            .values()
            .map(|island| IslandSnapshot {
                id: island.id.clone(),
                name: island.name.clone(),
                population: PopulationSnapshot {
                    size: island.population.size,
                    health: island.population.health,
                },
                ecosystem: EcosystemSnapshot {
                    fish_stock: island.ecosystem.fish_stock,
                    forest_biomass: island.ecosystem.forest_biomass,
                    soil_fertility: island.ecosystem.soil_fertility,
                },
                prices: island.market.prices.clone(),
                inventory: island.inventory.clone(),
                treasury: island.treasury.as_ref().map(|t| TreasurySnapshot {
                    balance: t.balance,
                    total_exports: t.total_exports,
                    total_imports: t.total_imports,
                }),
            })
            .collect();
        let ships = world
            .ships
            .values()
            .map(|ship| ShipSnapshot {
                id: ship.id.clone(),
                name: ship.name.clone(),
                location: ship.location.clone(),
                cargo: ship.cargo.clone(),
                cash: ship.cash,
                crew: CrewSnapshot {
                    count: ship.crew.count,
                    capacity: ship.crew.capacity,
                    morale: ship.crew.morale,
                },
                condition: ship.condition,
            })
            .collect();
        let mut events: Vec<EventSnapshot> = world
            .events
            .iter()
            .map(|event| EventSnapshot {
                id: event.id.clone(),
                event_type: event.event_type.to_string(),
                start_tick: event.start_tick,
                end_tick: event.end_tick,
            })
            .collect();
        events.sort_by(|a, b| a.id.cmp(&b.id));

        WorldSnapshot {
            tick: world.tick,
            time: world.time,
            state_hash: world.state_hash(),
            islands,
            ships,
            events,
            metrics: world.metrics.clone(),
        }
    }
}

/// Append-only writer for a snapshot stream, one JSON document per line,
/// optionally gzip-compressed.
pub struct SnapshotWriter {
    writer: Box<dyn Write>,
}

impl SnapshotWriter {
    pub fn create<P: AsRef<Path>>(path: P, compress: bool) -> Result<Self> {
        let file = File::create(path)?;
        let writer: Box<dyn Write> = if compress {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };
        Ok(SnapshotWriter { writer })
    }

    pub fn append(&mut self, snapshot: &WorldSnapshot) -> Result<()> {
        let line = serde_json::to_string(snapshot)
            .map_err(|e| SimulationError::JsonSerialize(e.to_string()))?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationConfig;
    use crate::world::initialize_world;

    #[test]
    fn test_snapshot_sorted_and_complete() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        let snapshot = WorldSnapshot::from_world(&world);
        assert_eq!(snapshot.islands.len(), world.islands.len());
        assert_eq!(snapshot.ships.len(), world.ships.len());
        let mut island_ids: Vec<String> =
            snapshot.islands.iter().map(|i| i.id.clone()).collect();
        let sorted = {
            let mut v = island_ids.clone();
            v.sort();
            v
        };
        assert_eq!(island_ids, sorted);
        island_ids.dedup();
        assert_eq!(island_ids.len(), snapshot.islands.len());
    }

    #[test]
    fn test_snapshot_serialization_stable() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        let a = serde_json::to_string(&WorldSnapshot::from_world(&world)).unwrap();
        let b = serde_json::to_string(&WorldSnapshot::from_world(&world)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_snapshot_round_trip() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        let snapshot = WorldSnapshot::from_world(&world);
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: WorldSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn test_snapshot_writer_plain() {
        let config = SimulationConfig::default();
        let world = initialize_world(&config).unwrap();
        let snapshot = WorldSnapshot::from_world(&world);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.jsonl");
        let mut writer = SnapshotWriter::create(&path, false).unwrap();
        writer.append(&snapshot).unwrap();
        writer.finish().unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }
}
