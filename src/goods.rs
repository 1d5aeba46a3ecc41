//! Good definitions for the archipelago economy.
//!
//! Goods form a closed set: every island produces, stores, and prices the
//! same five goods, and ships carry them as cargo. Each good belongs to a
//! market category (which sets its price elasticity defaults) and to a
//! labor sector (which sets which share of an island's workforce produces
//! it).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use strum_macros::{EnumIter, EnumString};

/// The tradeable goods of the archipelago.
///
/// Ordering is derived so goods can key `BTreeMap`s and iterate in a stable
/// order for state hashing.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum GoodId {
    Grain,
    Fish,
    Timber,
    Tools,
    Luxuries,
}

impl GoodId {
    /// All goods in canonical (sorted) order.
    pub fn all() -> [GoodId; 5] {
        [GoodId::Grain, GoodId::Fish, GoodId::Timber, GoodId::Tools, GoodId::Luxuries]
    }

    /// Stable identifier used in snapshots, logs, and advisor prompts.
    pub fn as_str(&self) -> &'static str {
        match self {
            GoodId::Grain => "grain",
            GoodId::Fish => "fish",
            GoodId::Timber => "timber",
            GoodId::Tools => "tools",
            GoodId::Luxuries => "luxuries",
        }
    }

    /// The labor sector that produces this good.
    pub fn sector(&self) -> LaborSector {
        match self {
            GoodId::Grain => LaborSector::Farming,
            GoodId::Fish => LaborSector::Fishing,
            GoodId::Timber => LaborSector::Forestry,
            GoodId::Tools | GoodId::Luxuries => LaborSector::Crafts,
        }
    }

    pub fn category(&self) -> GoodCategory {
        match self {
            GoodId::Grain | GoodId::Fish => GoodCategory::Food,
            GoodId::Timber => GoodCategory::Material,
            GoodId::Tools => GoodCategory::Tool,
            GoodId::Luxuries => GoodCategory::Luxury,
        }
    }

    /// Extractive goods are capped by the sustainable harvest of their
    /// underlying ecosystem stock.
    pub fn is_extractive(&self) -> bool {
        matches!(self, GoodId::Fish | GoodId::Timber)
    }
}

impl fmt::Display for GoodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Market category of a good; drives per-category pricing defaults.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum GoodCategory {
    Food,
    Material,
    Tool,
    Luxury,
}

impl GoodCategory {
    pub fn all() -> [GoodCategory; 4] {
        [GoodCategory::Food, GoodCategory::Material, GoodCategory::Tool, GoodCategory::Luxury]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GoodCategory::Food => "food",
            GoodCategory::Material => "material",
            GoodCategory::Tool => "tool",
            GoodCategory::Luxury => "luxury",
        }
    }
}

/// Labor sectors an island's population divides itself across.
///
/// Services produces no tradeable good; its implied wage tracks the general
/// price level so labor does not drain out of it entirely.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, EnumIter,
)]
#[serde(rename_all = "snake_case")]
pub enum LaborSector {
    Farming,
    Fishing,
    Forestry,
    Crafts,
    Services,
}

impl LaborSector {
    pub fn all() -> [LaborSector; 5] {
        [
            LaborSector::Farming,
            LaborSector::Fishing,
            LaborSector::Forestry,
            LaborSector::Crafts,
            LaborSector::Services,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LaborSector::Farming => "farming",
            LaborSector::Fishing => "fishing",
            LaborSector::Forestry => "forestry",
            LaborSector::Crafts => "crafts",
            LaborSector::Services => "services",
        }
    }

    /// Goods produced by this sector, in canonical order.
    pub fn goods(&self) -> &'static [GoodId] {
        match self {
            LaborSector::Farming => &[GoodId::Grain],
            LaborSector::Fishing => &[GoodId::Fish],
            LaborSector::Forestry => &[GoodId::Timber],
            LaborSector::Crafts => &[GoodId::Tools, GoodId::Luxuries],
            LaborSector::Services => &[],
        }
    }
}

impl fmt::Display for LaborSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static definition of a good: its economics never change during a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoodDefinition {
    pub id: GoodId,
    /// Reference price anchoring the clamp band and pressure formula.
    pub base_price: f64,
    /// Cargo volume per unit; ships are capacity-limited by volume.
    pub bulkiness: f64,
    /// Per-hour exponential decay rate of stored cargo. Zero for durables.
    pub spoilage_rate: f64,
}

impl GoodDefinition {
    pub fn category(&self) -> GoodCategory {
        self.id.category()
    }
}

/// The canonical good table, keyed in sorted order.
pub fn default_goods() -> BTreeMap<GoodId, GoodDefinition> {
    let defs = [
        GoodDefinition { id: GoodId::Grain, base_price: 10.0, bulkiness: 1.0, spoilage_rate: 0.002 },
        GoodDefinition { id: GoodId::Fish, base_price: 8.0, bulkiness: 1.0, spoilage_rate: 0.02 },
        GoodDefinition { id: GoodId::Timber, base_price: 15.0, bulkiness: 2.0, spoilage_rate: 0.0 },
        GoodDefinition { id: GoodId::Tools, base_price: 40.0, bulkiness: 1.5, spoilage_rate: 0.0 },
        GoodDefinition {
            id: GoodId::Luxuries,
            base_price: 80.0,
            bulkiness: 0.5,
            spoilage_rate: 0.001,
        },
    ];
    defs.into_iter().map(|d| (d.id, d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_all_goods_have_definitions() {
        let goods = default_goods();
        for good in GoodId::iter() {
            assert!(goods.contains_key(&good), "missing definition for {}", good);
        }
    }

    #[test]
    fn test_sector_mapping_is_total() {
        for good in GoodId::iter() {
            let sector = good.sector();
            assert!(sector.goods().contains(&good), "{} not listed under {}", good, sector);
        }
    }

    #[test]
    fn test_services_produces_nothing() {
        assert!(LaborSector::Services.goods().is_empty());
    }

    #[test]
    fn test_extractive_goods() {
        assert!(GoodId::Fish.is_extractive());
        assert!(GoodId::Timber.is_extractive());
        assert!(!GoodId::Grain.is_extractive());
        assert!(!GoodId::Tools.is_extractive());
    }

    #[test]
    fn test_btreemap_iteration_is_canonical() {
        let goods = default_goods();
        let keys: Vec<GoodId> = goods.keys().copied().collect();
        assert_eq!(keys, GoodId::all().to_vec());
    }

    #[test]
    fn test_good_id_serde_round_trip() {
        let json = serde_json::to_string(&GoodId::Luxuries).unwrap();
        assert_eq!(json, "\"luxuries\"");
        let back: GoodId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GoodId::Luxuries);
    }

    #[test]
    fn test_food_goods_spoil() {
        let goods = default_goods();
        assert!(goods[&GoodId::Fish].spoilage_rate > goods[&GoodId::Grain].spoilage_rate);
        assert_eq!(goods[&GoodId::Timber].spoilage_rate, 0.0);
    }
}
