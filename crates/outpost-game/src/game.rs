//! Game state: the authoritative server game and the shared read API

use crate::commands::PlaceBuildingRequest;
use crate::{Building, BuildingKind, GameConfig, HexCoord, Result};
use outpost_core::{Cell, MutableCollection, ReactiveCollection, Scheduler};

/// Read access shared by the server game and its client replicas
pub trait Game {
    /// Session counter, one tick per counter period
    fn counter(&self) -> Cell<u64>;

    /// Experience gained from finished buildings
    fn xp(&self) -> Cell<u64>;

    /// Iron mined so far
    fn iron(&self) -> Cell<u64>;

    /// Every building on the map
    fn buildings(&self) -> ReactiveCollection<Building>;

    /// The building at `coord`, if exactly one stands there
    fn building_at(&self, coord: HexCoord) -> Cell<Option<Building>> {
        self.buildings()
            .single_where(move |building| building.coord == coord)
    }
}

/// The authoritative game
///
/// All derived totals are retained, so they keep counting with nobody
/// watching.
pub struct ServerGame {
    scheduler: Scheduler,
    config: GameConfig,
    buildings: MutableCollection<Building>,
    counter: Cell<u64>,
    xp: Cell<u64>,
    iron: Cell<u64>,
}

impl ServerGame {
    /// Create an empty map; the counter starts at zero and ticks from now
    pub fn new(scheduler: Scheduler, config: GameConfig) -> Result<Self> {
        let buildings = MutableCollection::new();

        let counter = scheduler
            .periodic(config.counter_period_ms)
            .accum(0, |n: &u64, _| n + 1)
            .retain()?;

        let xp_per_building = config.xp_per_building;
        let xp = buildings
            .collection()
            .merge_map(move |building: &Building| {
                building.on_construction_finished().map_to(xp_per_building)
            })
            .accum_sum(0)
            .retain()?;

        let mining_scheduler = scheduler.clone();
        let mining_config = config.clone();
        let iron = buildings
            .collection()
            .merge_map(move |building: &Building| {
                building.on_iron_mined(&mining_scheduler, &mining_config)
            })
            .accum_sum(0)
            .retain()?;

        tracing::debug!(now = scheduler.now(), "server game created");
        Ok(Self {
            scheduler,
            config,
            buildings,
            counter,
            xp,
            iron,
        })
    }

    /// Start construction at `coord`; returns `false` if the tile is taken
    pub fn place_building(&self, kind: BuildingKind, coord: HexCoord) -> Result<bool> {
        if self.building_at(coord).value().is_some() {
            tracing::debug!(%coord, "tile already occupied");
            return Ok(false);
        }
        let building = Building::create(kind, coord, &self.scheduler, &self.config)?;
        Ok(self.buildings.insert(building))
    }

    /// Apply a decoded command-channel request
    pub fn apply_command(&self, request: &PlaceBuildingRequest) -> Result<bool> {
        self.place_building(request.kind, request.coord)
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }
}

impl Game for ServerGame {
    fn counter(&self) -> Cell<u64> {
        self.counter.clone()
    }

    fn xp(&self) -> Cell<u64> {
        self.xp.clone()
    }

    fn iron(&self) -> Cell<u64> {
        self.iron.clone()
    }

    fn buildings(&self) -> ReactiveCollection<Building> {
        self.buildings.collection()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game() -> ServerGame {
        ServerGame::new(Scheduler::new(0), GameConfig::default()).unwrap()
    }

    #[test]
    fn test_counter_ticks() {
        let game = game();
        assert_eq!(game.counter().value(), 0);

        game.scheduler().advance_by(3000);

        assert_eq!(game.counter().value(), 3);
    }

    #[test]
    fn test_place_building_once_per_tile() {
        let game = game();
        let coord = HexCoord::new(2, 3);

        assert!(game.place_building(BuildingKind::Habitat, coord).unwrap());
        assert!(!game.place_building(BuildingKind::Mineshaft, coord).unwrap());
        assert_eq!(game.buildings().len(), 1);

        let here = game.building_at(coord).value().unwrap();
        assert_eq!(here.kind, BuildingKind::Habitat);
        assert!(game.building_at(HexCoord::new(0, 0)).value().is_none());
    }

    #[test]
    fn test_xp_per_finished_building() {
        let game = game();
        game.place_building(BuildingKind::Mineshaft, HexCoord::new(0, 0))
            .unwrap();
        game.scheduler().advance_by(5000);
        game.place_building(BuildingKind::Habitat, HexCoord::new(0, 1))
            .unwrap();

        game.scheduler().advance_to(10_000);
        assert_eq!(game.xp().value(), 10);

        game.scheduler().advance_to(20_000);
        assert_eq!(game.xp().value(), 20);
    }

    #[test]
    fn test_iron_from_complete_mineshafts() {
        let game = game();
        game.place_building(BuildingKind::Mineshaft, HexCoord::new(0, 0))
            .unwrap();
        game.place_building(BuildingKind::Habitat, HexCoord::new(1, 0))
            .unwrap();

        game.scheduler().advance_to(10_000);
        assert_eq!(game.iron().value(), 0);

        game.scheduler().advance_to(15_000);
        assert_eq!(game.iron().value(), 10);

        game.scheduler().advance_to(25_000);
        assert_eq!(game.iron().value(), 30);
    }

    #[test]
    fn test_placing_buildings_keeps_mining_going() {
        let game = game();
        game.place_building(BuildingKind::Mineshaft, HexCoord::new(0, 0))
            .unwrap();
        game.scheduler().advance_to(10_000);

        for (n, at) in (12_000..=28_000).step_by(4000).enumerate() {
            game.scheduler().advance_to(at);
            let coord = HexCoord::new(1, n as i32);
            assert!(game.place_building(BuildingKind::Habitat, coord).unwrap());
        }
        game.scheduler().advance_to(30_000);

        assert_eq!(game.iron().value(), 40);
    }

    #[test]
    fn test_apply_command() {
        let game = game();
        let request = PlaceBuildingRequest::decode(
            r#"{"type": "Mineshaft", "coord": {"i": 4, "j": -2}}"#,
        )
        .unwrap();

        assert!(game.apply_command(&request).unwrap());
        let placed = game.building_at(HexCoord::new(4, -2)).value().unwrap();
        assert_eq!(placed.kind, BuildingKind::Mineshaft);
    }
}
