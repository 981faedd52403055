//! Projecting the game over the state feed, and rebuilding it on a client
//!
//! Root shape:
//!
//! ```text
//! { counter, xpCount, ironAmount,
//!   buildings: { "<i>:<j>": { type, coord: {i, j},
//!                             state: {state: "incomplete", startTime} | {state: "complete"} } } }
//! ```

use crate::game::Game;
use crate::{Building, BuildingKind, BuildingState, Error, GameConfig, HexCoord, Result};
use indexmap::IndexMap;
use outpost_core::{Cell, ReactiveCollection};
use outpost_sync::{
    dump_cell, dump_collection, dump_object, dump_object_cell, read_cell, read_collection,
    read_object_cell, read_object_property, read_value, WireObject,
};
use serde_json::json;

fn object<const N: usize>(fields: [(&str, WireObject); N]) -> WireObject {
    dump_object(
        fields
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect::<IndexMap<_, _>>(),
    )
}

/// Wire form of a building's construction state
pub fn dump_building_state(state: &BuildingState) -> WireObject {
    match state {
        BuildingState::Incomplete { start_time, .. } => object([
            ("state", WireObject::constant(json!("incomplete"))),
            ("startTime", WireObject::constant(json!(start_time))),
        ]),
        BuildingState::Complete => object([("state", WireObject::constant(json!("complete")))]),
    }
}

/// Wire form of a building; its state is swapped wholesale on completion
pub fn dump_building(building: &Building) -> WireObject {
    object([
        ("type", WireObject::constant(json!(building.kind.name()))),
        (
            "coord",
            WireObject::constant(json!({"i": building.coord.i, "j": building.coord.j})),
        ),
        (
            "state",
            dump_object_cell(&building.state.map(dump_building_state)),
        ),
    ])
}

/// Wire form of a whole game
pub fn dump_game(game: &impl Game) -> Result<WireObject> {
    let buildings = game
        .buildings()
        .map(|building: &Building| (building.coord.key(), dump_building(building)));
    Ok(object([
        ("counter", dump_cell(&game.counter())?),
        ("buildings", dump_collection(&buildings)),
        ("xpCount", dump_cell(&game.xp())?),
        ("ironAmount", dump_cell(&game.iron())?),
    ]))
}

/// Rebuild a construction state; `duration` is not on the wire and comes
/// from the building kind
pub fn read_building_state(object: &WireObject, duration: u64) -> Result<BuildingState> {
    let tag: String = read_value(&read_object_property(object, "state")?)?;
    match tag.as_str() {
        "complete" => Ok(BuildingState::Complete),
        "incomplete" => Ok(BuildingState::Incomplete {
            start_time: read_value(&read_object_property(object, "startTime")?)?,
            duration,
        }),
        _ => Err(Error::unrecognized("building state", tag)),
    }
}

/// Rebuild a building, following its state
pub fn read_building(object: &WireObject, config: &GameConfig) -> Result<Building> {
    let kind_name: String = read_value(&read_object_property(object, "type")?)?;
    let kind: BuildingKind = kind_name.parse()?;
    let coord: HexCoord = read_value(&read_object_property(object, "coord")?)?;
    let duration = kind.construction_ms(config);
    let state = read_object_cell(&read_object_property(object, "state")?, move |state| {
        read_building_state(state, duration)
    })?
    .retain()?;
    Ok(Building::new(kind, coord, state))
}

/// A client replica of a game, rebuilt from the root wire object
pub struct ClientGame {
    counter: Cell<u64>,
    xp: Cell<u64>,
    iron: Cell<u64>,
    buildings: ReactiveCollection<Building>,
}

impl ClientGame {
    /// Rebuild every root property and keep them following the feed
    pub fn from_root(root: &WireObject, config: &GameConfig) -> Result<Self> {
        let counter = read_cell(&read_object_property(root, "counter")?)?.retain()?;
        let xp = read_cell(&read_object_property(root, "xpCount")?)?.retain()?;
        let iron = read_cell(&read_object_property(root, "ironAmount")?)?.retain()?;

        let config = config.clone();
        let buildings = read_collection(
            &read_object_property(root, "buildings")?,
            move |_id: &str, building: &WireObject| read_building(building, &config),
        )?;
        let buildings = ReactiveCollection::from_cell(buildings.as_cell().retain()?);
        tracing::debug!(buildings = buildings.len(), "client game rebuilt");

        Ok(Self {
            counter,
            xp,
            iron,
            buildings,
        })
    }
}

impl Game for ClientGame {
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
        self.buildings.clone()
    }
}
