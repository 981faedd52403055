//! Outpost Game - A small colony game on top of the outpost runtime
//!
//! The server game owns the authoritative state:
//! - A session counter ticking on the injected [`outpost_core::Scheduler`]
//! - Buildings on a hex grid, each with a construction state
//! - XP per finished building and iron from complete mineshafts
//!
//! [`dump_game`] projects it as a wire object for the state feed, and
//! [`ClientGame::from_root`] rebuilds a live replica on the other side.
//! Both sides answer the same [`Game`] queries.
//!
//! ## Example
//!
//! ```
//! use outpost_core::Scheduler;
//! use outpost_game::{BuildingKind, Game, GameConfig, HexCoord, ServerGame};
//!
//! let game = ServerGame::new(Scheduler::new(0), GameConfig::default()).unwrap();
//! game.place_building(BuildingKind::Habitat, HexCoord::new(0, 0)).unwrap();
//!
//! game.scheduler().advance_to(15_000);
//! assert_eq!(game.counter().value(), 15);
//! assert_eq!(game.xp().value(), 10);
//! ```

mod buildings;
mod commands;
mod config;
mod error;
mod game;
pub mod network;

pub use buildings::{Building, BuildingKind, BuildingState, HexCoord};
pub use commands::{PlaceBuildingRequest, SignInOutcome, SignInRequest};
pub use config::GameConfig;
pub use error::{Error, Result};
pub use game::{Game, ServerGame};
pub use network::{
    dump_building, dump_building_state, dump_game, read_building, read_building_state, ClientGame,
};
